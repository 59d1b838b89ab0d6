//! Write commands and batches
//!
//! All mutations travel to the store as a [`WriteBatch`]: an ordered list of
//! [`Command`]s that the store applies all-or-nothing. A batch is the unit
//! of both pipelining (many writes per round-trip) and of the staged half of
//! an optimistic transaction.

use serde::{Deserialize, Serialize};

/// A single staged write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Set a string value
    Set {
        /// Target key
        key: String,
        /// New value
        value: String,
    },

    /// Set several string values at once
    MSet {
        /// Key/value pairs, applied in order
        pairs: Vec<(String, String)>,
    },

    /// Delete a key of any type
    Del {
        /// Target key
        key: String,
    },

    /// Add to an integer string value (missing key counts as 0)
    IncrBy {
        /// Target key
        key: String,
        /// Signed increment
        delta: i64,
    },

    /// Add a member to a set
    SAdd {
        /// Set key
        key: String,
        /// Member to add
        member: String,
    },

    /// Remove a member from a set
    SRem {
        /// Set key
        key: String,
        /// Member to remove
        member: String,
    },

    /// Add or rescore a sorted-set member
    ZAdd {
        /// Sorted-set key
        key: String,
        /// Member
        member: String,
        /// Score used for ordering
        score: f64,
    },

    /// Remove a sorted-set member
    ZRem {
        /// Sorted-set key
        key: String,
        /// Member to remove
        member: String,
    },

    /// Add to a member's score (missing member counts as 0)
    ZIncrBy {
        /// Sorted-set key
        key: String,
        /// Member
        member: String,
        /// Signed increment
        delta: f64,
    },

    /// Remove members by rank range, inclusive; negative ranks count from
    /// the highest score
    ZRemRangeByRank {
        /// Sorted-set key
        key: String,
        /// First rank
        start: i64,
        /// Last rank
        stop: i64,
    },

    /// Remove members whose score lies in `[min, max]`
    ZRemRangeByScore {
        /// Sorted-set key
        key: String,
        /// Lowest score removed
        min: f64,
        /// Highest score removed
        max: f64,
    },

    /// Set a hash field
    HSet {
        /// Hash key
        key: String,
        /// Field name
        field: String,
        /// Field value
        value: String,
    },

    /// Add to an integer hash field (missing field counts as 0)
    HIncrBy {
        /// Hash key
        key: String,
        /// Field name
        field: String,
        /// Signed increment
        delta: i64,
    },
}

impl Command {
    /// Keys this command writes
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Command::MSet { pairs } => pairs.iter().map(|(k, _)| k.as_str()).collect(),
            Command::Set { key, .. }
            | Command::Del { key }
            | Command::IncrBy { key, .. }
            | Command::SAdd { key, .. }
            | Command::SRem { key, .. }
            | Command::ZAdd { key, .. }
            | Command::ZRem { key, .. }
            | Command::ZIncrBy { key, .. }
            | Command::ZRemRangeByRank { key, .. }
            | Command::ZRemRangeByScore { key, .. }
            | Command::HSet { key, .. }
            | Command::HIncrBy { key, .. } => vec![key.as_str()],
        }
    }
}

/// Ordered collection of staged writes
///
/// Builder methods return `&mut Self` so several writes can be chained:
///
/// ```
/// use bazaar_core::WriteBatch;
///
/// let mut batch = WriteBatch::new();
/// batch
///     .hincr_by("users:17", "funds", -10)
///     .sadd("inventory:17", "itemX");
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteBatch {
    commands: Vec<Command>,
}

impl WriteBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of staged commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing is staged
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Staged commands in application order
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Drop every staged command
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Move the staged commands out, leaving the batch empty
    pub fn take(&mut self) -> WriteBatch {
        std::mem::take(self)
    }

    /// Stage an arbitrary command
    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    /// Stage `SET key value`
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(Command::Set {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Stage `MSET k1 v1 k2 v2 ...`
    pub fn mset<K, V>(&mut self, pairs: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let pairs = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.push(Command::MSet { pairs })
    }

    /// Stage `DEL key`
    pub fn del(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::Del { key: key.into() })
    }

    /// Stage `INCRBY key delta`
    pub fn incr_by(&mut self, key: impl Into<String>, delta: i64) -> &mut Self {
        self.push(Command::IncrBy {
            key: key.into(),
            delta,
        })
    }

    /// Stage `SADD key member`
    pub fn sadd(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Command::SAdd {
            key: key.into(),
            member: member.into(),
        })
    }

    /// Stage `SREM key member`
    pub fn srem(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Command::SRem {
            key: key.into(),
            member: member.into(),
        })
    }

    /// Stage `ZADD key score member`
    pub fn zadd(
        &mut self,
        key: impl Into<String>,
        member: impl Into<String>,
        score: f64,
    ) -> &mut Self {
        self.push(Command::ZAdd {
            key: key.into(),
            member: member.into(),
            score,
        })
    }

    /// Stage `ZREM key member`
    pub fn zrem(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Command::ZRem {
            key: key.into(),
            member: member.into(),
        })
    }

    /// Stage `ZINCRBY key delta member`
    pub fn zincr_by(
        &mut self,
        key: impl Into<String>,
        member: impl Into<String>,
        delta: f64,
    ) -> &mut Self {
        self.push(Command::ZIncrBy {
            key: key.into(),
            member: member.into(),
            delta,
        })
    }

    /// Stage `ZREMRANGEBYRANK key start stop`
    pub fn zrem_range_by_rank(&mut self, key: impl Into<String>, start: i64, stop: i64) -> &mut Self {
        self.push(Command::ZRemRangeByRank {
            key: key.into(),
            start,
            stop,
        })
    }

    /// Stage `ZREMRANGEBYSCORE key min max`
    pub fn zrem_range_by_score(&mut self, key: impl Into<String>, min: f64, max: f64) -> &mut Self {
        self.push(Command::ZRemRangeByScore {
            key: key.into(),
            min,
            max,
        })
    }

    /// Stage `HSET key field value`
    pub fn hset(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.push(Command::HSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        })
    }

    /// Stage `HINCRBY key field delta`
    pub fn hincr_by(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        delta: i64,
    ) -> &mut Self {
        self.push(Command::HIncrBy {
            key: key.into(),
            field: field.into(),
            delta,
        })
    }
}

impl From<Command> for WriteBatch {
    fn from(command: Command) -> Self {
        WriteBatch {
            commands: vec![command],
        }
    }
}

impl IntoIterator for WriteBatch {
    type Item = Command;
    type IntoIter = std::vec::IntoIter<Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}
