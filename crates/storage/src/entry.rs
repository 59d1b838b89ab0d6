//! Value types held by the in-memory keyspace

use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// A value stored under one key
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// Plain string (also used for integers)
    Str(String),
    /// Unordered set of members
    Set(FxHashSet<String>),
    /// Members ordered by score
    ZSet(SortedSet),
    /// Field/value map
    Hash(FxHashMap<String, String>),
}

impl Entry {
    /// Name used in wrong-type errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Entry::Str(_) => "string",
            Entry::Set(_) => "set",
            Entry::ZSet(_) => "zset",
            Entry::Hash(_) => "hash",
        }
    }

    /// Aggregates with no members are removed from the keyspace
    pub fn is_empty_aggregate(&self) -> bool {
        match self {
            Entry::Str(_) => false,
            Entry::Set(s) => s.is_empty(),
            Entry::ZSet(z) => z.is_empty(),
            Entry::Hash(h) => h.is_empty(),
        }
    }
}

/// Member keyed by `(score, member)` so ties order lexicographically
#[derive(Debug, Clone)]
struct Ranked {
    score: f64,
    member: String,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.member.cmp(&other.member))
    }
}

/// Sorted set: O(1) score lookup, ordered iteration by rank
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    scores: FxHashMap<String, f64>,
    order: BTreeSet<Ranked>,
}

impl PartialEq for SortedSet {
    fn eq(&self, other: &Self) -> bool {
        self.scores == other.scores
    }
}

impl SortedSet {
    /// Create an empty sorted set
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether the set has no members
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Score of `member`
    pub fn score(&self, member: &str) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Insert or rescore a member. Returns true if anything changed.
    pub fn insert(&mut self, member: &str, score: f64) -> bool {
        match self.scores.insert(member.to_string(), score) {
            Some(old) if old.total_cmp(&score) == Ordering::Equal => false,
            Some(old) => {
                self.order.remove(&Ranked {
                    score: old,
                    member: member.to_string(),
                });
                self.order.insert(Ranked {
                    score,
                    member: member.to_string(),
                });
                true
            }
            None => {
                self.order.insert(Ranked {
                    score,
                    member: member.to_string(),
                });
                true
            }
        }
    }

    /// Add `delta` to a member's score, creating it at 0 first
    pub fn incr(&mut self, member: &str, delta: f64) -> f64 {
        let score = self.score(member).unwrap_or(0.0) + delta;
        self.insert(member, score);
        score
    }

    /// Remove a member. Returns true if it was present.
    pub fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.order.remove(&Ranked {
                    score,
                    member: member.to_string(),
                });
                true
            }
            None => false,
        }
    }

    /// Members with ranks in `[start, stop]`, ascending by score
    pub fn range_by_rank(&self, start: i64, stop: i64) -> Vec<(String, f64)> {
        match normalize_rank_range(self.len(), start, stop) {
            Some((from, to)) => self
                .order
                .iter()
                .skip(from)
                .take(to - from + 1)
                .map(|r| (r.member.clone(), r.score))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Remove members with ranks in `[start, stop]`; returns how many
    pub fn remove_range_by_rank(&mut self, start: i64, stop: i64) -> usize {
        let doomed: Vec<String> = self
            .range_by_rank(start, stop)
            .into_iter()
            .map(|(member, _)| member)
            .collect();
        for member in &doomed {
            self.remove(member);
        }
        doomed.len()
    }

    /// Remove members scored within `[min, max]`; returns how many
    pub fn remove_range_by_score(&mut self, min: f64, max: f64) -> usize {
        let doomed: Vec<String> = self
            .order
            .iter()
            .filter(|r| r.score >= min && r.score <= max)
            .map(|r| r.member.clone())
            .collect();
        for member in &doomed {
            self.remove(member);
        }
        doomed.len()
    }
}

/// Resolve Redis-style rank bounds (negative counts from the end) into an
/// inclusive index range, or `None` if the range is empty
pub fn normalize_rank_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}
