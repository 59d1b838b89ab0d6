//! In-process implementation of [`Store`]
//!
//! # Design
//!
//! - One `RwLock` over the whole keyspace: reads share it, every batch
//!   holds the write lock from validation through application, so no
//!   reader ever observes half of a batch.
//! - Every key carries a revision, bumped on each effective modification.
//!   Revisions outlive deletion, so a watch on a key that is created and
//!   deleted again still conflicts.
//! - Batches are applied to copies of the touched entries first and
//!   written back only when every command succeeded (all-or-nothing).
//!
//! # Commit Sequence
//!
//! ```text
//! 1. Acquire keyspace write lock
//! 2. Compare watched revisions (mismatch -> Conflict, nothing applied)
//! 3. Copy touched entries into a staging map
//! 4. Apply each command to the staging map (error -> abort, nothing applied)
//! 5. Write staged entries back, bump revisions of changed keys
//! ```

use bazaar_core::{Command, CommitResult, Error, Result, Store, Watch, WriteBatch};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::entry::{Entry, SortedSet};

/// Keys and their revisions
#[derive(Debug, Default)]
struct Keyspace {
    entries: FxHashMap<String, Entry>,
    revisions: FxHashMap<String, u64>,
    last_revision: u64,
}

impl Keyspace {
    fn revision(&self, key: &str) -> u64 {
        self.revisions.get(key).copied().unwrap_or(0)
    }

    fn bump(&mut self, key: &str) {
        self.last_revision += 1;
        self.revisions.insert(key.to_string(), self.last_revision);
    }
}

/// Commit counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Batches applied (watched or not)
    pub commits: u64,
    /// Watched batches rejected because a watched key changed
    pub conflicts: u64,
    /// Batches rejected because a command failed
    pub failed: u64,
}

/// Thread-safe in-memory key-value store
///
/// # Example
///
/// ```
/// use bazaar_core::{Store, WriteBatch};
/// use bazaar_storage::MemoryStore;
///
/// let store = MemoryStore::new();
/// store.sadd("inventory:17", "itemX").unwrap();
///
/// let watch = store.watch(&["inventory:17"]).unwrap();
/// let mut batch = WriteBatch::new();
/// batch.srem("inventory:17", "itemX");
/// assert!(store.exec(watch, batch).unwrap().is_committed());
/// ```
pub struct MemoryStore {
    keyspace: RwLock<Keyspace>,
    info: RwLock<FxHashMap<String, String>>,
    commits: AtomicU64,
    conflicts: AtomicU64,
    failed: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store
    ///
    /// The status report starts as a healthy, fully synced node:
    /// `master_link_status:up` and `aof_pending_bio_fsync:0`.
    pub fn new() -> Self {
        let mut info = FxHashMap::default();
        info.insert("role".to_string(), "master".to_string());
        info.insert("master_link_status".to_string(), "up".to_string());
        info.insert("aof_pending_bio_fsync".to_string(), "0".to_string());
        Self {
            keyspace: RwLock::new(Keyspace::default()),
            info: RwLock::new(info),
            commits: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Overwrite one status field returned by [`Store::info`]
    pub fn set_info(&self, field: &str, value: &str) {
        self.info.write().insert(field.to_string(), value.to_string());
    }

    /// Number of keys currently holding a value
    pub fn key_count(&self) -> usize {
        self.keyspace.read().entries.len()
    }

    /// Remove every key; revisions still advance so open watches conflict
    pub fn flush_all(&self) {
        let mut ks = self.keyspace.write();
        let keys: Vec<String> = ks.entries.keys().cloned().collect();
        ks.entries.clear();
        for key in keys {
            ks.bump(&key);
        }
    }

    /// Current revision of `key` (0 if never written)
    pub fn revision(&self, key: &str) -> u64 {
        self.keyspace.read().revision(key)
    }

    /// Commit counters since creation
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            commits: self.commits.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn commit(&self, watch: Option<&Watch>, batch: WriteBatch) -> Result<CommitResult> {
        let mut ks = self.keyspace.write();

        if let Some(watch) = watch {
            let stale = watch
                .observed()
                .iter()
                .find(|(key, seen)| ks.revision(key) != *seen);
            if let Some((key, _)) = stale {
                debug!(key = %key, "watched key modified, rejecting commit");
                self.conflicts.fetch_add(1, Ordering::Relaxed);
                return Ok(CommitResult::Conflict);
            }
        }

        let mut staged: FxHashMap<String, Option<Entry>> = FxHashMap::default();
        for command in batch.commands() {
            for key in command.keys() {
                if !staged.contains_key(key) {
                    staged.insert(key.to_string(), ks.entries.get(key).cloned());
                }
            }
        }

        let mut changed: FxHashSet<String> = FxHashSet::default();
        for command in batch {
            if let Err(e) = apply_command(&mut staged, &mut changed, command) {
                self.failed.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        }

        for key in changed {
            match staged.remove(&key).flatten() {
                Some(entry) if !entry.is_empty_aggregate() => {
                    ks.entries.insert(key.clone(), entry);
                }
                _ => {
                    ks.entries.remove(&key);
                }
            }
            ks.bump(&key);
        }

        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(CommitResult::Committed)
    }

    fn read<T>(&self, key: &str, f: impl FnOnce(Option<&Entry>) -> Result<T>) -> Result<T> {
        let ks = self.keyspace.read();
        f(ks.entries.get(key))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ks = self.keyspace.read();
        f.debug_struct("MemoryStore")
            .field("keys", &ks.entries.len())
            .field("last_revision", &ks.last_revision)
            .field("stats", &self.stats())
            .finish()
    }
}

fn wrong_type(key: &str, expected: &'static str, entry: &Entry) -> Error {
    Error::WrongType {
        key: key.to_string(),
        expected,
        actual: entry.type_name(),
    }
}

fn parse_int(key: &str, raw: &str) -> Result<i64> {
    raw.parse::<i64>().map_err(|_| Error::NotAnInteger {
        key: key.to_string(),
    })
}

fn checked_add(key: &str, current: i64, delta: i64) -> Result<i64> {
    current.checked_add(delta).ok_or_else(|| Error::Overflow {
        key: key.to_string(),
    })
}

fn slot<'a>(staged: &'a mut FxHashMap<String, Option<Entry>>, key: &str) -> Result<&'a mut Option<Entry>> {
    staged
        .get_mut(key)
        .ok_or_else(|| Error::Internal(format!("key '{}' was not staged", key)))
}

fn as_set<'a>(slot: &'a mut Option<Entry>, key: &str) -> Result<&'a mut FxHashSet<String>> {
    match slot.get_or_insert_with(|| Entry::Set(FxHashSet::default())) {
        Entry::Set(set) => Ok(set),
        other => Err(wrong_type(key, "set", other)),
    }
}

fn as_zset<'a>(slot: &'a mut Option<Entry>, key: &str) -> Result<&'a mut SortedSet> {
    match slot.get_or_insert_with(|| Entry::ZSet(SortedSet::new())) {
        Entry::ZSet(zset) => Ok(zset),
        other => Err(wrong_type(key, "zset", other)),
    }
}

fn as_hash<'a>(slot: &'a mut Option<Entry>, key: &str) -> Result<&'a mut FxHashMap<String, String>> {
    match slot.get_or_insert_with(|| Entry::Hash(FxHashMap::default())) {
        Entry::Hash(hash) => Ok(hash),
        other => Err(wrong_type(key, "hash", other)),
    }
}

fn apply_command(
    staged: &mut FxHashMap<String, Option<Entry>>,
    changed: &mut FxHashSet<String>,
    command: Command,
) -> Result<()> {
    let mut touched = |key: &str, did_change: bool| {
        if did_change {
            changed.insert(key.to_string());
        }
    };

    match command {
        Command::Set { key, value } => {
            *slot(staged, &key)? = Some(Entry::Str(value));
            touched(&key, true);
        }
        Command::MSet { pairs } => {
            for (key, value) in pairs {
                *slot(staged, &key)? = Some(Entry::Str(value));
                touched(&key, true);
            }
        }
        Command::Del { key } => {
            let existed = slot(staged, &key)?.take().is_some();
            touched(&key, existed);
        }
        Command::IncrBy { key, delta } => {
            let s = slot(staged, &key)?;
            let current = match s.as_ref() {
                None => 0,
                Some(Entry::Str(raw)) => parse_int(&key, raw)?,
                Some(other) => return Err(wrong_type(&key, "string", other)),
            };
            *s = Some(Entry::Str(checked_add(&key, current, delta)?.to_string()));
            touched(&key, true);
        }
        Command::SAdd { key, member } => {
            let added = as_set(slot(staged, &key)?, &key)?.insert(member);
            touched(&key, added);
        }
        Command::SRem { key, member } => {
            let s = slot(staged, &key)?;
            let removed = s.is_some() && as_set(s, &key)?.remove(&member);
            touched(&key, removed);
        }
        Command::ZAdd { key, member, score } => {
            let did = as_zset(slot(staged, &key)?, &key)?.insert(&member, score);
            touched(&key, did);
        }
        Command::ZRem { key, member } => {
            let s = slot(staged, &key)?;
            let removed = s.is_some() && as_zset(s, &key)?.remove(&member);
            touched(&key, removed);
        }
        Command::ZIncrBy { key, member, delta } => {
            as_zset(slot(staged, &key)?, &key)?.incr(&member, delta);
            touched(&key, true);
        }
        Command::ZRemRangeByRank { key, start, stop } => {
            let s = slot(staged, &key)?;
            let removed = if s.is_some() {
                as_zset(s, &key)?.remove_range_by_rank(start, stop)
            } else {
                0
            };
            touched(&key, removed > 0);
        }
        Command::ZRemRangeByScore { key, min, max } => {
            let s = slot(staged, &key)?;
            let removed = if s.is_some() {
                as_zset(s, &key)?.remove_range_by_score(min, max)
            } else {
                0
            };
            touched(&key, removed > 0);
        }
        Command::HSet { key, field, value } => {
            as_hash(slot(staged, &key)?, &key)?.insert(field, value);
            touched(&key, true);
        }
        Command::HIncrBy { key, field, delta } => {
            let hash = as_hash(slot(staged, &key)?, &key)?;
            let current = match hash.get(&field) {
                Some(raw) => parse_int(&format!("{}/{}", key, field), raw)?,
                None => 0,
            };
            let next = checked_add(&key, current, delta)?;
            hash.insert(field, next.to_string());
            touched(&key, true);
        }
    }
    Ok(())
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.read(key, |entry| match entry {
            None => Ok(None),
            Some(Entry::Str(s)) => Ok(Some(s.clone())),
            Some(other) => Err(wrong_type(key, "string", other)),
        })
    }

    fn mget(&self, keys: &[&str]) -> Result<Vec<Option<String>>> {
        let ks = self.keyspace.read();
        // MGET reports non-string keys as missing rather than failing
        Ok(keys
            .iter()
            .map(|key| match ks.entries.get(*key) {
                Some(Entry::Str(s)) => Some(s.clone()),
                _ => None,
            })
            .collect())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        self.read(key, |entry| Ok(entry.is_some()))
    }

    fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        self.read(key, |entry| match entry {
            None => Ok(false),
            Some(Entry::Set(set)) => Ok(set.contains(member)),
            Some(other) => Err(wrong_type(key, "set", other)),
        })
    }

    fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.read(key, |entry| match entry {
            None => Ok(Vec::new()),
            Some(Entry::Set(set)) => {
                let mut members: Vec<String> = set.iter().cloned().collect();
                members.sort();
                Ok(members)
            }
            Some(other) => Err(wrong_type(key, "set", other)),
        })
    }

    fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.read(key, |entry| match entry {
            None => Ok(None),
            Some(Entry::ZSet(zset)) => Ok(zset.score(member)),
            Some(other) => Err(wrong_type(key, "zset", other)),
        })
    }

    fn zrange_with_scores(&self, key: &str, start: i64, stop: i64) -> Result<Vec<(String, f64)>> {
        self.read(key, |entry| match entry {
            None => Ok(Vec::new()),
            Some(Entry::ZSet(zset)) => Ok(zset.range_by_rank(start, stop)),
            Some(other) => Err(wrong_type(key, "zset", other)),
        })
    }

    fn zcard(&self, key: &str) -> Result<usize> {
        self.read(key, |entry| match entry {
            None => Ok(0),
            Some(Entry::ZSet(zset)) => Ok(zset.len()),
            Some(other) => Err(wrong_type(key, "zset", other)),
        })
    }

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.read(key, |entry| match entry {
            None => Ok(None),
            Some(Entry::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(other) => Err(wrong_type(key, "hash", other)),
        })
    }

    fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>> {
        self.read(key, |entry| match entry {
            None => Ok(Vec::new()),
            Some(Entry::Hash(hash)) => {
                let mut fields: Vec<(String, String)> =
                    hash.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                fields.sort();
                Ok(fields)
            }
            Some(other) => Err(wrong_type(key, "hash", other)),
        })
    }

    fn info(&self, field: &str) -> Result<Option<String>> {
        Ok(self.info.read().get(field).cloned())
    }

    fn apply(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.commit(None, batch).map(|_| ())
    }

    fn watch(&self, keys: &[&str]) -> Result<Watch> {
        let ks = self.keyspace.read();
        Ok(Watch::new(
            keys.iter()
                .map(|key| (key.to_string(), ks.revision(key)))
                .collect(),
        ))
    }

    fn exec(&self, watch: Watch, batch: WriteBatch) -> Result<CommitResult> {
        self.commit(Some(&watch), batch)
    }

    fn unwatch(&self, _watch: Watch) -> Result<()> {
        Ok(())
    }
}
