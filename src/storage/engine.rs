//! Thread-Safe Storage Engine
//!
//! This module implements the key space shared by every session.
//! It is a concurrent HashMap split into shards, each behind its own lock.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Keys are hashed onto 64 shards so unrelated keys rarely contend.
//! 2. **No Expiry Metadata**: Entries carry no deadline. Expiry is driven from outside
//!    (see [`crate::storage::expiry`]) and only needs the entry's generation.
//! 3. **Generations**: Every write stamps the entry with a fresh number from a
//!    process-wide counter, so an expiry record can tell whether the entry it
//!    was scheduled for is still the one in the store.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation touches exactly one shard and holds its lock for the whole
//! operation, which makes each of them atomic for its key.

use crate::storage::value::StoredValue;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// A stored value together with the generation of the write that produced it.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: StoredValue,
    pub generation: u64,
}

/// Precondition for a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    /// Always write
    Always,
    /// Write only if the key does not exist (NX)
    IfAbsent,
    /// Write only if the key exists (XX)
    IfPresent,
}

/// Point-in-time counters of store activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
    pub expired: u64,
}

#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Bytes, Entry>>,
}

/// The key space shared by all sessions.
///
/// Wrap it in an `Arc` and hand a clone to every component that needs it.
///
/// # Example
///
/// ```
/// use respcache::storage::{StorageEngine, StoredValue};
/// use bytes::Bytes;
///
/// let engine = StorageEngine::new();
/// engine.store(Bytes::from("name"), StoredValue::from("Ariz"));
///
/// let value = engine.load(b"name").unwrap();
/// assert_eq!(value.decoded(), Bytes::from("Ariz"));
///
/// assert!(engine.load_and_delete(b"name").is_some());
/// assert!(engine.load(b"name").is_none());
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,

    /// Source of write generations
    next_generation: AtomicU64,

    key_count: AtomicU64,
    get_count: AtomicU64,
    set_count: AtomicU64,
    del_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::default()).collect();

        Self {
            shards,
            next_generation: AtomicU64::new(1),
            key_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Upserts `key`, dropping any previous value.
    ///
    /// Returns the generation stamped on the new entry.
    pub fn store(&self, key: Bytes, value: StoredValue) -> u64 {
        let mut data = self.get_shard(&key).data.write();
        self.insert_locked(&mut data, key, value)
    }

    /// Upserts `key` if `condition` holds, checked under the same lock as the write.
    ///
    /// Returns the new generation, or `None` if the precondition failed.
    pub fn store_if(&self, key: Bytes, value: StoredValue, condition: SetCondition) -> Option<u64> {
        let shard = self.get_shard(&key);
        let mut data = shard.data.write();

        let exists = data.contains_key(&key);
        let allowed = match condition {
            SetCondition::Always => true,
            SetCondition::IfAbsent => !exists,
            SetCondition::IfPresent => exists,
        };
        if !allowed {
            return None;
        }

        Some(self.insert_locked(&mut data, key, value))
    }

    fn insert_locked(&self, data: &mut HashMap<Bytes, Entry>, key: Bytes, value: StoredValue) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.set_count.fetch_add(1, Ordering::Relaxed);

        if data.insert(key, Entry { value, generation }).is_none() {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }
        generation
    }

    /// Point lookup without side effects on the key space.
    pub fn load(&self, key: &[u8]) -> Option<StoredValue> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        let data = self.get_shard(key).data.read();
        data.get(key).map(|entry| entry.value.clone())
    }

    /// Whether `key` currently exists. Not counted as a read.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.get_shard(key).data.read().contains_key(key)
    }

    /// Removes `key` and returns the value it held, if any.
    pub fn load_and_delete(&self, key: &[u8]) -> Option<StoredValue> {
        self.del_count.fetch_add(1, Ordering::Relaxed);
        self.remove(key)
    }

    fn remove(&self, key: &[u8]) -> Option<StoredValue> {
        let removed = self.get_shard(key).data.write().remove(key);
        removed.map(|entry| {
            self.key_count.fetch_sub(1, Ordering::Relaxed);
            entry.value
        })
    }

    /// Removes `key` if present.
    pub fn delete(&self, key: &[u8]) {
        let _ = self.load_and_delete(key);
    }

    /// Removes `key` only if its entry still carries `generation`.
    ///
    /// Used by expiry so that a timer scheduled for an older write leaves a
    /// newer value alone.
    pub fn delete_if_generation(&self, key: &[u8], generation: u64) -> bool {
        let shard = self.get_shard(key);
        let mut data = shard.data.write();

        match data.get(key) {
            Some(entry) if entry.generation == generation => {
                data.remove(key);
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Removes `key` on behalf of an expiry timer, whatever it holds now.
    ///
    /// Counted as an expiry only, not as a delete.
    pub(crate) fn expire(&self, key: &[u8]) -> bool {
        self.remove(key).is_some()
    }

    /// Records that an expiry timer removed a key.
    pub(crate) fn record_expired(&self) {
        self.expired_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.key_count.load(Ordering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.key_count.load(Ordering::Relaxed),
            gets: self.get_count.load(Ordering::Relaxed),
            sets: self.set_count.load(Ordering::Relaxed),
            deletes: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}
