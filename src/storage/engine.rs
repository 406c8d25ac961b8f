//! Sharded Key-Value Store with Expiry Support
//!
//! This module implements the process-wide store. Keys map to [`Object`]s
//! that may carry an expiry deadline.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Keys are spread over 64 shards, each behind its own lock.
//! 2. **Lazy Expiry**: A read that finds an expired object deletes it and reports absence.
//! 3. **Active Expiry**: The sweeper (see `expiry`) cleans one shard at a time.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every `put`, `get` and `delete` holds its shard's lock for the duration of
//! one map operation. Removing an expired object on read takes the write lock,
//! exactly like `put`.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Number of shards for the store.
const NUM_SHARDS: usize = 64;

/// A stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    /// The opaque payload
    pub value: Bytes,
    /// When this object was created
    pub created_at: Instant,
    /// When this object expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Object {
    /// Creates an object. A negative `ttl_ms` means no expiry; zero or more
    /// sets the deadline `ttl_ms` milliseconds from now.
    pub fn new(value: Bytes, ttl_ms: i64) -> Self {
        let created_at = Instant::now();
        let expires_at = u64::try_from(ttl_ms)
            .ok()
            .map(|ms| created_at + Duration::from_millis(ms));

        Self {
            value,
            created_at,
            expires_at,
        }
    }

    /// Checks if this object has expired as of `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Returns the remaining TTL in milliseconds, or None if no expiry.
    pub fn ttl_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|exp| exp.saturating_duration_since(Instant::now()).as_millis() as u64)
    }
}

type Shard = RwLock<HashMap<Bytes, Object>>;

/// Result of cleaning one shard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardCleanup {
    /// Objects the shard held when the pass started
    pub examined: u64,
    /// Expired objects removed
    pub removed: u64,
}

/// The in-memory key-value store.
///
/// Designed to be wrapped in an `Arc` and shared between the reactor thread
/// and the background sweeper. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use pulsekv::storage::Store;
/// use bytes::Bytes;
///
/// let store = Store::new();
///
/// store.put(Bytes::from("name"), store.new_object(Bytes::from("Ariz"), -1));
/// let object = store.get(&Bytes::from("name")).unwrap();
/// assert_eq!(object.value, Bytes::from("Ariz"));
/// assert!(object.expires_at.is_none());
///
/// store.put(Bytes::from("gone"), store.new_object(Bytes::from("x"), 0));
/// assert!(store.get(&Bytes::from("gone")).is_none());
/// ```
pub struct Store {
    shards: Vec<Shard>,

    /// Number of keys currently held, expired-but-unswept included
    key_count: AtomicU64,

    /// Number of objects removed because they expired
    expired_count: AtomicU64,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .field("expired_count", &self.expired_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| RwLock::new(HashMap::new())).collect();

        Self {
            shards,
            key_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Creates an object for this store; see [`Object::new`].
    pub fn new_object(&self, value: Bytes, ttl_ms: i64) -> Object {
        Object::new(value, ttl_ms)
    }

    /// Inserts or overwrites `key` unconditionally.
    pub fn put(&self, key: Bytes, object: Object) {
        let mut data = self.shard(&key).write();
        if data.insert(key, object).is_none() {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns the object for `key`, or `None` if missing or expired.
    ///
    /// An expired object is removed here ("lazy expiry").
    pub fn get(&self, key: &Bytes) -> Option<Object> {
        let shard = self.shard(key);

        // Fast path: read lock for live or missing keys
        {
            let data = shard.read();
            match data.get(key) {
                Some(object) if !object.is_expired() => return Some(object.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired - need the write lock to remove it
        let mut data = shard.write();
        let now = Instant::now();
        match data.get(key) {
            Some(object) if object.is_expired_at(now) => {
                data.remove(key);
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                None
            }
            // Another writer replaced it between the two locks
            Some(object) => Some(object.clone()),
            None => None,
        }
    }

    /// Removes `key`. Returns whether a live key existed.
    pub fn delete(&self, key: &Bytes) -> bool {
        let mut data = self.shard(key).write();

        match data.remove(key) {
            Some(object) => {
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                if object.is_expired() {
                    self.expired_count.fetch_add(1, Ordering::Relaxed);
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }

    /// Checks if a key exists (and is not expired).
    pub fn exists(&self, key: &Bytes) -> bool {
        self.get(key).is_some()
    }

    /// Remaining TTL in milliseconds.
    ///
    /// - `None` if the key doesn't exist
    /// - `Some(-1)` if the key exists but has no expiry
    /// - `Some(ms)` otherwise
    pub fn ttl_ms(&self, key: &Bytes) -> Option<i64> {
        self.get(key)
            .map(|object| object.ttl_ms().map_or(-1, |ms| ms as i64))
    }

    /// Number of keys held, including expired keys not yet removed.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total objects removed because they expired.
    pub fn expired_total(&self) -> u64 {
        self.expired_count.load(Ordering::Relaxed)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Removes the expired objects of a single shard.
    ///
    /// Holds only that shard's write lock, so foreground operations on other
    /// shards proceed and those on this shard wait for one pass at most.
    ///
    /// An out-of-range index is an empty pass.
    pub fn cleanup_shard(&self, index: usize) -> ShardCleanup {
        let Some(shard) = self.shards.get(index) else {
            return ShardCleanup::default();
        };

        let now = Instant::now();
        let mut data = shard.write();
        let before = data.len();
        data.retain(|_, object| !object.is_expired_at(now));
        let removed = (before - data.len()) as u64;

        if removed > 0 {
            self.key_count.fetch_sub(removed, Ordering::Relaxed);
            self.expired_count.fetch_add(removed, Ordering::Relaxed);
        }

        ShardCleanup {
            examined: before as u64,
            removed,
        }
    }

    /// Removes expired objects from every shard, one shard at a time.
    pub fn cleanup_expired(&self) -> u64 {
        (0..self.shards.len())
            .map(|i| self.cleanup_shard(i).removed)
            .sum()
    }
}
