//! Thread-Safe Store with Expiry Support
//!
//! This module implements the store behind every command: one `HashMap` from
//! key to [`Entry`], guarded by a single `RwLock`.
//!
//! ## Design Decisions
//!
//! 1. **One lock**: every command is atomic with respect to every other
//!    command. Readers (GET lookup, EXIST, SAVE) share the lock; all mutations
//!    take it exclusively.
//! 2. **Whole-entry replacement**: an `Entry` is never edited in place where a
//!    reader could observe it. SET, INCR/DECR and LPUSH/RPUSH build a new
//!    entry and swap it in under the write lock.
//! 3. **Lazy + active expiry**: reads treat a lapsed entry as absent and GET
//!    removes it; the reaper ([`crate::storage::expiry`]) sweeps the rest.
//!
//! ## Lazy expiry in GET
//!
//! ```text
//!   read lock ──> live hit ──────────────────────────> return entry
//!       │
//!       └──> expired hit ──> write lock ──> still expired? ──> remove, None
//!                                               │
//!                                               └──> replaced meanwhile ──> return it
//! ```
//!
//! The re-check under the write lock means two readers racing on the same
//! expired key delete it once, and never delete a value written between the
//! two lock acquisitions.

use crate::protocol::Value;
use crate::storage::clock::{self, UnixSeconds};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// A stored value with its optional absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The stored value
    pub value: Value,
    /// Unix second at which this entry lapses (`None` = never)
    pub expires_at: Option<UnixSeconds>,
}

impl Entry {
    /// Creates an entry that never expires.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates an entry with the given expiry.
    pub fn with_expiry(value: Value, expires_at: Option<UnixSeconds>) -> Self {
        Self { value, expires_at }
    }

    /// Checks whether this entry has lapsed at `now`.
    ///
    /// An entry is expired from its expiry second onwards, so an expiry equal
    /// to the current second is already expired.
    #[inline]
    pub fn is_expired_at(&self, now: UnixSeconds) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Checks whether this entry has lapsed now.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(clock::now_secs())
    }
}

/// Which end of a list a push writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEnd {
    /// LPUSH: each value goes in front of the previous head.
    Front,
    /// RPUSH: values are appended in argument order.
    Back,
}

/// Semantic failures of store operations.
///
/// The messages are sent to clients verbatim (after `ERR `).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("key does not exist")]
    KeyNotFound,

    #[error("value is not type of int")]
    NotInteger,

    #[error("value is not type of list")]
    NotList,

    #[error("increment or decrement would overflow")]
    Overflow,
}

/// Store statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
    pub expired: u64,
}

/// The key-value store.
///
/// Constructed once, wrapped in an `Arc`, and handed to the command handler,
/// the expiry reaper and the snapshot manager.
///
/// # Example
///
/// ```
/// use redlite::protocol::Value;
/// use redlite::storage::Store;
///
/// let store = Store::new();
/// store.set("name", Value::string("Ada"), None);
///
/// let entry = store.get("name").unwrap();
/// assert_eq!(entry.value, Value::string("Ada"));
/// assert_eq!(entry.expires_at, None);
/// ```
pub struct Store {
    data: RwLock<HashMap<String, Entry>>,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total writes (SET, push, INCR/DECR)
    set_count: AtomicU64,

    /// Statistics: keys removed by DEL
    del_count: AtomicU64,

    /// Statistics: keys removed because they lapsed
    expired_count: AtomicU64,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("keys", &self.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    // Every critical section replaces whole entries, so a panic inside one
    // cannot leave a half-written entry behind and the guard is safe to reuse.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes `key` if it is present and lapsed. Returns true if removed.
    fn purge_if_expired(
        &self,
        data: &mut HashMap<String, Entry>,
        key: &str,
        now: UnixSeconds,
    ) -> bool {
        if data.get(key).is_some_and(|e| e.is_expired_at(now)) {
            data.remove(key);
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Stores `value` under `key`, replacing any existing entry.
    pub fn set(&self, key: impl Into<String>, value: Value, expires_at: Option<UnixSeconds>) {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.write();
        data.insert(key.into(), Entry::with_expiry(value, expires_at));
    }

    /// Gets the entry for a key.
    ///
    /// Returns `None` if the key doesn't exist or has lapsed; a lapsed entry is
    /// removed on the way out.
    pub fn get(&self, key: &str) -> Option<Entry> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        let now = clock::now_secs();

        {
            let data = self.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired_at(now) => return Some(entry.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut data = self.write();
        if self.purge_if_expired(&mut data, key, now) {
            return None;
        }
        data.get(key).cloned()
    }

    /// Checks if a key exists and has not lapsed.
    ///
    /// Takes only the read lock; a lapsed entry reads as absent but is left
    /// for GET or the reaper to remove.
    pub fn exists(&self, key: &str) -> bool {
        let now = clock::now_secs();
        let data = self.read();
        data.get(key).is_some_and(|e| !e.is_expired_at(now))
    }

    /// Deletes every listed key that is present.
    ///
    /// # Returns
    ///
    /// The number of keys actually removed. Unknown keys are skipped.
    pub fn delete<K: AsRef<str>>(&self, keys: &[K]) -> u64 {
        let mut data = self.write();

        let mut deleted = 0;
        for key in keys {
            if data.remove(key.as_ref()).is_some() {
                deleted += 1;
            }
        }

        self.del_count.fetch_add(deleted, Ordering::Relaxed);
        deleted
    }

    /// Pushes values onto the list at `key`, creating it if absent.
    ///
    /// With [`ListEnd::Front`] each value is inserted before the current
    /// head, so `LPUSH k a b c` yields `[c, b, a]`. With [`ListEnd::Back`]
    /// values are appended in order. The entry's expiry is kept.
    ///
    /// # Returns
    ///
    /// The length of the list after the push, or [`StoreError::NotList`] if
    /// the key holds another kind of value (the entry is left untouched).
    pub fn push(&self, key: &str, values: Vec<Value>, end: ListEnd) -> Result<usize, StoreError> {
        let now = clock::now_secs();
        let mut data = self.write();
        self.purge_if_expired(&mut data, key, now);

        let (previous, expires_at) = match data.get_mut(key) {
            Some(entry) => match &mut entry.value {
                Value::List(items) => (std::mem::take(items), entry.expires_at),
                _ => return Err(StoreError::NotList),
            },
            None => (Vec::new(), None),
        };

        let items = match end {
            ListEnd::Front => {
                let mut items: Vec<Value> = values.into_iter().rev().collect();
                items.extend(previous);
                items
            }
            ListEnd::Back => {
                let mut items = previous;
                items.extend(values);
                items
            }
        };

        let len = items.len();
        data.insert(key.to_string(), Entry::with_expiry(Value::List(items), expires_at));
        self.set_count.fetch_add(1, Ordering::Relaxed);

        Ok(len)
    }

    /// Adds `delta` to the integer stored at `key`, keeping its expiry.
    ///
    /// Fails with [`StoreError::KeyNotFound`] if the key is absent or lapsed,
    /// [`StoreError::NotInteger`] if it holds another kind of value, and
    /// [`StoreError::Overflow`] if the result does not fit in an `i64`. On
    /// failure the store is unchanged (apart from removing a lapsed entry).
    pub fn increment(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let now = clock::now_secs();
        let mut data = self.write();

        if self.purge_if_expired(&mut data, key, now) {
            return Err(StoreError::KeyNotFound);
        }

        let entry = data.get_mut(key).ok_or(StoreError::KeyNotFound)?;
        let current = entry.value.as_integer().ok_or(StoreError::NotInteger)?;
        let next = current.checked_add(delta).ok_or(StoreError::Overflow)?;

        *entry = Entry::with_expiry(Value::Integer(next), entry.expires_at);
        self.set_count.fetch_add(1, Ordering::Relaxed);

        Ok(next)
    }

    /// Removes every entry whose expiry has passed.
    ///
    /// This is called by the background expiry reaper.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were removed.
    pub fn cleanup_expired(&self) -> u64 {
        let now = clock::now_secs();
        let mut data = self.write();

        let before = data.len();
        data.retain(|_, entry| !entry.is_expired_at(now));
        let removed = (before - data.len()) as u64;

        if removed > 0 {
            self.expired_count.fetch_add(removed, Ordering::Relaxed);
        }
        removed
    }

    /// Runs `f` over the full map while holding the read lock.
    ///
    /// Used by the snapshot writer to serialize a consistent view without
    /// cloning the store.
    pub fn with_entries<R>(&self, f: impl FnOnce(&HashMap<String, Entry>) -> R) -> R {
        let data = self.read();
        f(&data)
    }

    /// Replaces the whole contents of the store.
    pub fn replace_all(&self, entries: HashMap<String, Entry>) {
        let mut data = self.write();
        *data = entries;
    }

    /// Returns the number of entries, including lapsed ones not yet removed.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns store statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len() as u64,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn list(items: &[&str]) -> Value {
        Value::list(items.iter().map(|s| Value::from(*s)).collect())
    }

    #[test]
    fn test_set_and_get() {
        let store = Store::new();
        store.set("name", Value::string("Ada"), None);

        let entry = store.get("name").unwrap();
        assert_eq!(entry.value, Value::string("Ada"));
        assert_eq!(entry.expires_at, None);
    }

    #[test]
    fn test_get_nonexistent() {
        let store = Store::new();
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_set_replaces_entry() {
        let store = Store::new();
        store.set("k", Value::string("v1"), Some(clock::now_secs() + 100));
        store.set("k", Value::Integer(2), None);

        assert_eq!(store.get("k"), Some(Entry::new(Value::Integer(2))));
    }

    #[test]
    fn test_delete_counts_only_present_keys() {
        let store = Store::new();
        store.set("a", Value::string("1"), None);

        assert_eq!(store.delete(&["a", "b"]), 1);
        assert_eq!(store.delete(&["a"]), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_exists() {
        let store = Store::new();
        store.set("k", Value::string("v"), None);

        assert!(store.exists("k"));
        assert!(!store.exists("other"));
    }

    #[test]
    fn test_exists_ignores_lapsed_entry_without_removing_it() {
        let store = Store::new();
        store.set("k", Value::string("v"), Some(1));

        assert!(!store.exists("k"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_lazy_expiry_on_get() {
        let store = Store::new();
        store.set("past", Value::string("v"), Some(clock::now_secs() - 10));
        store.set("future", Value::string("v"), Some(clock::now_secs() + 100));

        assert!(store.get("past").is_none());
        assert!(store.get("future").is_some());
        // the lapsed key is physically gone
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().expired, 1);
    }

    #[test]
    fn test_expiry_equal_to_now_is_expired() {
        let store = Store::new();
        store.set("k", Value::string("v"), Some(clock::now_secs()));
        assert!(store.get("k").is_none());
    }

    #[test]
    fn test_expiry_after_sleep() {
        let store = Store::new();
        store.set("k", Value::string("v"), Some(clock::now_secs() + 1));

        thread::sleep(std::time::Duration::from_millis(1100));

        assert!(!store.exists("k"));
        assert!(store.get("k").is_none());
    }

    #[test]
    fn test_lpush_rpush_order() {
        let store = Store::new();

        store.push("r", vec![Value::from("a")], ListEnd::Back).unwrap();
        store.push("r", vec![Value::from("b")], ListEnd::Back).unwrap();
        assert_eq!(store.get("r").unwrap().value, list(&["a", "b"]));

        store.push("l", vec![Value::from("a")], ListEnd::Front).unwrap();
        store.push("l", vec![Value::from("b")], ListEnd::Front).unwrap();
        assert_eq!(store.get("l").unwrap().value, list(&["b", "a"]));
    }

    #[test]
    fn test_push_multiple_values() {
        let store = Store::new();
        let values = vec![Value::from("a"), Value::from("b"), Value::from("c")];

        assert_eq!(store.push("l", values.clone(), ListEnd::Front), Ok(3));
        assert_eq!(store.get("l").unwrap().value, list(&["c", "b", "a"]));

        assert_eq!(store.push("r", values, ListEnd::Back), Ok(3));
        assert_eq!(store.get("r").unwrap().value, list(&["a", "b", "c"]));
    }

    #[test]
    fn test_push_keeps_heterogeneous_elements() {
        let store = Store::new();
        store
            .push("l", vec![Value::Integer(1), Value::Null], ListEnd::Back)
            .unwrap();

        assert_eq!(
            store.get("l").unwrap().value,
            Value::list(vec![Value::Integer(1), Value::Null])
        );
    }

    #[test]
    fn test_push_onto_non_list_fails_without_change() {
        let store = Store::new();
        store.set("s", Value::string("text"), None);

        assert_eq!(
            store.push("s", vec![Value::from("x")], ListEnd::Back),
            Err(StoreError::NotList)
        );
        assert_eq!(store.get("s").unwrap().value, Value::string("text"));
    }

    #[test]
    fn test_push_preserves_expiry() {
        let store = Store::new();
        let expiry = clock::now_secs() + 100;
        store.set("l", list(&["a"]), Some(expiry));

        store.push("l", vec![Value::from("b")], ListEnd::Back).unwrap();

        let entry = store.get("l").unwrap();
        assert_eq!(entry.value, list(&["a", "b"]));
        assert_eq!(entry.expires_at, Some(expiry));
    }

    #[test]
    fn test_push_onto_lapsed_key_starts_fresh() {
        let store = Store::new();
        store.set("l", Value::string("old"), Some(1));

        assert_eq!(store.push("l", vec![Value::from("x")], ListEnd::Back), Ok(1));
        assert_eq!(store.get("l"), Some(Entry::new(list(&["x"]))));
    }

    #[test]
    fn test_increment() {
        let store = Store::new();
        store.set("counter", Value::Integer(10), None);

        assert_eq!(store.increment("counter", 1), Ok(11));
        assert_eq!(store.increment("counter", -1), Ok(10));
        assert_eq!(store.get("counter").unwrap().value, Value::Integer(10));
    }

    #[test]
    fn test_increment_missing_key() {
        let store = Store::new();
        assert_eq!(store.increment("counter", 1), Err(StoreError::KeyNotFound));
        assert!(store.is_empty());
    }

    #[test]
    fn test_increment_lapsed_key() {
        let store = Store::new();
        store.set("counter", Value::Integer(1), Some(1));

        assert_eq!(store.increment("counter", 1), Err(StoreError::KeyNotFound));
        assert!(store.is_empty());
    }

    #[test]
    fn test_increment_non_integer() {
        let store = Store::new();
        store.set("s", Value::string("10"), None);

        assert_eq!(store.increment("s", -1), Err(StoreError::NotInteger));
        assert_eq!(store.get("s").unwrap().value, Value::string("10"));
    }

    #[test]
    fn test_increment_overflow() {
        let store = Store::new();
        store.set("max", Value::Integer(i64::MAX), None);

        assert_eq!(store.increment("max", 1), Err(StoreError::Overflow));
        assert_eq!(store.get("max").unwrap().value, Value::Integer(i64::MAX));
    }

    #[test]
    fn test_increment_preserves_expiry() {
        let store = Store::new();
        let expiry = clock::now_secs() + 100;
        store.set("counter", Value::Integer(5), Some(expiry));

        store.increment("counter", 1).unwrap();
        assert_eq!(store.get("counter").unwrap().expires_at, Some(expiry));
    }

    #[test]
    fn test_cleanup_expired() {
        let store = Store::new();
        store.set("key1", Value::string("v"), Some(1));
        store.set("key2", Value::string("v"), Some(clock::now_secs() - 1));
        store.set("key3", Value::string("v"), None);
        store.set("key4", Value::string("v"), Some(clock::now_secs() + 100));

        assert_eq!(store.cleanup_expired(), 2);
        assert_eq!(store.len(), 2);
        assert!(store.exists("key3"));
        assert!(store.exists("key4"));
    }

    #[test]
    fn test_replace_all_and_with_entries() {
        let store = Store::new();
        store.set("old", Value::string("v"), None);

        let mut entries = HashMap::new();
        entries.insert("new".to_string(), Entry::new(Value::Integer(1)));
        store.replace_all(entries);

        assert!(!store.exists("old"));
        let keys: Vec<String> = store.with_entries(|data| data.keys().cloned().collect());
        assert_eq!(keys, vec!["new".to_string()]);
    }

    #[test]
    fn test_concurrent_increments() {
        const WRITERS: i64 = 8;
        const INCREMENTS: i64 = 500;

        let store = Arc::new(Store::new());
        store.set("counter", Value::Integer(100), None);

        let handles: Vec<_> = (0..WRITERS)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..INCREMENTS {
                        store.increment("counter", 1).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            store.get("counter").unwrap().value,
            Value::Integer(100 + WRITERS * INCREMENTS)
        );
    }

    #[test]
    fn test_concurrent_access() {
        let store = Arc::new(Store::new());
        let mut handles = vec![];

        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key-{}-{}", i, j);
                    store.set(key.clone(), Value::string("value"), None);
                    assert!(store.get(&key).is_some());
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 1000);
    }

    #[test]
    fn test_stats() {
        let store = Store::new();
        store.set("a", Value::string("1"), None);
        store.set("b", Value::string("2"), None);
        store.get("a");
        store.delete(&["a", "zzz"]);

        let stats = store.stats();
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.set_ops, 2);
        assert_eq!(stats.get_ops, 1);
        assert_eq!(stats.del_ops, 1);
    }
}
