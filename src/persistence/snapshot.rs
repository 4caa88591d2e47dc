//! JSON Snapshot Persistence
//!
//! A snapshot is one JSON object mapping every key to its value and expiry:
//!
//! ```text
//! {
//!   "counter": { "Value": 42, "ExpiryDate": 0 },
//!   "queue":   { "Value": ["b", "a"], "ExpiryDate": 1767225600 },
//!   "name":    { "Value": "Ada", "ExpiryDate": 0 }
//! }
//! ```
//!
//! `ExpiryDate` is in Unix seconds with `0` meaning "never". Values map onto
//! JSON as: String → string, Integer → number, List → array, Null → null.
//!
//! ## Durability
//!
//! The store is serialized to memory under its read lock. The bytes are then
//! written to `<path>.tmp` on the blocking pool, synced and renamed over
//! `<path>`, so a failed write never clobbers the previous snapshot.

use crate::protocol::Value;
use crate::storage::{Entry, Store};
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::{self, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::task;
use tracing::{debug, info};

/// Default snapshot file name.
pub const DEFAULT_SNAPSHOT_PATH: &str = "data.json";

/// Errors that can occur while loading or saving a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid snapshot data in {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("value at key {key:?} is not valid UTF-8")]
    NonUtf8Value { key: String },

    #[error("snapshot writer task failed: {0}")]
    Writer(#[from] task::JoinError),
}

/// One key's record in the snapshot file.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry<V> {
    #[serde(rename = "Value")]
    value: V,
    #[serde(rename = "ExpiryDate")]
    expiry_date: i64,
}

/// Loads and saves the whole store as a JSON snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    path: PathBuf,
}

impl SnapshotManager {
    /// Creates a manager for the snapshot file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The snapshot file this manager reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    /// Replaces the contents of `store` with the snapshot on disk.
    ///
    /// A missing file is not an error: the store is left as is and `Ok(0)` is
    /// returned. A file that exists but does not decode is an error, and the
    /// store is left untouched.
    ///
    /// # Returns
    ///
    /// The number of entries loaded.
    pub fn load(&self, store: &Store) -> Result<usize, SnapshotError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No snapshot found, starting empty");
                return Ok(0);
            }
            Err(e) => return Err(io_error(&self.path, e)),
        };

        let records: HashMap<String, SnapshotEntry<Value>> =
            serde_json::from_slice(&bytes).map_err(|source| SnapshotError::Format {
                path: self.path.clone(),
                source,
            })?;

        let entries: HashMap<String, Entry> = records
            .into_iter()
            .map(|(key, record)| {
                let expires_at = (record.expiry_date > 0).then_some(record.expiry_date);
                (key, Entry::with_expiry(record.value, expires_at))
            })
            .collect();

        let count = entries.len();
        store.replace_all(entries);

        info!(path = %self.path.display(), entries = count, "Snapshot loaded");
        Ok(count)
    }

    /// Writes every entry of `store` to the snapshot file.
    ///
    /// The store is encoded under its read lock on the calling task. The file
    /// write, sync and rename then run on tokio's blocking pool.
    ///
    /// # Returns
    ///
    /// The number of entries written.
    pub async fn save(&self, store: &Store) -> Result<usize, SnapshotError> {
        let (bytes, count) = store.with_entries(encode_entries)?;

        let path = self.path.clone();
        let tmp = self.temp_path();
        task::spawn_blocking(move || write_atomically(&path, &tmp, &bytes)).await??;

        info!(path = %self.path.display(), entries = count, "Snapshot saved");
        Ok(count)
    }
}

fn io_error(path: &Path, source: io::Error) -> SnapshotError {
    SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes `bytes` to `tmp`, syncs it and renames it over `path`.
///
/// `tmp` is removed again on every failure after it was created.
fn write_atomically(path: &Path, tmp: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    let mut file = File::create(tmp).map_err(|e| io_error(tmp, e))?;
    let synced = file.write_all(bytes).and_then(|()| file.sync_all());
    drop(file);

    let result = match synced {
        Ok(()) => fs::rename(tmp, path).map_err(|e| io_error(path, e)),
        Err(e) => Err(io_error(tmp, e)),
    };

    match result {
        Ok(()) => {
            debug!(path = %path.display(), bytes = bytes.len(), "Snapshot data written");
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(tmp);
            Err(e)
        }
    }
}

/// Serializes the map to indented JSON with keys in sorted order.
fn encode_entries(data: &HashMap<String, Entry>) -> Result<(Vec<u8>, usize), SnapshotError> {
    let mut records = BTreeMap::new();

    for (key, entry) in data {
        if !is_utf8(&entry.value) {
            return Err(SnapshotError::NonUtf8Value { key: key.clone() });
        }
        records.insert(
            key.as_str(),
            SnapshotEntry {
                value: &entry.value,
                // 0 is "never", so a lapsed expiry must not collapse onto it
                expiry_date: entry.expires_at.map_or(0, |at| at.max(1)),
            },
        );
    }

    let bytes = serde_json::to_vec_pretty(&records).map_err(SnapshotError::Serialize)?;
    Ok((bytes, records.len()))
}

fn is_utf8(value: &Value) -> bool {
    match value {
        Value::String(data) => std::str::from_utf8(data).is_ok(),
        Value::List(items) => items.iter().all(is_utf8),
        Value::Integer(_) | Value::Null => true,
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(data) => match std::str::from_utf8(data) {
                Ok(s) => serializer.serialize_str(s),
                Err(_) => Err(ser::Error::custom("string value is not valid UTF-8")),
            },
            Value::Integer(n) => serializer.serialize_i64(*n),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Null => serializer.serialize_unit(),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, 64-bit integer, array or null")
    }

    fn visit_i64<E: de::Error>(self, n: i64) -> Result<Value, E> {
        Ok(Value::Integer(n))
    }

    fn visit_u64<E: de::Error>(self, n: u64) -> Result<Value, E> {
        i64::try_from(n)
            .map(Value::Integer)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(n), &self))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
        Ok(Value::from(s))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Value, E> {
        Ok(Value::string(s))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::List(items))
    }
}
