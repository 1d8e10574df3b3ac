//! Key-Value Persistence
//!
//! The vault, checkpoint store and game cache all persist through the
//! [`KeyValueStore`] trait. Callers inject two instances: a durable one
//! (survives restarts) and an ephemeral one (lives for the session).

pub mod file;
pub mod keys;
pub mod memory;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A writer panicked while holding the lock.
    #[error("storage lock poisoned")]
    Poisoned,
}

/// String-keyed string store.
///
/// Every write is a single atomic put; there are no transactions.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a value. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }
}

/// Read and decode a JSON value.
///
/// Missing keys, unreadable storage and malformed JSON all read as `None`.
pub fn read_json<T, S>(store: &S, key: &str) -> Option<T>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(key, error = %e, "storage read failed");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "ignoring malformed stored value");
            None
        }
    }
}

/// Encode and write a JSON value.
pub fn write_json<T, S>(store: &S, key: &str, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        a: u32,
    }

    #[test]
    fn test_json_helpers() {
        let store = MemoryStore::new();
        write_json(&store, "k", &Sample { a: 3 }).unwrap();
        assert_eq!(read_json::<Sample, _>(&store, "k"), Some(Sample { a: 3 }));
        assert_eq!(read_json::<Sample, _>(&store, "missing"), None);
    }

    #[test]
    fn test_malformed_json_reads_as_none() {
        let store = MemoryStore::new();
        store.set("k", "{not json").unwrap();
        assert_eq!(read_json::<Sample, _>(&store, "k"), None);
    }

    #[test]
    fn test_arc_forwarding() {
        let store: std::sync::Arc<dyn KeyValueStore> = std::sync::Arc::new(MemoryStore::new());
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }
}
