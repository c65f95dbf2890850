//! In-Memory Key-Value Store
//!
//! The store has no locking of its own. It is owned by the dispatcher task,
//! which is the only code that ever touches it, so every access is already
//! serialized by construction.

use bytes::Bytes;
use std::collections::HashMap;
use thiserror::Error;

/// Errors a backing store may report for a write.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store is configured with a key limit and it has been reached
    #[error("capacity exceeded: store holds the maximum of {max} keys")]
    CapacityExceeded { max: usize },
}

/// The interface the dispatcher needs from a backing store.
///
/// Writes are fallible so that stores with resource limits can refuse them;
/// reads never fail.
pub trait Store: Send + 'static {
    /// Inserts or overwrites the value stored under `key`.
    fn set(&mut self, key: Bytes, value: Bytes) -> Result<(), StoreError>;

    /// Returns the current value for `key`, if one was ever set.
    fn get(&self, key: &[u8]) -> Option<Bytes>;

    /// Number of keys currently stored.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A `HashMap` from byte-string keys to byte-string values.
///
/// Last write wins: a `set` for an existing key replaces its value.
///
/// # Example
///
/// ```
/// use loopkv::storage::{MemoryStore, Store};
/// use bytes::Bytes;
///
/// let mut store = MemoryStore::new();
/// store.set(Bytes::from("name"), Bytes::from("Ariz")).unwrap();
/// assert_eq!(store.get(b"name"), Some(Bytes::from("Ariz")));
/// assert_eq!(store.get(b"missing"), None);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: HashMap<Bytes, Bytes>,
    max_keys: Option<usize>,
}

impl MemoryStore {
    /// Creates an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that refuses new keys once `max_keys` are held.
    /// Overwriting an existing key is always allowed.
    pub fn with_max_keys(max_keys: usize) -> Self {
        Self {
            data: HashMap::new(),
            max_keys: Some(max_keys),
        }
    }

    /// The configured key limit, if any.
    pub fn max_keys(&self) -> Option<usize> {
        self.max_keys
    }
}

impl Store for MemoryStore {
    fn set(&mut self, key: Bytes, value: Bytes) -> Result<(), StoreError> {
        if let Some(max) = self.max_keys {
            if self.data.len() >= max && !self.data.contains_key(&key) {
                return Err(StoreError::CapacityExceeded { max });
            }
        }

        self.data.insert(key, value);
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.data.get(key).cloned()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut store = MemoryStore::new();

        store.set(Bytes::from("key"), Bytes::from("value")).unwrap();
        assert_eq!(store.get(b"key"), Some(Bytes::from("value")));
    }

    #[test]
    fn test_get_nonexistent() {
        let store = MemoryStore::new();
        assert_eq!(store.get(b"nonexistent"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_last_write_wins() {
        let mut store = MemoryStore::new();

        store.set(Bytes::from("key"), Bytes::from("v1")).unwrap();
        store.set(Bytes::from("key"), Bytes::from("v2")).unwrap();

        assert_eq!(store.get(b"key"), Some(Bytes::from("v2")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_binary_keys_and_values() {
        let mut store = MemoryStore::new();
        let key = Bytes::from(&b"k\x00\xff"[..]);
        let value = Bytes::from(&b"\r\n\x00"[..]);

        store.set(key.clone(), value.clone()).unwrap();
        assert_eq!(store.get(&key), Some(value));
    }

    #[test]
    fn test_key_limit() {
        let mut store = MemoryStore::with_max_keys(2);
        assert_eq!(store.max_keys(), Some(2));
        assert_eq!(MemoryStore::new().max_keys(), None);

        store.set(Bytes::from("a"), Bytes::from("1")).unwrap();
        store.set(Bytes::from("b"), Bytes::from("2")).unwrap();
        assert_eq!(
            store.set(Bytes::from("c"), Bytes::from("3")),
            Err(StoreError::CapacityExceeded { max: 2 })
        );

        // Overwrites do not grow the store
        store.set(Bytes::from("a"), Bytes::from("10")).unwrap();
        assert_eq!(store.get(b"a"), Some(Bytes::from("10")));
        assert_eq!(store.get(b"c"), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_many_keys() {
        let mut store = MemoryStore::new();

        for i in 0..1000 {
            let key = Bytes::from(format!("key-{}", i));
            store.set(key, Bytes::from(format!("value-{}", i))).unwrap();
        }

        assert_eq!(store.len(), 1000);
        assert_eq!(store.get(b"key-999"), Some(Bytes::from("value-999")));
    }
}
