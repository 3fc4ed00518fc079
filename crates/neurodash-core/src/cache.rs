//! Memoisation of expensive passes keyed by a content hash of their input.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Compute SHA-256 hash of data.
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hex SHA-256 identity of a cached computation's input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputKey(String);

impl InputKey {
    /// Start a key for the named computation.
    pub fn builder(kind: &str) -> InputKeyBuilder {
        InputKeyBuilder::new(kind)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental [`InputKey`] construction.
///
/// Every part is length-prefixed so that `["ab", "c"]` and `["a", "bc"]`
/// hash differently.
pub struct InputKeyBuilder {
    hasher: Sha256,
}

impl InputKeyBuilder {
    fn new(kind: &str) -> Self {
        let builder = Self {
            hasher: Sha256::new(),
        };
        builder.bytes(kind.as_bytes())
    }

    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.hasher.update((data.len() as u64).to_le_bytes());
        self.hasher.update(data);
        self
    }

    pub fn text(self, text: &str) -> Self {
        self.bytes(text.as_bytes())
    }

    /// Hash the JSON form of a value.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> serde_json::Result<Self> {
        let bytes = serde_json::to_vec(value)?;
        Ok(self.bytes(&bytes))
    }

    pub fn finish(self) -> InputKey {
        InputKey(hex::encode(self.hasher.finalize()))
    }
}

/// Results of one kind of computation, by input identity.
#[derive(Debug)]
pub struct MemoCache<V> {
    name: &'static str,
    entries: HashMap<InputKey, V>,
}

impl<V: Clone> MemoCache<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &InputKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Cached value for `key`, computing and storing it on a miss.
    ///
    /// A failed computation stores nothing.
    pub fn get_or_try_insert_with<E, F>(&mut self, key: InputKey, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.entries.get(&key) {
            debug!(cache = self.name, key = %key, "cache hit");
            return Ok(value.clone());
        }
        debug!(cache = self.name, key = %key, "cache miss");
        let value = compute()?;
        self.entries.insert(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_data() {
        assert_eq!(
            hash_data(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_key_parts_are_delimited() {
        let a = InputKey::builder("k").text("ab").text("c").finish();
        let b = InputKey::builder("k").text("a").text("bc").finish();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 64);

        let again = InputKey::builder("k").text("ab").text("c").finish();
        assert_eq!(a, again);
        assert_ne!(a, InputKey::builder("other").text("ab").text("c").finish());
    }

    #[test]
    fn test_json_key() {
        let a = InputKey::builder("k").json(&vec![1, 2, 3]).unwrap().finish();
        let b = InputKey::builder("k").json(&vec![1, 2, 4]).unwrap().finish();
        assert_ne!(a, b);
    }

    #[test]
    fn test_memo_computes_once() {
        let mut cache: MemoCache<u32> = MemoCache::new("test");
        let key = InputKey::builder("k").text("x").finish();
        let mut calls = 0;

        for _ in 0..3 {
            let v: Result<u32, ()> = cache.get_or_try_insert_with(key.clone(), || {
                calls += 1;
                Ok(7)
            });
            assert_eq!(v, Ok(7));
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&key));
    }

    #[test]
    fn test_memo_failure_not_cached() {
        let mut cache: MemoCache<u32> = MemoCache::new("test");
        let key = InputKey::builder("k").finish();

        let err: Result<u32, &str> = cache.get_or_try_insert_with(key.clone(), || Err("boom"));
        assert_eq!(err, Err("boom"));
        assert!(cache.is_empty());

        let ok: Result<u32, &str> = cache.get_or_try_insert_with(key, || Ok(1));
        assert_eq!(ok, Ok(1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
