mod inner;

use crate::Error;
use inner::StoreInner;
use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{path::PathBuf, sync::Arc};
use tracing::warn;

/// Durable key-value store backed by a single JSON file.
///
/// The file is read once at open and rewritten on every mutation. A missing
/// or corrupt file yields an empty store; an absent path keeps the store in
/// memory only.
#[derive(Debug, Clone, Default)]
pub struct KvStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl KvStore {
    pub fn open(path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner::open(path))),
        }
    }

    pub fn in_memory() -> Self {
        Self::open(None)
    }

    /// Value under `key`, or `None` when absent or of another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.inner.lock().data.get(key)?.clone();
        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, %err, "stored value has an unexpected shape");
                None
            }
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().data.contains_key(key)
    }

    /// Set `key` and flush.
    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: T) -> Result<(), Error> {
        let value = serde_json::to_value(value)?;
        let mut inner = self.inner.lock();
        inner.data.insert(key.into(), value);
        inner.flush()
    }

    /// Set every pair and flush once.
    pub fn update<I, K>(&self, entries: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut inner = self.inner.lock();
        inner
            .data
            .extend(entries.into_iter().map(|(key, value)| (key.into(), value)));
        inner.flush()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("smart_data.json");

        let store = KvStore::open(Some(path.clone()));
        store.set("restarts", 3u32).unwrap();
        store
            .update([("a", json!(1)), ("b", json!({"x": [1, 2]}))])
            .unwrap();
        drop(store);

        let store = KvStore::open(Some(path));
        assert_eq!(store.get::<u32>("restarts"), Some(3));
        assert_eq!(store.get_or::<u32>("missing", 7), 7);
        assert_eq!(
            store.get::<BTreeMap<String, Vec<u8>>>("b"),
            Some(BTreeMap::from([("x".to_string(), vec![1, 2])]))
        );
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("smart_data.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = KvStore::open(Some(path.clone()));
        assert!(store.is_empty());

        // the next write replaces the corrupt file
        store.set("k", "v").unwrap();
        assert_eq!(KvStore::open(Some(path)).get::<String>("k").as_deref(), Some("v"));
    }

    #[test]
    fn wrong_shape_reads_as_absent() {
        let store = KvStore::in_memory();
        store.set("n", "not a number").unwrap();
        assert_eq!(store.get::<u64>("n"), None);
        assert!(store.contains("n"));
    }
}
