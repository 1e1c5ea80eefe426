//! Local durable mirror of the session counters
//!
//! A key-value store (the page's local storage) holds one JSON snapshot under
//! a fixed key. It is read once when the session starts and written after
//! every counter change. It is advisory: any read failure means "no prior
//! session", and write failures are only logged.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use sentinel_core::CounterSnapshot;

use crate::error::MirrorError;

/// String key-value storage
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    /// Backing storage failure
    fn get(&self, key: &str) -> Result<Option<String>, MirrorError>;

    /// # Errors
    /// Backing storage failure
    fn set(&self, key: &str, value: &str) -> Result<(), MirrorError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, MirrorError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), MirrorError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per key under a directory
#[derive(Debug, Clone)]
pub struct FileKvStore {
    root: PathBuf,
}

impl FileKvStore {
    /// # Errors
    /// `MirrorError::Io` if the directory cannot be created
    pub fn open(root: impl AsRef<Path>) -> Result<Self, MirrorError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.root.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, MirrorError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), MirrorError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Counter mirror bound to one key
#[derive(Clone)]
pub struct LocalMirror {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl LocalMirror {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Strict read
    ///
    /// # Errors
    /// Storage failure or a corrupt payload
    pub fn try_load(&self) -> Result<Option<CounterSnapshot>, MirrorError> {
        match self.store.get(&self.key)? {
            Some(raw) => Ok(Some(CounterSnapshot::from_json(&raw)?)),
            None => Ok(None),
        }
    }

    /// Read the stored snapshot; failures degrade to zero counters
    #[must_use]
    pub fn load(&self) -> CounterSnapshot {
        match self.try_load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => CounterSnapshot::default(),
            Err(error) => {
                tracing::warn!(key = %self.key, %error, "mirror unreadable, starting from zero");
                CounterSnapshot::default()
            }
        }
    }

    /// Write the latest snapshot; failures are logged and swallowed
    pub fn store(&self, snapshot: CounterSnapshot) {
        let result = snapshot
            .to_json()
            .map_err(MirrorError::from)
            .and_then(|raw| self.store.set(&self.key, &raw));
        if let Err(error) = result {
            tracing::warn!(key = %self.key, %error, "mirror write failed");
        }
    }
}

impl std::fmt::Debug for LocalMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMirror").field("key", &self.key).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, MirrorError> {
            Err(MirrorError::Unavailable("storage disabled".into()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), MirrorError> {
            Err(MirrorError::Unavailable("storage disabled".into()))
        }
    }

    #[test]
    fn round_trips_through_memory() {
        let mirror = LocalMirror::new(Arc::new(MemoryKvStore::new()), "k");
        assert_eq!(mirror.load(), CounterSnapshot::default());
        mirror.store(CounterSnapshot::new(2, 15));
        assert_eq!(mirror.load(), CounterSnapshot::new(2, 15));
    }

    #[test]
    fn corrupt_payload_reads_as_zero() {
        let store = Arc::new(MemoryKvStore::new());
        store.set("k", "{not json").unwrap();
        let mirror = LocalMirror::new(store, "k");
        assert!(matches!(mirror.try_load(), Err(MirrorError::Corrupt(_))));
        assert_eq!(mirror.load(), CounterSnapshot::default());
    }

    #[test]
    fn unavailable_storage_is_harmless() {
        let mirror = LocalMirror::new(Arc::new(BrokenStore), "k");
        mirror.store(CounterSnapshot::new(1, 1));
        assert_eq!(mirror.load(), CounterSnapshot::default());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let first = LocalMirror::new(Arc::new(FileKvStore::open(dir.path()).unwrap()), "fraud_detection_data");
        first.store(CounterSnapshot::new(4, 90));

        let second = LocalMirror::new(Arc::new(FileKvStore::open(dir.path()).unwrap()), "fraud_detection_data");
        assert_eq!(second.load(), CounterSnapshot::new(4, 90));
        assert!(dir.path().join("fraud_detection_data.json").exists());
    }
}
