use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use parking_lot::RwLock;

use crate::KvEngine;
use crate::KvError;
use crate::StoredEntry;

/// In-process engine. Contents live as long as the backend holding it.
#[derive(Default, Debug)]
pub struct MemKvEngine {
    data: RwLock<BTreeMap<String, StoredEntry>>,
    revision: AtomicU64,
}

impl MemKvEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvEngine for MemKvEngine {
    fn get(
        &self,
        key: &str,
    ) -> Result<Option<StoredEntry>, KvError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn insert(
        &self,
        key: &str,
        entry: &StoredEntry,
    ) -> Result<(), KvError> {
        self.data.write().insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn remove(
        &self,
        key: &str,
    ) -> Result<Option<StoredEntry>, KvError> {
        Ok(self.data.write().remove(key))
    }

    fn scan_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, StoredEntry)>, KvError> {
        let data = self.data.read();
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn load_revision(&self) -> Result<u64, KvError> {
        Ok(self.revision.load(Ordering::SeqCst))
    }

    fn store_revision(
        &self,
        revision: u64,
    ) -> Result<(), KvError> {
        self.revision.store(revision, Ordering::SeqCst);
        Ok(())
    }

    fn flush(&self) -> Result<(), KvError> {
        Ok(())
    }
}
