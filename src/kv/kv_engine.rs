#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;

use crate::KvError;

/// Persisted form of a value and its mutation metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub value: Vec<u8>,
    pub create_index: u64,
    pub modified_index: u64,
    pub ttl: u64,
    /// Unix millis after which the entry is expired, if it has a ttl
    pub expires_at_ms: Option<u64>,
}

impl StoredEntry {
    pub fn is_expired(
        &self,
        now_ms: u64,
    ) -> bool {
        self.expires_at_ms.is_some_and(|deadline| deadline <= now_ms)
    }
}

/// Raw storage underneath [`super::KvBackend`].
///
/// Keys are fully namespaced. Engines need no locking of their own beyond
/// thread safety: the backend serialises every mutation.
#[cfg_attr(test, automock)]
pub trait KvEngine: Send + Sync + 'static {
    fn get(
        &self,
        key: &str,
    ) -> Result<Option<StoredEntry>, KvError>;

    fn insert(
        &self,
        key: &str,
        entry: &StoredEntry,
    ) -> Result<(), KvError>;

    fn remove(
        &self,
        key: &str,
    ) -> Result<Option<StoredEntry>, KvError>;

    /// All entries whose key starts with `prefix`, in key order
    fn scan_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, StoredEntry)>, KvError>;

    /// Index of the last committed mutation
    fn load_revision(&self) -> Result<u64, KvError>;

    fn store_revision(
        &self,
        revision: u64,
    ) -> Result<(), KvError>;

    fn flush(&self) -> Result<(), KvError>;
}
