use std::collections::BTreeMap;

use super::KvPair;
use crate::KvError;

/// Frozen, read-only view of a key subtree.
///
/// Reflects every mutation with an index below [`KvSnapshot::version`] and
/// none at or above it.
#[derive(Debug, Clone, Default)]
pub struct KvSnapshot {
    prefix: String,
    version: u64,
    pairs: BTreeMap<String, KvPair>,
}

impl KvSnapshot {
    pub(crate) fn new(
        prefix: &str,
        version: u64,
        pairs: impl IntoIterator<Item = KvPair>,
    ) -> Self {
        Self {
            prefix: prefix.to_string(),
            version,
            pairs: pairs.into_iter().map(|p| (p.key.clone(), p)).collect(),
        }
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Result<KvPair, KvError> {
        self.pairs.get(key).cloned().ok_or(KvError::NotFound)
    }

    pub fn enumerate(
        &self,
        prefix: &str,
    ) -> Vec<KvPair> {
        self.pairs
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
