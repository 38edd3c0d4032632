use std::path::Path;

use tracing::debug;
use tracing::warn;

use crate::constants::SLED_DATA_TREE;
use crate::constants::SLED_META_KEY_REVISION;
use crate::constants::SLED_META_TREE;
use crate::KvEngine;
use crate::KvError;
use crate::StoredEntry;

/// Persistent engine on an embedded sled database.
///
/// Entries are bincode envelopes in the data tree. The revision counter lives
/// in the meta tree so mutation indexes keep increasing across restarts.
#[derive(Debug)]
pub struct SledKvEngine {
    db: ::sled::Db,
    data: ::sled::Tree,
    meta: ::sled::Tree,
}

impl SledKvEngine {
    pub fn open(db_root_path: impl AsRef<Path> + std::fmt::Debug) -> Result<Self, KvError> {
        let db = init_sled_kv_db(&db_root_path)?;
        Self::from_db(db)
    }

    pub fn from_db(db: ::sled::Db) -> Result<Self, KvError> {
        let data = db.open_tree(SLED_DATA_TREE)?;
        let meta = db.open_tree(SLED_META_TREE)?;
        Ok(Self { db, data, meta })
    }

    fn decode(bytes: &[u8]) -> Result<StoredEntry, KvError> {
        bincode::deserialize(bytes).map_err(KvError::from)
    }
}

impl KvEngine for SledKvEngine {
    fn get(
        &self,
        key: &str,
    ) -> Result<Option<StoredEntry>, KvError> {
        match self.data.get(key.as_bytes())? {
            Some(bytes) => Self::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn insert(
        &self,
        key: &str,
        entry: &StoredEntry,
    ) -> Result<(), KvError> {
        let bytes = bincode::serialize(entry)?;
        self.data.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    fn remove(
        &self,
        key: &str,
    ) -> Result<Option<StoredEntry>, KvError> {
        match self.data.remove(key.as_bytes())? {
            Some(bytes) => Self::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn scan_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, StoredEntry)>, KvError> {
        let mut entries = Vec::new();
        for item in self.data.scan_prefix(prefix.as_bytes()) {
            let (key, value) = item?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| KvError::Engine(format!("non utf8 key: {e}")))?;
            entries.push((key, Self::decode(&value)?));
        }
        Ok(entries)
    }

    fn load_revision(&self) -> Result<u64, KvError> {
        match self.meta.get(SLED_META_KEY_REVISION)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                    KvError::Engine(format!("invalid revision length {}", bytes.len()))
                })?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    fn store_revision(
        &self,
        revision: u64,
    ) -> Result<(), KvError> {
        self.meta.insert(SLED_META_KEY_REVISION, revision.to_be_bytes().to_vec())?;
        Ok(())
    }

    fn flush(&self) -> Result<(), KvError> {
        self.db.flush()?;
        Ok(())
    }
}

pub fn init_sled_kv_db(
    sled_db_root_path: impl AsRef<Path> + std::fmt::Debug
) -> Result<::sled::Db, KvError> {
    debug!("init_sled_kv_db from path: {:?}", &sled_db_root_path);

    let path = sled_db_root_path.as_ref();
    let kv_db_path = path.join("kv");

    ::sled::Config::default()
        .path(&kv_db_path)
        .cache_capacity(64 * 1024 * 1024) //64MB
        .flush_every_ms(Some(10))
        .use_compression(true)
        .compression_factor(1)
        .open()
        .map_err(|e| {
            warn!(
                "Try to open DB at this location: {:?} and failed: {:?}",
                kv_db_path, e
            );
            e.into()
        })
}
