//! KvStore
//!
//! The key-value contract the cluster database and the alert bus are built on:
//! - Plain and conditional writes (create / update / compare-and-set)
//! - Prefix enumeration and point-in-time snapshots
//! - Ordered prefix watches that can resume from a mutation index

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::KvSnapshot;
use crate::KvError;
use crate::Result;

/// Kind of mutation a pair was produced by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvAction {
    Set,
    Create,
    Get,
    Delete,
    Expire,
}

/// A key, its value and the indexes of the mutations that created and last
/// modified it. Keys are relative to the store namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
    pub action: KvAction,
    pub create_index: u64,
    pub modified_index: u64,
    /// Time to live in seconds, 0 for none
    pub ttl: u64,
}

/// Callback invoked once per mutation under a watched prefix.
///
/// Receives the full (namespaced) watched prefix and either the mutation or a
/// delivery error. Returning `Err` ends the subscription.
pub type WatchCb = Arc<
    dyn Fn(String, std::result::Result<KvPair, KvError>) -> BoxFuture<'static, Result<()>>
        + Send
        + Sync,
>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// `<domain>/<cluster_id>/` prefix all keys of this store live under
    fn namespace(&self) -> &str;

    async fn get(
        &self,
        key: &str,
    ) -> std::result::Result<KvPair, KvError>;

    /// Unconditional write
    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: u64,
    ) -> std::result::Result<KvPair, KvError>;

    /// Fails with `AlreadyExists` if the key is present
    async fn create(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: u64,
    ) -> std::result::Result<KvPair, KvError>;

    /// Fails with `NotFound` if the key is absent
    async fn update(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: u64,
    ) -> std::result::Result<KvPair, KvError>;

    async fn delete(
        &self,
        key: &str,
    ) -> std::result::Result<KvPair, KvError>;

    /// Atomically replaces `kvp.value` if the stored bytes still equal `prev_value`.
    async fn compare_and_set(
        &self,
        kvp: KvPair,
        prev_value: Vec<u8>,
    ) -> std::result::Result<KvPair, KvError>;

    async fn enumerate(
        &self,
        prefix: &str,
    ) -> std::result::Result<Vec<KvPair>, KvError>;

    /// Subscribes `cb` to every mutation under `prefix`.
    ///
    /// `start_index == 0` watches from now on, otherwise retained mutations with
    /// `modified_index >= start_index` are replayed first. Delivery stops when
    /// `cancel` fires.
    async fn watch_tree(
        &self,
        prefix: &str,
        start_index: u64,
        cancel: CancellationToken,
        cb: WatchCb,
    ) -> std::result::Result<(), KvError>;

    /// Frozen copy of the keys under `prefix` and the first index it does not reflect
    async fn snapshot(
        &self,
        prefix: &str,
    ) -> std::result::Result<(KvSnapshot, u64), KvError>;
}

/// JSON helpers over the raw byte interface
#[async_trait]
pub trait KvStoreExt: KvStore {
    /// Reads `key` and decodes its JSON value
    async fn get_val<T>(
        &self,
        key: &str,
    ) -> std::result::Result<(KvPair, T), KvError>
    where
        T: DeserializeOwned + Send,
    {
        let kvp = self.get(key).await?;
        let value = decode_json(&kvp)?;
        Ok((kvp, value))
    }

    async fn put_val<T>(
        &self,
        key: &str,
        value: &T,
        ttl: u64,
    ) -> std::result::Result<KvPair, KvError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let bytes = encode_json(key, value)?;
        self.put(key, bytes, ttl).await
    }

    async fn create_val<T>(
        &self,
        key: &str,
        value: &T,
        ttl: u64,
    ) -> std::result::Result<KvPair, KvError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let bytes = encode_json(key, value)?;
        self.create(key, bytes, ttl).await
    }

    async fn update_val<T>(
        &self,
        key: &str,
        value: &T,
        ttl: u64,
    ) -> std::result::Result<KvPair, KvError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let bytes = encode_json(key, value)?;
        self.update(key, bytes, ttl).await
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}

pub fn decode_json<T: DeserializeOwned>(kvp: &KvPair) -> std::result::Result<T, KvError> {
    serde_json::from_slice(&kvp.value).map_err(|source| KvError::Decode {
        key: kvp.key.clone(),
        source,
    })
}

pub fn encode_json<T: Serialize + ?Sized>(
    key: &str,
    value: &T,
) -> std::result::Result<Vec<u8>, KvError> {
    serde_json::to_vec(value).map_err(|source| KvError::Encode {
        key: key.to_string(),
        source,
    })
}

/// Opens namespaced stores on a shared backend
pub trait KvFactory: Send + Sync + 'static {
    fn open(
        &self,
        namespace: &str,
    ) -> Result<Arc<dyn KvStore>>;
}
