//! Store Adapters
//!
//! Typed pass-through handles on the three named stores. Their only logic is
//! tagging write failures with the store they came from.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::domain::ports::{EntryId, KeySet, KeyValueStore, LogicalKey};
use crate::error::{Error, Result};

/// Named handle on an underlying key-value store.
pub struct TypedStore<K, V> {
    name: String,
    inner: Arc<dyn KeyValueStore<K, V>>,
}

/// Payloads by entry identifier.
pub type BlobStore = TypedStore<EntryId, Bytes>;
/// Key sets by entry identifier.
pub type ReverseKeyStore = TypedStore<EntryId, KeySet>;
/// Entry identifiers by logical key.
pub type ForwardKeyStore = TypedStore<LogicalKey, EntryId>;

impl<K, V> TypedStore<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, inner: Arc<dyn KeyValueStore<K, V>>) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, key: &K) -> Result<Option<V>> {
        self.inner.get(key).await
    }

    /// Write through to the store.
    ///
    /// `Unavailable` and already-tagged write failures pass through; any
    /// other error becomes a `StoreWriteFailure` naming this store.
    pub async fn put(&self, key: K, value: V, ttl: Option<Duration>) -> Result<()> {
        self.inner
            .put(key, value, ttl)
            .await
            .map_err(|e| match e {
                Error::Unavailable(_) | Error::StoreWriteFailure { .. } => e,
                other => Error::write_failure(&self.name, other.to_string()),
            })
    }

    pub async fn approximate_size(&self) -> Result<u64> {
        self.inner.approximate_size().await
    }
}
