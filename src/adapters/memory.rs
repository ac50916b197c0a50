//! In-Memory Storage Cluster
//!
//! Process-local implementation of the storage ports, used by tests and by
//! the single-node service binary.
//!
//! # Design
//!
//! - DashMap per named store for lock-free concurrent access
//! - Fixed time-to-live per record, checked on read and reclaimed by
//!   `purge_expired`
//! - Fault toggles to simulate rejected writes and an unreachable counter

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;

use crate::domain::ports::{
    DynBlobStore, DynForwardKeyStore, DynReverseKeyStore, EntryId, KeySet, KeyValueStore,
    LogicalKey, SequenceGenerator, StorageCluster,
};
use crate::error::{Error, Result};

/// A value together with its absolute expiry deadline.
#[derive(Debug, Clone)]
struct StoredValue<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> StoredValue<V> {
    fn new(value: V, ttl: Option<Duration>) -> Self {
        // A TTL too large to represent never expires.
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        Self { value, expires_at }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Store statistics
#[derive(Debug, Clone, Default)]
pub struct InMemoryStoreStats {
    /// Records currently held, including expired ones not yet purged
    pub entries: u64,
    /// Read operations
    pub reads: u64,
    /// Write operations
    pub writes: u64,
    /// Records dropped because they expired
    pub expired: u64,
}

/// In-memory key-value store with per-record expiry.
pub struct InMemoryStore<K, V> {
    name: String,
    entries: DashMap<K, StoredValue<V>>,
    reject_writes: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
    expired: AtomicU64,
}

impl<K, V> InMemoryStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
            reject_writes: AtomicBool::new(false),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// Store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Make every subsequent write fail until switched back.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Drop every expired record, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, stored| !stored.is_expired(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            self.expired.fetch_add(purged as u64, Ordering::Relaxed);
            debug!(store = %self.name, purged, "Purged expired records");
        }
        purged
    }

    /// Get store statistics.
    pub fn stats(&self) -> InMemoryStoreStats {
        InMemoryStoreStats {
            entries: self.entries.len() as u64,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl<K, V> KeyValueStore<K, V> for InMemoryStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();

        let expired = match self.entries.get(key) {
            Some(stored) if !stored.is_expired(now) => return Ok(Some(stored.value.clone())),
            Some(_) => true,
            None => false,
        };

        // The read guard is released above; only remove the record if it is
        // still the expired one (a concurrent put may have replaced it).
        if expired
            && self
                .entries
                .remove_if(key, |_, stored| stored.is_expired(now))
                .is_some()
        {
            self.expired.fetch_add(1, Ordering::Relaxed);
        }
        Ok(None)
    }

    async fn put(&self, key: K, value: V, ttl: Option<Duration>) -> Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(Error::write_failure(&self.name, "writes rejected"));
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(key, StoredValue::new(value, ttl));
        Ok(())
    }

    async fn approximate_size(&self) -> Result<u64> {
        Ok(self.entries.len() as u64)
    }
}

/// In-memory monotonic counter.
pub struct InMemorySequence {
    value: AtomicU64,
    available: AtomicBool,
}

impl InMemorySequence {
    /// Create a counter whose first `next()` returns `initial + 1`.
    pub fn new(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) the counter.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Last value handed out.
    pub fn current(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SequenceGenerator for InMemorySequence {
    async fn next(&self) -> Result<EntryId> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("sequence counter unreachable".to_string()));
        }
        // Never wrap: a reused id would overwrite a live blob.
        self.value
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_add(1))
            .map(|previous| EntryId(previous + 1))
            .map_err(|_| Error::Unavailable("sequence exhausted".to_string()))
    }
}

/// Process-local cluster handing out named stores and sequences.
///
/// Opening a name twice returns the same underlying store, so several
/// engines built over one cluster behave like nodes sharing data.
#[derive(Default)]
pub struct InMemoryCluster {
    blob_stores: DashMap<String, Arc<InMemoryStore<EntryId, Bytes>>>,
    reverse_key_stores: DashMap<String, Arc<InMemoryStore<EntryId, KeySet>>>,
    forward_key_stores: DashMap<String, Arc<InMemoryStore<LogicalKey, EntryId>>>,
    sequences: DashMap<String, Arc<InMemorySequence>>,
}

impl InMemoryCluster {
    /// Create an empty cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete handle on a blob store, if it has been opened.
    pub fn blob_store_handle(&self, name: &str) -> Option<Arc<InMemoryStore<EntryId, Bytes>>> {
        self.blob_stores.get(name).map(|s| s.clone())
    }

    /// Concrete handle on a reverse key store, if it has been opened.
    pub fn reverse_key_store_handle(
        &self,
        name: &str,
    ) -> Option<Arc<InMemoryStore<EntryId, KeySet>>> {
        self.reverse_key_stores.get(name).map(|s| s.clone())
    }

    /// Concrete handle on a forward key store, if it has been opened.
    pub fn forward_key_store_handle(
        &self,
        name: &str,
    ) -> Option<Arc<InMemoryStore<LogicalKey, EntryId>>> {
        self.forward_key_stores.get(name).map(|s| s.clone())
    }

    /// Concrete handle on a sequence, if it has been opened.
    pub fn sequence_handle(&self, name: &str) -> Option<Arc<InMemorySequence>> {
        self.sequences.get(name).map(|s| s.clone())
    }

    /// Purge expired records from every store.
    pub fn purge_expired(&self) -> usize {
        let blobs: usize = self.blob_stores.iter().map(|s| s.purge_expired()).sum();
        let reverse: usize = self.reverse_key_stores.iter().map(|s| s.purge_expired()).sum();
        let forward: usize = self.forward_key_stores.iter().map(|s| s.purge_expired()).sum();
        blobs + reverse + forward
    }

    fn open<K, V>(
        stores: &DashMap<String, Arc<InMemoryStore<K, V>>>,
        name: &str,
    ) -> Arc<InMemoryStore<K, V>>
    where
        K: Eq + Hash + Clone,
        V: Clone,
    {
        stores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InMemoryStore::new(name)))
            .clone()
    }
}

#[async_trait]
impl StorageCluster for InMemoryCluster {
    async fn blob_store(&self, name: &str) -> Result<DynBlobStore> {
        Ok(Self::open(&self.blob_stores, name))
    }

    async fn reverse_key_store(&self, name: &str) -> Result<DynReverseKeyStore> {
        Ok(Self::open(&self.reverse_key_stores, name))
    }

    async fn forward_key_store(&self, name: &str) -> Result<DynForwardKeyStore> {
        Ok(Self::open(&self.forward_key_stores, name))
    }

    async fn sequence(&self, name: &str, initial: u64) -> Result<Arc<dyn SequenceGenerator>> {
        let sequence = self
            .sequences
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InMemorySequence::new(initial)))
            .clone();
        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_store_put_get() {
        let store: InMemoryStore<String, u64> = InMemoryStore::new("test");
        store.put("a".to_string(), 1, None).await.unwrap();

        assert_eq!(store.get(&"a".to_string()).await.unwrap(), Some(1));
        assert_eq!(store.get(&"b".to_string()).await.unwrap(), None);
        assert_eq!(store.approximate_size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_overwrite() {
        let store: InMemoryStore<String, u64> = InMemoryStore::new("test");
        store.put("a".to_string(), 1, None).await.unwrap();
        store.put("a".to_string(), 2, None).await.unwrap();

        assert_eq!(store.get(&"a".to_string()).await.unwrap(), Some(2));
        assert_eq!(store.approximate_size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_expiry_on_read() {
        let store: InMemoryStore<String, u64> = InMemoryStore::new("test");
        store
            .put("a".to_string(), 1, Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(store.get(&"a".to_string()).await.unwrap(), Some(1));

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get(&"a".to_string()).await.unwrap(), None);
        assert_eq!(store.stats().expired, 1);
        assert_eq!(store.approximate_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_purge_expired() {
        let store: InMemoryStore<String, u64> = InMemoryStore::new("test");
        store
            .put("short".to_string(), 1, Some(Duration::from_millis(10)))
            .await
            .unwrap();
        store.put("forever".to_string(), 2, None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.stats().entries, 1);
        assert_eq!(store.get(&"forever".to_string()).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_store_huge_ttl_never_expires() {
        let store: InMemoryStore<String, u64> = InMemoryStore::new("test");
        store
            .put("a".to_string(), 1, Some(Duration::MAX))
            .await
            .unwrap();
        assert_eq!(store.get(&"a".to_string()).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_store_rejects_writes() {
        let store: InMemoryStore<String, u64> = InMemoryStore::new("blobs");
        store.set_reject_writes(true);

        let result = store.put("a".to_string(), 1, None).await;
        assert_matches!(result, Err(Error::StoreWriteFailure { ref store, .. }) if store == "blobs");

        store.set_reject_writes(false);
        store.put("a".to_string(), 1, None).await.unwrap();
        assert_eq!(store.stats().writes, 1);
    }

    #[tokio::test]
    async fn test_sequence_is_strictly_increasing() {
        let sequence = InMemorySequence::new(0);
        let a = sequence.next().await.unwrap();
        let b = sequence.next().await.unwrap();
        assert_eq!(a, EntryId(1));
        assert!(b > a);
        assert_eq!(sequence.current(), 2);
    }

    #[tokio::test]
    async fn test_sequence_stops_at_max_instead_of_wrapping() {
        let sequence = InMemorySequence::new(u64::MAX - 1);

        assert_eq!(sequence.next().await.unwrap(), EntryId(u64::MAX));
        assert_matches!(
            sequence.next().await,
            Err(Error::Unavailable(ref reason)) if reason == "sequence exhausted"
        );
        assert_matches!(sequence.next().await, Err(Error::Unavailable(_)));
        assert_eq!(sequence.current(), u64::MAX);
    }

    #[tokio::test]
    async fn test_sequence_unavailable() {
        let sequence = InMemorySequence::new(10);
        sequence.set_available(false);
        assert_matches!(sequence.next().await, Err(Error::Unavailable(_)));

        sequence.set_available(true);
        assert_eq!(sequence.next().await.unwrap(), EntryId(11));
    }

    #[tokio::test]
    async fn test_concurrent_sequence_values_are_unique() {
        let sequence = Arc::new(InMemorySequence::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let sequence = sequence.clone();
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                for _ in 0..100 {
                    ids.push(sequence.next().await.unwrap());
                }
                ids
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 800);
    }

    #[tokio::test]
    async fn test_cluster_shares_named_stores() {
        let cluster = InMemoryCluster::new();
        let first = cluster.forward_key_store("keys").await.unwrap();
        let second = cluster.forward_key_store("keys").await.unwrap();

        first
            .put(LogicalKey::from("k"), EntryId(5), None)
            .await
            .unwrap();
        assert_eq!(
            second.get(&LogicalKey::from("k")).await.unwrap(),
            Some(EntryId(5))
        );
        assert!(cluster.forward_key_store_handle("keys").is_some());
        assert!(cluster.forward_key_store_handle("other").is_none());
    }

    #[tokio::test]
    async fn test_cluster_sequence_keeps_first_initial_value() {
        let cluster = InMemoryCluster::new();
        let first = cluster.sequence("seq", 100).await.unwrap();
        let second = cluster.sequence("seq", 0).await.unwrap();

        assert_eq!(first.next().await.unwrap(), EntryId(101));
        assert_eq!(second.next().await.unwrap(), EntryId(102));
    }

    #[tokio::test]
    async fn test_cluster_purge_expired() {
        let cluster = InMemoryCluster::new();
        let blobs = cluster.blob_store("blobs").await.unwrap();
        let keys = cluster.forward_key_store("keys").await.unwrap();
        let ttl = Some(Duration::from_millis(10));

        blobs.put(EntryId(1), Bytes::from("x"), ttl).await.unwrap();
        keys.put(LogicalKey::from("a"), EntryId(1), ttl).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cluster.purge_expired(), 2);
    }
}
