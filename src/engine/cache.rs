//! Indirection Cache Engine
//!
//! Maps many logical keys onto one shared payload through an internally
//! allocated [`EntryId`].
//!
//! # Write path
//!
//! ```text
//! put(keys, payload)
//!   1. id = sequence.next()
//!   2. blob store      [id]  = payload
//!   3. reverse store   [id]  = keys
//!   4. forward store   [key] = id      (for each key)
//! ```
//!
//! The forward store is written last: it is the only way a reader reaches an
//! identifier, so a crash part way through leaves at worst an unreachable
//! blob that expires on its own, never a key pointing at a missing blob.
//! There is no rollback; a retry allocates a new identifier.
//!
//! # Read path
//!
//! `get(key)` resolves `key` in the forward store and fetches the blob.
//! A missing hop at either step is a plain miss.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::future::try_join_all;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::lifecycle::EngineState;
use super::stores::{BlobStore, ForwardKeyStore, ReverseKeyStore, TypedStore};
use crate::adapters::LoggingEventPublisher;
use crate::config::EngineConfig;
use crate::domain::events::{CacheEvent, WriteStage};
use crate::domain::ports::{
    EntryId, EventPublisher, KeySet, LogicalKey, MetricsSink, SequenceGenerator, StorageCluster,
    TtlUnit,
};
use crate::error::{Error, Result};
use crate::monitoring::{HealthCheckResult, MetricsCollector};

/// Counter of `get` calls
pub const GET_CALL_COUNT: &str = "cache_get_call_count";
/// Latency of successful `get` calls
pub const GET_CALL_TIME: &str = "cache_get_call_time";
/// Counter of `get` calls that missed
pub const GET_MISS_COUNT: &str = "cache_get_miss_count";
/// Counter of `put` calls
pub const PUT_CALL_COUNT: &str = "cache_put_call_count";
/// Latency of successful `put` calls
pub const PUT_CALL_TIME: &str = "cache_put_call_time";
/// Counter of `put` calls that failed
pub const PUT_FAILURE_COUNT: &str = "cache_put_failure_count";

const HEALTH_CHECK_NAME: &str = "indirection-cache";

/// Snapshot of store cardinalities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Logical keys in the forward store
    pub keys: u64,
    /// Payloads in the blob store
    pub blobs: u64,
    /// Key sets in the reverse store
    pub key_sets: u64,
}

/// Everything bound by `init`.
struct Bindings {
    blobs: BlobStore,
    reverse: ReverseKeyStore,
    forward: ForwardKeyStore,
    sequence: Arc<dyn SequenceGenerator>,
    default_ttl: Option<Duration>,
}

struct Lifecycle {
    state: EngineState,
    bindings: Option<Arc<Bindings>>,
}

/// A put that stopped part way.
struct PartialWrite {
    stage: WriteStage,
    entry_id: Option<EntryId>,
    error: Error,
}

/// Indirection cache engine
pub struct IndirectionCache {
    instance_id: String,
    cluster: Arc<dyn StorageCluster>,
    metrics: Arc<dyn MetricsSink>,
    events: Arc<dyn EventPublisher>,
    lifecycle: RwLock<Lifecycle>,
}

impl IndirectionCache {
    /// Create an uninitialized engine over a storage cluster.
    pub fn new(
        cluster: Arc<dyn StorageCluster>,
        metrics: Arc<dyn MetricsSink>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            instance_id: uuid::Uuid::new_v4().to_string(),
            cluster,
            metrics,
            events,
            lifecycle: RwLock::new(Lifecycle {
                state: EngineState::Uninitialized,
                bindings: None,
            }),
        }
    }

    /// Create with in-process metrics and logging-only events
    pub fn with_defaults(cluster: Arc<dyn StorageCluster>) -> Self {
        Self::new(
            cluster,
            Arc::new(MetricsCollector::new()),
            Arc::new(LoggingEventPublisher::new()),
        )
    }

    /// Unique id of this engine instance, used in logs and events.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.lifecycle.read().state
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Bind the configured stores and sequence.
    pub async fn init(&self, config: &EngineConfig) -> Result<()> {
        config.validate()?;
        // Fail before touching the cluster if init is not allowed.
        self.state().transition(EngineState::Initialized)?;

        let blobs = self.cluster.blob_store(&config.blob_store).await?;
        let reverse = self
            .cluster
            .reverse_key_store(&config.reverse_key_store)
            .await?;
        let forward = self
            .cluster
            .forward_key_store(&config.forward_key_store)
            .await?;
        let sequence = self
            .cluster
            .sequence(&config.sequence, config.sequence_initial_value)
            .await?;

        let bindings = Arc::new(Bindings {
            blobs: TypedStore::new(&config.blob_store, blobs),
            reverse: TypedStore::new(&config.reverse_key_store, reverse),
            forward: TypedStore::new(&config.forward_key_store, forward),
            sequence,
            default_ttl: config.default_ttl(),
        });

        {
            let mut lifecycle = self.lifecycle.write();
            // A concurrent init may have won while the stores were opening.
            lifecycle.state = lifecycle.state.transition(EngineState::Initialized)?;
            lifecycle.bindings = Some(bindings);
        }

        info!(
            instance_id = %self.instance_id,
            blob_store = %config.blob_store,
            forward_key_store = %config.forward_key_store,
            reverse_key_store = %config.reverse_key_store,
            sequence = %config.sequence,
            default_ttl_secs = ?config.default_ttl_secs,
            "Initialized indirection cache"
        );
        self.emit(CacheEvent::engine_initialized(
            &self.instance_id,
            &config.blob_store,
            &config.forward_key_store,
            &config.reverse_key_store,
        ))
        .await;
        Ok(())
    }

    /// Begin serving reads and writes.
    pub async fn start(&self) -> Result<()> {
        self.advance(EngineState::Started)?;
        info!(instance_id = %self.instance_id, "Indirection cache startup sequence complete");
        self.emit(CacheEvent::engine_started(&self.instance_id)).await;
        Ok(())
    }

    /// Stop serving and release the store handles.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.write();
            lifecycle.state = lifecycle.state.transition(EngineState::Stopped)?;
            lifecycle.bindings = None;
        }
        info!(instance_id = %self.instance_id, "Indirection cache shutdown sequence complete");
        self.emit(CacheEvent::engine_stopped(&self.instance_id)).await;
        Ok(())
    }

    fn advance(&self, next: EngineState) -> Result<()> {
        let mut lifecycle = self.lifecycle.write();
        lifecycle.state = lifecycle.state.transition(next)?;
        Ok(())
    }

    /// Bound stores, only while started.
    fn serving(&self, operation: &'static str) -> Result<Arc<Bindings>> {
        let lifecycle = self.lifecycle.read();
        match (&lifecycle.state, &lifecycle.bindings) {
            (EngineState::Started, Some(bindings)) => Ok(bindings.clone()),
            (state, _) => Err(Error::NotStarted {
                operation,
                state: state.to_string(),
            }),
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store `payload` under every key in `keys`.
    ///
    /// Uses the configured default expiry, if any. Returns the identifier the
    /// keys now resolve to.
    pub async fn put<I, K>(&self, keys: I, payload: impl Into<Bytes>) -> Result<EntryId>
    where
        I: IntoIterator<Item = K>,
        K: Into<LogicalKey>,
    {
        self.put_with_expiry(keys, payload, None).await
    }

    /// Store `payload` under `keys`, expiring `value` `unit`s after the write.
    pub async fn put_with_ttl<I, K>(
        &self,
        keys: I,
        payload: impl Into<Bytes>,
        unit: TtlUnit,
        value: u64,
    ) -> Result<EntryId>
    where
        I: IntoIterator<Item = K>,
        K: Into<LogicalKey>,
    {
        self.put_with_expiry(keys, payload, Some(unit.duration(value)))
            .await
    }

    /// Store `payload` under `keys` with an explicit expiry.
    ///
    /// `None` falls back to the configured default expiry.
    pub async fn put_with_expiry<I, K>(
        &self,
        keys: I,
        payload: impl Into<Bytes>,
        expiry: Option<Duration>,
    ) -> Result<EntryId>
    where
        I: IntoIterator<Item = K>,
        K: Into<LogicalKey>,
    {
        let keys = KeySet::new(keys)?;
        self.write_entry(keys, payload.into(), expiry).await
    }

    async fn write_entry(
        &self,
        keys: KeySet,
        payload: Bytes,
        expiry: Option<Duration>,
    ) -> Result<EntryId> {
        let bindings = self.serving("put")?;
        self.metrics.count(PUT_CALL_COUNT, 1);
        let start = Instant::now();

        let ttl = expiry.or(bindings.default_ttl);
        let size_bytes = payload.len() as u64;

        match Self::write_in_order(&bindings, &keys, payload, ttl).await {
            Ok(entry_id) => {
                self.metrics.record_time(PUT_CALL_TIME, start.elapsed());
                debug!(
                    entry_id = %entry_id,
                    keys = keys.len(),
                    size_bytes,
                    ttl_ms = ?ttl.map(|d| d.as_millis()),
                    "Stored cache entry"
                );
                self.emit(CacheEvent::entry_written(
                    entry_id,
                    keys.len(),
                    size_bytes,
                    ttl,
                ))
                .await;
                Ok(entry_id)
            }
            Err(failure) => {
                self.metrics.count(PUT_FAILURE_COUNT, 1);
                warn!(
                    stage = %failure.stage,
                    entry_id = ?failure.entry_id.map(|id| id.value()),
                    error = %failure.error,
                    "Cache write failed; earlier records are left to expire"
                );
                self.emit(CacheEvent::write_failed(
                    failure.entry_id,
                    failure.stage,
                    failure.error.to_string(),
                ))
                .await;
                Err(failure.error)
            }
        }
    }

    /// Blob, then reverse keys, then forward keys. Never reorder.
    async fn write_in_order(
        bindings: &Bindings,
        keys: &KeySet,
        payload: Bytes,
        ttl: Option<Duration>,
    ) -> std::result::Result<EntryId, PartialWrite> {
        let entry_id = bindings.sequence.next().await.map_err(|error| PartialWrite {
            stage: WriteStage::Sequence,
            entry_id: None,
            error,
        })?;

        let failed_at = move |stage| {
            move |error| PartialWrite {
                stage,
                entry_id: Some(entry_id),
                error,
            }
        };

        bindings
            .blobs
            .put(entry_id, payload, ttl)
            .await
            .map_err(failed_at(WriteStage::Blob))?;

        bindings
            .reverse
            .put(entry_id, keys.clone(), ttl)
            .await
            .map_err(failed_at(WriteStage::ReverseKeys))?;

        // Forward keys are independent of each other.
        try_join_all(
            keys.iter()
                .map(|key| bindings.forward.put(key.clone(), entry_id, ttl)),
        )
        .await
        .map_err(failed_at(WriteStage::ForwardKeys))?;

        Ok(entry_id)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch the payload `key` currently refers to.
    ///
    /// Fails with [`Error::EntryNotFound`] when the key is unknown or its
    /// blob has expired.
    pub async fn get(&self, key: impl Into<LogicalKey>) -> Result<Bytes> {
        let key = key.into();
        let bindings = self.serving("get")?;
        self.metrics.count(GET_CALL_COUNT, 1);
        let start = Instant::now();

        let Some(entry_id) = bindings.forward.get(&key).await? else {
            self.metrics.count(GET_MISS_COUNT, 1);
            return Err(Error::not_found(key.0));
        };

        match bindings.blobs.get(&entry_id).await? {
            Some(payload) => {
                self.metrics.record_time(GET_CALL_TIME, start.elapsed());
                Ok(payload)
            }
            None => {
                debug!(key = %key, entry_id = %entry_id, "Key refers to an expired or orphaned blob");
                self.metrics.count(GET_MISS_COUNT, 1);
                Err(Error::not_found(key.0))
            }
        }
    }

    /// Identifier `key` currently refers to.
    pub async fn resolve(&self, key: impl Into<LogicalKey>) -> Result<EntryId> {
        let key = key.into();
        let bindings = self.serving("resolve")?;
        bindings
            .forward
            .get(&key)
            .await?
            .ok_or_else(|| Error::not_found(key.0))
    }

    /// Every key written together with `key`, in write order.
    pub async fn aliases(&self, key: impl Into<LogicalKey>) -> Result<KeySet> {
        let key = key.into();
        let bindings = self.serving("aliases")?;
        let Some(entry_id) = bindings.forward.get(&key).await? else {
            return Err(Error::not_found(key.0));
        };
        bindings
            .reverse
            .get(&entry_id)
            .await?
            .ok_or_else(|| Error::not_found(key.0))
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Approximate number of logical keys.
    pub async fn count_keys(&self) -> Result<u64> {
        self.serving("count_keys")?.forward.approximate_size().await
    }

    /// Approximate number of stored payloads.
    pub async fn count_blobs(&self) -> Result<u64> {
        self.serving("count_blobs")?.blobs.approximate_size().await
    }

    /// Approximate cardinalities of all three stores.
    pub async fn stats(&self) -> Result<CacheStats> {
        let bindings = self.serving("stats")?;
        Ok(CacheStats {
            keys: bindings.forward.approximate_size().await?,
            blobs: bindings.blobs.approximate_size().await?,
            key_sets: bindings.reverse.approximate_size().await?,
        })
    }

    /// Liveness: unhealthy only until `init` has bound the stores.
    pub fn health_check(&self) -> HealthCheckResult {
        let state = self.state();
        if state.is_initialized() {
            HealthCheckResult::healthy(HEALTH_CHECK_NAME).with_message(state.to_string())
        } else {
            HealthCheckResult::unhealthy(HEALTH_CHECK_NAME, "stores are not initialized")
        }
    }

    async fn emit(&self, event: CacheEvent) {
        if let Err(e) = self.events.publish(event).await {
            warn!(error = %e, "Failed to publish cache event");
        }
    }
}

impl std::fmt::Debug for IndirectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndirectionCache")
            .field("instance_id", &self.instance_id)
            .field("state", &self.state())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryCluster, InMemoryEventCollector};
    use assert_matches::assert_matches;

    struct Harness {
        cluster: Arc<InMemoryCluster>,
        metrics: Arc<MetricsCollector>,
        events: Arc<InMemoryEventCollector>,
        cache: IndirectionCache,
    }

    fn harness() -> Harness {
        let cluster = Arc::new(InMemoryCluster::new());
        let metrics = Arc::new(MetricsCollector::new());
        let events = Arc::new(InMemoryEventCollector::new());
        let cache = IndirectionCache::new(cluster.clone(), metrics.clone(), events.clone());
        Harness {
            cluster,
            metrics,
            events,
            cache,
        }
    }

    async fn started() -> Harness {
        let h = harness();
        h.cache.init(&EngineConfig::default()).await.unwrap();
        h.cache.start().await.unwrap();
        h
    }

    #[tokio::test]
    async fn test_round_trip() {
        let h = started().await;
        h.cache.put(["build:abc"], "hello").await.unwrap();

        assert_eq!(h.cache.get("build:abc").await.unwrap(), Bytes::from("hello"));
    }

    #[tokio::test]
    async fn test_write_order_is_blob_reverse_forward() {
        let h = started().await;
        let config = EngineConfig::default();
        let blobs = h.cluster.blob_store_handle(&config.blob_store).unwrap();
        let reverse = h
            .cluster
            .reverse_key_store_handle(&config.reverse_key_store)
            .unwrap();
        let forward = h
            .cluster
            .forward_key_store_handle(&config.forward_key_store)
            .unwrap();

        // Reject the reverse write: the blob must already be there and no
        // forward key may have been written.
        reverse.set_reject_writes(true);
        let result = h.cache.put(["k"], "payload").await;
        assert_matches!(result, Err(Error::StoreWriteFailure { .. }));

        assert_eq!(blobs.stats().writes, 1);
        assert_eq!(forward.stats().writes, 0);
        assert_matches!(h.cache.get("k").await, Err(Error::EntryNotFound { .. }));
    }

    #[tokio::test]
    async fn test_sequence_failure_writes_nothing() {
        let h = started().await;
        let sequence = h
            .cluster
            .sequence_handle(&EngineConfig::default().sequence)
            .unwrap();
        sequence.set_available(false);

        assert_matches!(h.cache.put(["k"], "x").await, Err(Error::Unavailable(_)));
        assert_eq!(h.cache.count_blobs().await.unwrap(), 0);

        let failures = h.events.events_of_type("WriteFailed");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].entry_id(), None);
    }

    #[tokio::test]
    async fn test_exhausted_sequence_fails_put_without_writing() {
        let h = harness();
        let config = EngineConfig {
            sequence_initial_value: u64::MAX - 1,
            ..Default::default()
        };
        h.cache.init(&config).await.unwrap();
        h.cache.start().await.unwrap();

        let last = h.cache.put(["a"], "first").await.unwrap();
        assert_eq!(last, EntryId(u64::MAX));

        let err = h.cache.put(["b"], "second").await.unwrap_err();
        assert_matches!(err, Error::Unavailable(ref reason) if reason == "sequence exhausted");

        assert_eq!(
            h.cache.stats().await.unwrap(),
            CacheStats {
                keys: 1,
                blobs: 1,
                key_sets: 1,
            }
        );
        assert_eq!(h.cache.get("a").await.unwrap(), Bytes::from("first"));
        assert!(h.cache.get("b").await.unwrap_err().is_miss());
        assert_eq!(h.metrics.counter_value(PUT_FAILURE_COUNT), 1);

        let failures = h.events.events_of_type("WriteFailed");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].entry_id(), None);
    }

    #[tokio::test]
    async fn test_multi_key_aliasing() {
        let h = started().await;
        let id = h.cache.put(["k1", "k2"], "shared").await.unwrap();

        assert_eq!(h.cache.resolve("k1").await.unwrap(), id);
        assert_eq!(h.cache.resolve("k2").await.unwrap(), id);
        assert_eq!(h.cache.get("k2").await.unwrap(), Bytes::from("shared"));
        assert_eq!(h.cache.count_blobs().await.unwrap(), 1);
        assert_eq!(h.cache.count_keys().await.unwrap(), 2);

        let aliases = h.cache.aliases("k2").await.unwrap();
        assert_eq!(aliases, KeySet::new(["k1", "k2"]).unwrap());
    }

    #[tokio::test]
    async fn test_each_put_allocates_fresh_id() {
        let h = started().await;
        let first = h.cache.put(["k"], "same").await.unwrap();
        let second = h.cache.put(["k"], "same").await.unwrap();

        assert!(second > first);
        assert_eq!(h.cache.count_blobs().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_key_set_is_rejected() {
        let h = started().await;
        let result = h.cache.put(Vec::<String>::new(), "x").await;
        assert_matches!(result, Err(Error::InvalidKeySet(_)));
        assert_eq!(h.metrics.counter_value(PUT_CALL_COUNT), 0);
    }

    #[tokio::test]
    async fn test_default_ttl_applies() {
        let h = harness();
        let config = EngineConfig {
            default_ttl_secs: Some(3600),
            ..Default::default()
        };
        h.cache.init(&config).await.unwrap();
        h.cache.start().await.unwrap();
        h.cache.put(["k"], "x").await.unwrap();

        let written = h.events.events_of_type("EntryWritten");
        assert_matches!(
            written.as_slice(),
            [CacheEvent::EntryWritten { ttl_ms: Some(3_600_000), .. }]
        );
    }

    #[tokio::test]
    async fn test_explicit_ttl_overrides_default() {
        let h = harness();
        let config = EngineConfig {
            default_ttl_secs: Some(3600),
            ..Default::default()
        };
        h.cache.init(&config).await.unwrap();
        h.cache.start().await.unwrap();
        h.cache
            .put_with_ttl(["k"], "x", TtlUnit::Minutes, 2)
            .await
            .unwrap();

        let written = h.events.events_of_type("EntryWritten");
        assert_matches!(
            written.as_slice(),
            [CacheEvent::EntryWritten { ttl_ms: Some(120_000), .. }]
        );
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let h = started().await;
        h.cache.put(["k"], "x").await.unwrap();
        h.cache.get("k").await.unwrap();
        let _ = h.cache.get("missing").await;

        assert_eq!(h.metrics.counter_value(PUT_CALL_COUNT), 1);
        assert_eq!(h.metrics.timing_count(PUT_CALL_TIME), 1);
        assert_eq!(h.metrics.counter_value(GET_CALL_COUNT), 2);
        assert_eq!(h.metrics.counter_value(GET_MISS_COUNT), 1);
        assert_eq!(h.metrics.timing_count(GET_CALL_TIME), 1);
    }

    #[tokio::test]
    async fn test_operations_require_started() {
        let h = harness();
        assert_matches!(
            h.cache.get("k").await,
            Err(Error::NotStarted { operation: "get", .. })
        );

        h.cache.init(&EngineConfig::default()).await.unwrap();
        assert_matches!(
            h.cache.put(["k"], "x").await,
            Err(Error::NotStarted { operation: "put", ref state }) if state == "Initialized"
        );

        h.cache.start().await.unwrap();
        h.cache.stop().await.unwrap();
        assert_matches!(
            h.cache.count_keys().await,
            Err(Error::NotStarted { ref state, .. }) if state == "Stopped"
        );
    }

    #[tokio::test]
    async fn test_lifecycle_misuse() {
        let h = harness();
        assert_matches!(h.cache.start().await, Err(Error::InvalidTransition { .. }));
        assert_matches!(h.cache.stop().await, Err(Error::InvalidTransition { .. }));

        h.cache.init(&EngineConfig::default()).await.unwrap();
        assert_matches!(
            h.cache.init(&EngineConfig::default()).await,
            Err(Error::InvalidTransition { .. })
        );

        h.cache.start().await.unwrap();
        h.cache.stop().await.unwrap();
        assert_matches!(
            h.cache.init(&EngineConfig::default()).await,
            Err(Error::InvalidTransition { .. })
        );
        assert_eq!(h.cache.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_invalid_config_leaves_engine_uninitialized() {
        let h = harness();
        let config = EngineConfig {
            forward_key_store: String::new(),
            ..Default::default()
        };
        assert_matches!(h.cache.init(&config).await, Err(Error::Config(_)));
        assert_eq!(h.cache.state(), EngineState::Uninitialized);
    }

    #[tokio::test]
    async fn test_health_check() {
        let h = harness();
        let health = h.cache.health_check();
        assert!(!health.is_healthy());
        assert_eq!(health.message.as_deref(), Some("stores are not initialized"));

        h.cache.init(&EngineConfig::default()).await.unwrap();
        assert!(h.cache.health_check().is_healthy());

        h.cache.start().await.unwrap();
        assert!(h.cache.health_check().is_healthy());
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let h = started().await;
        h.cache.stop().await.unwrap();

        let types: Vec<&str> = h.events.events().iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec!["EngineInitialized", "EngineStarted", "EngineStopped"]
        );
    }

    #[tokio::test]
    async fn test_stats() {
        let h = started().await;
        h.cache.put(["a", "b", "c"], "x").await.unwrap();
        h.cache.put(["d"], "y").await.unwrap();

        assert_eq!(
            h.cache.stats().await.unwrap(),
            CacheStats {
                keys: 4,
                blobs: 2,
                key_sets: 2,
            }
        );
    }
}
