//! Domain Ports (DDD Port/Adapter Pattern)
//!
//! This module defines the value objects of the cache and the abstractions
//! (ports) the engine depends on. Infrastructure adapters implement these
//! traits to provide concrete storage, sequencing, metrics and event sinks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Indirection Cache Engine                     │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  StorageCluster │ KeyValueStore │ SequenceGenerator │    │
//! │  │  MetricsSink    │ EventPublisher                    │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  InMemoryCluster │ PrometheusMetricsSink │ Logging  │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::events::CacheEvent;
use crate::error::{Error, Result};

// =============================================================================
// Value Objects
// =============================================================================

/// Internally generated handle binding a payload to the keys that reference it.
///
/// Unique for the lifetime of the cluster and never reused, even after the
/// entry has expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(pub u64);

impl EntryId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied name of a cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalKey(pub String);

impl LogicalKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for LogicalKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LogicalKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&String> for LogicalKey {
    fn from(s: &String) -> Self {
        Self(s.clone())
    }
}

/// The keys submitted together in one write.
///
/// Non-empty, ordered by first appearance, without duplicates. Stored
/// verbatim in the reverse key store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet(Vec<LogicalKey>);

impl KeySet {
    /// Build a key set, collapsing duplicates onto their first occurrence.
    pub fn new<I, K>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = K>,
        K: Into<LogicalKey>,
    {
        let mut seen = HashSet::new();
        let keys: Vec<LogicalKey> = keys
            .into_iter()
            .map(Into::into)
            .filter(|k: &LogicalKey| seen.insert(k.clone()))
            .collect();

        if keys.is_empty() {
            return Err(Error::InvalidKeySet(
                "a write needs at least one logical key".to_string(),
            ));
        }
        Ok(Self(keys))
    }

    /// Single-key convenience constructor.
    pub fn single(key: impl Into<LogicalKey>) -> Self {
        Self(vec![key.into()])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the set has no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, key: &LogicalKey) -> bool {
        self.0.contains(key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LogicalKey> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[LogicalKey] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a KeySet {
    type Item = &'a LogicalKey;
    type IntoIter = std::slice::Iter<'a, LogicalKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Time unit for caller-supplied time-to-live values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TtlUnit {
    /// Convert `value` units into a duration, saturating on overflow.
    pub fn duration(self, value: u64) -> Duration {
        match self {
            TtlUnit::Milliseconds => Duration::from_millis(value),
            TtlUnit::Seconds => Duration::from_secs(value),
            TtlUnit::Minutes => Duration::from_secs(value.saturating_mul(60)),
            TtlUnit::Hours => Duration::from_secs(value.saturating_mul(3_600)),
            TtlUnit::Days => Duration::from_secs(value.saturating_mul(86_400)),
        }
    }
}

impl std::fmt::Display for TtlUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TtlUnit::Milliseconds => write!(f, "milliseconds"),
            TtlUnit::Seconds => write!(f, "seconds"),
            TtlUnit::Minutes => write!(f, "minutes"),
            TtlUnit::Hours => write!(f, "hours"),
            TtlUnit::Days => write!(f, "days"),
        }
    }
}

// =============================================================================
// Storage Ports
// =============================================================================

/// Port for a distributed key-value store.
///
/// Each call is atomic for a single key; there are no multi-key transactions.
/// A `ttl` is a fixed time-to-live measured from the write, never refreshed by
/// reads.
#[async_trait]
pub trait KeyValueStore<K, V>: Send + Sync
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Read the current value for a key, `None` if absent or expired.
    async fn get(&self, key: &K) -> Result<Option<V>>;

    /// Write a value, replacing any previous one.
    async fn put(&self, key: K, value: V, ttl: Option<Duration>) -> Result<()>;

    /// Entry count as tracked by the store; approximate under concurrent writes.
    async fn approximate_size(&self) -> Result<u64>;
}

/// Port for the cluster-wide monotonic counter.
#[async_trait]
pub trait SequenceGenerator: Send + Sync {
    /// Increment and return the new value.
    ///
    /// Fails with [`Error::Unavailable`] if the counter cannot be reached.
    async fn next(&self) -> Result<EntryId>;
}

/// Store holding payloads by identifier.
pub type DynBlobStore = Arc<dyn KeyValueStore<EntryId, Bytes>>;
/// Store holding key sets by identifier.
pub type DynReverseKeyStore = Arc<dyn KeyValueStore<EntryId, KeySet>>;
/// Store holding identifiers by logical key.
pub type DynForwardKeyStore = Arc<dyn KeyValueStore<LogicalKey, EntryId>>;

/// Port for the cluster client that hands out named stores and sequences.
///
/// Opening the same name twice yields handles onto the same data, so engines
/// on different nodes see each other's writes.
#[async_trait]
pub trait StorageCluster: Send + Sync {
    async fn blob_store(&self, name: &str) -> Result<DynBlobStore>;

    async fn reverse_key_store(&self, name: &str) -> Result<DynReverseKeyStore>;

    async fn forward_key_store(&self, name: &str) -> Result<DynForwardKeyStore>;

    /// Open (or create starting at `initial`) a named sequence.
    async fn sequence(&self, name: &str, initial: u64) -> Result<Arc<dyn SequenceGenerator>>;
}

// =============================================================================
// Metrics Port
// =============================================================================

/// Port for counters and timing samples.
pub trait MetricsSink: Send + Sync {
    /// Add `delta` to a named counter.
    fn count(&self, name: &str, delta: u64);

    /// Record one timing sample.
    fn record_time(&self, name: &str, elapsed: Duration);
}

// =============================================================================
// Event Publisher Port
// =============================================================================

/// Port for publishing lifecycle and error events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a cache event.
    async fn publish(&self, event: CacheEvent) -> Result<()>;
}

// =============================================================================
// Tests
// =============================================================================
