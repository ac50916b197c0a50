//! Cache Events
//!
//! Immutable records of lifecycle transitions and write outcomes in the
//! cache engine.
//!
//! # Usage
//!
//! Cache events are used for:
//! - Audit logging of lifecycle transitions
//! - Surfacing partial-write failures (orphaned blobs)
//! - Test assertions on engine behaviour
//!
//! # Example
//!
//! ```ignore
//! let event = CacheEvent::entry_written(EntryId::new(42), 2, 1024, None);
//! event_publisher.publish(event).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ports::EntryId;

/// Write stage at which a put failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteStage {
    /// Allocating the entry identifier
    Sequence,
    /// Writing the payload
    Blob,
    /// Writing the key set against the identifier
    ReverseKeys,
    /// Pointing logical keys at the identifier
    ForwardKeys,
}

impl std::fmt::Display for WriteStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteStage::Sequence => write!(f, "sequence"),
            WriteStage::Blob => write!(f, "blob"),
            WriteStage::ReverseKeys => write!(f, "reverse-keys"),
            WriteStage::ForwardKeys => write!(f, "forward-keys"),
        }
    }
}

/// Event representing a significant occurrence in the cache engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CacheEvent {
    // =========================================================================
    // Lifecycle Events
    // =========================================================================
    /// Stores and sequence were bound.
    EngineInitialized {
        instance_id: String,
        blob_store: String,
        forward_key_store: String,
        reverse_key_store: String,
        timestamp: DateTime<Utc>,
    },

    /// The engine began serving reads and writes.
    EngineStarted {
        instance_id: String,
        timestamp: DateTime<Utc>,
    },

    /// The engine stopped serving.
    EngineStopped {
        instance_id: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Write Events
    // =========================================================================
    /// All three records of a put became visible.
    EntryWritten {
        entry_id: u64,
        key_count: usize,
        size_bytes: u64,
        ttl_ms: Option<u64>,
        timestamp: DateTime<Utc>,
    },

    /// A put failed part way; earlier records are left to expire.
    WriteFailed {
        entry_id: Option<u64>,
        stage: WriteStage,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl CacheEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CacheEvent::EngineInitialized { timestamp, .. } => *timestamp,
            CacheEvent::EngineStarted { timestamp, .. } => *timestamp,
            CacheEvent::EngineStopped { timestamp, .. } => *timestamp,
            CacheEvent::EntryWritten { timestamp, .. } => *timestamp,
            CacheEvent::WriteFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string.
    pub fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::EngineInitialized { .. } => "EngineInitialized",
            CacheEvent::EngineStarted { .. } => "EngineStarted",
            CacheEvent::EngineStopped { .. } => "EngineStopped",
            CacheEvent::EntryWritten { .. } => "EntryWritten",
            CacheEvent::WriteFailed { .. } => "WriteFailed",
        }
    }

    /// Get the entry identifier if applicable.
    pub fn entry_id(&self) -> Option<EntryId> {
        match self {
            CacheEvent::EntryWritten { entry_id, .. } => Some(EntryId(*entry_id)),
            CacheEvent::WriteFailed { entry_id, .. } => entry_id.map(EntryId),
            _ => None,
        }
    }

    /// True for events that report a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, CacheEvent::WriteFailed { .. })
    }
}

// =============================================================================
// Event Builders
// =============================================================================

impl CacheEvent {
    /// Create an EngineInitialized event.
    pub fn engine_initialized(
        instance_id: impl Into<String>,
        blob_store: impl Into<String>,
        forward_key_store: impl Into<String>,
        reverse_key_store: impl Into<String>,
    ) -> Self {
        CacheEvent::EngineInitialized {
            instance_id: instance_id.into(),
            blob_store: blob_store.into(),
            forward_key_store: forward_key_store.into(),
            reverse_key_store: reverse_key_store.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an EngineStarted event.
    pub fn engine_started(instance_id: impl Into<String>) -> Self {
        CacheEvent::EngineStarted {
            instance_id: instance_id.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an EngineStopped event.
    pub fn engine_stopped(instance_id: impl Into<String>) -> Self {
        CacheEvent::EngineStopped {
            instance_id: instance_id.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an EntryWritten event.
    pub fn entry_written(
        entry_id: EntryId,
        key_count: usize,
        size_bytes: u64,
        ttl: Option<Duration>,
    ) -> Self {
        CacheEvent::EntryWritten {
            entry_id: entry_id.value(),
            key_count,
            size_bytes,
            ttl_ms: ttl.map(|d| d.as_millis() as u64),
            timestamp: Utc::now(),
        }
    }

    /// Create a WriteFailed event.
    pub fn write_failed(
        entry_id: Option<EntryId>,
        stage: WriteStage,
        reason: impl Into<String>,
    ) -> Self {
        CacheEvent::WriteFailed {
            entry_id: entry_id.map(|id| id.value()),
            stage,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
