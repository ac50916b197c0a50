//! Event Publisher Adapter
//!
//! `LoggingEventPublisher` turns cache events into structured `tracing`
//! records; `InMemoryEventCollector` keeps them for assertions.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn, Level};

use crate::domain::events::CacheEvent;
use crate::domain::ports::EventPublisher;
use crate::error::Result;

macro_rules! at_level {
    ($level:expr, $($arg:tt)+) => {
        if $level == Level::DEBUG {
            debug!($($arg)+)
        } else {
            info!($($arg)+)
        }
    };
}

/// Logs each cache event with its fields.
///
/// Write failures are always logged at warn.
#[derive(Debug, Clone)]
pub struct LoggingEventPublisher {
    level: Level,
}

impl Default for LoggingEventPublisher {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingEventPublisher {
    /// Log at debug level.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log at info level; used by the service binary.
    pub fn info_level() -> Self {
        Self { level: Level::INFO }
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: CacheEvent) -> Result<()> {
        match &event {
            CacheEvent::EngineInitialized {
                instance_id,
                blob_store,
                forward_key_store,
                reverse_key_store,
                ..
            } => at_level!(
                self.level,
                instance_id = %instance_id,
                blob_store = %blob_store,
                forward_key_store = %forward_key_store,
                reverse_key_store = %reverse_key_store,
                "Cache engine bound its stores"
            ),
            CacheEvent::EngineStarted { instance_id, .. } => {
                at_level!(self.level, instance_id = %instance_id, "Cache engine started")
            }
            CacheEvent::EngineStopped { instance_id, .. } => {
                at_level!(self.level, instance_id = %instance_id, "Cache engine stopped")
            }
            CacheEvent::EntryWritten {
                entry_id,
                key_count,
                size_bytes,
                ttl_ms,
                ..
            } => at_level!(
                self.level,
                entry_id,
                key_count,
                size_bytes,
                ttl_ms = ?ttl_ms,
                "Cache entry written"
            ),
            CacheEvent::WriteFailed {
                entry_id,
                stage,
                reason,
                ..
            } => warn!(
                entry_id = ?entry_id,
                stage = %stage,
                reason = %reason,
                "Cache write failed"
            ),
        }
        Ok(())
    }
}

/// Keeps published events in memory, in publish order.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    events: RwLock<Vec<CacheEvent>>,
}

impl InMemoryEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far.
    pub fn events(&self) -> Vec<CacheEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Events whose [`CacheEvent::event_type`] is `event_type`.
    pub fn events_of_type(&self, event_type: &str) -> Vec<CacheEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, event: CacheEvent) -> Result<()> {
        self.events.write().push(event);
        Ok(())
    }
}
