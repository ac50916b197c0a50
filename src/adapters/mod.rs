//! Infrastructure Adapters
//!
//! This module contains adapter implementations for the domain ports,
//! following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │  StorageCluster │ KeyValueStore │ MetricsSink │ Events     │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ InMemoryCluster │ PrometheusMetricsSink                    │ │
//! │  │ LoggingEventPublisher │ InMemoryEventCollector             │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use buckcache::adapters::{InMemoryCluster, PrometheusMetricsSink};
//!
//! let cluster = Arc::new(InMemoryCluster::new());
//! let metrics = Arc::new(PrometheusMetricsSink::new());
//! let cache = IndirectionCache::new(cluster, metrics, events);
//! ```

mod event_publisher;
mod memory;
mod prometheus;

pub use event_publisher::{InMemoryEventCollector, LoggingEventPublisher};
pub use memory::{InMemoryCluster, InMemorySequence, InMemoryStore, InMemoryStoreStats};
pub use self::prometheus::PrometheusMetricsSink;
