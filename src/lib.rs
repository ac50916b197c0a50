//! buckcache - Distributed Build-Artifact Cache
//!
//! Stores build artifacts under one or more logical keys on top of a
//! replicated key-value store. Every write allocates a fresh entry
//! identifier from a cluster-wide sequence; the payload is stored once under
//! that identifier and each logical key points at it.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────────────┐
//!  put / get ───────▶│   IndirectionCache   │
//!                    └──────────┬───────────┘
//!        ┌───────────────┬──────┴───────┬──────────────────┐
//!        ▼               ▼              ▼                  ▼
//!   Sequence        Blob Store    Reverse Key Store   Forward Key Store
//!   (next id)       id → bytes    id → key set        key → id
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - In-memory cluster, Prometheus sink, event publishers
//! - [`config`] - YAML configuration
//! - [`domain`] - Value objects, events and ports
//! - [`engine`] - The indirection cache engine and its lifecycle
//! - [`error`] - Error types
//! - [`monitoring`] - Health results and in-process metrics

pub mod adapters;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod monitoring;

// Re-export commonly used types
pub use adapters::InMemoryCluster;
pub use config::{EngineConfig, ServiceConfig};
pub use domain::{EntryId, KeySet, LogicalKey, TtlUnit};
pub use engine::{CacheStats, EngineState, IndirectionCache};
pub use error::{Error, Result};
pub use monitoring::{HealthCheckResult, HealthStatus};
