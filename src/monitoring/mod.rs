//! Observability
//!
//! Health results and in-process metrics collection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Observability                          │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌────────────────────┐   ┌────────────────────────────┐  │
//! │  │ Metrics Collector  │   │ Health Checks              │  │
//! │  │ (Lock-free sink)   │   │ (Engine liveness)          │  │
//! │  └────────────────────┘   └────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod collector;
mod health;

pub use collector::{Counter, Histogram, MetricsCollector};
pub use health::{HealthCheckResult, HealthResponse, HealthStatus};
