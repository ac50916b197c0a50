//! Prometheus Metrics Adapter
//!
//! Implements the `MetricsSink` port on a `prometheus::Registry`.
//!
//! Counters and timing histograms are registered lazily the first time a
//! name is used. Names must be valid Prometheus metric names.

use std::time::Duration;

use dashmap::DashMap;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use tracing::warn;

use crate::domain::ports::MetricsSink;
use crate::error::{Error, Result};

/// Latency buckets in seconds, from 100µs to 2.5s.
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Metrics sink backed by a Prometheus registry.
pub struct PrometheusMetricsSink {
    registry: Registry,
    counters: DashMap<String, IntCounter>,
    timers: DashMap<String, Histogram>,
}

impl PrometheusMetricsSink {
    /// Create a sink with its own registry.
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    /// Create a sink registering into an existing registry.
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            counters: DashMap::new(),
            timers: DashMap::new(),
        }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| Error::Internal(format!("Metrics output is not UTF-8: {}", e)))
    }

    fn counter(&self, name: &str) -> Option<IntCounter> {
        if let Some(counter) = self.counters.get(name) {
            return Some(counter.clone());
        }

        let counter = match IntCounter::new(name, format!("{} (call count)", name)) {
            Ok(counter) => counter,
            Err(e) => {
                warn!(metric = %name, error = %e, "Invalid counter name");
                return None;
            }
        };
        let counter = self
            .counters
            .entry(name.to_string())
            .or_insert_with(|| {
                if let Err(e) = self.registry.register(Box::new(counter.clone())) {
                    warn!(metric = %name, error = %e, "Failed to register counter");
                }
                counter
            })
            .clone();
        Some(counter)
    }

    fn timer(&self, name: &str) -> Option<Histogram> {
        if let Some(timer) = self.timers.get(name) {
            return Some(timer.clone());
        }

        let opts = HistogramOpts::new(name, format!("{} (seconds)", name))
            .buckets(LATENCY_BUCKETS.to_vec());
        let timer = match Histogram::with_opts(opts) {
            Ok(timer) => timer,
            Err(e) => {
                warn!(metric = %name, error = %e, "Invalid histogram name");
                return None;
            }
        };
        let timer = self
            .timers
            .entry(name.to_string())
            .or_insert_with(|| {
                if let Err(e) = self.registry.register(Box::new(timer.clone())) {
                    warn!(metric = %name, error = %e, "Failed to register histogram");
                }
                timer
            })
            .clone();
        Some(timer)
    }
}

impl Default for PrometheusMetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for PrometheusMetricsSink {
    fn count(&self, name: &str, delta: u64) {
        if let Some(counter) = self.counter(name) {
            counter.inc_by(delta);
        }
    }

    fn record_time(&self, name: &str, elapsed: Duration) {
        if let Some(timer) = self.timer(name) {
            timer.observe(elapsed.as_secs_f64());
        }
    }
}
