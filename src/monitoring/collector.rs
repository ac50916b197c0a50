//! Metrics Collector
//!
//! Lock-free, process-local implementation of the `MetricsSink` port. Used
//! where no Prometheus registry is wanted, and by tests to assert on the
//! counters the engine emits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::domain::ports::MetricsSink;

/// Counter metric
#[derive(Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by n
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Get current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Latency histogram (seconds)
pub struct Histogram {
    /// Bucket upper bounds
    boundaries: Vec<f64>,
    /// Cumulative bucket counts
    buckets: Vec<AtomicU64>,
    /// Sum of observations in microseconds
    sum_us: AtomicU64,
    /// Count of observations
    count: AtomicU64,
}

impl Histogram {
    /// Create a histogram with latency buckets from 100µs to 1s
    pub fn latency() -> Self {
        let boundaries = vec![
            0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
        ];
        let buckets = boundaries.iter().map(|_| AtomicU64::new(0)).collect();

        Self {
            boundaries,
            buckets,
            sum_us: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Observe duration
    pub fn observe_duration(&self, duration: Duration) {
        let seconds = duration.as_secs_f64();
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        for (i, &boundary) in self.boundaries.iter().enumerate() {
            if seconds <= boundary {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Get count
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Get sum in seconds
    pub fn sum(&self) -> f64 {
        self.sum_us.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    /// Get average in seconds
    pub fn average(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        self.sum() / count as f64
    }

    /// Count of observations at or below `le` seconds, if `le` is a bucket bound
    pub fn bucket_count(&self, le: f64) -> Option<u64> {
        self.boundaries
            .iter()
            .position(|&b| b == le)
            .map(|i| self.buckets[i].load(Ordering::Relaxed))
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::latency()
    }
}

/// Metrics collector
#[derive(Default)]
pub struct MetricsCollector {
    counters: DashMap<String, Arc<Counter>>,
    histograms: DashMap<String, Arc<Histogram>>,
}

impl MetricsCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a counter
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        if let Some(counter) = self.counters.get(name) {
            return counter.clone();
        }
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Counter::new()))
            .clone()
    }

    /// Get or create a histogram
    pub fn histogram(&self, name: &str) -> Arc<Histogram> {
        if let Some(histogram) = self.histograms.get(name) {
            return histogram.clone();
        }
        self.histograms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Histogram::latency()))
            .clone()
    }

    /// Current value of a counter, zero if never incremented
    pub fn counter_value(&self, name: &str) -> u64 {
        self.counters.get(name).map_or(0, |c| c.get())
    }

    /// Number of timing samples recorded under a name
    pub fn timing_count(&self, name: &str) -> u64 {
        self.histograms.get(name).map_or(0, |h| h.count())
    }

    /// Get all counter values
    pub fn get_counters(&self) -> HashMap<String, u64> {
        self.counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().get()))
            .collect()
    }
}

impl MetricsSink for MetricsCollector {
    fn count(&self, name: &str, delta: u64) {
        self.counter(name).add(delta);
    }

    fn record_time(&self, name: &str, elapsed: Duration) {
        self.histogram(name).observe_duration(elapsed);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);

        counter.add(10);
        assert_eq!(counter.get(), 10);
    }

    #[test]
    fn test_histogram_duration() {
        let histogram = Histogram::latency();

        histogram.observe_duration(Duration::from_millis(5));
        histogram.observe_duration(Duration::from_millis(10));

        assert_eq!(histogram.count(), 2);
        assert!((histogram.average() - 0.0075).abs() < 1e-9);
        assert_eq!(histogram.bucket_count(0.005), Some(1));
        assert_eq!(histogram.bucket_count(0.01), Some(2));
        assert_eq!(histogram.bucket_count(0.3), None);
    }

    #[test]
    fn test_collector_as_sink() {
        let collector = MetricsCollector::new();
        let sink: &dyn MetricsSink = &collector;

        sink.count("cache_get_call_count", 1);
        sink.count("cache_get_call_count", 1);
        sink.record_time("cache_get_call_time", Duration::from_micros(50));

        assert_eq!(collector.counter_value("cache_get_call_count"), 2);
        assert_eq!(collector.counter_value("never_touched"), 0);
        assert_eq!(collector.timing_count("cache_get_call_time"), 1);
        assert_eq!(collector.get_counters().len(), 1);
    }

    #[test]
    fn test_concurrent_counting() {
        let collector = Arc::new(MetricsCollector::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let collector = collector.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        collector.count("cache_put_call_count", 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(collector.counter_value("cache_put_call_count"), 8000);
    }

    #[test]
    fn test_same_counter_returned() {
        let collector = MetricsCollector::new();

        let c1 = collector.counter("test");
        let c2 = collector.counter("test");

        c1.add(1);
        assert_eq!(c2.get(), 1);
    }
}
