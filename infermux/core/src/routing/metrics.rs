//! Router Metrics
//!
//! Counters and latency histograms for routing calls:
//! - Outcome counts (success, provider failure, timeout, cancellation)
//! - Routing-phase rejections (invalid request, unknown model)
//! - Provider latency distribution, globally and per resolved model
//!
//! Everything is atomics plus a `DashMap`, so recording never waits on a lock
//! held across an await.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

// ============================================================================
// Histogram for Latency Tracking
// ============================================================================

/// A histogram for tracking latency distributions
#[derive(Debug)]
pub struct Histogram {
    /// Bucket upper bounds, in milliseconds
    buckets: Vec<f64>,
    /// Count per bucket
    counts: Vec<AtomicU64>,
    /// Total count
    total_count: AtomicU64,
    /// Sum of all values, in microseconds
    sum_us: AtomicU64,
    /// Maximum value seen, in microseconds
    max_us: AtomicU64,
}

impl Histogram {
    /// Create a histogram with the given bucket bounds (milliseconds, ascending)
    #[must_use]
    pub fn new(buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            total_count: AtomicU64::new(0),
            sum_us: AtomicU64::new(0),
            max_us: AtomicU64::new(0),
        }
    }

    /// Default latency buckets, 1 ms to 2 min
    #[must_use]
    pub fn latency_default() -> Self {
        Self::new(vec![
            1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
            30000.0, 60000.0, 120_000.0,
        ])
    }

    /// Record one observation
    pub fn record(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        #[allow(clippy::cast_precision_loss)]
        let millis = micros as f64 / 1000.0;

        // Values past the last bound land in the last bucket
        let bucket_idx = self
            .buckets
            .iter()
            .position(|&b| millis <= b)
            .unwrap_or_else(|| self.buckets.len().saturating_sub(1));
        if let Some(count) = self.counts.get(bucket_idx) {
            count.fetch_add(1, Ordering::Relaxed);
        }

        self.total_count.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(micros, Ordering::Relaxed);
        self.max_us.fetch_max(micros, Ordering::Relaxed);
    }

    /// Get histogram snapshot
    #[must_use]
    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            buckets: self.buckets.clone(),
            counts: self
                .counts
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
            total: self.total_count.load(Ordering::Relaxed),
            sum_us: self.sum_us.load(Ordering::Relaxed),
            max_us: self.max_us.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of histogram data
#[derive(Clone, Debug)]
pub struct HistogramSnapshot {
    /// Bucket upper bounds (ms)
    pub buckets: Vec<f64>,
    /// Count per bucket
    pub counts: Vec<u64>,
    /// Observations
    pub total: u64,
    /// Sum of observations (µs)
    pub sum_us: u64,
    /// Largest observation (µs)
    pub max_us: u64,
}

#[allow(clippy::cast_precision_loss)]
impl HistogramSnapshot {
    /// Upper bound (ms) of the bucket holding percentile `p` (0.0..=1.0)
    #[must_use]
    pub fn percentile(&self, p: f64) -> f64 {
        if self.total == 0 {
            return 0.0;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let target = ((self.total as f64 * p).ceil() as u64).max(1);
        let mut cumulative = 0u64;

        for (i, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return self.buckets[i];
            }
        }

        self.buckets.last().copied().unwrap_or(0.0)
    }

    /// Mean latency (ms)
    #[must_use]
    pub fn mean_ms(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.sum_us as f64 / self.total as f64 / 1000.0
    }

    /// Get p50
    #[must_use]
    pub fn p50(&self) -> f64 {
        self.percentile(0.5)
    }

    /// Get p90
    #[must_use]
    pub fn p90(&self) -> f64 {
        self.percentile(0.9)
    }

    /// Get p99
    #[must_use]
    pub fn p99(&self) -> f64 {
        self.percentile(0.99)
    }
}

// ============================================================================
// Counter
// ============================================================================

/// A simple atomic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a counter at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by one
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Current value
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Per-Model Metrics
// ============================================================================

/// How a dispatched call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchFailure {
    /// The provider reported an error
    Provider,
    /// The deadline passed
    Timeout,
    /// The caller cancelled
    Canceled,
}

/// Metrics for a single resolved model
#[derive(Debug)]
pub struct ModelMetrics {
    /// Dispatched calls
    pub requests: Counter,
    /// Successful calls
    pub successes: Counter,
    /// Failed calls (any dispatch failure)
    pub failures: Counter,
    /// Provider latency
    pub latency: Histogram,
}

impl ModelMetrics {
    fn new() -> Self {
        Self {
            requests: Counter::new(),
            successes: Counter::new(),
            failures: Counter::new(),
            latency: Histogram::latency_default(),
        }
    }

    /// Summarize this model's metrics
    #[must_use]
    pub fn summary(&self, model: &str) -> ModelMetricsSummary {
        let latency = self.latency.snapshot();
        ModelMetricsSummary {
            model: model.to_string(),
            requests: self.requests.get(),
            successes: self.successes.get(),
            failures: self.failures.get(),
            latency_mean_ms: latency.mean_ms(),
            latency_p50_ms: latency.p50(),
            latency_p99_ms: latency.p99(),
        }
    }
}

/// Summary of model metrics
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelMetricsSummary {
    /// Resolved model identifier
    pub model: String,
    /// Dispatched calls
    pub requests: u64,
    /// Successful calls
    pub successes: u64,
    /// Failed calls
    pub failures: u64,
    /// Mean provider latency (ms)
    pub latency_mean_ms: f64,
    /// Median provider latency (bucket bound, ms)
    pub latency_p50_ms: f64,
    /// p99 provider latency (bucket bound, ms)
    pub latency_p99_ms: f64,
}

// ============================================================================
// Router Metrics
// ============================================================================

/// Centralized metrics for the router
#[derive(Debug)]
pub struct RouterMetrics {
    /// Per-model metrics, keyed by resolved model
    models: DashMap<String, Arc<ModelMetrics>>,

    /// Calls received
    pub total_requests: Counter,
    /// Calls that succeeded
    pub successes: Counter,
    /// Calls where the provider failed
    pub provider_failures: Counter,
    /// Calls that hit their deadline
    pub timeouts: Counter,
    /// Calls cancelled upstream
    pub cancellations: Counter,
    /// Calls rejected before dispatch
    pub routing_failures: Counter,

    /// Provider latency across all models
    pub latency: Histogram,

    /// When metrics collection started
    started_at: Instant,
}

impl Default for RouterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterMetrics {
    /// Create new metrics collector
    #[must_use]
    pub fn new() -> Self {
        Self {
            models: DashMap::new(),
            total_requests: Counter::new(),
            successes: Counter::new(),
            provider_failures: Counter::new(),
            timeouts: Counter::new(),
            cancellations: Counter::new(),
            routing_failures: Counter::new(),
            latency: Histogram::latency_default(),
            started_at: Instant::now(),
        }
    }

    /// Get or create metrics for a model
    pub fn model_metrics(&self, model: &str) -> Arc<ModelMetrics> {
        if let Some(metrics) = self.models.get(model) {
            return Arc::clone(metrics.value());
        }
        Arc::clone(
            self.models
                .entry(model.to_string())
                .or_insert_with(|| Arc::new(ModelMetrics::new()))
                .value(),
        )
    }

    /// Record a call arriving
    pub fn record_request(&self) {
        self.total_requests.inc();
    }

    /// Record a call rejected before any provider was contacted
    pub fn record_routing_failure(&self) {
        self.routing_failures.inc();
    }

    /// Record a successful dispatch
    pub fn record_success(&self, model: &str, latency: Duration) {
        self.successes.inc();
        self.latency.record(latency);

        let metrics = self.model_metrics(model);
        metrics.requests.inc();
        metrics.successes.inc();
        metrics.latency.record(latency);
    }

    /// Record a failed dispatch
    pub fn record_failure(&self, model: &str, failure: DispatchFailure, latency: Duration) {
        match failure {
            DispatchFailure::Provider => self.provider_failures.inc(),
            DispatchFailure::Timeout => self.timeouts.inc(),
            DispatchFailure::Canceled => self.cancellations.inc(),
        }
        self.latency.record(latency);

        let metrics = self.model_metrics(model);
        metrics.requests.inc();
        metrics.failures.inc();
        metrics.latency.record(latency);
    }

    /// Get uptime
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Serializable view of every metric, models sorted by name
    #[must_use]
    pub fn snapshot(&self) -> RouterMetricsSnapshot {
        let latency = self.latency.snapshot();
        let mut models: Vec<ModelMetricsSummary> = self
            .models
            .iter()
            .map(|entry| entry.value().summary(entry.key()))
            .collect();
        models.sort_by(|a, b| a.model.cmp(&b.model));

        RouterMetricsSnapshot {
            uptime_seconds: self.uptime().as_secs(),
            total_requests: self.total_requests.get(),
            successes: self.successes.get(),
            provider_failures: self.provider_failures.get(),
            timeouts: self.timeouts.get(),
            cancellations: self.cancellations.get(),
            routing_failures: self.routing_failures.get(),
            latency_p50_ms: latency.p50(),
            latency_p90_ms: latency.p90(),
            latency_p99_ms: latency.p99(),
            models,
        }
    }
}

/// Point-in-time view of router metrics
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouterMetricsSnapshot {
    /// Seconds since the router was created
    pub uptime_seconds: u64,
    /// Calls received
    pub total_requests: u64,
    /// Successful calls
    pub successes: u64,
    /// Provider failures
    pub provider_failures: u64,
    /// Timeouts
    pub timeouts: u64,
    /// Cancellations
    pub cancellations: u64,
    /// Routing-phase rejections
    pub routing_failures: u64,
    /// Median provider latency (bucket bound, ms)
    pub latency_p50_ms: f64,
    /// p90 provider latency (bucket bound, ms)
    pub latency_p90_ms: f64,
    /// p99 provider latency (bucket bound, ms)
    pub latency_p99_ms: f64,
    /// Per-model breakdown
    pub models: Vec<ModelMetricsSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_percentiles() {
        let histogram = Histogram::latency_default();
        for _ in 0..90 {
            histogram.record(Duration::from_millis(3));
        }
        for _ in 0..10 {
            histogram.record(Duration::from_millis(400));
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.total, 100);
        assert_eq!(snapshot.max_us, 400_000);
        assert!((snapshot.p50() - 5.0).abs() < f64::EPSILON);
        assert!((snapshot.p90() - 5.0).abs() < f64::EPSILON);
        assert!((snapshot.p99() - 500.0).abs() < f64::EPSILON);
        assert!((snapshot.mean_ms() - 42.7).abs() < 1e-9);
    }

    #[test]
    fn test_histogram_overflow_goes_to_last_bucket() {
        let histogram = Histogram::new(vec![1.0, 10.0]);
        histogram.record(Duration::from_secs(60));
        assert_eq!(histogram.snapshot().counts, vec![0, 1]);
    }

    #[test]
    fn test_empty_snapshot_is_zero() {
        let snapshot = RouterMetrics::new().snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert!(snapshot.latency_p99_ms.abs() < f64::EPSILON);
        assert!(snapshot.models.is_empty());
    }

    #[test]
    fn test_outcomes_are_counted_per_model() {
        let metrics = RouterMetrics::new();
        metrics.record_request();
        metrics.record_success("echo-v1", Duration::from_millis(1));
        metrics.record_request();
        metrics.record_failure("echo-v1", DispatchFailure::Timeout, Duration::from_millis(7));
        metrics.record_request();
        metrics.record_failure("other", DispatchFailure::Canceled, Duration::from_millis(2));
        metrics.record_request();
        metrics.record_routing_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 4);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.cancellations, 1);
        assert_eq!(snapshot.provider_failures, 0);
        assert_eq!(snapshot.routing_failures, 1);

        let names: Vec<&str> = snapshot.models.iter().map(|m| m.model.as_str()).collect();
        assert_eq!(names, ["echo-v1", "other"]);
        assert_eq!(snapshot.models[0].requests, 2);
        assert_eq!(snapshot.models[0].failures, 1);
    }
}
