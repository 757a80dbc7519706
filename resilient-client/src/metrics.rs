//! Client metrics in Prometheus text format.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
struct Series {
    name: String,
    help: String,
    value: AtomicU64,
}

impl Series {
    fn new(name: String, help: String) -> Self {
        Self {
            name,
            help,
            value: AtomicU64::new(0),
        }
    }

    fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    fn render(&self, kind: &str) -> String {
        format!(
            "# HELP {name} {help}\n# TYPE {name} {kind}\n{name} {value}\n",
            name = self.name,
            help = self.help,
            value = self.get()
        )
    }
}

/// A monotonically increasing counter.
#[derive(Debug)]
pub struct Counter(Series);

impl Counter {
    /// Create a counter starting at zero.
    #[must_use]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self(Series::new(name.into(), help.into()))
    }

    /// Add one.
    pub fn inc(&self) {
        self.inc_by(1);
    }

    /// Add `amount`.
    pub fn inc_by(&self, amount: u64) {
        self.0.value.fetch_add(amount, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.get()
    }

    /// Metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Prometheus text exposition.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        self.0.render("counter")
    }
}

/// A value that can go up and down.
#[derive(Debug)]
pub struct Gauge(Series);

impl Gauge {
    /// Create a gauge starting at zero.
    #[must_use]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self(Series::new(name.into(), help.into()))
    }

    /// Replace the value.
    pub fn set(&self, value: u64) {
        self.0.value.store(value, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.get()
    }

    /// Metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Prometheus text exposition.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        self.0.render("gauge")
    }
}

/// Counters maintained by [`HttpClient`](crate::client::HttpClient).
#[derive(Debug)]
pub struct ClientMetrics {
    /// Logical requests issued through the client
    pub requests: Counter,
    /// Retries performed after a failed attempt
    pub retries: Counter,
    /// Requests that ended in an error
    pub failures: Counter,
    /// Requests rejected by an open circuit
    pub circuit_rejections: Counter,
    /// Responses served from cache
    pub cache_hits: Counter,
    /// Cacheable requests that missed
    pub cache_misses: Counter,
    /// Entries currently cached
    pub cache_size: Gauge,
}

impl ClientMetrics {
    /// Create metrics with the given name prefix.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            requests: Counter::new(
                format!("{prefix}_requests_total"),
                "Total number of requests issued",
            ),
            retries: Counter::new(
                format!("{prefix}_retries_total"),
                "Total number of retried attempts",
            ),
            failures: Counter::new(
                format!("{prefix}_failures_total"),
                "Total number of failed requests",
            ),
            circuit_rejections: Counter::new(
                format!("{prefix}_circuit_rejections_total"),
                "Total number of requests rejected by an open circuit",
            ),
            cache_hits: Counter::new(
                format!("{prefix}_cache_hits_total"),
                "Total number of cache hits",
            ),
            cache_misses: Counter::new(
                format!("{prefix}_cache_misses_total"),
                "Total number of cache misses",
            ),
            cache_size: Gauge::new(
                format!("{prefix}_cache_size"),
                "Current number of items in cache",
            ),
        }
    }

    /// Format all metrics as Prometheus text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        [
            self.requests.to_prometheus(),
            self.retries.to_prometheus(),
            self.failures.to_prometheus(),
            self.circuit_rejections.to_prometheus(),
            self.cache_hits.to_prometheus(),
            self.cache_misses.to_prometheus(),
            self.cache_size.to_prometheus(),
        ]
        .concat()
    }
}

impl Default for ClientMetrics {
    fn default() -> Self {
        Self::new("resilient_client")
    }
}
