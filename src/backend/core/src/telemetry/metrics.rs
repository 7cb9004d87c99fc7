//! Prometheus metrics for aggregation loads, HTTP requests and errors.
//!
//! Metric families:
//!
//! - `atlas_level_loads_total` / `atlas_level_load_duration_seconds`: one
//!   sample per resolver or loader call, labelled by tree level
//! - `atlas_level_rows`: rows returned per load
//! - `atlas_aggregations_total` / `atlas_aggregation_duration_seconds`: one
//!   sample per entry-point call, labelled by shape and outcome
//! - `atlas_fanout_in_flight`: sibling loads currently holding a permit
//! - `http_request_duration_seconds` / `http_requests_total`
//! - `atlas_errors_total`: recorded by [`crate::error::AtlasError`]
//!
//! # Example
//!
//! ```rust,no_run
//! use atlas_core::telemetry::metrics::{LevelLoadMetrics, LoadOutcome};
//! use std::time::Duration;
//!
//! LevelLoadMetrics::record("guides", LoadOutcome::Ok, 12, Duration::from_millis(3));
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Histogram buckets for durations (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,

    /// Global labels to add to all metrics
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            duration_buckets: default_duration_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_duration_buckets() -> Vec<f64> {
    vec![
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
    ]
}

/// Handle to the installed Prometheus recorder.
///
/// Cloned into the HTTP state so `GET /metrics` can render the exposition.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// A registry that renders nothing. Used when metrics are disabled and in tests.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Initialize the metrics subsystem.
///
/// # Errors
///
/// Returns an error if the bucket list is empty or a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig, service_name: &str) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::disabled());
    }

    let mut builder = PrometheusBuilder::new().add_global_label("service", service_name);

    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }

    builder = builder.set_buckets(&config.duration_buckets)?;

    let handle = builder.install_recorder()?;

    register_metric_descriptions();

    tracing::info!(service_name = %service_name, "Metrics initialized");

    Ok(MetricsRegistry {
        prometheus_handle: Some(handle),
    })
}

fn register_metric_descriptions() {
    describe_counter!("atlas_level_loads_total", "Resolver and loader calls by tree level");
    describe_histogram!(
        "atlas_level_load_duration_seconds",
        "Duration of a single level load in seconds"
    );
    describe_histogram!("atlas_level_rows", "Rows returned by a single level load");

    describe_counter!("atlas_aggregations_total", "Aggregation requests by shape and outcome");
    describe_histogram!(
        "atlas_aggregation_duration_seconds",
        "End-to-end aggregation duration in seconds"
    );

    describe_gauge!("atlas_fanout_in_flight", "Sibling loads currently holding a fan-out permit");

    describe_histogram!("http_request_duration_seconds", "HTTP request duration in seconds");
    describe_counter!("http_requests_total", "Total number of HTTP requests");

    describe_counter!("atlas_errors_total", "Errors by code and category");
}

/// Result of one level load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Ok,
    Failed,
}

impl LoadOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
        }
    }
}

/// Per-level load metrics.
pub struct LevelLoadMetrics;

impl LevelLoadMetrics {
    pub fn record(level: &'static str, outcome: LoadOutcome, rows: usize, duration: Duration) {
        counter!(
            "atlas_level_loads_total",
            "level" => level,
            "outcome" => outcome.as_str(),
        )
        .increment(1);

        histogram!("atlas_level_load_duration_seconds", "level" => level).record(duration.as_secs_f64());

        if outcome == LoadOutcome::Ok {
            histogram!("atlas_level_rows", "level" => level).record(rows as f64);
        }
    }
}

/// Aggregation outcome as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationOutcome {
    Found,
    Absent,
    Failed,
}

impl AggregationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Found => "found",
            Self::Absent => "absent",
            Self::Failed => "failed",
        }
    }
}

/// Entry-point level metrics.
pub struct AggregationMetrics;

impl AggregationMetrics {
    pub fn record(shape: &'static str, outcome: AggregationOutcome, duration: Duration) {
        counter!(
            "atlas_aggregations_total",
            "shape" => shape,
            "outcome" => outcome.as_str(),
        )
        .increment(1);

        histogram!("atlas_aggregation_duration_seconds", "shape" => shape).record(duration.as_secs_f64());
    }
}

/// Gauge for the fan-out pool.
pub struct FanOutGauge;

impl FanOutGauge {
    pub fn set_in_flight(pool_name: &str, in_flight: usize) {
        gauge!("atlas_fanout_in_flight", "pool" => pool_name.to_string()).set(in_flight as f64);
    }
}

/// Request duration histogram for HTTP requests.
pub struct RequestDurationHistogram;

impl RequestDurationHistogram {
    /// Record a request duration.
    pub fn record(method: &str, path: &str, status_code: u16, duration_seconds: f64) {
        histogram!(
            "http_request_duration_seconds",
            "method" => method.to_string(),
            "path" => path.to_string(),
            "status_code" => status_code.to_string(),
        )
        .record(duration_seconds);

        counter!(
            "http_requests_total",
            "method" => method.to_string(),
            "path" => path.to_string(),
            "status_code" => status_code.to_string(),
        )
        .increment(1);
    }
}

/// Measures an operation and hands back the elapsed time.
pub struct OperationTimer {
    start: Instant,
}

impl OperationTimer {
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
