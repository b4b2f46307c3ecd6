//! Observability metrics for the harvesting engine
//!
//! Metric emission goes through the `metrics` facade, so recording is a no-op
//! unless a recorder is installed. The binary installs the Prometheus exporter
//! when `--metrics-addr` is given.
//!
//! ## Metrics
//!
//! - `api_requests_total{platform,status}` - page requests by outcome
//! - `api_request_duration_seconds{platform}` - page request latency
//! - `api_rate_limited_total{platform}` - rate-limit signals and blocked-pool waits
//! - `api_retries_total{platform,class}` - backoff retries
//! - `credential_switches_total` - credential rotations
//! - `chunks_completed_total` / `chunks_failed_total{class}` - chunk outcomes
//! - `chunk_duration_seconds` - wall time per fetched chunk

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::split::DateChunk;
use crate::Platform;

static METRICS_INITIALIZED: OnceCell<SocketAddr> = OnceCell::new();

/// Errors installing the metrics exporter
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed (address in use, recorder already set)
    #[error("failed to install Prometheus exporter: {0}")]
    Install(String),
}

/// Install the Prometheus exporter and register metric descriptions
///
/// Idempotent: later calls return `Ok(())` without rebinding.
///
/// # Arguments
/// * `addr` - Socket address for the scrape endpoint (e.g., "0.0.0.0:9090")
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if let Some(bound) = METRICS_INITIALIZED.get() {
        debug!(addr = %bound, "Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    describe_counter!(
        "api_requests_total",
        Unit::Count,
        "Page requests issued to platform APIs"
    );
    describe_histogram!(
        "api_request_duration_seconds",
        Unit::Seconds,
        "Page request duration in seconds"
    );
    describe_counter!(
        "api_rate_limited_total",
        Unit::Count,
        "Rate-limit signals received or blocked-pool waits"
    );
    describe_counter!("api_retries_total", Unit::Count, "Backoff retries of a page");
    describe_counter!(
        "credential_switches_total",
        Unit::Count,
        "Rotations to another credential"
    );
    describe_counter!(
        "chunks_completed_total",
        Unit::Count,
        "Chunks fetched, delivered and recorded"
    );
    describe_counter!("chunks_failed_total", Unit::Count, "Chunks surfaced as failed");
    describe_histogram!(
        "chunk_duration_seconds",
        Unit::Seconds,
        "Wall time to fetch and deliver one chunk"
    );

    let _ = METRICS_INITIALIZED.set(addr);
    info!(addr = %addr, "Metrics exporter listening");
    Ok(())
}

/// Whether [`init_metrics`] has succeeded in this process
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.get().is_some()
}

/// Timing guard for one page request
pub struct RequestMetrics {
    platform: Platform,
    start_time: Instant,
}

impl RequestMetrics {
    /// Start timing a request
    pub fn start(platform: Platform) -> Self {
        Self {
            platform,
            start_time: Instant::now(),
        }
    }

    /// Record the request outcome; `status` is an HTTP code or a label such as "network_error"
    pub fn record(&self, status: impl Into<String>) {
        let status = status.into();
        counter!(
            "api_requests_total",
            "platform" => self.platform.to_string(),
            "status" => status,
        )
        .increment(1);
        histogram!(
            "api_request_duration_seconds",
            "platform" => self.platform.to_string(),
        )
        .record(self.start_time.elapsed().as_secs_f64());
    }
}

/// Record a rate-limit signal
pub fn record_rate_limited(platform: Platform) {
    counter!("api_rate_limited_total", "platform" => platform.to_string()).increment(1);
}

/// Record a scheduled retry and its delay
pub fn record_retry(platform: Platform, class: &str, delay: Duration) {
    counter!(
        "api_retries_total",
        "platform" => platform.to_string(),
        "class" => class.to_string(),
    )
    .increment(1);
    debug!(
        platform = %platform,
        class = class,
        backoff_ms = delay.as_millis() as u64,
        "Retry backoff recorded"
    );
}

/// Record a credential rotation
pub fn record_credential_switch() {
    counter!("credential_switches_total").increment(1);
}

/// Record a wait on a fully exhausted credential pool
pub fn record_pool_blocked(wait: Duration) {
    counter!("api_rate_limited_total", "platform" => "pool").increment(1);
    debug!(wait_ms = wait.as_millis() as u64, "Pool blocked wait recorded");
}

/// Per-chunk outcome metrics
pub struct ChunkMetrics {
    job: String,
    chunk: DateChunk,
    start_time: Instant,
}

impl ChunkMetrics {
    /// Start tracking a chunk
    pub fn start(job: impl Into<String>, chunk: DateChunk) -> Self {
        Self {
            job: job.into(),
            chunk,
            start_time: Instant::now(),
        }
    }

    /// Record a delivered and recorded chunk
    pub fn record_success(&self, items: usize) {
        let duration = self.start_time.elapsed();
        counter!("chunks_completed_total").increment(1);
        histogram!("chunk_duration_seconds").record(duration.as_secs_f64());
        info!(
            job = %self.job,
            chunk = %self.chunk,
            items = items,
            duration_ms = duration.as_millis() as u64,
            "Chunk completed"
        );
    }

    /// Record a failed chunk
    pub fn record_failure(&self, class: &str, error: &str) {
        let duration = self.start_time.elapsed();
        counter!("chunks_failed_total", "class" => class.to_string()).increment(1);
        histogram!("chunk_duration_seconds").record(duration.as_secs_f64());
        warn!(
            job = %self.job,
            chunk = %self.chunk,
            class = class,
            error = %error,
            duration_ms = duration.as_millis() as u64,
            "Chunk failed"
        );
    }
}
