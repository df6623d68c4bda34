//! Observability infrastructure for the rightsizing server
//!
//! Provides:
//! - Prometheus metrics (query latency, inference latency, job counters, summary cache)
//! - Structured JSON logging of job lifecycle events with tracing

use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServerMetricsInner> = OnceLock::new();

struct ServerMetricsInner {
    query_latency_seconds: HistogramVec,
    inference_latency_seconds: HistogramVec,
    inference_errors: IntCounterVec,
    jobs_submitted: IntCounterVec,
    jobs_deduplicated: IntCounter,
    jobs_finished: IntCounterVec,
    summary_cache_hits: IntCounter,
    summary_cache_misses: IntCounter,
}

impl ServerMetricsInner {
    fn new() -> Self {
        Self {
            query_latency_seconds: register_histogram_vec!(
                "rightsizing_query_latency_seconds",
                "Time spent aggregating usage and quota from the metric store",
                &["entity"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register query_latency_seconds"),

            inference_latency_seconds: register_histogram_vec!(
                "rightsizing_inference_latency_seconds",
                "Time spent in inference service calls",
                &["operation"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            inference_errors: register_int_counter_vec!(
                "rightsizing_inference_errors_total",
                "Failed inference service calls",
                &["operation"]
            )
            .expect("Failed to register inference_errors"),

            jobs_submitted: register_int_counter_vec!(
                "rightsizing_jobs_submitted_total",
                "Jobs handed to the task queue",
                &["task"]
            )
            .expect("Failed to register jobs_submitted"),

            jobs_deduplicated: register_int_counter!(
                "rightsizing_jobs_deduplicated_total",
                "Job requests answered with an already running job"
            )
            .expect("Failed to register jobs_deduplicated"),

            jobs_finished: register_int_counter_vec!(
                "rightsizing_jobs_finished_total",
                "Jobs that reached a terminal state",
                &["task", "state"]
            )
            .expect("Failed to register jobs_finished"),

            summary_cache_hits: register_int_counter!(
                "rightsizing_summary_cache_hits_total",
                "Cluster summary requests served from cache"
            )
            .expect("Failed to register summary_cache_hits"),

            summary_cache_misses: register_int_counter!(
                "rightsizing_summary_cache_misses_total",
                "Cluster summary requests that recomputed the summary"
            )
            .expect("Failed to register summary_cache_misses"),
        }
    }
}

/// Server metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ServerMetrics {
    _private: (),
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServerMetricsInner {
        GLOBAL_METRICS.get_or_init(ServerMetricsInner::new)
    }

    /// Record one aggregation query, labelled by entity kind
    pub fn observe_query_latency(&self, entity: &str, duration_secs: f64) {
        self.inner()
            .query_latency_seconds
            .with_label_values(&[entity])
            .observe(duration_secs);
    }

    pub fn observe_inference_latency(&self, operation: &str, duration_secs: f64) {
        self.inner()
            .inference_latency_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn inc_inference_errors(&self, operation: &str) {
        self.inner()
            .inference_errors
            .with_label_values(&[operation])
            .inc();
    }

    pub fn inc_jobs_submitted(&self, task: &str) {
        self.inner().jobs_submitted.with_label_values(&[task]).inc();
    }

    pub fn inc_jobs_deduplicated(&self) {
        self.inner().jobs_deduplicated.inc();
    }

    /// Count a job that reached a terminal state (`SUCCESS` / `FAILURE`)
    pub fn inc_jobs_finished(&self, task: &str, state: &str) {
        self.inner()
            .jobs_finished
            .with_label_values(&[task, state])
            .inc();
    }

    pub fn inc_summary_cache_hit(&self) {
        self.inner().summary_cache_hits.inc();
    }

    pub fn inc_summary_cache_miss(&self) {
        self.inner().summary_cache_misses.inc();
    }

    /// Every registered metric in the Prometheus text format
    pub fn render(&self) -> prometheus::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Structured logger for server and job lifecycle events
///
/// Used by the task queue hooks; logging here never changes a job's
/// outcome.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Log a job handed to the queue
    pub fn log_job_submitted(&self, job_id: &str, task: &str, args: &[String]) {
        info!(
            event = "job_submitted",
            service = %self.service,
            job_id = %job_id,
            task = %task,
            args = ?args,
            "Job submitted"
        );
    }

    /// Pre-run hook
    pub fn log_job_started(&self, job_id: &str, task: &str, attempt: u32) {
        info!(
            event = "job_started",
            service = %self.service,
            job_id = %job_id,
            task = %task,
            attempt = attempt,
            "Job started"
        );
    }

    /// Post-run hook
    pub fn log_job_finished(&self, job_id: &str, task: &str, elapsed_ms: u128) {
        info!(
            event = "job_finished",
            service = %self.service,
            job_id = %job_id,
            task = %task,
            elapsed_ms = elapsed_ms,
            "Job finished"
        );
    }

    /// Error hook; `will_retry` tells whether another attempt follows
    pub fn log_job_error(&self, job_id: &str, task: &str, attempt: u32, error: &str, will_retry: bool) {
        if will_retry {
            warn!(
                event = "job_retry",
                service = %self.service,
                job_id = %job_id,
                task = %task,
                attempt = attempt,
                error = %error,
                "Job failed, retrying"
            );
        } else {
            error!(
                event = "job_failed",
                service = %self.service,
                job_id = %job_id,
                task = %task,
                attempt = attempt,
                error = %error,
                "Job failed"
            );
        }
    }

    /// Log a request answered with an existing job
    pub fn log_job_reused(&self, key: &str, job_id: &str) {
        debug!(
            event = "job_reused",
            service = %self.service,
            key = %key,
            job_id = %job_id,
            "Job already in flight for key"
        );
    }

    /// Log server startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "server_started",
            service = %self.service,
            version = %version,
            "Rightsizing server started"
        );
    }

    /// Log server shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            service = %self.service,
            reason = %reason,
            "Rightsizing server shutting down"
        );
    }
}
