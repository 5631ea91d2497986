//! Prometheus metrics for search execution.

use lazy_static::lazy_static;
use prometheus::{CounterVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry};

/// Container for all search metrics
pub struct SearchMetrics {
    /// Completed searches by status ("success", "timeout", "partial_timeout", "alert", "error")
    pub responses_total: CounterVec,

    /// Alerts returned to callers by alert type
    pub alerts_total: CounterVec,

    /// Duration of index service requests
    pub index_request_duration: HistogramVec,

    /// Duration of backend search requests per repository
    pub backend_request_duration: HistogramVec,

    /// Backend requests retried on another instance
    pub backend_retries: CounterVec,

    /// Time spent waiting for a backend concurrency permit
    pub limiter_wait: Histogram,

    /// Boolean evaluation rounds by operator
    pub boolean_rounds: CounterVec,
}

impl SearchMetrics {
    fn new() -> Self {
        Self {
            responses_total: CounterVec::new(
                Opts::new("search_responses_total", "Total number of completed searches")
                    .namespace("codesearch"),
                &["status"],
            )
            .expect("Failed to create search_responses_total metric"),

            alerts_total: CounterVec::new(
                Opts::new("search_alerts_total", "Total number of search alerts returned")
                    .namespace("codesearch"),
                &["alert_type"],
            )
            .expect("Failed to create search_alerts_total metric"),

            index_request_duration: HistogramVec::new(
                HistogramOpts::new(
                    "index_request_duration_seconds",
                    "Duration of index service searches",
                )
                .namespace("codesearch")
                .buckets(vec![
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
                ]),
                &["outcome"],
            )
            .expect("Failed to create index_request_duration_seconds metric"),

            backend_request_duration: HistogramVec::new(
                HistogramOpts::new(
                    "backend_request_duration_seconds",
                    "Duration of unindexed backend searches per repository",
                )
                .namespace("codesearch")
                .buckets(vec![
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
                ]),
                &["outcome"],
            )
            .expect("Failed to create backend_request_duration_seconds metric"),

            backend_retries: CounterVec::new(
                Opts::new(
                    "backend_retries_total",
                    "Backend searches retried against another instance",
                )
                .namespace("codesearch"),
                &["reason"],
            )
            .expect("Failed to create backend_retries_total metric"),

            limiter_wait: Histogram::with_opts(
                HistogramOpts::new(
                    "backend_limiter_wait_seconds",
                    "Time spent waiting for a backend concurrency permit",
                )
                .namespace("codesearch")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            )
            .expect("Failed to create backend_limiter_wait_seconds metric"),

            boolean_rounds: CounterVec::new(
                Opts::new(
                    "boolean_evaluation_rounds_total",
                    "Evaluation rounds of boolean query operators",
                )
                .namespace("codesearch"),
                &["operator"],
            )
            .expect("Failed to create boolean_evaluation_rounds_total metric"),
        }
    }
}

lazy_static! {
    /// Global search metrics instance
    pub static ref SEARCH_METRICS: SearchMetrics = SearchMetrics::new();
}

/// Register search metrics with a Prometheus registry
pub fn init_search_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(SEARCH_METRICS.responses_total.clone()))?;
    registry.register(Box::new(SEARCH_METRICS.alerts_total.clone()))?;
    registry.register(Box::new(SEARCH_METRICS.index_request_duration.clone()))?;
    registry.register(Box::new(SEARCH_METRICS.backend_request_duration.clone()))?;
    registry.register(Box::new(SEARCH_METRICS.backend_retries.clone()))?;
    registry.register(Box::new(SEARCH_METRICS.limiter_wait.clone()))?;
    registry.register(Box::new(SEARCH_METRICS.boolean_rounds.clone()))?;

    tracing::info!("Search metrics initialized");
    Ok(())
}
