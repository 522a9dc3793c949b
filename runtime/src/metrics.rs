//! Prometheus metrics for observability and monitoring.
//!
//! Coordinators record:
//! - Submissions accepted and rejected by validation
//! - Results published and discarded as stale
//! - Fetch failures by kind
//! - Fetch durations
//!
//! Every metric carries a `coordinator` label with the coordinator's name.
//!
//! # Example
//!
//! ```rust,no_run
//! use reader_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//!
//! if let Some(text) = recorder.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use reader_core::ErrorKind;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder.
///
/// Installs a global Prometheus recorder and renders the exposition text on
/// demand. Serving that text over HTTP is left to the embedding application.
#[derive(Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Create a recorder that is not installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a
    /// warning and succeeds without a handle.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the global recorder wasn't installed by this instance.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "coordinator_submissions_total",
        "Total number of queries accepted by fetch coordinators"
    );
    describe_counter!(
        "coordinator_rejections_total",
        "Total number of queries rejected by validation"
    );
    describe_counter!(
        "coordinator_publications_total",
        "Total number of fetch results published to observers"
    );
    describe_counter!(
        "coordinator_discards_total",
        "Total number of fetch results discarded as stale"
    );
    describe_counter!(
        "coordinator_fetch_failures_total",
        "Total number of failed fetches, by kind"
    );
    describe_histogram!(
        "coordinator_fetch_duration_seconds",
        "Time taken by fetch collaborators"
    );
}

/// Fetch coordinator metrics recorder.
pub struct CoordinatorMetrics;

impl CoordinatorMetrics {
    /// Record an accepted submission.
    pub fn record_submission(coordinator: &str) {
        counter!("coordinator_submissions_total", "coordinator" => coordinator.to_string())
            .increment(1);
    }

    /// Record a submission rejected by validation.
    pub fn record_rejection(coordinator: &str) {
        counter!("coordinator_rejections_total", "coordinator" => coordinator.to_string())
            .increment(1);
    }

    /// Record a published result.
    pub fn record_publication(coordinator: &str) {
        counter!("coordinator_publications_total", "coordinator" => coordinator.to_string())
            .increment(1);
    }

    /// Record a discarded (stale) result.
    pub fn record_discard(coordinator: &str) {
        counter!("coordinator_discards_total", "coordinator" => coordinator.to_string())
            .increment(1);
    }

    /// Record a failed fetch.
    pub fn record_failure(coordinator: &str, kind: ErrorKind) {
        counter!(
            "coordinator_fetch_failures_total",
            "coordinator" => coordinator.to_string(),
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    /// Record how long a fetch took.
    pub fn record_fetch_duration(coordinator: &str, duration: Duration) {
        histogram!("coordinator_fetch_duration_seconds", "coordinator" => coordinator.to_string())
            .record(duration.as_secs_f64());
    }
}
