//! # Reader Runtime
//!
//! Fetch coordination for the Reader application.
//!
//! Every screen that shows remote or persisted data owns a
//! [`FetchCoordinator`]. The coordinator accepts queries, runs the injected
//! fetch function on a worker task, and publishes [`RequestState`] values to
//! its observers. Fetches race (a user can retype a search before the first
//! request returns), so the coordinator only ever publishes the outcome of
//! the most recently issued request.
//!
//! ## Core Components
//!
//! - **`FetchCoordinator`**: owns the current state and enforces latest-request-wins
//! - **`Subscription`**: observer registration, deregistered on drop
//! - **`FetchHandle`**: per-submission handle for waiting on completion
//! - **Metrics**: counters and histograms for submissions, publications and discards
//!
//! ## Example
//!
//! ```ignore
//! use reader_runtime::FetchCoordinator;
//! use reader_core::query::non_blank_text;
//!
//! let search = FetchCoordinator::builder(books_api)
//!     .validator(non_blank_text())
//!     .build();
//!
//! let _subscription = search.subscribe(|state| render(state));
//!
//! search.submit("dune".to_string())?;
//! search.submit("dune messiah".to_string())?; // "dune" can no longer be published
//! ```
//!
//! [`RequestState`]: reader_core::RequestState

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Prometheus metrics for observability
pub mod metrics;

/// The fetch coordinator and its subscriptions
pub mod coordinator;

pub use coordinator::{FetchCoordinator, FetchCoordinatorBuilder, Subscription};

/// Error types for coordinator operations
pub mod error {
    use reader_core::error::ValidationError;
    use thiserror::Error;

    /// Errors returned synchronously by coordinator operations
    ///
    /// Fetch failures are never reported here. They are published to
    /// observers as failed request states.
    #[derive(Error, Debug)]
    pub enum CoordinatorError {
        /// The query failed the coordinator's validity check
        ///
        /// No fetch was issued and the current state was not touched.
        #[error("Query rejected: {0}")]
        Validation(#[from] ValidationError),

        /// The coordinator has been disposed and accepts no more queries
        #[error("Coordinator has been disposed")]
        Disposed,

        /// `submit` was called outside a tokio runtime
        ///
        /// Checked before any state change, so the submission had no effect.
        #[error("No tokio runtime available to run the fetch")]
        NoRuntime,

        /// The fetch task could not be joined
        ///
        /// This typically means the runtime shut down while the fetch was running.
        #[error("Fetch task failed: {0}")]
        TaskJoin(#[from] tokio::task::JoinError),

        /// Timeout waiting for a fetch to complete
        #[error("Timeout waiting for fetch to complete")]
        Timeout,
    }
}

pub use error::CoordinatorError;

/// Configuration for [`FetchCoordinator`] instances
///
/// # Example
///
/// ```
/// use reader_runtime::CoordinatorConfig;
///
/// let config = CoordinatorConfig::new("search").with_abort_superseded(true);
/// assert_eq!(config.name, "search");
/// ```
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Label used in logs and metrics
    pub name: String,
    /// Abort the worker task of a request as soon as a newer one is submitted
    ///
    /// Superseded results are discarded either way; aborting only saves the
    /// work of finishing a fetch nobody will see. Off by default.
    pub abort_superseded: bool,
}

impl CoordinatorConfig {
    /// Create a configuration with the given name and default settings
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            abort_superseded: false,
        }
    }

    /// Set the coordinator name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enable or disable aborting superseded fetch tasks
    #[must_use]
    pub fn with_abort_superseded(mut self, abort: bool) -> Self {
        self.abort_superseded = abort;
        self
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new("fetch")
    }
}

/// What happened to a submission once its fetch finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The result was published as the current state
    Applied,
    /// The result was dropped: a newer query was submitted, the coordinator
    /// was disposed, or the task was aborted as superseded
    Discarded,
}

impl FetchOutcome {
    /// Check if the result was published
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Handle for one submission
///
/// Returned by [`FetchCoordinator::submit()`]. Dropping the handle does not
/// cancel the fetch; it only gives up the ability to wait for it.
///
/// # Example
///
/// ```ignore
/// let handle = search.submit("dune".to_string())?;
/// let outcome = handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// assert!(outcome.is_applied());
/// ```
#[derive(Debug)]
pub struct FetchHandle {
    sequence: u64,
    task: JoinHandle<FetchOutcome>,
}

impl FetchHandle {
    const fn new(sequence: u64, task: JoinHandle<FetchOutcome>) -> Self {
        Self { sequence, task }
    }

    /// Sequence number assigned to this submission
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Check if the fetch task has finished
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the fetch to finish and the staleness check to run
    ///
    /// An aborted task (see [`CoordinatorConfig::abort_superseded`]) counts
    /// as [`FetchOutcome::Discarded`].
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::TaskJoin`] if the task could not be joined
    /// for any reason other than cancellation.
    pub async fn wait(self) -> Result<FetchOutcome, CoordinatorError> {
        match self.task.await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_cancelled() => Ok(FetchOutcome::Discarded),
            Err(e) => Err(CoordinatorError::TaskJoin(e)),
        }
    }

    /// Wait for the fetch to finish, giving up after `timeout`
    ///
    /// The coordinator has no timeout of its own: a fetch that never resolves
    /// leaves the state in loading. This only bounds how long the caller waits.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::Timeout`] if `timeout` elapses first
    /// - [`CoordinatorError::TaskJoin`] as for [`wait()`](Self::wait)
    pub async fn wait_with_timeout(self, timeout: Duration) -> Result<FetchOutcome, CoordinatorError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| CoordinatorError::Timeout)?
    }
}

/// Guard that decrements the in-flight counter on drop
///
/// Dropped when a fetch task finishes, panics, or is aborted.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
