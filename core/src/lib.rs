//! # Reader Core
//!
//! Core types for the Reader fetch coordination layer.
//!
//! Every screen of the Reader application that shows remote or persisted
//! data (search results, the personal library, a book's details) wraps each
//! fetch in a tri-state result and republishes it to observers. This crate
//! holds the pieces those screens share:
//!
//! - **`RequestState`**: loading / success-with-data / failed-with-error
//! - **Errors**: the failure taxonomy produced by fetch collaborators
//! - **Fetcher**: the injected asynchronous fetch function
//! - **Query validation**: pre-submission validity checks
//! - **Book model**: search hits and personal-library records
//!
//! The coordinator that enforces latest-request-wins ordering lives in
//! `reader-runtime`.
//!
//! ## Example
//!
//! ```
//! use reader_core::error::FetchError;
//! use reader_core::fetch::Fetcher;
//!
//! let fetcher = |query: String| async move {
//!     if query == "missing" {
//!         Err(FetchError::NotFound(query))
//!     } else {
//!         Ok(vec![format!("{query} for beginners")])
//!     }
//! };
//!
//! # tokio_test::block_on(async {
//! let titles = fetcher.fetch("rust".to_string()).await;
//! assert_eq!(titles, Ok(vec!["rust for beginners".to_string()]));
//! # });
//! ```

pub use chrono::{DateTime, Utc};

/// Tri-state request results
pub mod request_state;

/// Book search hits and personal-library records
pub mod book;

pub use request_state::{ErrorKind, FetchFailure, RequestState, Status};

/// Error types shared by fetch collaborators and callers
pub mod error {
    use super::request_state::{ErrorKind, FetchFailure};
    use thiserror::Error;

    /// Failure produced by a fetch collaborator
    ///
    /// A coordinator never lets this escape to its callers: it is converted
    /// into a [`FetchFailure`] and published as a failed state.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum FetchError {
        /// The collaborator could not reach its backend
        #[error("Transport error: {0}")]
        Transport(String),

        /// The query yielded no result where one was expected
        #[error("Not found: {0}")]
        NotFound(String),

        /// The backend responded but the payload was unusable
        #[error("Deserialization error: {0}")]
        Deserialization(String),
    }

    impl FetchError {
        /// The failure category of this error
        #[must_use]
        pub const fn kind(&self) -> ErrorKind {
            match self {
                Self::Transport(_) => ErrorKind::Transport,
                Self::NotFound(_) => ErrorKind::NotFound,
                Self::Deserialization(_) => ErrorKind::Deserialization,
            }
        }

        /// The message carried by this error, without the category prefix
        #[must_use]
        pub fn message(&self) -> &str {
            match self {
                Self::Transport(msg) | Self::NotFound(msg) | Self::Deserialization(msg) => msg,
            }
        }
    }

    impl From<FetchError> for FetchFailure {
        fn from(error: FetchError) -> Self {
            let kind = error.kind();
            match error {
                FetchError::Transport(message)
                | FetchError::NotFound(message)
                | FetchError::Deserialization(message) => Self { kind, message },
            }
        }
    }

    impl From<serde_json::Error> for FetchError {
        fn from(error: serde_json::Error) -> Self {
            Self::Deserialization(error.to_string())
        }
    }

    /// A query failed the caller's pre-submission validity check
    ///
    /// Returned synchronously from `submit`; it never becomes a request state.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum ValidationError {
        /// The query is empty or consists only of whitespace
        #[error("Query is empty or blank")]
        Blank,

        /// The query was rejected by a custom predicate
        #[error("Query rejected: {0}")]
        Rejected(String),
    }
}

/// Fetch collaborator seam
///
/// The coordinator does not know whether data comes from an HTTP API, a
/// document store, or a test double. It only calls a [`Fetcher`].
pub mod fetch {
    use super::error::FetchError;
    use futures::future::BoxFuture;
    use std::future::Future;

    /// An injected asynchronous fetch function
    ///
    /// # Type Parameters
    ///
    /// - `Q`: Query type (search term, book id, filter)
    /// - `T`: Fetched value
    ///
    /// The returned future is spawned on a worker task, so it must own
    /// everything it needs (`'static`) and be `Send`.
    ///
    /// Closures `Fn(Q) -> impl Future<Output = Result<T, FetchError>>`
    /// implement this trait automatically.
    pub trait Fetcher<Q, T>: Send + Sync + 'static {
        /// Start fetching the value for `query`
        fn fetch(&self, query: Q) -> BoxFuture<'static, Result<T, FetchError>>;
    }

    impl<Q, T, F, Fut> Fetcher<Q, T> for F
    where
        F: Fn(Q) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        fn fetch(&self, query: Q) -> BoxFuture<'static, Result<T, FetchError>> {
            Box::pin(self(query))
        }
    }
}

/// Query validity checks applied before a fetch is issued
pub mod query {
    use super::error::ValidationError;
    use std::sync::Arc;

    /// Caller-supplied validity check for queries of type `Q`
    pub type QueryValidator<Q> = Arc<dyn Fn(&Q) -> Result<(), ValidationError> + Send + Sync>;

    /// Reject empty and whitespace-only text
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Blank`] if `query` has no non-whitespace characters.
    ///
    /// # Example
    ///
    /// ```
    /// use reader_core::query::not_blank;
    ///
    /// assert!(not_blank("dune").is_ok());
    /// assert!(not_blank("   ").is_err());
    /// ```
    pub fn not_blank<S>(query: &S) -> Result<(), ValidationError>
    where
        S: AsRef<str> + ?Sized,
    {
        if query.as_ref().trim().is_empty() {
            Err(ValidationError::Blank)
        } else {
            Ok(())
        }
    }

    /// Validator that accepts every query
    #[must_use]
    pub fn accept_all<Q: 'static>() -> QueryValidator<Q> {
        Arc::new(|_: &Q| Ok(()))
    }

    /// Validator rejecting blank text queries
    #[must_use]
    pub fn non_blank_text<Q>() -> QueryValidator<Q>
    where
        Q: AsRef<str> + 'static,
    {
        Arc::new(|query: &Q| not_blank(query))
    }

    /// Build a validator from a boolean predicate
    ///
    /// Queries for which `predicate` returns `false` are rejected with
    /// [`ValidationError::Rejected`] carrying `reason`.
    #[must_use]
    pub fn predicate<Q, F>(reason: impl Into<String>, predicate: F) -> QueryValidator<Q>
    where
        Q: 'static,
        F: Fn(&Q) -> bool + Send + Sync + 'static,
    {
        let reason = reason.into();
        Arc::new(move |query: &Q| {
            if predicate(query) {
                Ok(())
            } else {
                Err(ValidationError::Rejected(reason.clone()))
            }
        })
    }
}
