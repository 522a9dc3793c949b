//! Tri-state request results.
//!
//! A [`RequestState`] is what every observer of a fetch sees: the request is
//! either still loading, has produced data, or has failed. The three cases
//! are variants of one enum, so a state can never carry data and an error at
//! the same time, and a loading state carries neither.
//!
//! # Example
//!
//! ```
//! use reader_core::request_state::{ErrorKind, RequestState, Status};
//!
//! let state: RequestState<Vec<&str>> = RequestState::success(vec!["Dune"]);
//! assert_eq!(state.status(), Status::Success);
//! assert_eq!(state.data(), Some(&vec!["Dune"]));
//!
//! let failed: RequestState<Vec<&str>> = RequestState::failed(ErrorKind::Transport, "offline");
//! assert!(failed.data().is_none());
//! assert_eq!(failed.error().map(|e| e.kind), Some(ErrorKind::Transport));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the three cases a [`RequestState`] is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// A request has been issued and has not produced a result yet
    Loading,
    /// The request produced data
    Success,
    /// The request failed
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Category of a failed fetch.
///
/// Validation failures are not listed here: a query that fails validation is
/// rejected before any fetch is issued and never becomes a [`RequestState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The collaborator could not reach its backend
    Transport,
    /// The query yielded no result where one was expected
    NotFound,
    /// The backend responded but the payload was unusable
    Deserialization,
    /// The collaborator itself crashed (panicked) while fetching
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::NotFound => write!(f, "not_found"),
            Self::Deserialization => write!(f, "deserialization"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Error payload of a [`RequestState::Failed`] state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchFailure {
    /// Failure category
    pub kind: ErrorKind,
    /// Human-readable description, suitable for showing to a user
    pub message: String,
}

impl FetchFailure {
    /// Create a failure payload
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

/// Result of a fetch as seen by observers.
///
/// States are immutable values. A coordinator replaces its current state with
/// a new one in a single assignment; fields are never updated piecemeal.
///
/// Serializes as `{"status": "...", "payload": ...}` so snapshots can be
/// handed to a UI layer as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "payload", rename_all = "snake_case")]
pub enum RequestState<T> {
    /// Waiting for the most recently issued request
    Loading,
    /// The most recently applied request produced data
    Success(T),
    /// The most recently applied request failed
    Failed(FetchFailure),
}

impl<T> RequestState<T> {
    /// A loading state
    #[must_use]
    pub const fn loading() -> Self {
        Self::Loading
    }

    /// A success state carrying `data`
    #[must_use]
    pub const fn success(data: T) -> Self {
        Self::Success(data)
    }

    /// A failed state with the given kind and message
    #[must_use]
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failed(FetchFailure::new(kind, message))
    }

    /// Which case this state is in
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::Loading => Status::Loading,
            Self::Success(_) => Status::Success,
            Self::Failed(_) => Status::Failed,
        }
    }

    /// Fetched data, present only for [`Status::Success`]
    #[must_use]
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Failure payload, present only for [`Status::Failed`]
    #[must_use]
    pub const fn error(&self) -> Option<&FetchFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Check if this is a loading state
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Check if this is a success state
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Check if this is a failed state
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Consume the state, returning the data if it is a success
    #[must_use]
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Transform the success payload, leaving loading and failed states as-is
    #[must_use]
    pub fn map<U, F>(self, f: F) -> RequestState<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Loading => RequestState::Loading,
            Self::Success(data) => RequestState::Success(f(data)),
            Self::Failed(failure) => RequestState::Failed(failure),
        }
    }
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        Self::Loading
    }
}

impl<T> From<Result<T, FetchFailure>> for RequestState<T> {
    fn from(result: Result<T, FetchFailure>) -> Self {
        match result {
            Ok(data) => Self::Success(data),
            Err(failure) => Self::Failed(failure),
        }
    }
}
