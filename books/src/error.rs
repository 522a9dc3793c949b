//! Error types for the book search client, the library store and the screen models

use reader_core::error::{FetchError, ValidationError};
use reader_runtime::CoordinatorError;
use thiserror::Error;

/// Errors that can occur when talking to the book search API
#[derive(Debug, Error)]
pub enum BooksApiError {
    /// HTTP request could not be sent or the connection failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The request did not finish within the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// No volume exists for the requested id
    #[error("Volume not found: {0}")]
    NotFound(String),

    /// Response body could not be parsed
    #[error("Response parsing failed: {0}")]
    ResponseParseFailed(String),

    /// Rate limited - too many requests
    #[error("Rate limited - too many requests")]
    RateLimited,

    /// API key rejected
    #[error("Unauthorized - invalid API key")]
    Unauthorized,

    /// API returned an unexpected status
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },
}

impl From<reqwest::Error> for BooksApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::ResponseParseFailed(error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

impl From<BooksApiError> for FetchError {
    fn from(error: BooksApiError) -> Self {
        match error {
            BooksApiError::NotFound(id) => Self::NotFound(format!("volume {id}")),
            BooksApiError::ResponseParseFailed(message) => Self::Deserialization(message),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Errors from the personal library store
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LibraryError {
    /// No record with this id
    #[error("Library book not found: {0}")]
    NotFound(String),

    /// The storage backend failed
    #[error("Library backend failed: {0}")]
    Backend(String),
}

impl From<LibraryError> for FetchError {
    fn from(error: LibraryError) -> Self {
        match error {
            LibraryError::NotFound(id) => Self::NotFound(format!("library book {id}")),
            LibraryError::Backend(message) => Self::Transport(message),
        }
    }
}

/// Errors returned by screen model actions
#[derive(Debug, Error)]
pub enum ScreenError {
    /// The screen's coordinator refused the query
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    /// Writing to the library failed
    #[error(transparent)]
    Library(#[from] LibraryError),

    /// The input failed validation
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// The action needs a loaded record and the screen has none
    #[error("Nothing loaded on the {0} screen")]
    NothingLoaded(&'static str),
}
