//! Configuration for the book search client
//!
//! Values come from environment variables with sensible defaults:
//!
//! | Variable                      | Default                                  |
//! |-------------------------------|------------------------------------------|
//! | `READER_BOOKS_API_URL`        | `https://www.googleapis.com/books/v1`    |
//! | `READER_BOOKS_API_KEY`        | unset                                    |
//! | `READER_REQUEST_TIMEOUT_SECS` | `10`                                     |
//! | `READER_MAX_RESULTS`          | `20` (valid range 1..=40)                |
//! | `READER_DEFAULT_QUERY`        | `android`                                |
//!
//! # Example
//!
//! ```no_run
//! use reader_books::config::BooksConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BooksConfig::from_env()?;
//! println!("Searching {} ({} results per page)", config.api_url, config.max_results);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default base URL of the book search API
pub const DEFAULT_API_URL: &str = "https://www.googleapis.com/books/v1";

/// Largest page size the search API accepts
pub const MAX_RESULTS_LIMIT: u32 = 40;

/// Configuration error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed
    #[error("Invalid value for {var}: {value}")]
    InvalidValue {
        /// Variable name
        var: &'static str,
        /// Raw value found in the environment
        value: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Book search client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooksConfig {
    /// Base URL of the search API, without a trailing slash
    pub api_url: String,
    /// API key appended to every request when set
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Page size of search requests
    pub max_results: u32,
    /// Search term the search screen loads when it opens
    pub default_query: String,
}

impl Default for BooksConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            request_timeout_secs: 10,
            max_results: 20,
            default_query: "android".to_string(),
        }
    }
}

impl BooksConfig {
    /// Load configuration from the environment and validate it
    ///
    /// # Errors
    ///
    /// Returns error if a numeric variable does not parse or validation fails
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// Blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns error if a numeric variable does not parse or validation fails
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            api_url: get("READER_BOOKS_API_URL")
                .map_or(defaults.api_url, |url| url.trim().trim_end_matches('/').to_string()),
            api_key: get("READER_BOOKS_API_KEY"),
            request_timeout_secs: parse_var(
                "READER_REQUEST_TIMEOUT_SECS",
                get("READER_REQUEST_TIMEOUT_SECS"),
                defaults.request_timeout_secs,
            )?,
            max_results: parse_var(
                "READER_MAX_RESULTS",
                get("READER_MAX_RESULTS"),
                defaults.max_results,
            )?,
            default_query: get("READER_DEFAULT_QUERY").unwrap_or(defaults.default_query),
        };

        config.validate()?;
        Ok(config)
    }

    /// Set the API base URL
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the page size
    #[must_use]
    pub const fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    /// Set the request timeout in seconds
    #[must_use]
    pub const fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Request timeout as a [`Duration`]
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if the URL is empty, the timeout is zero, or the page
    /// size is outside `1..=40`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::Validation("api_url cannot be empty".to_string()));
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "api_url must be an http(s) URL, got {}",
                self.api_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.max_results == 0 || self.max_results > MAX_RESULTS_LIMIT {
            return Err(ConfigError::Validation(format!(
                "max_results must be between 1 and {MAX_RESULTS_LIMIT}, got {}",
                self.max_results
            )));
        }
        Ok(())
    }
}

fn parse_var<N: std::str::FromStr>(
    var: &'static str,
    raw: Option<String>,
    default: N,
) -> Result<N, ConfigError> {
    raw.map_or(Ok(default), |value| {
        value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value })
    })
}
