//! # Reader Books
//!
//! The book-tracking domain of the Reader application, built on the fetch
//! coordinator from `reader-runtime`:
//!
//! - **Search API client**: volume search and lookup over HTTP/JSON
//! - **Library store**: the personal library as a document collection
//! - **Screen models**: one coordinator per screen (search, library, details, update)
//!
//! ## Example
//!
//! ```no_run
//! use reader_books::{BooksApiClient, BooksConfig, SearchModel};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BooksConfig::from_env()?;
//!     let client = BooksApiClient::new(&config)?;
//!     let search = SearchModel::from_client(&client, &config);
//!
//!     let _subscription = search.subscribe(|state| println!("{}", state.status()));
//!
//!     search.load_default()?;
//!     search.search("dune")?.wait().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod library;
pub mod screens;
pub mod types;

// Re-export main types for convenience
pub use client::{BooksApiClient, VolumeFetcher};
pub use config::{BooksConfig, ConfigError};
pub use error::{BooksApiError, LibraryError, ScreenError};
pub use library::{BookStore, InMemoryBookStore, LibraryFilter};
pub use screens::{DetailsModel, LibraryModel, SearchModel, UpdateModel};
pub use types::VolumesResponse;
