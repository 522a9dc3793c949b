//! Personal library store
//!
//! The library is a collection of [`LibraryBook`] documents. [`BookStore`] is
//! the seam to whatever document database holds it; [`InMemoryBookStore`] is
//! the bundled implementation used by tests and the demo.

use crate::error::LibraryError;
use reader_core::book::{BookUpdate, LibraryBook, ReadingStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Boxed future returned by [`BookStore`] methods
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LibraryError>> + Send + 'a>>;

/// Which library records to load
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LibraryFilter {
    /// Only records owned by this user; every record when `None`
    pub user_id: Option<String>,
    /// Only records saved from this search volume
    pub google_book_id: Option<String>,
}

impl LibraryFilter {
    /// Every record in the collection
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Records owned by `user_id`
    #[must_use]
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            google_book_id: None,
        }
    }

    /// Narrow to records saved from `google_book_id`
    #[must_use]
    pub fn with_google_book_id(mut self, google_book_id: impl Into<String>) -> Self {
        self.google_book_id = Some(google_book_id.into());
        self
    }

    /// Check if `book` passes the filter
    #[must_use]
    pub fn matches(&self, book: &LibraryBook) -> bool {
        self.user_id.as_ref().is_none_or(|user| &book.user_id == user)
            && self
                .google_book_id
                .as_ref()
                .is_none_or(|id| &book.google_book_id == id)
    }
}

/// Document store holding the personal library
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so stores can be shared as
/// `Arc<dyn BookStore>` and captured by fetch closures.
pub trait BookStore: Send + Sync {
    /// Records passing `filter`, in insertion order
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::Backend` if the store cannot be read
    fn list(&self, filter: LibraryFilter) -> StoreFuture<'_, Vec<LibraryBook>>;

    /// The record with document id `id`
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if there is no such record
    fn get(&self, id: String) -> StoreFuture<'_, LibraryBook>;

    /// Insert a record and return it with its assigned document id
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::Backend` if the write fails
    fn add(&self, book: LibraryBook) -> StoreFuture<'_, LibraryBook>;

    /// Apply a partial update and return the updated record
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if there is no such record
    fn update(&self, id: String, update: BookUpdate) -> StoreFuture<'_, LibraryBook>;

    /// Delete a record
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if there is no such record
    fn remove(&self, id: String) -> StoreFuture<'_, ()>;
}

/// In-memory [`BookStore`]
///
/// Document ids are assigned sequentially (`book-1`, `book-2`, ...) unless
/// the inserted record already carries one.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookStore {
    books: Arc<RwLock<BTreeMap<u64, LibraryBook>>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryBookStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.books.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.books.read().await.is_empty()
    }
}

fn position(books: &BTreeMap<u64, LibraryBook>, id: &str) -> Option<u64> {
    books
        .iter()
        .find_map(|(key, book)| (book.id == id).then_some(*key))
}

impl BookStore for InMemoryBookStore {
    fn list(&self, filter: LibraryFilter) -> StoreFuture<'_, Vec<LibraryBook>> {
        Box::pin(async move {
            Ok(self
                .books
                .read()
                .await
                .values()
                .filter(|book| filter.matches(book))
                .cloned()
                .collect())
        })
    }

    fn get(&self, id: String) -> StoreFuture<'_, LibraryBook> {
        Box::pin(async move {
            let books = self.books.read().await;
            position(&books, &id)
                .and_then(|key| books.get(&key).cloned())
                .ok_or(LibraryError::NotFound(id))
        })
    }

    fn add(&self, mut book: LibraryBook) -> StoreFuture<'_, LibraryBook> {
        Box::pin(async move {
            let key = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            if book.id.is_empty() {
                book.id = format!("book-{key}");
            }
            tracing::debug!(id = %book.id, title = %book.title, "Added library book");
            self.books.write().await.insert(key, book.clone());
            Ok(book)
        })
    }

    fn update(&self, id: String, update: BookUpdate) -> StoreFuture<'_, LibraryBook> {
        Box::pin(async move {
            let mut books = self.books.write().await;
            let book = position(&books, &id)
                .and_then(|key| books.get_mut(&key))
                .ok_or(LibraryError::NotFound(id))?;
            book.apply(&update);
            tracing::debug!(id = %book.id, "Updated library book");
            Ok(book.clone())
        })
    }

    fn remove(&self, id: String) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut books = self.books.write().await;
            let key = position(&books, &id).ok_or(LibraryError::NotFound(id))?;
            books.remove(&key);
            Ok(())
        })
    }
}

/// Books started and not finished (the "reading now" shelf)
#[must_use]
pub fn reading_now(books: &[LibraryBook]) -> Vec<LibraryBook> {
    books
        .iter()
        .filter(|book| book.reading_status() == ReadingStatus::Reading)
        .cloned()
        .collect()
}

/// Books saved but not started (the reading list)
#[must_use]
pub fn reading_list(books: &[LibraryBook]) -> Vec<LibraryBook> {
    books
        .iter()
        .filter(|book| book.reading_status() == ReadingStatus::NotStarted)
        .cloned()
        .collect()
}
