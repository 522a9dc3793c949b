//! Screen models
//!
//! Each screen owns one [`FetchCoordinator`] for its query context, so a
//! search typed on the search screen can never overwrite the details shown on
//! another. Models expose `subscribe`, `current_state` and `dispose`, and add
//! the screen's own actions on top.

use crate::client::BooksApiClient;
use crate::config::BooksConfig;
use crate::error::ScreenError;
use crate::library::{self, BookStore, LibraryFilter};
use reader_core::RequestState;
use reader_core::book::{BookItem, BookUpdate, LibraryBook};
use reader_core::error::{FetchError, ValidationError};
use reader_core::fetch::Fetcher;
use reader_core::query::{non_blank_text, predicate};
use reader_runtime::{CoordinatorConfig, FetchCoordinator, FetchHandle, Subscription};
use std::sync::Arc;

/// Observer plumbing shared by every screen model
macro_rules! screen_state {
    ($query:ty, $data:ty) => {
        /// Register an observer for this screen's request state
        pub fn subscribe<F>(&self, observer: F) -> Subscription
        where
            F: Fn(&RequestState<$data>) + Send + Sync + 'static,
        {
            self.coordinator.subscribe(observer)
        }

        /// Snapshot of this screen's request state
        #[must_use]
        pub fn current_state(&self) -> RequestState<$data> {
            self.coordinator.current_state()
        }

        /// The screen's coordinator
        #[must_use]
        pub const fn coordinator(&self) -> &FetchCoordinator<$query, $data> {
            &self.coordinator
        }

        /// Tear the screen down; in-flight fetches are abandoned
        pub fn dispose(&self) {
            self.coordinator.dispose();
        }
    };
}

// ============================================================================
// Search
// ============================================================================

/// Search screen: volumes matching the typed term
pub struct SearchModel {
    coordinator: FetchCoordinator<String, Vec<BookItem>>,
    default_query: String,
}

impl SearchModel {
    /// Create a search screen around any search fetcher
    #[must_use]
    pub fn new<F>(fetcher: F, default_query: impl Into<String>) -> Self
    where
        F: Fetcher<String, Vec<BookItem>>,
    {
        Self {
            coordinator: FetchCoordinator::builder(fetcher)
                .config(CoordinatorConfig::new("search"))
                .validator(non_blank_text())
                .build(),
            default_query: default_query.into(),
        }
    }

    /// Create a search screen backed by the search API
    #[must_use]
    pub fn from_client(client: &BooksApiClient, config: &BooksConfig) -> Self {
        Self::new(client.clone(), config.default_query.clone())
    }

    /// Run the search the screen shows when it opens
    ///
    /// # Errors
    ///
    /// Returns error if the default term is blank or the coordinator refuses it
    pub fn load_default(&self) -> Result<FetchHandle, ScreenError> {
        self.search(&self.default_query)
    }

    /// Search for `query`, ignoring surrounding whitespace
    ///
    /// # Errors
    ///
    /// Returns error if `query` is blank or the coordinator refuses it
    pub fn search(&self, query: &str) -> Result<FetchHandle, ScreenError> {
        Ok(self.coordinator.submit(query.trim().to_string())?)
    }

    /// Term loaded by [`load_default()`](Self::load_default)
    #[must_use]
    pub fn default_query(&self) -> &str {
        &self.default_query
    }

    screen_state!(String, Vec<BookItem>);
}

// ============================================================================
// Library (home screen)
// ============================================================================

/// Home screen: the personal library
pub struct LibraryModel {
    coordinator: FetchCoordinator<LibraryFilter, Vec<LibraryBook>>,
}

impl LibraryModel {
    /// Create a library screen over `store`
    #[must_use]
    pub fn new(store: Arc<dyn BookStore>) -> Self {
        let fetcher = move |filter: LibraryFilter| {
            let store = Arc::clone(&store);
            async move { store.list(filter).await.map_err(FetchError::from) }
        };

        Self {
            coordinator: FetchCoordinator::builder(fetcher)
                .config(CoordinatorConfig::new("library"))
                .validator(predicate("user id cannot be blank", |filter: &LibraryFilter| {
                    filter
                        .user_id
                        .as_deref()
                        .is_none_or(|user| !user.trim().is_empty())
                }))
                .build(),
        }
    }

    /// Load every record in the library
    ///
    /// # Errors
    ///
    /// Returns error if the coordinator has been disposed
    pub fn reload(&self) -> Result<FetchHandle, ScreenError> {
        Ok(self.coordinator.submit(LibraryFilter::all())?)
    }

    /// Load the records owned by `user_id`
    ///
    /// # Errors
    ///
    /// Returns error if `user_id` is blank or the coordinator refuses the query
    pub fn for_user(&self, user_id: &str) -> Result<FetchHandle, ScreenError> {
        Ok(self.coordinator.submit(LibraryFilter::for_user(user_id))?)
    }

    /// "Reading now" shelf of the loaded library (empty unless loaded)
    #[must_use]
    pub fn reading_now(&self) -> Vec<LibraryBook> {
        self.current_state()
            .data()
            .map(|books| library::reading_now(books))
            .unwrap_or_default()
    }

    /// Reading list of the loaded library (empty unless loaded)
    #[must_use]
    pub fn reading_list(&self) -> Vec<LibraryBook> {
        self.current_state()
            .data()
            .map(|books| library::reading_list(books))
            .unwrap_or_default()
    }

    screen_state!(LibraryFilter, Vec<LibraryBook>);
}

/// Name shown in the home screen header: the local part of the email
///
/// ```
/// use reader_books::screens::display_name;
///
/// assert_eq!(display_name(Some("ada@example.com")), "ada");
/// assert_eq!(display_name(None), "N/A");
/// ```
#[must_use]
pub fn display_name(email: Option<&str>) -> String {
    email
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .and_then(|email| email.split('@').next())
        .map_or_else(|| "N/A".to_string(), ToString::to_string)
}

// ============================================================================
// Details
// ============================================================================

/// Details screen: one volume looked up by id
pub struct DetailsModel {
    coordinator: FetchCoordinator<String, BookItem>,
}

impl DetailsModel {
    /// Create a details screen around any volume fetcher
    #[must_use]
    pub fn new<F>(fetcher: F) -> Self
    where
        F: Fetcher<String, BookItem>,
    {
        Self {
            coordinator: FetchCoordinator::builder(fetcher)
                .config(CoordinatorConfig::new("details"))
                .validator(non_blank_text())
                .build(),
        }
    }

    /// Create a details screen backed by the search API
    #[must_use]
    pub fn from_client(client: &BooksApiClient) -> Self {
        Self::new(client.volume_fetcher())
    }

    /// Show the volume with id `book_id`
    ///
    /// # Errors
    ///
    /// Returns error if `book_id` is blank or the coordinator refuses it
    pub fn show(&self, book_id: &str) -> Result<FetchHandle, ScreenError> {
        Ok(self.coordinator.submit(book_id.trim().to_string())?)
    }

    /// Save the shown volume to `user_id`'s library
    ///
    /// # Errors
    ///
    /// - `ScreenError::NothingLoaded` unless a volume is shown
    /// - `ScreenError::Library` if the store write fails
    pub async fn save_to_library(
        &self,
        store: &dyn BookStore,
        user_id: &str,
    ) -> Result<LibraryBook, ScreenError> {
        let item = self
            .current_state()
            .into_data()
            .ok_or(ScreenError::NothingLoaded("details"))?;
        let saved = store.add(LibraryBook::from_item(&item, user_id)).await?;
        tracing::info!(id = %saved.id, google_book_id = %saved.google_book_id, "Saved book to library");
        Ok(saved)
    }

    screen_state!(String, BookItem);
}

// ============================================================================
// Update
// ============================================================================

/// Update screen: one library record, found by the search volume it was saved from
pub struct UpdateModel {
    coordinator: FetchCoordinator<String, LibraryBook>,
    store: Arc<dyn BookStore>,
}

impl UpdateModel {
    /// Create an update screen for `user_id`'s records in `store`
    #[must_use]
    pub fn new(store: Arc<dyn BookStore>, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let lookup_store = Arc::clone(&store);
        let fetcher = move |google_book_id: String| {
            let store = Arc::clone(&lookup_store);
            let filter = LibraryFilter::for_user(user_id.clone()).with_google_book_id(google_book_id.clone());
            async move {
                store
                    .list(filter)
                    .await
                    .map_err(FetchError::from)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| FetchError::NotFound(format!("library book for volume {google_book_id}")))
            }
        };

        Self {
            coordinator: FetchCoordinator::builder(fetcher)
                .config(CoordinatorConfig::new("update"))
                .validator(non_blank_text())
                .build(),
            store,
        }
    }

    /// Show the record saved from volume `google_book_id`
    ///
    /// # Errors
    ///
    /// Returns error if the id is blank or the coordinator refuses it
    pub fn show(&self, google_book_id: &str) -> Result<FetchHandle, ScreenError> {
        Ok(self.coordinator.submit(google_book_id.trim().to_string())?)
    }

    /// Write `update` to the shown record, then reload it
    ///
    /// Notes are trimmed; blank notes and empty updates are rejected. The
    /// returned handle tracks the reload that publishes the persisted record.
    ///
    /// # Errors
    ///
    /// - `ScreenError::Validation` for an empty update or blank notes
    /// - `ScreenError::NothingLoaded` unless a record is shown
    /// - `ScreenError::Library` if the store write fails
    pub async fn save(&self, mut update: BookUpdate) -> Result<FetchHandle, ScreenError> {
        if update.is_empty() {
            return Err(ValidationError::Rejected("nothing to update".to_string()).into());
        }
        if let Some(notes) = update.notes.take() {
            let notes = notes.trim();
            if notes.is_empty() {
                return Err(ValidationError::Blank.into());
            }
            update.notes = Some(notes.to_string());
        }

        let record = self.loaded()?;
        self.store.update(record.id.clone(), update).await?;
        tracing::debug!(id = %record.id, "Saved library book update");
        Ok(self.coordinator.submit(record.google_book_id)?)
    }

    /// Delete the shown record, then reload
    ///
    /// The reload publishes a not-found failure once the record is gone.
    ///
    /// # Errors
    ///
    /// - `ScreenError::NothingLoaded` unless a record is shown
    /// - `ScreenError::Library` if the store delete fails
    pub async fn remove(&self) -> Result<FetchHandle, ScreenError> {
        let record = self.loaded()?;
        self.store.remove(record.id.clone()).await?;
        tracing::info!(id = %record.id, "Removed library book");
        Ok(self.coordinator.submit(record.google_book_id)?)
    }

    fn loaded(&self) -> Result<LibraryBook, ScreenError> {
        self.current_state()
            .into_data()
            .ok_or(ScreenError::NothingLoaded("update"))
    }

    screen_state!(String, LibraryBook);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::InMemoryBookStore;
    use reader_core::{ErrorKind, Status};
    use reader_runtime::CoordinatorError;
    use reader_testing::{RecordingObserver, ScriptedFetcher, book_item, library_book, test_time};

    #[tokio::test]
    async fn test_search_loads_default_term() {
        let fetcher = ScriptedFetcher::new();
        let search = SearchModel::new(fetcher.clone(), "android");

        let handle = search.load_default().unwrap();
        assert_eq!(fetcher.calls(), vec!["android".to_string()]);
        fetcher.succeed(0, vec![book_item("a1", "Android Basics")]);
        assert!(handle.wait().await.unwrap().is_applied());

        let books = search.current_state().into_data().unwrap();
        assert_eq!(books[0].volume_info.title, "Android Basics");
    }

    #[tokio::test]
    async fn test_search_trims_and_rejects_blank() {
        let fetcher = ScriptedFetcher::<String, Vec<BookItem>>::new();
        let search = SearchModel::new(fetcher.clone(), "android");

        let _handle = search.search("  dune ").unwrap();
        assert_eq!(fetcher.calls(), vec!["dune".to_string()]);

        let err = search.search("   ").unwrap_err();
        assert!(matches!(
            err,
            ScreenError::Coordinator(CoordinatorError::Validation(ValidationError::Blank))
        ));
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_library_shelves() {
        let store = InMemoryBookStore::new();
        let mut reading = library_book("a", "Dune", "user-1");
        reading.started_reading = Some(test_time());
        store.add(reading).await.unwrap();
        store.add(library_book("b", "Emma", "user-1")).await.unwrap();
        store.add(library_book("c", "Ubik", "user-2")).await.unwrap();

        let library = LibraryModel::new(Arc::new(store));
        assert!(library.reading_now().is_empty());

        library.for_user("user-1").unwrap().wait().await.unwrap();
        assert_eq!(library.current_state().into_data().map(|b| b.len()), Some(2));
        assert_eq!(library.reading_now()[0].title, "Dune");
        assert_eq!(library.reading_list()[0].title, "Emma");

        library.reload().unwrap().wait().await.unwrap();
        assert_eq!(library.current_state().into_data().map(|b| b.len()), Some(3));

        assert!(matches!(
            library.for_user(" "),
            Err(ScreenError::Coordinator(CoordinatorError::Validation(ValidationError::Rejected(_))))
        ));
    }

    #[tokio::test]
    async fn test_details_save_to_library() {
        let fetcher = ScriptedFetcher::new();
        let details = DetailsModel::new(fetcher.clone());
        let store = InMemoryBookStore::new();

        assert!(matches!(
            details.save_to_library(&store, "user-1").await,
            Err(ScreenError::NothingLoaded("details"))
        ));

        let handle = details.show("vol-1").unwrap();
        fetcher.succeed(0, book_item("vol-1", "Dune"));
        handle.wait().await.unwrap();

        let saved = details.save_to_library(&store, "user-1").await.unwrap();
        assert_eq!(saved.google_book_id, "vol-1");
        assert_eq!(saved.user_id, "user-1");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_save_reloads_persisted_record() {
        let store = Arc::new(InMemoryBookStore::new());
        store.add(library_book("doc-1", "Dune", "user-1")).await.unwrap();

        let update = UpdateModel::new(store.clone(), "user-1");
        let recorder = RecordingObserver::new();
        let _sub = update.subscribe(recorder.observer());

        update.show("g-doc-1").unwrap().wait().await.unwrap();
        assert_eq!(update.current_state().into_data().map(|b| b.id), Some("doc-1".into()));

        let handle = update
            .save(BookUpdate::default().with_notes("  loved it ").with_rating(4.5))
            .await
            .unwrap();
        handle.wait().await.unwrap();

        let book = update.current_state().into_data().unwrap();
        assert_eq!(book.notes, "loved it");
        assert!((book.rating - 4.5).abs() < f64::EPSILON);
        assert_eq!(
            recorder.statuses(),
            vec![
                Status::Loading,
                Status::Loading,
                Status::Success,
                Status::Loading,
                Status::Success,
            ]
        );
    }

    #[tokio::test]
    async fn test_update_rejects_empty_and_blank() {
        let store = Arc::new(InMemoryBookStore::new());
        let update = UpdateModel::new(store, "user-1");

        assert!(matches!(
            update.save(BookUpdate::default()).await,
            Err(ScreenError::Validation(ValidationError::Rejected(_)))
        ));
        assert!(matches!(
            update.save(BookUpdate::default().with_notes("   ")).await,
            Err(ScreenError::Validation(ValidationError::Blank))
        ));
        assert!(matches!(
            update.save(BookUpdate::default().with_notes("ok")).await,
            Err(ScreenError::NothingLoaded("update"))
        ));
    }

    #[tokio::test]
    async fn test_update_remove_publishes_not_found() {
        let store = Arc::new(InMemoryBookStore::new());
        store.add(library_book("doc-1", "Dune", "user-1")).await.unwrap();
        let update = UpdateModel::new(store.clone(), "user-1");

        update.show("g-doc-1").unwrap().wait().await.unwrap();
        update.remove().await.unwrap().wait().await.unwrap();

        let state = update.current_state();
        assert_eq!(state.error().map(|f| f.kind), Some(ErrorKind::NotFound));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_lookup_is_scoped_to_user() {
        let store = Arc::new(InMemoryBookStore::new());
        store.add(library_book("doc-1", "Dune", "someone-else")).await.unwrap();
        let update = UpdateModel::new(store, "user-1");

        update.show("g-doc-1").unwrap().wait().await.unwrap();
        assert!(update.current_state().is_failed());
    }

    #[tokio::test]
    async fn test_dispose_rejects_further_queries() {
        let search = SearchModel::new(ScriptedFetcher::new(), "android");
        search.dispose();
        assert!(matches!(
            search.load_default(),
            Err(ScreenError::Coordinator(CoordinatorError::Disposed))
        ));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(Some("reader@example.com")), "reader");
        assert_eq!(display_name(Some("  ")), "N/A");
        assert_eq!(display_name(None), "N/A");
    }
}
