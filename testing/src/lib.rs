//! # Reader Testing
//!
//! Testing utilities for the Reader fetch coordination layer.
//!
//! This crate provides:
//! - `ScriptedFetcher`: a fetch collaborator whose calls park until the test
//!   resolves them, so completion order is fully under the test's control
//! - `RecordingObserver`: an observer that records every published state
//! - Fixtures for book search hits and library records
//!
//! ## Example
//!
//! ```ignore
//! use reader_testing::{RecordingObserver, ScriptedFetcher};
//! use reader_runtime::FetchCoordinator;
//!
//! #[tokio::test]
//! async fn test_latest_wins() {
//!     let fetcher = ScriptedFetcher::<String, u32>::new();
//!     let coordinator = FetchCoordinator::new(fetcher.clone());
//!     let recorder = RecordingObserver::new();
//!     let _sub = coordinator.subscribe(recorder.observer());
//!
//!     let first = coordinator.submit("a".into()).unwrap();
//!     let second = coordinator.submit("ab".into()).unwrap();
//!
//!     fetcher.succeed(1, 2);
//!     second.wait().await.unwrap();
//!     fetcher.succeed(0, 1);
//!     first.wait().await.unwrap();
//!
//!     assert_eq!(coordinator.current_state().into_data(), Some(2));
//! }
//! ```

use chrono::{DateTime, Utc};

/// Mock collaborators for tests
pub mod mocks {
    use futures::future::BoxFuture;
    use reader_core::error::FetchError;
    use reader_core::fetch::Fetcher;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use std::time::Duration;
    use tokio::sync::{Notify, oneshot};

    /// A fetch collaborator driven by the test
    ///
    /// Every call records its query and returns a future that stays pending
    /// until the test resolves that call by index (0 for the first call). A
    /// call whose responder is dropped resolves to a transport error.
    ///
    /// Clones share the same call log, so keep one clone in the test and hand
    /// another to the coordinator.
    pub struct ScriptedFetcher<Q, T> {
        inner: Arc<ScriptInner<Q, T>>,
    }

    struct ScriptInner<Q, T> {
        calls: Mutex<Vec<PendingCall<Q, T>>>,
        notify: Notify,
    }

    struct PendingCall<Q, T> {
        query: Q,
        responder: Option<oneshot::Sender<Result<T, FetchError>>>,
    }

    impl<Q, T> Clone for ScriptedFetcher<Q, T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<Q, T> Default for ScriptedFetcher<Q, T> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<Q, T> ScriptedFetcher<Q, T> {
        /// Create a fetcher with no recorded calls
        #[must_use]
        pub fn new() -> Self {
            Self {
                inner: Arc::new(ScriptInner {
                    calls: Mutex::new(Vec::new()),
                    notify: Notify::new(),
                }),
            }
        }

        fn lock(&self) -> MutexGuard<'_, Vec<PendingCall<Q, T>>> {
            self.inner.calls.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Number of fetch calls made so far
        #[must_use]
        pub fn call_count(&self) -> usize {
            self.lock().len()
        }

        /// Queries of all calls, in call order
        #[must_use]
        pub fn calls(&self) -> Vec<Q>
        where
            Q: Clone,
        {
            self.lock().iter().map(|call| call.query.clone()).collect()
        }

        /// Number of calls not resolved yet
        #[must_use]
        pub fn pending(&self) -> usize {
            self.lock()
                .iter()
                .filter(|call| call.responder.is_some())
                .count()
        }

        /// Resolve call `index` with `result`
        ///
        /// Returns `false` if there is no such call or it was already resolved.
        /// Resolving a call whose future was dropped (e.g. an aborted task)
        /// still returns `true`.
        pub fn resolve(&self, index: usize, result: Result<T, FetchError>) -> bool {
            let responder = self
                .lock()
                .get_mut(index)
                .and_then(|call| call.responder.take());
            responder.is_some_and(|tx| {
                let _ = tx.send(result);
                true
            })
        }

        /// Resolve call `index` with data
        pub fn succeed(&self, index: usize, data: T) -> bool {
            self.resolve(index, Ok(data))
        }

        /// Resolve call `index` with an error
        pub fn fail(&self, index: usize, error: FetchError) -> bool {
            self.resolve(index, Err(error))
        }

        /// Wait until at least `count` calls have been made
        ///
        /// Returns `false` if `timeout` elapses first.
        pub async fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
            tokio::time::timeout(timeout, async {
                while self.call_count() < count {
                    self.inner.notify.notified().await;
                }
            })
            .await
            .is_ok()
        }
    }

    impl<Q, T> Fetcher<Q, T> for ScriptedFetcher<Q, T>
    where
        Q: Send + 'static,
        T: Send + 'static,
    {
        fn fetch(&self, query: Q) -> BoxFuture<'static, Result<T, FetchError>> {
            let (tx, rx) = oneshot::channel();
            self.lock().push(PendingCall {
                query,
                responder: Some(tx),
            });
            self.inner.notify.notify_one();

            Box::pin(async move {
                rx.await.unwrap_or_else(|_| {
                    Err(FetchError::Transport(
                        "scripted call dropped without a response".to_string(),
                    ))
                })
            })
        }
    }

    /// A fetch collaborator that answers every call immediately
    ///
    /// `respond` maps the query to the result; every query is recorded.
    pub struct InstantFetcher<Q, T> {
        respond: Arc<dyn Fn(&Q) -> Result<T, FetchError> + Send + Sync>,
        calls: Arc<Mutex<Vec<Q>>>,
    }

    impl<Q, T> Clone for InstantFetcher<Q, T> {
        fn clone(&self) -> Self {
            Self {
                respond: Arc::clone(&self.respond),
                calls: Arc::clone(&self.calls),
            }
        }
    }

    impl<Q, T> InstantFetcher<Q, T> {
        /// Create a fetcher answering with `respond`
        pub fn new<F>(respond: F) -> Self
        where
            F: Fn(&Q) -> Result<T, FetchError> + Send + Sync + 'static,
        {
            Self {
                respond: Arc::new(respond),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Queries of all calls, in call order
        #[must_use]
        pub fn calls(&self) -> Vec<Q>
        where
            Q: Clone,
        {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Number of fetch calls made so far
        #[must_use]
        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
        }
    }

    impl<Q, T> Fetcher<Q, T> for InstantFetcher<Q, T>
    where
        Q: Send + 'static,
        T: Send + 'static,
    {
        fn fetch(&self, query: Q) -> BoxFuture<'static, Result<T, FetchError>> {
            let result = (self.respond)(&query);
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(query);
            Box::pin(async move { result })
        }
    }
}

/// Observers that record what a coordinator publishes
pub mod observers {
    use reader_core::{RequestState, Status};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Records every state delivered to it
    ///
    /// # Example
    ///
    /// ```
    /// use reader_core::RequestState;
    /// use reader_testing::RecordingObserver;
    ///
    /// let recorder = RecordingObserver::<u32>::new();
    /// let observer = recorder.observer();
    /// observer(&RequestState::loading());
    /// observer(&RequestState::success(7));
    ///
    /// assert_eq!(recorder.len(), 2);
    /// assert_eq!(recorder.successes(), vec![7]);
    /// ```
    pub struct RecordingObserver<T> {
        inner: Arc<Recording<T>>,
    }

    struct Recording<T> {
        states: Mutex<Vec<RequestState<T>>>,
        notify: Notify,
    }

    impl<T> Clone for RecordingObserver<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<T> Default for RecordingObserver<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<T> RecordingObserver<T> {
        /// Create an empty recorder
        #[must_use]
        pub fn new() -> Self {
            Self {
                inner: Arc::new(Recording {
                    states: Mutex::new(Vec::new()),
                    notify: Notify::new(),
                }),
            }
        }

        fn lock(&self) -> MutexGuard<'_, Vec<RequestState<T>>> {
            self.inner.states.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Callback to pass to `FetchCoordinator::subscribe`
        pub fn observer(&self) -> impl Fn(&RequestState<T>) + Send + Sync + 'static
        where
            T: Clone + Send + 'static,
        {
            let inner = Arc::clone(&self.inner);
            move |state: &RequestState<T>| {
                inner
                    .states
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(state.clone());
                inner.notify.notify_one();
            }
        }

        /// Every recorded state, in delivery order
        #[must_use]
        pub fn states(&self) -> Vec<RequestState<T>>
        where
            T: Clone,
        {
            self.lock().clone()
        }

        /// Status of every recorded state, in delivery order
        #[must_use]
        pub fn statuses(&self) -> Vec<Status> {
            self.lock().iter().map(RequestState::status).collect()
        }

        /// Data of every recorded success, in delivery order
        #[must_use]
        pub fn successes(&self) -> Vec<T>
        where
            T: Clone,
        {
            self.lock().iter().filter_map(|s| s.data().cloned()).collect()
        }

        /// The most recent recorded state
        #[must_use]
        pub fn last(&self) -> Option<RequestState<T>>
        where
            T: Clone,
        {
            self.lock().last().cloned()
        }

        /// Number of recorded states
        #[must_use]
        pub fn len(&self) -> usize {
            self.lock().len()
        }

        /// Check if nothing was recorded
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.lock().is_empty()
        }

        /// Wait until the recorded states satisfy `predicate`
        ///
        /// Returns `false` if `timeout` elapses first.
        pub async fn wait_until<F>(&self, predicate: F, timeout: Duration) -> bool
        where
            F: Fn(&[RequestState<T>]) -> bool,
        {
            tokio::time::timeout(timeout, async {
                while !predicate(&self.lock()) {
                    self.inner.notify.notified().await;
                }
            })
            .await
            .is_ok()
        }
    }
}

/// Fixtures for book search hits and library records
pub mod fixtures {
    use super::{DateTime, Utc};
    use reader_core::book::{BookItem, ImageLinks, LibraryBook, VolumeInfo};

    /// A search hit with the given id and title
    #[must_use]
    pub fn book_item(id: &str, title: &str) -> BookItem {
        BookItem {
            id: id.to_string(),
            volume_info: VolumeInfo {
                title: title.to_string(),
                authors: vec!["Test Author".to_string()],
                published_date: Some("2020-01-01".to_string()),
                page_count: Some(320),
                categories: vec!["Fiction".to_string()],
                image_links: Some(ImageLinks {
                    small_thumbnail: format!("http://books.example.com/{id}.jpg"),
                    thumbnail: String::new(),
                }),
                ..VolumeInfo::default()
            },
        }
    }

    /// A library record saved from [`book_item`] by `user_id`
    #[must_use]
    pub fn library_book(id: &str, title: &str, user_id: &str) -> LibraryBook {
        LibraryBook {
            id: id.to_string(),
            ..LibraryBook::from_item(&book_item(&format!("g-{id}"), title), user_id)
        }
    }

    /// Fixed timestamp for deterministic tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }
}

/// Install a test-friendly tracing subscriber
///
/// Honors `RUST_LOG`; safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use fixtures::{book_item, library_book, test_time};
pub use mocks::{InstantFetcher, ScriptedFetcher};
pub use observers::RecordingObserver;

#[cfg(test)]
mod tests {
    use super::*;
    use reader_core::error::FetchError;
    use reader_core::fetch::Fetcher;
    use reader_core::{RequestState, Status};
    use std::time::Duration;

    #[tokio::test]
    async fn test_scripted_fetcher_resolves_out_of_order() {
        let fetcher = ScriptedFetcher::<&'static str, u32>::new();
        let first = fetcher.fetch("a");
        let second = fetcher.fetch("b");

        assert_eq!(fetcher.calls(), vec!["a", "b"]);
        assert_eq!(fetcher.pending(), 2);

        assert!(fetcher.succeed(1, 2));
        assert_eq!(second.await, Ok(2));
        assert!(fetcher.fail(0, FetchError::NotFound("a".into())));
        assert_eq!(first.await, Err(FetchError::NotFound("a".into())));

        assert!(!fetcher.succeed(0, 9));
        assert!(!fetcher.succeed(5, 9));
        assert_eq!(fetcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_scripted_fetcher_dropped_responder() {
        let fetcher = ScriptedFetcher::<u8, u8>::new();
        let call = fetcher.fetch(1);
        drop(fetcher);
        // Dropping the fetcher drops the pending responder
        assert!(matches!(call.await, Err(FetchError::Transport(_))));
    }

    #[tokio::test]
    async fn test_wait_for_calls() {
        let fetcher = ScriptedFetcher::<u8, u8>::new();
        let background = fetcher.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _pending = background.fetch(1);
        });
        assert!(fetcher.wait_for_calls(1, Duration::from_secs(1)).await);
        assert!(!fetcher.wait_for_calls(2, Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_instant_fetcher() {
        let fetcher = InstantFetcher::new(|q: &u32| Ok::<_, FetchError>(q + 1));
        assert_eq!(fetcher.fetch(1).await, Ok(2));
        assert_eq!(fetcher.calls(), vec![1]);
    }

    #[tokio::test]
    async fn test_recording_observer_wait_until() {
        let recorder = RecordingObserver::<u32>::new();
        let observer = recorder.observer();
        tokio::spawn(async move {
            observer(&RequestState::loading());
            observer(&RequestState::success(3));
        });

        let done = recorder
            .wait_until(|states| states.len() == 2, Duration::from_secs(1))
            .await;
        assert!(done);
        assert_eq!(recorder.statuses(), vec![Status::Loading, Status::Success]);
        assert_eq!(recorder.last(), Some(RequestState::success(3)));
    }

    #[test]
    fn test_fixtures() {
        let book = library_book("doc-1", "Dune", "user-1");
        assert_eq!(book.id, "doc-1");
        assert_eq!(book.google_book_id, "g-doc-1");
        assert!(book.photo_url.starts_with("https://"));
        assert_eq!(test_time(), test_time());
    }
}
