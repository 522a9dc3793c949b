//! Latest-request-wins fetch coordinator.
//!
//! # Ordering
//!
//! Each accepted submission gets the next sequence number `n` and publishes
//! a loading state right away. When its fetch finishes, the result is
//! published only if `n` is still the newest sequence issued and is greater
//! than the last applied sequence. Anything else is discarded without a
//! publication, so observers never see a result older than one already
//! delivered.
//!
//! # Delivery
//!
//! `sequence`, `latest_applied`, `current` and the subscriber list live
//! behind one mutex; every read-modify-write on them is a single critical
//! section. Publications are appended to an ordered outbox while that lock is
//! held and delivered after it is released by whichever thread gets to drain
//! the outbox first. This keeps delivery in publication order for every
//! observer, and lets observers call back into the coordinator (for example
//! to submit a follow-up query) without deadlocking.

use crate::metrics::CoordinatorMetrics;
use crate::{CoordinatorConfig, CoordinatorError, FetchHandle, FetchOutcome, InFlightGuard};
use futures::FutureExt;
use reader_core::fetch::Fetcher;
use reader_core::query::{QueryValidator, accept_all};
use reader_core::{ErrorKind, RequestState};
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;
use tokio::task::AbortHandle;

/// Observer callback registered through [`FetchCoordinator::subscribe()`]
type Observer<T> = Arc<dyn Fn(&RequestState<T>) + Send + Sync>;

/// Owns the current [`RequestState`] for one query context and publishes
/// only the outcome of the most recently submitted query.
///
/// A coordinator is a cheap handle: clones share the same state. Create one
/// per search box or data panel and [`dispose()`](Self::dispose) it when that
/// context goes away.
///
/// # Type Parameters
///
/// - `Q`: Query type
/// - `T`: Fetched value, cloned into every published state
///
/// # Example
///
/// ```ignore
/// let details = FetchCoordinator::builder(volume_fetcher)
///     .config(CoordinatorConfig::new("details"))
///     .validator(non_blank_text())
///     .build();
///
/// let _subscription = details.subscribe(|state| match state {
///     RequestState::Loading => show_spinner(),
///     RequestState::Success(book) => show_book(book),
///     RequestState::Failed(failure) => show_error(&failure.message),
/// });
///
/// details.submit(book_id)?;
/// ```
pub struct FetchCoordinator<Q, T> {
    inner: Arc<Inner<Q, T>>,
}

impl<Q, T> Clone for FetchCoordinator<Q, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Builder for [`FetchCoordinator`]
pub struct FetchCoordinatorBuilder<Q, T> {
    fetcher: Arc<dyn Fetcher<Q, T>>,
    validator: QueryValidator<Q>,
    config: CoordinatorConfig,
    initial_state: RequestState<T>,
}

impl<Q, T> FetchCoordinatorBuilder<Q, T>
where
    Q: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Reject queries that fail `validator` before any fetch is issued
    #[must_use]
    pub fn validator(mut self, validator: QueryValidator<Q>) -> Self {
        self.validator = validator;
        self
    }

    /// Use a custom configuration
    #[must_use]
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// State reported before the first submission (loading by default)
    #[must_use]
    pub fn initial_state(mut self, state: RequestState<T>) -> Self {
        self.initial_state = state;
        self
    }

    /// Build the coordinator
    #[must_use]
    pub fn build(self) -> FetchCoordinator<Q, T> {
        tracing::debug!(coordinator = %self.config.name, "Creating fetch coordinator");
        FetchCoordinator {
            inner: Arc::new(Inner {
                fetcher: self.fetcher,
                validator: self.validator,
                config: self.config,
                state: Mutex::new(CoordinatorState {
                    sequence: 0,
                    latest_applied: 0,
                    current: self.initial_state,
                    version: 0,
                    subscribers: Vec::new(),
                    next_subscriber_id: 0,
                    disposed: false,
                    newest_task: None,
                }),
                outbox: Mutex::new(Outbox {
                    queue: VecDeque::new(),
                    draining: false,
                }),
                in_flight: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }
}

impl<Q, T> FetchCoordinator<Q, T>
where
    Q: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Create a coordinator that accepts every query
    #[must_use]
    pub fn new<F>(fetcher: F) -> Self
    where
        F: Fetcher<Q, T>,
    {
        Self::builder(fetcher).build()
    }

    /// Start building a coordinator around `fetcher`
    #[must_use]
    pub fn builder<F>(fetcher: F) -> FetchCoordinatorBuilder<Q, T>
    where
        F: Fetcher<Q, T>,
    {
        FetchCoordinatorBuilder {
            fetcher: Arc::new(fetcher),
            validator: accept_all(),
            config: CoordinatorConfig::default(),
            initial_state: RequestState::loading(),
        }
    }

    /// Submit a query
    ///
    /// Publishes a loading state immediately, then runs the fetch on a worker
    /// task. The result is published only if no newer query has been submitted
    /// by the time it arrives. Submitting the same query twice issues two
    /// fetches; nothing is cached.
    ///
    /// # Errors
    ///
    /// Returned synchronously, with no state change and no fetch issued:
    ///
    /// - [`CoordinatorError::Validation`] if the query fails the validity check
    /// - [`CoordinatorError::Disposed`] after [`dispose()`](Self::dispose)
    /// - [`CoordinatorError::NoRuntime`] when called outside a tokio runtime
    ///
    /// Fetch failures are never returned here; they are published as
    /// [`RequestState::Failed`].
    #[tracing::instrument(skip(self, query), fields(coordinator = %self.inner.config.name))]
    pub fn submit(&self, query: Q) -> Result<FetchHandle, CoordinatorError> {
        let name = &self.inner.config.name;

        if let Err(error) = (self.inner.validator)(&query) {
            tracing::debug!(%error, "Rejected query");
            CoordinatorMetrics::record_rejection(name);
            return Err(CoordinatorError::Validation(error));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            tracing::warn!("Rejected query: no tokio runtime");
            CoordinatorError::NoRuntime
        })?;

        let (sequence, superseded) = {
            let mut state = self.inner.lock_state();
            if state.disposed {
                tracing::warn!("Rejected query: coordinator disposed");
                return Err(CoordinatorError::Disposed);
            }

            state.sequence += 1;
            let sequence = state.sequence;
            state.current = RequestState::loading();
            let version = state.next_version();
            self.inner.enqueue(Delivery::Broadcast {
                version,
                state: RequestState::loading(),
            });

            (sequence, state.newest_task.take())
        };
        self.inner.drain();

        CoordinatorMetrics::record_submission(name);
        tracing::debug!(sequence, "Submitted query");

        if self.inner.config.abort_superseded {
            if let Some(task) = superseded {
                tracing::trace!("Aborting superseded fetch");
                task.abort();
            }
        }

        let fetcher = Arc::clone(&self.inner.fetcher);
        let weak = Arc::downgrade(&self.inner);
        let guard = InFlightGuard::enter(&self.inner.in_flight);
        let coordinator = name.clone();

        let task = runtime.spawn(async move {
            let _guard = guard;
            let start = Instant::now();

            // Building the future runs the fetcher's synchronous part, so it
            // sits under the same unwind guard as the future itself.
            let fetch = async move { fetcher.fetch(query).await };
            let result = match AssertUnwindSafe(fetch).catch_unwind().await {
                Ok(Ok(data)) => RequestState::success(data),
                Ok(Err(error)) => {
                    tracing::debug!(%coordinator, sequence, %error, "Fetch failed");
                    CoordinatorMetrics::record_failure(&coordinator, error.kind());
                    RequestState::Failed(error.into())
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::warn!(%coordinator, sequence, %message, "Fetch panicked");
                    CoordinatorMetrics::record_failure(&coordinator, ErrorKind::Internal);
                    RequestState::failed(ErrorKind::Internal, format!("fetch panicked: {message}"))
                }
            };
            CoordinatorMetrics::record_fetch_duration(&coordinator, start.elapsed());

            match weak.upgrade() {
                Some(inner) => inner.complete(sequence, result),
                None => {
                    tracing::trace!(%coordinator, sequence, "Coordinator dropped, discarding result");
                    FetchOutcome::Discarded
                }
            }
        });

        self.inner.track_task(sequence, task.abort_handle());

        Ok(FetchHandle::new(sequence, task))
    }

    /// Register an observer
    ///
    /// The observer receives the current state right after registration and
    /// then every later publication, in publication order. If a delivery is
    /// already in progress (on another thread, or because `subscribe` was
    /// called from an observer), the initial state is queued behind it and
    /// arrives after `subscribe` returns, still ahead of any newer publication.
    ///
    /// Observers run outside the coordinator's lock but should still hand
    /// long work elsewhere: they delay delivery to every other observer. A
    /// panicking observer is logged and skipped.
    ///
    /// Dropping the returned [`Subscription`] deregisters the observer. On a
    /// disposed coordinator the observer is never called.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&RequestState<T>) + Send + Sync + 'static,
    {
        let id = {
            let mut state = self.inner.lock_state();
            if state.disposed {
                return Subscription::inert();
            }

            let id = state.next_subscriber_id;
            state.next_subscriber_id += 1;
            let since_version = state.version;
            state.subscribers.push(Subscriber {
                id,
                since_version,
                observer: Arc::new(observer),
            });
            self.inner.enqueue(Delivery::Replay {
                subscriber: id,
                state: state.current.clone(),
            });
            id
        };
        self.inner.drain();

        tracing::trace!(coordinator = %self.inner.config.name, subscriber = id, "Observer registered");

        let registry: Arc<dyn Registry> = self.inner.clone();
        Subscription {
            id,
            registry: Some(Arc::downgrade(&registry)),
        }
    }

    /// Snapshot of the last published state
    #[must_use]
    pub fn current_state(&self) -> RequestState<T> {
        self.inner.lock_state().current.clone()
    }

    /// Sequence number of the most recent accepted submission (0 if none)
    #[must_use]
    pub fn latest_sequence(&self) -> u64 {
        self.inner.lock_state().sequence
    }

    /// Sequence number of the last result actually published (0 if none)
    #[must_use]
    pub fn latest_applied_sequence(&self) -> u64 {
        self.inner.lock_state().latest_applied
    }

    /// Number of registered observers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock_state().subscribers.len()
    }

    /// Number of fetch tasks still running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Check if [`dispose()`](Self::dispose) has been called
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.lock_state().disposed
    }

    /// Name from the coordinator's configuration
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Tear the coordinator down
    ///
    /// Deregisters every observer and rejects later submissions. In-flight
    /// fetches are abandoned, not cancelled: they run to completion and their
    /// results are discarded.
    pub fn dispose(&self) {
        let removed = {
            let mut state = self.inner.lock_state();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.newest_task = None;
            let removed = state.subscribers.len();
            state.subscribers.clear();
            removed
        };

        tracing::debug!(
            coordinator = %self.inner.config.name,
            removed_observers = removed,
            in_flight = self.in_flight(),
            "Coordinator disposed"
        );
    }
}

impl<Q, T> std::fmt::Debug for FetchCoordinator<Q, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("FetchCoordinator")
            .field("name", &self.inner.config.name)
            .field("sequence", &state.sequence)
            .field("latest_applied", &state.latest_applied)
            .field("status", &state.current.status())
            .field("subscribers", &state.subscribers.len())
            .field("in_flight", &self.inner.in_flight.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Observer registration returned by [`FetchCoordinator::subscribe()`]
///
/// Deregisters the observer when dropped. Keep it alive for as long as the
/// observer should receive publications.
#[must_use = "dropping a Subscription immediately deregisters its observer"]
pub struct Subscription {
    id: u64,
    registry: Option<Weak<dyn Registry>>,
}

impl Subscription {
    const fn inert() -> Self {
        Self {
            id: u64::MAX,
            registry: None,
        }
    }

    /// Deregister the observer now
    pub fn dispose(self) {
        drop(self);
    }

    /// Check if the observer is still registered with a live coordinator
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registry
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|registry| registry.is_registered(self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.take().and_then(|weak| weak.upgrade()) {
            registry.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Type-erased view of a coordinator used by [`Subscription`]
trait Registry: Send + Sync {
    fn unsubscribe(&self, id: u64);
    fn is_registered(&self, id: u64) -> bool;
}

struct Inner<Q, T> {
    fetcher: Arc<dyn Fetcher<Q, T>>,
    validator: QueryValidator<Q>,
    config: CoordinatorConfig,
    state: Mutex<CoordinatorState<T>>,
    outbox: Mutex<Outbox<T>>,
    in_flight: Arc<AtomicUsize>,
}

struct CoordinatorState<T> {
    /// Sequence of the newest accepted submission
    sequence: u64,
    /// Sequence of the last published result
    latest_applied: u64,
    current: RequestState<T>,
    /// Publication counter, bumped for every loading or result publication
    version: u64,
    subscribers: Vec<Subscriber<T>>,
    next_subscriber_id: u64,
    disposed: bool,
    /// Abort handle of the newest fetch task, for `abort_superseded`
    newest_task: Option<AbortHandle>,
}

impl<T> CoordinatorState<T> {
    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

struct Subscriber<T> {
    id: u64,
    /// Publications up to this version are covered by the replay sent on registration
    since_version: u64,
    observer: Observer<T>,
}

enum Delivery<T> {
    /// A publication for every observer registered before `version`
    Broadcast { version: u64, state: RequestState<T> },
    /// The current state replayed to one newly registered observer
    Replay { subscriber: u64, state: RequestState<T> },
}

struct Outbox<T> {
    queue: VecDeque<Delivery<T>>,
    /// Some thread is currently delivering from the queue
    draining: bool,
}

impl<Q, T> Inner<Q, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState<T>> {
        // Observers never run under this lock, so poisoning can only come from
        // a panic in our own bookkeeping; the state is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_outbox(&self) -> MutexGuard<'_, Outbox<T>> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a delivery; callers hold the state lock so the queue order
    /// matches publication order.
    fn enqueue(&self, delivery: Delivery<T>) {
        self.lock_outbox().queue.push_back(delivery);
    }

    /// Deliver queued publications unless another thread is already doing so
    fn drain(&self) {
        {
            let mut outbox = self.lock_outbox();
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }

        loop {
            let delivery = {
                let mut outbox = self.lock_outbox();
                if let Some(delivery) = outbox.queue.pop_front() {
                    delivery
                } else {
                    outbox.draining = false;
                    return;
                }
            };
            self.deliver(&delivery);
        }
    }

    fn deliver(&self, delivery: &Delivery<T>) {
        match delivery {
            Delivery::Broadcast { version, state } => {
                let observers: Vec<Observer<T>> = self
                    .lock_state()
                    .subscribers
                    .iter()
                    .filter(|subscriber| subscriber.since_version < *version)
                    .map(|subscriber| Arc::clone(&subscriber.observer))
                    .collect();
                for observer in observers {
                    self.notify(&observer, state);
                }
            }
            Delivery::Replay { subscriber, state } => {
                let observer = self
                    .lock_state()
                    .subscribers
                    .iter()
                    .find(|s| s.id == *subscriber)
                    .map(|s| Arc::clone(&s.observer));
                if let Some(observer) = observer {
                    self.notify(&observer, state);
                }
            }
        }
    }

    fn notify(&self, observer: &Observer<T>, state: &RequestState<T>) {
        if std::panic::catch_unwind(AssertUnwindSafe(|| observer(state))).is_err() {
            tracing::warn!(coordinator = %self.config.name, "Observer panicked, skipping");
        }
    }

    /// Run the staleness check for a finished fetch and publish if it passes
    fn complete(&self, sequence: u64, result: RequestState<T>) -> FetchOutcome {
        let name = &self.config.name;
        {
            let mut state = self.lock_state();
            if state.disposed {
                tracing::trace!(coordinator = %name, sequence, "Coordinator disposed, discarding result");
                CoordinatorMetrics::record_discard(name);
                return FetchOutcome::Discarded;
            }
            if sequence != state.sequence || sequence <= state.latest_applied {
                tracing::trace!(
                    coordinator = %name,
                    sequence,
                    newest = state.sequence,
                    latest_applied = state.latest_applied,
                    "Discarding stale result"
                );
                CoordinatorMetrics::record_discard(name);
                return FetchOutcome::Discarded;
            }

            state.latest_applied = sequence;
            state.current = result.clone();
            state.newest_task = None;
            let version = state.next_version();
            self.enqueue(Delivery::Broadcast {
                version,
                state: result,
            });
        }
        self.drain();

        CoordinatorMetrics::record_publication(name);
        tracing::debug!(coordinator = %name, sequence, "Published result");
        FetchOutcome::Applied
    }

    /// Remember the newest task's abort handle so a later submission can abort it
    fn track_task(&self, sequence: u64, task: AbortHandle) {
        let mut state = self.lock_state();
        if state.sequence == sequence && !state.disposed && state.latest_applied < sequence {
            state.newest_task = Some(task);
        } else if self.config.abort_superseded && state.sequence != sequence {
            // Superseded before the handle could be stored
            task.abort();
        }
    }
}

impl<Q, T> Registry for Inner<Q, T>
where
    Q: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn unsubscribe(&self, id: u64) {
        let mut state = self.lock_state();
        let before = state.subscribers.len();
        state.subscribers.retain(|subscriber| subscriber.id != id);
        if state.subscribers.len() < before {
            tracing::trace!(coordinator = %self.config.name, subscriber = id, "Observer deregistered");
        }
    }

    fn is_registered(&self, id: u64) -> bool {
        self.lock_state()
            .subscribers
            .iter()
            .any(|subscriber| subscriber.id == id)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
