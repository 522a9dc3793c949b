//! Integration tests for latest-request-wins publication
//!
//! Drives `FetchCoordinator` with scripted fetches whose completion order is
//! chosen by the test, and checks what observers end up seeing.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic
#![allow(clippy::cast_possible_truncation)] // Test code - allow pedantic warnings

use proptest::prelude::*;
use reader_core::error::FetchError;
use reader_core::query::non_blank_text;
use reader_core::{ErrorKind, RequestState, Status};
use reader_runtime::{CoordinatorConfig, CoordinatorError, FetchCoordinator, FetchOutcome};
use reader_testing::{InstantFetcher, RecordingObserver, ScriptedFetcher, init_test_tracing};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

// ============================================================================
// Test Fixtures
// ============================================================================

type Titles = Vec<String>;

fn titles(items: &[&str]) -> Titles {
    items.iter().map(ToString::to_string).collect()
}

fn search_coordinator(fetcher: &ScriptedFetcher<String, Titles>) -> FetchCoordinator<String, Titles> {
    FetchCoordinator::builder(fetcher.clone())
        .config(CoordinatorConfig::new("search"))
        .validator(non_blank_text())
        .build()
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_newer_result_survives_older_late_completion() {
    init_test_tracing();
    let fetcher = ScriptedFetcher::new();
    let search = search_coordinator(&fetcher);
    let recorder = RecordingObserver::new();
    let _sub = search.subscribe(recorder.observer());

    let first = search.submit("a".to_string()).unwrap();
    let second = search.submit("ab".to_string()).unwrap();
    assert_eq!(fetcher.calls(), vec!["a".to_string(), "ab".to_string()]);

    fetcher.succeed(1, titles(&["Y"]));
    assert_eq!(second.wait().await.unwrap(), FetchOutcome::Applied);

    fetcher.succeed(0, titles(&["X"]));
    assert_eq!(first.wait().await.unwrap(), FetchOutcome::Discarded);

    assert_eq!(search.current_state().into_data(), Some(titles(&["Y"])));
    assert_eq!(
        recorder.states(),
        vec![
            RequestState::loading(),
            RequestState::loading(),
            RequestState::loading(),
            RequestState::success(titles(&["Y"])),
        ]
    );
}

#[tokio::test]
async fn test_back_to_back_submissions_publish_only_the_second() {
    let fetcher = ScriptedFetcher::new();
    let search = search_coordinator(&fetcher);
    let recorder = RecordingObserver::new();
    let _sub = search.subscribe(recorder.observer());

    let first = search.submit("dune".to_string()).unwrap();
    let second = search.submit("dune messiah".to_string()).unwrap();

    // The older request completes first and is still dropped
    fetcher.succeed(0, titles(&["Dune"]));
    assert_eq!(first.wait().await.unwrap(), FetchOutcome::Discarded);
    assert!(search.current_state().is_loading());

    // Even a failure for the newest request beats a success for an older one
    fetcher.fail(1, FetchError::Transport("connection reset".into()));
    assert_eq!(second.wait().await.unwrap(), FetchOutcome::Applied);

    let state = search.current_state();
    assert_eq!(state.error().map(|f| f.kind), Some(ErrorKind::Transport));
    assert!(recorder.successes().is_empty());
    assert_eq!(search.latest_applied_sequence(), 2);
}

#[tokio::test]
async fn test_older_error_after_newer_success_is_discarded() {
    let fetcher = ScriptedFetcher::new();
    let search = search_coordinator(&fetcher);

    let first = search.submit("a".to_string()).unwrap();
    let second = search.submit("ab".to_string()).unwrap();

    fetcher.succeed(1, titles(&["Y"]));
    second.wait().await.unwrap();
    fetcher.fail(0, FetchError::Transport("timed out".into()));
    assert_eq!(first.wait().await.unwrap(), FetchOutcome::Discarded);

    assert_eq!(search.current_state(), RequestState::success(titles(&["Y"])));
}

#[tokio::test]
async fn test_identical_query_is_fetched_again() {
    let fetcher = ScriptedFetcher::new();
    let search = search_coordinator(&fetcher);

    let first = search.submit("dune".to_string()).unwrap();
    fetcher.succeed(0, titles(&["Dune"]));
    first.wait().await.unwrap();

    let again = search.submit("dune".to_string()).unwrap();
    assert_eq!(again.sequence(), 2);
    assert_eq!(fetcher.call_count(), 2);
    assert!(search.current_state().is_loading());

    fetcher.succeed(1, titles(&["Dune", "Dune Messiah"]));
    assert!(again.wait().await.unwrap().is_applied());
    assert_eq!(search.current_state().into_data().map(|t| t.len()), Some(2));
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_blank_query_changes_nothing() {
    let fetcher = ScriptedFetcher::new();
    let search = search_coordinator(&fetcher);

    let handle = search.submit("dune".to_string()).unwrap();
    fetcher.succeed(0, titles(&["Dune"]));
    handle.wait().await.unwrap();

    let recorder = RecordingObserver::new();
    let _sub = search.subscribe(recorder.observer());

    for blank in ["", "   "] {
        let result = search.submit(blank.to_string());
        assert!(matches!(result, Err(CoordinatorError::Validation(_))));
    }

    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(search.latest_sequence(), 1);
    assert_eq!(search.current_state().into_data(), Some(titles(&["Dune"])));
    // Only the replay on registration
    assert_eq!(recorder.len(), 1);
}

// ============================================================================
// Subscribers
// ============================================================================

#[tokio::test]
async fn test_late_subscriber_receives_current_state() {
    let fetcher = ScriptedFetcher::new();
    let search = search_coordinator(&fetcher);

    let handle = search.submit("dune".to_string()).unwrap();
    fetcher.succeed(0, titles(&["Dune"]));
    handle.wait().await.unwrap();

    let recorder = RecordingObserver::new();
    let _sub = search.subscribe(recorder.observer());
    assert_eq!(recorder.states(), vec![RequestState::success(titles(&["Dune"]))]);
}

#[tokio::test]
async fn test_publication_without_subscribers_updates_current() {
    let fetcher = ScriptedFetcher::new();
    let search = search_coordinator(&fetcher);
    assert_eq!(search.subscriber_count(), 0);

    let handle = search.submit("dune".to_string()).unwrap();
    fetcher.fail(0, FetchError::Deserialization("bad json".into()));
    assert!(handle.wait().await.unwrap().is_applied());

    let failure = search.current_state().error().cloned().unwrap();
    assert_eq!(failure.kind, ErrorKind::Deserialization);
    assert_eq!(failure.message, "bad json");
}

#[tokio::test]
async fn test_all_observers_see_the_same_sequence() {
    let fetcher = ScriptedFetcher::new();
    let search = search_coordinator(&fetcher);
    let first = RecordingObserver::new();
    let second = RecordingObserver::new();
    let _a = search.subscribe(first.observer());
    let _b = search.subscribe(second.observer());

    let handle = search.submit("dune".to_string()).unwrap();
    fetcher.succeed(0, titles(&["Dune"]));
    handle.wait().await.unwrap();

    assert_eq!(first.states(), second.states());
    assert_eq!(
        first.statuses(),
        vec![Status::Loading, Status::Loading, Status::Success]
    );
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_failure_replaces_previous_success() {
    let fetcher = ScriptedFetcher::new();
    let search = search_coordinator(&fetcher);

    let handle = search.submit("dune".to_string()).unwrap();
    fetcher.succeed(0, titles(&["Dune"]));
    handle.wait().await.unwrap();

    let handle = search.submit("dune messiah".to_string()).unwrap();
    fetcher.fail(1, FetchError::Transport("offline".into()));
    handle.wait().await.unwrap();

    let state = search.current_state();
    assert!(state.is_failed());
    assert!(state.data().is_none());
    assert_eq!(state.error().map(|f| f.kind), Some(ErrorKind::Transport));
}

#[tokio::test]
async fn test_not_found_is_published() {
    let details: FetchCoordinator<String, String> = FetchCoordinator::new(InstantFetcher::new(
        |id: &String| Err(FetchError::NotFound(format!("volume {id}"))),
    ));

    details.submit("missing".to_string()).unwrap().wait().await.unwrap();
    let failure = details.current_state().error().cloned().unwrap();
    assert_eq!(failure.kind, ErrorKind::NotFound);
    assert_eq!(failure.message, "volume missing");
}

// ============================================================================
// Independence
// ============================================================================

#[tokio::test]
async fn test_coordinators_are_independent() {
    let search_fetcher = ScriptedFetcher::new();
    let search = search_coordinator(&search_fetcher);
    let details: FetchCoordinator<String, String> =
        FetchCoordinator::new(InstantFetcher::new(|id: &String| Ok(format!("volume {id}"))));

    let search_log = RecordingObserver::new();
    let details_log = RecordingObserver::new();
    let _s = search.subscribe(search_log.observer());
    let _d = details.subscribe(details_log.observer());

    details.submit("abc".to_string()).unwrap().wait().await.unwrap();
    let handle = search.submit("dune".to_string()).unwrap();
    search_fetcher.succeed(0, titles(&["Dune"]));
    handle.wait().await.unwrap();

    assert_eq!(search_log.successes(), vec![titles(&["Dune"])]);
    assert_eq!(details_log.successes(), vec!["volume abc".to_string()]);
    assert_eq!(search.latest_sequence(), 1);
    assert_eq!(details.latest_sequence(), 1);
}

// ============================================================================
// Disposal and cancellation
// ============================================================================

#[tokio::test]
async fn test_dispose_abandons_in_flight_fetch() {
    let fetcher = ScriptedFetcher::new();
    let search = search_coordinator(&fetcher);
    let recorder = RecordingObserver::new();
    let sub = search.subscribe(recorder.observer());

    let handle = search.submit("dune".to_string()).unwrap();
    search.dispose();
    assert!(search.is_disposed());
    assert!(!sub.is_active());
    assert_eq!(search.subscriber_count(), 0);

    fetcher.succeed(0, titles(&["Dune"]));
    assert_eq!(handle.wait().await.unwrap(), FetchOutcome::Discarded);
    assert_eq!(recorder.len(), 2);
    assert!(search.current_state().is_loading());

    assert!(matches!(
        search.submit("dune".to_string()),
        Err(CoordinatorError::Disposed)
    ));
    let late = RecordingObserver::new();
    let inert = search.subscribe(late.observer());
    assert!(!inert.is_active());
    assert!(late.is_empty());

    // Disposing twice is harmless
    search.dispose();
}

#[tokio::test]
async fn test_dropping_every_handle_discards_result() {
    let fetcher = ScriptedFetcher::new();
    let handle = {
        let search = search_coordinator(&fetcher);
        search.submit("dune".to_string()).unwrap()
    };

    fetcher.succeed(0, titles(&["Dune"]));
    assert_eq!(handle.wait().await.unwrap(), FetchOutcome::Discarded);
}

#[tokio::test]
async fn test_abort_superseded_cancels_older_task() {
    let fetcher = ScriptedFetcher::new();
    let search = FetchCoordinator::builder(fetcher.clone())
        .config(CoordinatorConfig::new("search").with_abort_superseded(true))
        .build();

    let first = search.submit("a".to_string()).unwrap();
    let second = search.submit("ab".to_string()).unwrap();

    assert_eq!(first.wait_with_timeout(WAIT).await.unwrap(), FetchOutcome::Discarded);

    fetcher.succeed(1, titles(&["AB"]));
    assert!(second.wait_with_timeout(WAIT).await.unwrap().is_applied());
    assert_eq!(search.current_state().into_data(), Some(titles(&["AB"])));
    assert_eq!(search.in_flight(), 0);
}

#[tokio::test]
async fn test_never_resolving_fetch_stays_loading() {
    let fetcher = ScriptedFetcher::new();
    let search = search_coordinator(&fetcher);

    let handle = search.submit("dune".to_string()).unwrap();
    let result = handle.wait_with_timeout(Duration::from_millis(20)).await;
    assert!(matches!(result, Err(CoordinatorError::Timeout)));
    assert!(search.current_state().is_loading());
    assert_eq!(search.in_flight(), 1);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completions_never_go_backwards() {
    init_test_tracing();
    let search: FetchCoordinator<u32, u32> = FetchCoordinator::new(|n: u32| async move {
        tokio::time::sleep(Duration::from_micros(u64::from((n * 7919) % 500))).await;
        Ok::<_, FetchError>(n)
    });
    let recorder = RecordingObserver::new();
    let _sub = search.subscribe(recorder.observer());

    let handles: Vec<_> = (1..=50).map(|n| search.submit(n).unwrap()).collect();
    for handle in handles {
        handle.wait_with_timeout(WAIT).await.unwrap();
    }

    // Every success is the newest submission at the time it was applied, so
    // the published values can only increase
    let successes = recorder.successes();
    assert!(successes.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(search.current_state().into_data(), Some(50));
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_only_newest_submission_is_published(
        order in (1usize..8).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (published, current) = runtime.block_on(async {
            let fetcher = ScriptedFetcher::<usize, usize>::new();
            let coordinator = FetchCoordinator::new(fetcher.clone());
            let recorder = RecordingObserver::new();
            let _sub = coordinator.subscribe(recorder.observer());

            let mut handles: Vec<_> = (0..order.len())
                .map(|i| Some(coordinator.submit(i).unwrap()))
                .collect();

            for &index in &order {
                fetcher.succeed(index, index);
                handles[index].take().unwrap().wait().await.unwrap();
            }

            (recorder.successes(), coordinator.current_state())
        });

        let newest = order.len() - 1;
        prop_assert_eq!(published, vec![newest]);
        prop_assert_eq!(current, RequestState::success(newest));
    }
}
