//! Search demo binary
//!
//! Opens the search screen with the configured default term, then fires every
//! term given on the command line back to back. Only the last term's results
//! are published; earlier responses are discarded however they arrive. The
//! first hit is then opened on the details screen and saved to an in-memory
//! library.
//!
//! ```text
//! RUST_LOG=reader_runtime=debug cargo run -p search-demo -- dune "dune messiah"
//! ```

use reader_books::library::BookStore;
use reader_books::{
    BooksApiClient, BooksConfig, DetailsModel, InMemoryBookStore, LibraryFilter, LibraryModel,
    SearchModel,
};
use reader_core::RequestState;
use reader_core::book::BookItem;
use reader_runtime::metrics::MetricsRecorder;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEMO_USER: &str = "demo-user";

fn render(state: &RequestState<Vec<BookItem>>) {
    match state {
        RequestState::Loading => println!("  [search] loading..."),
        RequestState::Success(books) => {
            println!("  [search] {} result(s)", books.len());
            for book in books.iter().take(5) {
                let info = &book.volume_info;
                println!("    - {} ({})", info.title, info.authors_line());
            }
        }
        RequestState::Failed(failure) => println!("  [search] failed: {failure}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "search_demo=info,reader_runtime=info,reader_books=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Search Demo: latest request wins ===\n");

    let config = BooksConfig::from_env()?;
    let client = BooksApiClient::new(&config)?;
    tracing::info!(api_url = %client.api_url(), "Using book search API");

    let mut metrics = MetricsRecorder::new();
    metrics.install()?;

    let timeout = config.request_timeout() + Duration::from_secs(1);
    let search = SearchModel::from_client(&client, &config);
    let _subscription = search.subscribe(render);

    println!(">>> Opening search screen with \"{}\"", search.default_query());
    search.load_default()?.wait_with_timeout(timeout).await?;

    let terms: Vec<String> = std::env::args().skip(1).collect();
    if !terms.is_empty() {
        println!("\n>>> Typing {} term(s) back to back: {terms:?}", terms.len());
        let mut handles = Vec::new();
        for term in &terms {
            match search.search(term) {
                Ok(handle) => handles.push((term.clone(), handle)),
                Err(error) => println!("  rejected {term:?}: {error}"),
            }
        }
        for (term, handle) in handles {
            let outcome = handle.wait_with_timeout(timeout).await?;
            println!("  {term:?} -> {outcome:?}");
        }
    }

    let Some(first) = search
        .current_state()
        .into_data()
        .and_then(|books| books.into_iter().next())
    else {
        println!("\nNo results to open.");
        search.dispose();
        return Ok(());
    };

    println!("\n>>> Opening details for {}", first.id);
    let details = DetailsModel::from_client(&client);
    details.show(&first.id)?.wait_with_timeout(timeout).await?;
    match details.current_state() {
        RequestState::Success(book) => {
            let info = &book.volume_info;
            println!("  {} | {} pages | {}", info.title, info.page_count.unwrap_or_default(), info.thumbnail_url());
        }
        other => println!("  details: {}", other.status()),
    }

    let store = Arc::new(InMemoryBookStore::new());
    if details.current_state().is_success() {
        let saved = details.save_to_library(store.as_ref(), DEMO_USER).await?;
        println!("  saved to library as {}", saved.id);
    }

    let library = LibraryModel::new(store.clone());
    library.for_user(DEMO_USER)?.wait_with_timeout(timeout).await?;
    println!(
        "\n>>> Library: {} book(s), {} on the reading list",
        store.list(LibraryFilter::for_user(DEMO_USER)).await?.len(),
        library.reading_list().len()
    );

    if let Some(text) = metrics.render() {
        println!("\n=== Metrics ===\n{text}");
    }

    search.dispose();
    details.dispose();
    library.dispose();
    println!("\n=== Demo Complete ===");
    Ok(())
}
