//! Book search API client implementation

use crate::config::BooksConfig;
use crate::error::BooksApiError;
use crate::types::VolumesResponse;
use futures::future::BoxFuture;
use reader_core::book::BookItem;
use reader_core::error::FetchError;
use reader_core::fetch::Fetcher;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

/// Book search API client
///
/// Cheap to clone; clones share the connection pool.
///
/// As a [`Fetcher`] the client runs searches, so it can be handed straight to
/// a `FetchCoordinator<String, Vec<BookItem>>`. Use [`volume_fetcher()`]
/// for single-volume lookups.
///
/// [`volume_fetcher()`]: Self::volume_fetcher
#[derive(Clone)]
pub struct BooksApiClient {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    max_results: u32,
}

impl BooksApiClient {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns `BooksApiError::RequestFailed` if the HTTP client cannot be built
    pub fn new(config: &BooksConfig) -> Result<Self, BooksApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| BooksApiError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_results: config.max_results,
        })
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Search volumes matching `query`
    ///
    /// A response without `items` yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns errors for network failures, API errors, or parsing failures
    #[tracing::instrument(skip(self), fields(max_results = self.max_results))]
    pub async fn search(&self, query: &str) -> Result<Vec<BookItem>, BooksApiError> {
        let max_results = self.max_results.to_string();
        let mut params = vec![("q", query), ("maxResults", max_results.as_str())];
        if let Some(key) = &self.api_key {
            params.push(("key", key.as_str()));
        }

        let request = self
            .client
            .get(format!("{}/volumes", self.api_url))
            .query(&params);
        let response: VolumesResponse = self.send(request, query).await?;

        let items = response.into_items();
        tracing::debug!(results = items.len(), "Search completed");
        Ok(items)
    }

    /// Fetch a single volume by id
    ///
    /// # Errors
    ///
    /// Returns `BooksApiError::NotFound` for unknown ids, otherwise as for
    /// [`search()`](Self::search)
    #[tracing::instrument(skip(self))]
    pub async fn volume(&self, id: &str) -> Result<BookItem, BooksApiError> {
        let mut request = self.client.get(format!("{}/volumes/{id}", self.api_url));
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }
        self.send(request, id).await
    }

    /// A [`Fetcher`] that looks volumes up by id
    #[must_use]
    pub fn volume_fetcher(&self) -> VolumeFetcher {
        VolumeFetcher {
            client: self.clone(),
        }
    }

    async fn send<R: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        subject: &str,
    ) -> Result<R, BooksApiError> {
        let response = request
            .header("accept", "application/json")
            .send()
            .await
            .map_err(BooksApiError::from)?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text().await.map_err(BooksApiError::from)?;
                serde_json::from_str::<R>(&body)
                    .map_err(|e| BooksApiError::ResponseParseFailed(e.to_string()))
            }
            StatusCode::NOT_FOUND => Err(BooksApiError::NotFound(subject.to_string())),
            StatusCode::TOO_MANY_REQUESTS => Err(BooksApiError::RateLimited),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(BooksApiError::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(status = status.as_u16(), "Book search API error");
                Err(BooksApiError::ApiError {
                    status: status.as_u16(),
                    message: body,
                })
            }
        }
    }
}

impl std::fmt::Debug for BooksApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BooksApiClient")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("max_results", &self.max_results)
            .finish_non_exhaustive()
    }
}

impl Fetcher<String, Vec<BookItem>> for BooksApiClient {
    fn fetch(&self, query: String) -> BoxFuture<'static, Result<Vec<BookItem>, FetchError>> {
        let client = self.clone();
        Box::pin(async move { client.search(&query).await.map_err(FetchError::from) })
    }
}

/// Looks volumes up by id through a [`BooksApiClient`]
#[derive(Debug, Clone)]
pub struct VolumeFetcher {
    client: BooksApiClient,
}

impl Fetcher<String, BookItem> for VolumeFetcher {
    fn fetch(&self, id: String) -> BoxFuture<'static, Result<BookItem, FetchError>> {
        let client = self.client.clone();
        Box::pin(async move { client.volume(&id).await.map_err(FetchError::from) })
    }
}
