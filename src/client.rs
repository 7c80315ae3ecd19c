//! Client-side state manager for the dashboard routes.
//!
//! `DashboardStore` owns the latest weather, news and search results and
//! refreshes them through an injected [`Transport`]. Each slice is replaced
//! independently: a failed news refresh never touches the cached weather.
//!
//! Overlapping refreshes of the same slice are resolved by a per-slice
//! request token. Only the response to the most recently issued request is
//! applied, whatever order the responses arrive in.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::error::ErrorBody;
use crate::models::{Article, Envelope, NewsPage, PaginationInfo, WeatherSnapshot};

/// A slice value: the payload, or the error shown in its place.
pub type Fetched<T> = Result<T, ErrorBody>;

pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    TimedOut,
    #[error("{0}")]
    Failed(String),
}

/// GET against the dashboard server. `path` includes the query string.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str) -> Result<TransportResponse, TransportError>;
}

/// `Transport` over HTTP to a running dashboard server.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent("NewsDashboard/1.0 (Client)")
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::TimedOut
                } else {
                    TransportError::Failed(e.to_string())
                }
            })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        Ok(TransportResponse { status, body })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NewsMode {
    #[default]
    Headlines,
    All,
}

impl NewsMode {
    fn route(self) -> &'static str {
        match self {
            NewsMode::Headlines => "/api/news/headlines",
            NewsMode::All => "/api/news/all",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClientTimeouts {
    pub weather: Duration,
    pub search: Duration,
    pub default: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            weather: Duration::from_secs(10),
            search: Duration::from_secs(10),
            default: Duration::from_secs(50),
        }
    }
}

/// Everything the store caches. `None` means never fetched (or cleared).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    pub weather: Option<Fetched<WeatherSnapshot>>,
    pub news: Option<Fetched<Vec<Article>>>,
    pub news_pagination: Option<PaginationInfo>,
    pub search: Option<Fetched<Vec<Article>>>,
    pub search_pagination: Option<PaginationInfo>,
    pub news_mode: NewsMode,
}

#[derive(Debug, Clone, Copy)]
enum Slice {
    News,
    Search,
    Weather,
}

#[derive(Default)]
struct SliceTokens {
    news: AtomicU64,
    search: AtomicU64,
    weather: AtomicU64,
}

impl SliceTokens {
    fn counter(&self, slice: Slice) -> &AtomicU64 {
        match slice {
            Slice::News => &self.news,
            Slice::Search => &self.search,
            Slice::Weather => &self.weather,
        }
    }

    fn issue(&self, slice: Slice) -> u64 {
        self.counter(slice).fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_latest(&self, slice: Slice, token: u64) -> bool {
        self.counter(slice).load(Ordering::SeqCst) == token
    }
}

/// Raises the loading count for its lifetime.
struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn new(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

enum RequestFailure {
    TimedOut,
    Status { status: u16, detail: String },
    Transport(String),
}

pub struct DashboardStore {
    transport: Arc<dyn Transport>,
    timeouts: ClientTimeouts,
    state: RwLock<DashboardState>,
    in_flight: AtomicUsize,
    tokens: SliceTokens,
}

impl DashboardStore {
    pub fn new(transport: Arc<dyn Transport>, timeouts: ClientTimeouts) -> Self {
        Self {
            transport,
            timeouts,
            state: RwLock::new(DashboardState::default()),
            in_flight: AtomicUsize::new(0),
            tokens: SliceTokens::default(),
        }
    }

    pub async fn snapshot(&self) -> DashboardState {
        self.state.read().await.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub async fn news_mode(&self) -> NewsMode {
        self.state.read().await.news_mode
    }

    pub async fn set_news_mode(&self, mode: NewsMode) {
        self.state.write().await.news_mode = mode;
    }

    /// Refresh the news slice. `mode` falls back to the stored mode.
    pub async fn refresh_news(&self, mode: Option<NewsMode>, page: u32, page_size: u32) {
        let mode = match mode {
            Some(mode) => mode,
            None => self.news_mode().await,
        };
        let token = self.tokens.issue(Slice::News);
        let _loading = LoadingGuard::new(&self.in_flight);

        let path = format!("{}?page={}&pageSize={}", mode.route(), page, page_size);
        let outcome: Fetched<NewsPage> = match self.request(&path, self.timeouts.default).await {
            Ok(body) => decode::<NewsPage>(&body),
            Err(RequestFailure::TimedOut) => Err(ErrorBody::new(
                "News refresh timed out. Using cached data.",
            )),
            Err(_) => Err(ErrorBody::new(
                "Failed to refresh news. Using cached data if available.",
            )),
        };

        self.apply(Slice::News, token, |state| match outcome {
            Ok(page) => {
                state.news = Some(Ok(page.articles));
                state.news_pagination = Some(page.pagination);
            }
            Err(err) => {
                state.news = Some(Err(err));
                state.news_pagination = None;
            }
        })
        .await;
    }

    /// Search and cache one page of results. A blank query clears the slice
    /// without touching the network.
    pub async fn update_search(&self, query: &str, page: u32, page_size: u32) -> Fetched<Vec<Article>> {
        let token = self.tokens.issue(Slice::Search);

        if query.trim().is_empty() {
            self.apply(Slice::Search, token, |state| {
                state.search = None;
                state.search_pagination = None;
            })
            .await;
            return Ok(Vec::new());
        }

        let _loading = LoadingGuard::new(&self.in_flight);
        let path = format!(
            "/api/search-result?{}",
            form_urlencoded::Serializer::new(String::new())
                .append_pair("query", query)
                .append_pair("page", &page.to_string())
                .append_pair("pageSize", &page_size.to_string())
                .finish()
        );

        let outcome: Fetched<NewsPage> = match self.request(&path, self.timeouts.search).await {
            Ok(body) => decode::<NewsPage>(&body),
            Err(RequestFailure::TimedOut) => Err(ErrorBody::new(
                "Search request timed out. Please try again.",
            )),
            Err(RequestFailure::Status { status, detail }) => {
                Err(ErrorBody::new(format!("Search failed: {} {}", status, detail)))
            }
            Err(RequestFailure::Transport(_)) => {
                Err(ErrorBody::new("Failed to fetch search results"))
            }
        };

        let result = outcome.as_ref().map(|page| page.articles.clone()).map_err(|e| e.clone());
        self.apply(Slice::Search, token, |state| match outcome {
            Ok(page) => {
                state.search = Some(Ok(page.articles));
                state.search_pagination = Some(page.pagination);
            }
            Err(err) => {
                state.search = Some(Err(err));
                state.search_pagination = None;
            }
        })
        .await;
        result
    }

    pub async fn update_weather(&self, city: &str) -> Fetched<WeatherSnapshot> {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("city", city)
            .finish();
        self.fetch_weather(format!("/api/weather?{}", query)).await
    }

    pub async fn update_weather_by_coords(&self, lat: f64, lon: f64) -> Fetched<WeatherSnapshot> {
        self.fetch_weather(format!("/api/weather?lat={}&lon={}", lat, lon))
            .await
    }

    async fn fetch_weather(&self, path: String) -> Fetched<WeatherSnapshot> {
        let token = self.tokens.issue(Slice::Weather);
        let _loading = LoadingGuard::new(&self.in_flight);

        let outcome = match self.request(&path, self.timeouts.weather).await {
            Ok(body) => decode::<WeatherSnapshot>(&body),
            Err(RequestFailure::TimedOut) => Err(ErrorBody::new(
                "Weather request timed out. Please try again.",
            )),
            Err(RequestFailure::Status { status, detail }) => Err(ErrorBody::new(format!(
                "Server weather fetch failed: {} {}",
                status, detail
            ))),
            Err(RequestFailure::Transport(_)) => {
                Err(ErrorBody::new("Failed to fetch weather data"))
            }
        };

        let value = outcome.clone();
        self.apply(Slice::Weather, token, |state| state.weather = Some(value))
            .await;
        outcome
    }

    /// GET `path` under `limit`. Returns the body of a 2xx response.
    async fn request(&self, path: &str, limit: Duration) -> Result<String, RequestFailure> {
        let response = match tokio::time::timeout(limit, self.transport.get(path)).await {
            Err(_) => {
                warn!("{} timed out after {:?}", path, limit);
                return Err(RequestFailure::TimedOut);
            }
            Ok(Err(TransportError::TimedOut)) => return Err(RequestFailure::TimedOut),
            Ok(Err(TransportError::Failed(e))) => {
                warn!("{} failed: {}", path, e);
                return Err(RequestFailure::Transport(e));
            }
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            // Prefer the route's `{error}` message over the raw body.
            let detail = serde_json::from_str::<ErrorBody>(&response.body)
                .map(|body| body.error)
                .unwrap_or(response.body);
            warn!("{} returned {}: {}", path, response.status, detail);
            return Err(RequestFailure::Status {
                status: response.status,
                detail,
            });
        }
        Ok(response.body)
    }

    /// Run `update` under the state lock if `token` is still the latest for `slice`.
    async fn apply<F>(&self, slice: Slice, token: u64, update: F) -> bool
    where
        F: FnOnce(&mut DashboardState),
    {
        let mut state = self.state.write().await;
        if !self.tokens.is_latest(slice, token) {
            debug!("Discarding stale {:?} response (token {})", slice, token);
            return false;
        }
        update(&mut state);
        true
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Fetched<T> {
    match serde_json::from_str::<Envelope<T>>(body) {
        Ok(envelope) => envelope.into_result(),
        Err(e) => {
            warn!("Unreadable response body: {}", e);
            Err(ErrorBody::new("Unexpected response from server"))
        }
    }
}
