use std::any::Any;
use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::{Error, ErrorBody};
use crate::models::{Article, NewsPage, PaginationInfo};
use crate::news::NewsQuery;
use crate::upstream::Upstream;

const HEADLINES_PAGE_SIZE: u32 = 10;
const ALL_NEWS_PAGE_SIZE: u32 = 30;
const SEARCH_PAGE_SIZE: u32 = 10;
/// Page size of the broader fetch used when an id is not in the headlines.
const ARTICLE_LOOKUP_PAGE_SIZE: u32 = 100;

pub struct AppState {
    pub upstream: Arc<Upstream>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        .route("/api/news/headlines", get(headlines))
        .route("/api/news/all", get(all_news))
        .route("/api/news/:id", get(article))
        .route("/api/search-result", get(search))
        .route("/api/weather", get(weather))
        .route("/health", get(health))
        .with_state(state);
    with_middleware(routes)
}

fn with_middleware(router: Router) -> Router {
    router
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
}

// Uniform `{error}` body with a status
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody::new(self.message))).into_response()
    }
}

/// Adapter failures surface as a server error with the adapter's message.
impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

/// Malformed query strings answer 400 in the same `{error}` shape.
impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::new(rejection.status(), rejection.body_text())
    }
}

fn panic_response(_payload: Box<dyn Any + Send + 'static>) -> Response {
    error!("Handler panicked");
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageQuery {
    fn resolve(&self, default_page_size: u32) -> (u32, u32) {
        (
            self.page.unwrap_or(1).max(1),
            self.page_size.unwrap_or(default_page_size).max(1),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub query: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Slice `[(page-1)*page_size, page*page_size)` out of `items`.
pub fn paginate<T: Clone>(items: &[T], page: u32, page_size: u32) -> Vec<T> {
    let start = (page.max(1) as usize - 1).saturating_mul(page_size as usize);
    items
        .iter()
        .skip(start)
        .take(page_size as usize)
        .cloned()
        .collect()
}

// Route handlers
pub async fn headlines(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<NewsPage>, AppError> {
    let Query(query) = query?;
    let (page, page_size) = query.resolve(HEADLINES_PAGE_SIZE);

    let batch = state
        .upstream
        .fetch_top_headlines(None, page, page_size)
        .await?;

    Ok(Json(NewsPage {
        articles: batch.articles,
        pagination: PaginationInfo::new(page, page_size, batch.total_results),
    }))
}

pub async fn all_news(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<NewsPage>, AppError> {
    let Query(query) = query?;
    let (page, page_size) = query.resolve(ALL_NEWS_PAGE_SIZE);

    let news_query = NewsQuery {
        page,
        page_size,
        ..NewsQuery::default()
    };
    let batch = state.upstream.fetch_all_news("", &news_query).await?;

    Ok(Json(NewsPage {
        articles: batch.articles,
        pagination: PaginationInfo::new(page, page_size, batch.total_results),
    }))
}

/// Looks in the default headlines first, then in a broader general fetch.
pub async fn article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Article>, AppError> {
    if let Ok(batch) = state
        .upstream
        .fetch_top_headlines(None, 1, HEADLINES_PAGE_SIZE)
        .await
    {
        if let Some(found) = batch.articles.into_iter().find(|a| a.id == id) {
            return Ok(Json(found));
        }
    }

    let broader = NewsQuery {
        page_size: ARTICLE_LOOKUP_PAGE_SIZE,
        ..NewsQuery::default()
    };
    if let Ok(batch) = state.upstream.fetch_all_news("", &broader).await {
        if let Some(found) = batch.articles.into_iter().find(|a| a.id == id) {
            return Ok(Json(found));
        }
    }

    info!("Article {} not found", id);
    Err(AppError::new(StatusCode::NOT_FOUND, "Article not found"))
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<NewsPage>, AppError> {
    let Query(query) = query?;
    let keyword = match query.query.as_deref().map(str::trim) {
        Some(keyword) if !keyword.is_empty() => keyword,
        _ => {
            return Err(AppError::new(
                StatusCode::BAD_REQUEST,
                "Please enter a search query",
            ))
        }
    };
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(SEARCH_PAGE_SIZE).max(1);

    let news_query = NewsQuery {
        page_size: state.upstream.config().news.search_page_size,
        ..NewsQuery::default()
    };
    let matches = state.upstream.search_news(keyword, &news_query).await?;

    Ok(Json(NewsPage {
        articles: paginate(&matches, page, page_size),
        pagination: PaginationInfo::new(page, page_size, matches.len() as u64),
    }))
}

pub async fn weather(
    State(state): State<Arc<AppState>>,
    query: Result<Query<WeatherQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query?;
    let city = query.city.as_deref().map(str::trim).filter(|c| !c.is_empty());

    let snapshot = match (city, query.lat, query.lon) {
        (Some(city), _, _) => state.upstream.fetch_weather(city).await?,
        (None, Some(lat), Some(lon)) => state.upstream.fetch_weather_by_coords(lat, lon).await?,
        _ => {
            return Err(AppError::new(
                StatusCode::BAD_REQUEST,
                "Please provide a city or coordinates",
            ))
        }
    };

    Ok(Json(snapshot))
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}
