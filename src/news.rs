use reqwest::Request;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identity::article_id;
use crate::models::{Article, ArticleBatch};
use crate::upstream::Upstream;

pub const NO_NEWS_MESSAGE: &str = "No news articles available.";
pub const NO_SEARCH_RESULTS_MESSAGE: &str = "No articles found";

/// NewsAPI `/top-headlines` and `/everything` body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsApiResponse {
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub articles: Vec<RawArticle>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawArticle {
    #[serde(default)]
    pub source: RawSource,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub url_to_image: Option<String>,
    pub published_at: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSource {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Options shared by the all-news and search calls.
#[derive(Debug, Clone)]
pub struct NewsQuery {
    pub language: String,
    pub sort_by: String,
    pub page_size: u32,
    pub page: u32,
    pub country: Option<String>,
}

impl Default for NewsQuery {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            sort_by: "publishedAt".to_string(),
            page_size: 20,
            page: 1,
            country: None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// True when the image host is, or is a subdomain of, a blocked domain.
pub fn is_blocked_image(image_url: &str, blocked_domains: &[String]) -> bool {
    let host = Url::parse(image_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()));

    match host {
        Some(host) => blocked_domains.iter().any(|domain| {
            let domain = domain.trim_start_matches('.').to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{}", domain))
        }),
        None => blocked_domains
            .iter()
            .any(|domain| image_url.contains(domain.as_str())),
    }
}

/// Map one upstream item to an `Article`, or `None` if a required field is empty.
pub fn normalize_article(raw: RawArticle, blocked_domains: &[String]) -> Option<Article> {
    let title = non_empty(raw.title)?;
    let description = non_empty(raw.description)?;
    let url = non_empty(raw.url)?;
    let content = non_empty(raw.content)?;
    let source = non_empty(raw.source.name)?;

    let image_url = non_empty(raw.url_to_image)
        .filter(|image| !is_blocked_image(image, blocked_domains));

    Some(Article {
        id: article_id(&url),
        title,
        description,
        content,
        url,
        source,
        source_id: raw.source.id,
        published_at: raw.published_at,
        image_url,
        country: None,
    })
}

impl Upstream {
    /// Headlines from `sources`, or from the configured trusted sources when blank.
    pub async fn fetch_top_headlines(
        &self,
        sources: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<ArticleBatch> {
        let key = self.news_key()?;

        let sources = match sources.map(str::trim).filter(|s| !s.is_empty()) {
            Some(sources) => sources.to_string(),
            None => self.config.news.trusted_sources.join(","),
        };

        let params = vec![
            ("sources", sources),
            ("page", page.to_string()),
            ("pageSize", page_size.to_string()),
        ];

        let response = self.cached_news("top-headlines", &params, key).await?;
        let batch = self.into_batch(response)?;
        info!(
            "Fetched {} headlines ({} total)",
            batch.articles.len(),
            batch.total_results
        );
        Ok(batch)
    }

    /// General headlines when `keyword` is blank, keyword search otherwise.
    pub async fn fetch_all_news(&self, keyword: &str, query: &NewsQuery) -> Result<ArticleBatch> {
        let key = self.news_key()?;

        let mut params = Vec::new();
        let endpoint = if keyword.trim().is_empty() {
            "top-headlines"
        } else {
            params.push(("q", keyword.to_string()));
            params.push(("sortBy", query.sort_by.clone()));
            "everything"
        };
        params.push(("language", query.language.clone()));
        params.push(("pageSize", query.page_size.to_string()));
        params.push(("page", query.page.to_string()));
        if let Some(country) = query.country.as_deref().filter(|c| !c.is_empty()) {
            params.push(("country", country.to_string()));
        }

        let response = self.cached_news(endpoint, &params, key).await?;
        let batch = self.into_batch(response)?;
        info!(
            "Fetched {} articles from /{} ({} total)",
            batch.articles.len(),
            endpoint,
            batch.total_results
        );
        Ok(batch)
    }

    /// Keyword search without server-side paging; never cached.
    pub async fn search_news(&self, keyword: &str, query: &NewsQuery) -> Result<Vec<Article>> {
        let key = self.news_key()?;

        if keyword.trim().is_empty() {
            return Err(Error::EmptyResult(NO_SEARCH_RESULTS_MESSAGE.to_string()));
        }

        let mut params = vec![
            ("q", keyword.to_string()),
            ("sortBy", query.sort_by.clone()),
            ("language", query.language.clone()),
            ("pageSize", query.page_size.to_string()),
        ];
        if let Some(country) = query.country.as_deref().filter(|c| !c.is_empty()) {
            params.push(("country", country.to_string()));
        }

        let request = self.news_request("everything", &params, key)?;
        let response: NewsApiResponse = self.send_json(request, news_failure).await?;
        let articles = self.collect_articles(response.articles);

        if articles.is_empty() {
            return Err(Error::EmptyResult(NO_SEARCH_RESULTS_MESSAGE.to_string()));
        }
        info!("Search for '{}' matched {} articles", keyword, articles.len());
        Ok(articles)
    }

    fn news_request(&self, endpoint: &str, params: &[(&str, String)], key: &str) -> Result<Request> {
        let url = format!(
            "{}/{}",
            self.config.news.base_url.trim_end_matches('/'),
            endpoint
        );
        self.client
            .get(url)
            .query(params)
            .header("X-Api-Key", key)
            .build()
            .map_err(Error::from_transport)
    }

    async fn cached_news(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        key: &str,
    ) -> Result<NewsApiResponse> {
        let request = self.news_request(endpoint, params, key)?;
        let cache_key = request.url().to_string();

        if let Some(hit) = self.news_cache.get(&cache_key).await {
            debug!("Cache hit for {}", cache_key);
            return Ok(hit);
        }

        let response: NewsApiResponse = self.send_json(request, news_failure).await?;
        self.news_cache.insert(cache_key, response.clone()).await;
        Ok(response)
    }

    fn collect_articles(&self, raw: Vec<RawArticle>) -> Vec<Article> {
        let received = raw.len();
        let articles: Vec<Article> = raw
            .into_iter()
            .filter_map(|item| normalize_article(item, &self.config.news.blocked_image_domains))
            .collect();

        if articles.len() < received {
            warn!(
                "Dropped {} of {} articles with missing fields",
                received - articles.len(),
                received
            );
        }
        articles
    }

    fn into_batch(&self, response: NewsApiResponse) -> Result<ArticleBatch> {
        let articles = self.collect_articles(response.articles);
        if articles.is_empty() {
            return Err(Error::EmptyResult(NO_NEWS_MESSAGE.to_string()));
        }
        Ok(ArticleBatch {
            articles,
            total_results: response.total_results,
        })
    }
}

fn news_failure(status: reqwest::StatusCode) -> String {
    format!("News API failed with status {}", status.as_u16())
}
