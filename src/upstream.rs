use std::time::Duration;

use reqwest::{Client, Request, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error};

use crate::cache::ResponseCache;
use crate::config::{Config, Credentials};
use crate::error::{Error, Result};
use crate::news::NewsApiResponse;

/// Client for the third-party providers. News and weather calls are
/// implemented in `news.rs` and `weather.rs`.
pub struct Upstream {
    pub(crate) client: Client,
    pub(crate) config: Config,
    pub(crate) credentials: Credentials,
    pub(crate) news_cache: ResponseCache<NewsApiResponse>,
}

/// Failure body both providers send, e.g. `{"cod":"404","message":"city not found"}`.
#[derive(Debug, Deserialize)]
struct ProviderError {
    message: Option<String>,
}

impl Upstream {
    pub fn new(config: Config, credentials: Credentials) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("NewsDashboard/1.0 (News Aggregator)")
            .build()?;

        let news_cache = ResponseCache::new(config.cache_ttl());

        Ok(Self {
            client,
            config,
            credentials,
            news_cache,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn news_key(&self) -> Result<&str> {
        self.credentials
            .news_api_key
            .as_deref()
            .ok_or(Error::Configuration {
                key: Credentials::NEWS_API_KEY_VAR,
            })
    }

    pub(crate) fn weather_key(&self) -> Result<&str> {
        self.credentials
            .weather_api_key
            .as_deref()
            .ok_or(Error::Configuration {
                key: Credentials::WEATHER_API_KEY_VAR,
            })
    }

    /// Execute `request` and decode a successful body as `T`.
    ///
    /// A non-2xx status becomes `UpstreamHttp` carrying the provider's
    /// `message`, or `fallback(status)` when the body has none.
    pub(crate) async fn send_json<T, F>(&self, request: Request, fallback: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnOnce(StatusCode) -> String,
    {
        // Path only: weather URLs carry the API key in the query string.
        let path = request.url().path().to_string();
        debug!("GET {}", path);

        let response = self.client.execute(request).await.map_err(|e| {
            error!("Request to {} failed: {}", path, e);
            Error::from_transport(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ProviderError>()
                .await
                .ok()
                .and_then(|body| body.message)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| fallback(status));
            error!("{} returned {}: {}", path, status, message);
            return Err(Error::UpstreamHttp {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<T>().await.map_err(|e| {
            error!("Failed to decode response from {}: {}", path, e);
            Error::Network(e.to_string())
        })
    }
}
