use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Seconds a successful headlines/all-news response is reused, 0 disables
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Weather poll interval in minutes
    #[serde(default = "default_weather_poll")]
    pub weather_poll_minutes: u64,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_weather_poll() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewsConfig {
    #[serde(default = "default_news_base_url")]
    pub base_url: String,
    /// Sources queried for headlines when the caller names none
    #[serde(default = "default_trusted_sources")]
    pub trusted_sources: Vec<String>,
    /// Image hosts that refuse hotlinked requests
    #[serde(default = "default_blocked_image_domains")]
    pub blocked_image_domains: Vec<String>,
    /// Upstream page size for the search route, which slices locally
    #[serde(default = "default_search_page_size")]
    pub search_page_size: u32,
}

fn default_news_base_url() -> String {
    "https://newsapi.org/v2".to_string()
}

fn default_trusted_sources() -> Vec<String> {
    ["bbc-news", "cnn", "reuters", "associated-press", "the-verge"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_blocked_image_domains() -> Vec<String> {
    [
        "politico.com",
        "news-journalonline.com",
        "trueachievements.com",
        "yourtango.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_search_page_size() -> u32 {
    100
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            base_url: default_news_base_url(),
            trusted_sources: default_trusted_sources(),
            blocked_image_domains: default_blocked_image_domains(),
            search_page_size: default_search_page_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,
    #[serde(default = "default_geoip_url")]
    pub geoip_url: String,
    #[serde(default = "default_units")]
    pub units: String,
}

fn default_weather_base_url() -> String {
    "https://api.openweathermap.org/data/2.5".to_string()
}

fn default_geoip_url() -> String {
    "https://ipapi.co/json/".to_string()
}

fn default_units() -> String {
    "metric".to_string()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_base_url(),
            geoip_url: default_geoip_url(),
            units: default_units(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cache_ttl_secs: default_cache_ttl(),
            weather_poll_minutes: default_weather_poll(),
            news: NewsConfig::default(),
            weather: WeatherConfig::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.weather_poll_minutes == 0 {
            anyhow::bail!("weather_poll_minutes must be at least 1");
        }
        if self.news.search_page_size == 0 {
            anyhow::bail!("news.search_page_size must be at least 1");
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn weather_poll_interval(&self) -> Duration {
        Duration::from_secs(self.weather_poll_minutes.max(1).saturating_mul(60))
    }
}

/// Provider API keys. Read from the environment only, never from the config file.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub news_api_key: Option<String>,
    pub weather_api_key: Option<String>,
}

impl Credentials {
    pub const NEWS_API_KEY_VAR: &'static str = "NEWSAPI_KEY";
    pub const WEATHER_API_KEY_VAR: &'static str = "OPENWEATHER_API_KEY";

    /// Blank keys count as missing.
    pub fn new(news_api_key: Option<String>, weather_api_key: Option<String>) -> Self {
        Self {
            news_api_key: news_api_key.filter(|k| !k.trim().is_empty()),
            weather_api_key: weather_api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var(Self::NEWS_API_KEY_VAR).ok(),
            std::env::var(Self::WEATHER_API_KEY_VAR).ok(),
        )
    }
}
