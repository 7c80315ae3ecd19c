use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use news_dashboard::config::{Config, Credentials};
use news_dashboard::routes::{self, AppState};
use news_dashboard::upstream::Upstream;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "news_dashboard=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("DASHBOARD_CONFIG").unwrap_or_else(|_| "dashboard.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        "Loaded configuration from {} ({} trusted sources)",
        config_path,
        config.news.trusted_sources.len()
    );

    let credentials = Credentials::from_env();
    if credentials.news_api_key.is_none() {
        warn!("{} is not set; news routes will fail", Credentials::NEWS_API_KEY_VAR);
    }
    if credentials.weather_api_key.is_none() {
        warn!("{} is not set; weather routes will fail", Credentials::WEATHER_API_KEY_VAR);
    }

    let bind_addr = config.bind_addr.clone();
    let upstream = Arc::new(Upstream::new(config, credentials)?);
    let app = routes::router(Arc::new(AppState { upstream }));

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
