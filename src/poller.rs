use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::DashboardStore;
use crate::config::Config;
use crate::upstream::Upstream;

/// Shortest period a poller will run at; a zero period would panic the timer.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Best-effort city lookup used when neither a remembered city nor
/// coordinates are available.
#[async_trait]
pub trait CityLookup: Send + Sync {
    async fn city_by_ip(&self) -> Option<String>;
}

#[async_trait]
impl CityLookup for Upstream {
    async fn city_by_ip(&self) -> Option<String> {
        self.fetch_city_by_ip().await
    }
}

/// Repeating weather refresh for one city.
///
/// The refresh runs inside the timer loop, so a tick that comes due while
/// the previous refresh is still in flight is skipped rather than queued.
/// Dropping the poller cancels it.
pub struct WeatherPoller {
    city: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl WeatherPoller {
    /// Poll every `weather_poll_minutes` from `config`.
    pub fn from_config(store: Arc<DashboardStore>, city: impl Into<String>, config: &Config) -> Self {
        Self::start(store, city, config.weather_poll_interval())
    }

    pub fn start(store: Arc<DashboardStore>, city: impl Into<String>, every: Duration) -> Self {
        let city = city.into();
        let every = every.max(MIN_POLL_INTERVAL);
        let cancel = CancellationToken::new();

        let task_city = city.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                info!("Polling weather for {}", task_city);
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    result = store.update_weather(&task_city) => {
                        if let Err(e) = result {
                            warn!("Weather poll for {} failed: {}", task_city, e.error);
                        }
                    }
                }
            }
            info!("Weather polling for {} stopped", task_city);
        });

        Self {
            city,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel and wait for the task to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for WeatherPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Pick the city to show weather for and load it into `store`.
///
/// Order: the remembered city, then coordinates (the city name comes back
/// in the snapshot), then IP geolocation. Returns the city to poll, or
/// `None` when every source failed.
pub async fn locate(
    store: &DashboardStore,
    remembered: Option<&str>,
    coords: Option<(f64, f64)>,
    lookup: &dyn CityLookup,
) -> Option<String> {
    if let Some(city) = remembered.map(str::trim).filter(|c| !c.is_empty()) {
        // A remembered city is polled even if this first fetch fails.
        let _ = store.update_weather(city).await;
        return Some(city.to_string());
    }

    if let Some((lat, lon)) = coords {
        match store.update_weather_by_coords(lat, lon).await {
            Ok(snapshot) if !snapshot.city.is_empty() => return Some(snapshot.city),
            Ok(_) => warn!("Weather for ({}, {}) has no city name", lat, lon),
            Err(e) => warn!("Weather by coordinates failed: {}", e.error),
        }
    }

    let city = lookup.city_by_ip().await?;
    match store.update_weather(&city).await {
        Ok(snapshot) if !snapshot.city.is_empty() => Some(snapshot.city),
        Ok(_) => Some(city),
        Err(e) => {
            warn!("Weather for {} failed: {}", city, e.error);
            None
        }
    }
}
