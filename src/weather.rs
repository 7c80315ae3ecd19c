use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use reqwest::Request;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{ForecastDay, WeatherSnapshot};
use crate::upstream::Upstream;

pub const MAX_FORECAST_DAYS: usize = 7;
const UNKNOWN_CONDITION: &str = "Unknown";
const NO_ALERTS: &str = "No alerts available";

#[derive(Debug, Deserialize)]
struct CurrentWeatherResponse {
    #[serde(default)]
    name: String,
    main: Reading,
    #[serde(default)]
    weather: Vec<Condition>,
    #[serde(default)]
    timezone: i64,
    #[serde(default)]
    alerts: Vec<Alert>,
}

#[derive(Debug, Deserialize)]
struct Reading {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    main: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Alert {
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    list: Vec<ForecastEntry>,
}

#[derive(Debug, Deserialize)]
struct ForecastEntry {
    /// Unix seconds
    dt: i64,
    main: Reading,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct GeoIpResponse {
    city: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    City(&'a str),
    Coords(f64, f64),
}

impl Target<'_> {
    fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            Target::City(city) => vec![("q", city.to_string())],
            Target::Coords(lat, lon) => vec![("lat", lat.to_string()), ("lon", lon.to_string())],
        }
    }

    fn failure(&self, call: &str) -> String {
        let hint = match self {
            Target::City(_) => "city name",
            Target::Coords(..) => "coordinates",
        };
        format!("{} API failed. Check {} or API key.", call, hint)
    }
}

fn first_condition(conditions: &[Condition]) -> String {
    conditions
        .first()
        .and_then(|c| c.main.clone())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| UNKNOWN_CONDITION.to_string())
}

/// One entry per local calendar day, first occurrence wins, at most seven.
fn build_forecast(entries: &[ForecastEntry], utc_offset_secs: i64) -> Vec<ForecastDay> {
    let offset = i32::try_from(utc_offset_secs)
        .ok()
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix());

    let mut seen = HashSet::new();
    let mut days = Vec::new();

    for entry in entries {
        if days.len() >= MAX_FORECAST_DAYS {
            break;
        }
        let Some(at) = DateTime::from_timestamp(entry.dt, 0) else {
            continue;
        };
        let local = at.with_timezone(&offset);
        if seen.insert(local.date_naive()) {
            days.push(ForecastDay {
                date: local.format("%a").to_string(),
                temp: entry.main.temp.round() as i64,
                condition: first_condition(&entry.weather),
            });
        }
    }

    days
}

fn snapshot(current: CurrentWeatherResponse, forecast: ForecastResponse) -> WeatherSnapshot {
    let alert = current
        .alerts
        .first()
        .and_then(|a| a.description.clone())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| NO_ALERTS.to_string());

    WeatherSnapshot {
        forecast: build_forecast(&forecast.list, current.timezone),
        condition: first_condition(&current.weather),
        temp: current.main.temp.round() as i64,
        city: current.name,
        alert: Some(alert),
        timezone: current.timezone,
    }
}

impl Upstream {
    pub async fn fetch_weather(&self, city: &str) -> Result<WeatherSnapshot> {
        self.fetch_weather_for(Target::City(city)).await
    }

    pub async fn fetch_weather_by_coords(&self, lat: f64, lon: f64) -> Result<WeatherSnapshot> {
        self.fetch_weather_for(Target::Coords(lat, lon)).await
    }

    /// City for the caller's public IP. Best effort: failures are logged and yield `None`.
    pub async fn fetch_city_by_ip(&self) -> Option<String> {
        match self.lookup_city().await {
            Ok(city) => city,
            Err(e) => {
                warn!("IP geolocation failed: {}", e);
                None
            }
        }
    }

    async fn lookup_city(&self) -> Result<Option<String>> {
        let request = self
            .client
            .get(&self.config.weather.geoip_url)
            .build()
            .map_err(Error::from_transport)?;
        let body: GeoIpResponse = self
            .send_json(request, |status| {
                format!("IP API failed with status {}", status.as_u16())
            })
            .await?;
        Ok(body.city.filter(|c| !c.trim().is_empty()))
    }

    /// Current conditions then forecast; either failing fails the whole call.
    async fn fetch_weather_for(&self, target: Target<'_>) -> Result<WeatherSnapshot> {
        let key = self.weather_key()?;

        let request = self.weather_request("weather", &target, key)?;
        let current: CurrentWeatherResponse = self
            .send_json(request, |_| target.failure("Weather"))
            .await?;

        let request = self.weather_request("forecast", &target, key)?;
        let forecast: ForecastResponse = self
            .send_json(request, |_| target.failure("Forecast"))
            .await?;

        let snapshot = snapshot(current, forecast);
        info!(
            "Weather for {}: {}°, {} ({} forecast days)",
            snapshot.city,
            snapshot.temp,
            snapshot.condition,
            snapshot.forecast.len()
        );
        Ok(snapshot)
    }

    fn weather_request(&self, endpoint: &str, target: &Target<'_>, key: &str) -> Result<Request> {
        let url = format!(
            "{}/{}",
            self.config.weather.base_url.trim_end_matches('/'),
            endpoint
        );
        let mut params = target.params();
        params.push(("units", self.config.weather.units.clone()));
        params.push(("appid", key.to_string()));

        self.client
            .get(url)
            .query(&params)
            .build()
            .map_err(Error::from_transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Credentials};
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // 2026-10-19 00:00:00 UTC, a Monday
    const MONDAY: i64 = 1_792_368_000;
    const HOUR: i64 = 3600;
    const DAY: i64 = 24 * HOUR;

    fn entry(dt: i64, temp: f64, condition: &str) -> Value {
        json!({"dt": dt, "main": {"temp": temp}, "weather": [{"main": condition}]})
    }

    fn entries(values: Vec<Value>) -> Vec<ForecastEntry> {
        serde_json::from_value(Value::Array(values)).unwrap()
    }

    fn current_body(city: &str) -> Value {
        json!({
            "name": city,
            "main": {"temp": 18.6},
            "weather": [{"main": "Clouds"}],
            "timezone": 3600
        })
    }

    fn forecast_body() -> Value {
        json!({"list": [
            entry(MONDAY + 9 * HOUR, 17.2, "Rain"),
            entry(MONDAY + 12 * HOUR, 19.0, "Clear"),
            entry(MONDAY + DAY + 9 * HOUR, 15.4, "Clouds")
        ]})
    }

    async fn upstream_for(server: &MockServer) -> Upstream {
        let mut config = Config::default();
        config.weather.base_url = format!("{}/data/2.5", server.uri());
        config.weather.geoip_url = format!("{}/json/", server.uri());
        let creds = Credentials::new(None, Some("weather-key".to_string()));
        Upstream::new(config, creds).unwrap()
    }

    mod forecast_tests {
        use super::*;

        #[test]
        fn test_same_day_repeated_keeps_first() {
            let list = entries(vec![
                entry(MONDAY + 3 * HOUR, 10.4, "Rain"),
                entry(MONDAY + 6 * HOUR, 20.0, "Clear"),
                entry(MONDAY + 9 * HOUR, 30.0, "Snow"),
            ]);

            let forecast = build_forecast(&list, 0);

            assert_eq!(forecast.len(), 1);
            assert_eq!(
                forecast[0],
                ForecastDay {
                    date: "Mon".to_string(),
                    temp: 10,
                    condition: "Rain".to_string()
                }
            );
        }

        #[test]
        fn test_one_entry_per_day_in_order() {
            let list = entries(
                (0..5)
                    .flat_map(|d| {
                        (0..8).map(move |slot| entry(MONDAY + d * DAY + slot * 3 * HOUR, d as f64, "Clear"))
                    })
                    .collect(),
            );

            let forecast = build_forecast(&list, 0);
            let labels: Vec<&str> = forecast.iter().map(|d| d.date.as_str()).collect();

            assert_eq!(labels, vec!["Mon", "Tue", "Wed", "Thu", "Fri"]);
            assert_eq!(forecast[3].temp, 3);
        }

        #[test]
        fn test_caps_at_seven_days() {
            let list = entries((0..10).map(|d| entry(MONDAY + d * DAY, 1.0, "Clear")).collect());
            assert_eq!(build_forecast(&list, 0).len(), MAX_FORECAST_DAYS);
        }

        #[test]
        fn test_days_follow_city_offset() {
            // 23:00 UTC Monday is already Tuesday at UTC+2.
            let list = entries(vec![
                entry(MONDAY + 20 * HOUR, 1.0, "Clear"),
                entry(MONDAY + 23 * HOUR, 2.0, "Rain"),
            ]);

            let utc = build_forecast(&list, 0);
            let plus_two = build_forecast(&list, 2 * 3600);

            assert_eq!(utc.len(), 1);
            assert_eq!(plus_two.len(), 2);
            assert_eq!(plus_two[1].date, "Tue");
        }

        #[test]
        fn test_missing_condition_is_unknown() {
            let list = entries(vec![json!({"dt": MONDAY, "main": {"temp": 4.5}, "weather": []})]);
            assert_eq!(build_forecast(&list, 0)[0].condition, "Unknown");
        }
    }

    mod fetch_weather_tests {
        use super::*;

        #[tokio::test]
        async fn test_city_weather() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/data/2.5/weather"))
                .and(query_param("q", "Lisbon"))
                .and(query_param("units", "metric"))
                .and(query_param("appid", "weather-key"))
                .respond_with(ResponseTemplate::new(200).set_body_json(current_body("Lisbon")))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/data/2.5/forecast"))
                .and(query_param("q", "Lisbon"))
                .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
                .expect(1)
                .mount(&server)
                .await;

            let upstream = upstream_for(&server).await;
            let weather = upstream.fetch_weather("Lisbon").await.unwrap();

            assert_eq!(weather.city, "Lisbon");
            assert_eq!(weather.temp, 19);
            assert_eq!(weather.condition, "Clouds");
            assert_eq!(weather.alert.as_deref(), Some("No alerts available"));
            assert_eq!(weather.timezone, 3600);
            assert_eq!(weather.forecast.len(), 2);
            assert_eq!(weather.forecast[0].condition, "Rain");
        }

        #[tokio::test]
        async fn test_coords_weather_and_alert() {
            let server = MockServer::start().await;
            let mut body = current_body("Porto");
            body["alerts"] = json!([{"description": "Storm warning"}]);
            Mock::given(method("GET"))
                .and(path("/data/2.5/weather"))
                .and(query_param("lat", "41.15"))
                .and(query_param("lon", "-8.61"))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/data/2.5/forecast"))
                .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
                .mount(&server)
                .await;

            let upstream = upstream_for(&server).await;
            let weather = upstream.fetch_weather_by_coords(41.15, -8.61).await.unwrap();

            assert_eq!(weather.city, "Porto");
            assert_eq!(weather.alert.as_deref(), Some("Storm warning"));
        }

        #[tokio::test]
        async fn test_provider_message_on_unknown_city() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/data/2.5/weather"))
                .respond_with(
                    ResponseTemplate::new(404)
                        .set_body_json(json!({"cod": "404", "message": "city not found"})),
                )
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/data/2.5/forecast"))
                .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
                .expect(0)
                .mount(&server)
                .await;

            let upstream = upstream_for(&server).await;
            let err = upstream.fetch_weather("Atlantis").await.unwrap_err();

            assert_eq!(err.to_string(), "city not found");
        }

        #[tokio::test]
        async fn test_forecast_failure_fails_whole_call() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/data/2.5/weather"))
                .respond_with(ResponseTemplate::new(200).set_body_json(current_body("Lisbon")))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/data/2.5/forecast"))
                .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
                .mount(&server)
                .await;

            let upstream = upstream_for(&server).await;
            let err = upstream.fetch_weather_by_coords(1.0, 2.0).await.unwrap_err();

            assert_eq!(
                err,
                Error::UpstreamHttp {
                    status: 500,
                    message: "Forecast API failed. Check coordinates or API key.".to_string()
                }
            );
        }

        #[tokio::test]
        async fn test_missing_key() {
            let upstream = Upstream::new(Config::default(), Credentials::default()).unwrap();
            let err = upstream.fetch_weather("Lisbon").await.unwrap_err();
            assert_eq!(
                err.to_string(),
                "API configuration error. Please contact support."
            );
        }
    }

    mod city_by_ip_tests {
        use super::*;

        #[tokio::test]
        async fn test_city_found() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/json/"))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(json!({"city": "Madrid", "ip": "1.2.3.4"})),
                )
                .mount(&server)
                .await;

            let upstream = upstream_for(&server).await;
            assert_eq!(upstream.fetch_city_by_ip().await, Some("Madrid".to_string()));
        }

        #[tokio::test]
        async fn test_failure_is_none() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/json/"))
                .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
                .mount(&server)
                .await;

            let upstream = upstream_for(&server).await;
            assert_eq!(upstream.fetch_city_by_ip().await, None);
        }

        #[tokio::test]
        async fn test_missing_city_is_none() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/json/"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ip": "1.2.3.4"})))
                .mount(&server)
                .await;

            let upstream = upstream_for(&server).await;
            assert_eq!(upstream.fetch_city_by_ip().await, None);
        }
    }
}
