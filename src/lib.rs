//! News Dashboard - news and weather aggregation behind one JSON API
//!
//! The server side proxies NewsAPI and OpenWeatherMap, normalizing their
//! responses into stable article and weather shapes. The client side keeps
//! a cached, independently refreshed view of those routes.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod news;
pub mod poller;
pub mod routes;
pub mod upstream;
pub mod weather;
