//! Local schema returned by the routes and cached by the client store.

use serde::{Deserialize, Serialize};

use crate::error::ErrorBody;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub url: String,
    pub source: String,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    /// Short weekday label, e.g. `Mon`
    pub date: String,
    pub temp: i64,
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub city: String,
    pub temp: i64,
    pub condition: String,
    #[serde(default)]
    pub alert: Option<String>,
    /// UTC offset in seconds
    pub timezone: i64,
    #[serde(default)]
    pub forecast: Vec<ForecastDay>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub page: u32,
    pub page_size: u32,
    pub total_results: u64,
    pub total_pages: u64,
}

impl PaginationInfo {
    /// `page` and `page_size` are clamped to at least 1.
    pub fn new(page: u32, page_size: u32, total_results: u64) -> Self {
        let page_size = page_size.max(1);
        Self {
            page: page.max(1),
            page_size,
            total_results,
            total_pages: total_results.div_ceil(u64::from(page_size)),
        }
    }
}

/// Adapter result for the paginated news endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleBatch {
    pub articles: Vec<Article>,
    pub total_results: u64,
}

/// Success body of the news and search routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsPage {
    pub articles: Vec<Article>,
    pub pagination: PaginationInfo,
}

/// Route response as seen by a caller: either `{error}` or the payload.
///
/// `Failure` is listed first so an `{error}` body never decodes as a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Failure(ErrorBody),
    Success(T),
}

impl<T> Envelope<T> {
    pub fn into_result(self) -> Result<T, ErrorBody> {
        match self {
            Envelope::Success(value) => Ok(value),
            Envelope::Failure(body) => Err(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod pagination_tests {
        use super::*;

        #[test]
        fn test_total_pages_rounds_up() {
            assert_eq!(PaginationInfo::new(1, 10, 25).total_pages, 3);
            assert_eq!(PaginationInfo::new(1, 10, 30).total_pages, 3);
            assert_eq!(PaginationInfo::new(1, 10, 31).total_pages, 4);
        }

        #[test]
        fn test_no_results_no_pages() {
            assert_eq!(PaginationInfo::new(1, 10, 0).total_pages, 0);
        }

        #[test]
        fn test_total_pages_over_many_sizes() {
            for page_size in 1..=17u32 {
                for total in 0..=60u64 {
                    let info = PaginationInfo::new(1, page_size, total);
                    let expected = (total as f64 / page_size as f64).ceil() as u64;
                    assert_eq!(info.total_pages, expected, "{total}/{page_size}");
                }
            }
        }

        #[test]
        fn test_zero_values_are_clamped() {
            let info = PaginationInfo::new(0, 0, 5);
            assert_eq!(info.page, 1);
            assert_eq!(info.page_size, 1);
            assert_eq!(info.total_pages, 5);
        }

        #[test]
        fn test_serializes_camel_case() {
            let value = serde_json::to_value(PaginationInfo::new(2, 10, 25)).unwrap();
            assert_eq!(
                value,
                serde_json::json!({
                    "page": 2,
                    "pageSize": 10,
                    "totalResults": 25,
                    "totalPages": 3
                })
            );
        }
    }

    mod envelope_tests {
        use super::*;

        #[test]
        fn test_error_body_decodes_as_failure() {
            let envelope: Envelope<NewsPage> =
                serde_json::from_str(r#"{"error":"No news articles available."}"#).unwrap();
            assert_eq!(
                envelope.into_result(),
                Err(ErrorBody::new("No news articles available."))
            );
        }

        #[test]
        fn test_payload_decodes_as_success() {
            let json = r#"{
                "articles": [],
                "pagination": {"page": 1, "pageSize": 10, "totalResults": 0, "totalPages": 0}
            }"#;
            let envelope: Envelope<NewsPage> = serde_json::from_str(json).unwrap();
            let page = envelope.into_result().unwrap();
            assert!(page.articles.is_empty());
            assert_eq!(page.pagination.page_size, 10);
        }
    }

    #[test]
    fn test_article_null_image_is_serialized() {
        let article = Article {
            id: "abc".to_string(),
            title: "T".to_string(),
            description: "D".to_string(),
            content: "C".to_string(),
            url: "https://example.com".to_string(),
            source: "S".to_string(),
            source_id: None,
            published_at: None,
            image_url: None,
            country: None,
        };
        let value = serde_json::to_value(&article).unwrap();
        assert!(value["imageUrl"].is_null());
        assert!(value.get("country").is_none());
        assert_eq!(value["source"], "S");
    }
}
