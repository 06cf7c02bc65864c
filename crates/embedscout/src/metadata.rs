// ABOUTME: TMDB-style metadata lookup used by providers to turn a numeric id
// ABOUTME: into a searchable title, release year, and IMDb id.

use serde_json::Value;
use tracing::debug;

use crate::error::ScrapeError;
use crate::stream::MediaType;

const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org";
const DEFAULT_API_KEY: &str = "439c478a771f35c05022f9feabcca01c";

/// Title metadata for one movie or show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleInfo {
    pub title: String,
    pub year: Option<i32>,
    pub imdb_id: Option<String>,
}

/// Client for the metadata API providers search sites with.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl Default for MetadataClient {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl MetadataClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Look up the title, year, and IMDb id for a content id.
    pub async fn title_info(
        &self,
        media_type: MediaType,
        id: &str,
    ) -> Result<TitleInfo, ScrapeError> {
        let url = format!(
            "{}/3/{}/{}?api_key={}&append_to_response=external_ids",
            self.base_url,
            media_type.as_str(),
            id,
            self.api_key
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                ScrapeError::fetch(&url, "Metadata", Some(anyhow::anyhow!("request failed: {}", e)))
            })?
            .error_for_status()
            .map_err(|e| {
                ScrapeError::fetch(&url, "Metadata", Some(anyhow::anyhow!("{}", e)))
            })?;

        let body: Value = response.json().await.map_err(|e| {
            ScrapeError::parse(&url, "Metadata", Some(anyhow::anyhow!("bad JSON: {}", e)))
        })?;

        let info = match media_type {
            MediaType::Movie => TitleInfo {
                title: json_str(&body, "title").ok_or_else(|| {
                    ScrapeError::parse(&url, "Metadata", Some(anyhow::anyhow!("missing title")))
                })?,
                year: json_str(&body, "release_date").and_then(|d| parse_year(&d)),
                imdb_id: json_str(&body, "imdb_id"),
            },
            MediaType::Tv => TitleInfo {
                title: json_str(&body, "name").ok_or_else(|| {
                    ScrapeError::parse(&url, "Metadata", Some(anyhow::anyhow!("missing name")))
                })?,
                year: json_str(&body, "first_air_date").and_then(|d| parse_year(&d)),
                imdb_id: body
                    .get("external_ids")
                    .and_then(|e| e.get("imdb_id"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
        };

        debug!(id, media_type = %media_type, title = info.title, "metadata lookup");
        Ok(info)
    }
}

fn json_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_year(date: &str) -> Option<i32> {
    date.get(..4)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use pretty_assertions::assert_eq;

    fn client(server: &MockServer) -> MetadataClient {
        MetadataClient::default().with_base_url(server.base_url())
    }

    #[tokio::test]
    async fn movie_lookup_parses_title_year_imdb() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/3/movie/603")
                    .query_param("append_to_response", "external_ids");
                then.status(200).json_body(serde_json::json!({
                    "title": "The Matrix",
                    "release_date": "1999-03-30",
                    "imdb_id": "tt0133093"
                }));
            })
            .await;

        let info = client(&server)
            .title_info(MediaType::Movie, "603")
            .await
            .expect("lookup");

        assert_eq!(info.title, "The Matrix");
        assert_eq!(info.year, Some(1999));
        assert_eq!(info.imdb_id.as_deref(), Some("tt0133093"));
    }

    #[tokio::test]
    async fn tv_lookup_reads_external_ids() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/3/tv/110316");
                then.status(200).json_body(serde_json::json!({
                    "name": "Alice in Borderland",
                    "first_air_date": "2020-12-10",
                    "external_ids": {"imdb_id": "tt10795658"}
                }));
            })
            .await;

        let info = client(&server)
            .title_info(MediaType::Tv, "110316")
            .await
            .expect("lookup");

        assert_eq!(info.title, "Alice in Borderland");
        assert_eq!(info.year, Some(2020));
        assert_eq!(info.imdb_id.as_deref(), Some("tt10795658"));
    }

    #[tokio::test]
    async fn not_found_is_a_fetch_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/3/movie/0");
                then.status(404).json_body(serde_json::json!({"status_code": 34}));
            })
            .await;

        let err = client(&server)
            .title_info(MediaType::Movie, "0")
            .await
            .expect_err("should fail");
        assert!(err.is_fetch());
    }

    #[tokio::test]
    async fn missing_title_is_a_parse_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/3/movie/1");
                then.status(200).json_body(serde_json::json!({"release_date": "2001-01-01"}));
            })
            .await;

        let err = client(&server)
            .title_info(MediaType::Movie, "1")
            .await
            .expect_err("should fail");
        assert!(!err.is_fetch());
    }
}
