//! Remote photo-library API client: paginated media search filtered to
//! photos, with bearer handling and refresh-on-expiry.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{ClientSecrets, StoredToken, refresh_token, save_token};

pub const PHOTOS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/photoslibrary.readonly";

const SEARCH_ENDPOINT: &str = "https://photoslibrary.googleapis.com/v1/mediaItems:search";
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client shared by the authorization flow and the API calls. Carries a
/// bounded request timeout so a hung endpoint cannot stall startup or the
/// listing flow forever.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(API_TIMEOUT).build()
}

/// Authenticated API handle. Owned by the lister flow; the token is refreshed
/// in place (and re-persisted) when its recorded expiry is imminent.
pub struct ApiClient {
    http: reqwest::Client,
    secrets: ClientSecrets,
    token: StoredToken,
    cache_path: PathBuf,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    page_size: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
    filters: Filters,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Filters {
    media_type_filter: MediaTypeFilter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaTypeFilter {
    media_types: [&'static str; 1],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub media_items: Vec<MediaItem>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub base_url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl ApiClient {
    pub fn new(
        http: reqwest::Client,
        secrets: ClientSecrets,
        token: StoredToken,
        cache_path: PathBuf,
    ) -> Self {
        Self {
            http,
            secrets,
            token,
            cache_path,
        }
    }

    /// One page of the library search, filtered to photo media. Pass the
    /// `next_page_token` from the previous page to continue; a response
    /// without one is the last page.
    pub async fn search_photos(
        &mut self,
        page_size: i32,
        page_token: Option<&str>,
    ) -> Result<SearchResponse> {
        let bearer = self.bearer().await?;
        let request = SearchRequest {
            page_size,
            page_token,
            filters: Filters {
                media_type_filter: MediaTypeFilter {
                    media_types: ["PHOTO"],
                },
            },
        };
        let response = self
            .http
            .post(SEARCH_ENDPOINT)
            .bearer_auth(&bearer)
            .json(&request)
            .send()
            .await
            .context("media search request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("media search returned {status}: {body}");
        }
        response
            .json::<SearchResponse>()
            .await
            .context("decoding media search response")
    }

    async fn bearer(&mut self) -> Result<String> {
        if self.token.is_stale(SystemTime::now()) {
            let refresh = self
                .token
                .refresh_token
                .clone()
                .context("access token expired and no refresh token is cached")?;
            debug!("access token stale; refreshing");
            self.token = refresh_token(&self.http, &self.secrets, &refresh)
                .await
                .context("refreshing access token")?;
            save_token(&self.cache_path, &self.token).with_context(|| {
                format!("saving refreshed token to {}", self.cache_path.display())
            })?;
        }
        Ok(self.token.access_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_request_serializes_to_wire_names() {
        let request = SearchRequest {
            page_size: 50,
            page_token: None,
            filters: Filters {
                media_type_filter: MediaTypeFilter {
                    media_types: ["PHOTO"],
                },
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "pageSize": 50,
                "filters": {
                    "mediaTypeFilter": { "mediaTypes": ["PHOTO"] }
                }
            })
        );
    }

    #[test]
    fn search_request_includes_continuation_token() {
        let request = SearchRequest {
            page_size: 10,
            page_token: Some("abc"),
            filters: Filters {
                media_type_filter: MediaTypeFilter {
                    media_types: ["PHOTO"],
                },
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["pageToken"], "abc");
    }

    #[test]
    fn search_response_parses_page() {
        let response: SearchResponse = serde_json::from_str(
            r#"{
                "mediaItems": [
                    {"baseUrl": "https://example.com/a", "mimeType": "image/jpeg"},
                    {"baseUrl": "https://example.com/b"}
                ],
                "nextPageToken": "token-2"
            }"#,
        )
        .unwrap();
        assert_eq!(response.media_items.len(), 2);
        assert_eq!(response.media_items[0].base_url, "https://example.com/a");
        assert_eq!(response.media_items[1].mime_type, None);
        assert_eq!(response.next_page_token.as_deref(), Some("token-2"));
    }

    #[test]
    fn search_response_tolerates_empty_library() {
        let response: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(response.media_items.is_empty());
        assert!(response.next_page_token.is_none());
    }
}
