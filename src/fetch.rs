//! Image fetcher: downloads a server-side pre-scaled variant of a photo and
//! decodes it. No caching, no retry; every failure is reported to the
//! rotation loop and logged there.

use std::time::Duration;

use image::DynamicImage;
use thiserror::Error;

use crate::events::PhotoUrl;

/// Bounds requested from the remote so full-resolution originals are never
/// downloaded.
pub const VARIANT_WIDTH: u32 = 2048;
pub const VARIANT_HEIGHT: u32 = 1024;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {0}")]
    Status(reqwest::StatusCode),
    #[error("decode error: {0}")]
    Decode(#[from] image::ImageError),
}

pub struct Fetcher {
    http: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> reqwest::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?,
        })
    }

    /// Downloads and decodes one photo. The codec is auto-detected from the
    /// response body.
    pub async fn fetch(&self, url: &PhotoUrl) -> Result<DynamicImage, FetchError> {
        let response = self
            .http
            .get(url.sized(VARIANT_WIDTH, VARIANT_HEIGHT))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let bytes = response.bytes().await?;
        Ok(image::load_from_memory(&bytes)?)
    }
}
