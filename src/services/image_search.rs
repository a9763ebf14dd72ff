//! Keyword image search (Bing Image Search v7 response shape)

use bytes::{Bytes, BytesMut};
use serde::Deserialize;

use crate::config::ImageSearchConfig;
use crate::error::{AppError, AppResult};

/// Largest search result that will be downloaded
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<SearchHit>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchHit {
    content_url: String,
    #[serde(default)]
    encoding_format: Option<String>,
}

/// A downloaded search result
#[derive(Debug)]
pub struct FoundImage {
    pub data: Bytes,
    pub extension: String,
}

#[derive(Clone)]
pub struct ImageSearchClient {
    http_client: reqwest::Client,
    config: ImageSearchConfig,
    max_bytes: usize,
}

impl ImageSearchClient {
    pub fn new(http_client: reqwest::Client, config: ImageSearchConfig) -> Self {
        Self {
            http_client,
            config,
            max_bytes: MAX_IMAGE_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Searches for `keyword` and downloads the first hit.
    pub async fn fetch_first(&self, keyword: &str) -> AppResult<FoundImage> {
        let response = self
            .http_client
            .get(&self.config.url)
            .query(&[("q", keyword), ("count", "1"), ("safeSearch", "Strict")])
            .header("Ocp-Apim-Subscription-Key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Image search request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "Image search failed: status={}",
                response.status()
            )));
        }

        let results: SearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse image search: {}", e)))?;

        let hit = results
            .value
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("No image found for '{}'", keyword)))?;

        let download = self
            .http_client
            .get(&hit.content_url)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Image download failed: {}", e)))?;

        if !download.status().is_success() {
            return Err(AppError::Internal(format!(
                "Image download failed: status={}",
                download.status()
            )));
        }

        let content_type = download
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let data = self.read_capped(download).await?;

        if data.is_empty() {
            return Err(AppError::NotFound(format!("Empty image for '{}'", keyword)));
        }

        let extension = image_extension(
            hit.encoding_format.as_deref(),
            content_type.as_deref(),
            &hit.content_url,
        );

        Ok(FoundImage { data, extension })
    }

    /// Reads the body, giving up once it grows past `max_bytes`.
    async fn read_capped(&self, mut download: reqwest::Response) -> AppResult<Bytes> {
        let too_large =
            || AppError::Internal(format!("Image download exceeds {} bytes", self.max_bytes));

        if download
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(too_large());
        }

        let mut data = BytesMut::new();
        while let Some(chunk) = download
            .chunk()
            .await
            .map_err(|e| AppError::Internal(format!("Image download failed: {}", e)))?
        {
            if data.len() + chunk.len() > self.max_bytes {
                return Err(too_large());
            }
            data.extend_from_slice(&chunk);
        }
        Ok(data.freeze())
    }
}

/// Picks a file extension from the search metadata, the response content type
/// or the URL path, in that order.
fn image_extension(encoding: Option<&str>, content_type: Option<&str>, url: &str) -> String {
    let normalize = |ext: &str| match ext.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" => Some("jpg".to_string()),
        "png" => Some("png".to_string()),
        "gif" => Some("gif".to_string()),
        "webp" => Some("webp".to_string()),
        "bmp" => Some("bmp".to_string()),
        _ => None,
    };

    encoding
        .and_then(normalize)
        .or_else(|| {
            content_type
                .and_then(|ct| ct.split(';').next())
                .and_then(|ct| ct.trim().strip_prefix("image/"))
                .and_then(normalize)
        })
        .or_else(|| {
            let path = url.split(['?', '#']).next().unwrap_or(url);
            std::path::Path::new(path)
                .extension()
                .and_then(|e| e.to_str())
                .and_then(normalize)
        })
        .unwrap_or_else(|| "jpg".to_string())
}
