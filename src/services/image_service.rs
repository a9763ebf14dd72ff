use std::path::Path;
use std::sync::{Arc, LazyLock};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{AppError, AppResult};
use crate::services::image_search::ImageSearchClient;
use crate::storage::StorageBackend;

/// Placeholder used when an item has no image of its own
pub const DEFAULT_IMAGE: &str = "images/default/no-logo.gif";

/// Where user uploads land, relative to the static root
pub const UPLOADS_DIR: &str = "images/uploads";

/// Where keyword search results land, relative to the static root
pub const SEARCH_DIR: &str = "images/search";

/// File types accepted as item images
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Za-z0-9._-]+").expect("static regex")
});

/// A file submitted with the add/update form
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub data: Bytes,
}

pub struct ImageService {
    storage: Arc<dyn StorageBackend>,
    search: Option<ImageSearchClient>,
}

impl ImageService {
    pub fn new(storage: Arc<dyn StorageBackend>, search: Option<ImageSearchClient>) -> Self {
        Self { storage, search }
    }

    pub fn is_default(reference: &str) -> bool {
        reference == DEFAULT_IMAGE
    }

    /// Produces the image reference for an add or update.
    ///
    /// An upload wins; otherwise a keyword search when `feeling_lucky` is set;
    /// otherwise the current image (updates) or the default placeholder (adds).
    /// Search failures are logged and fall through.
    pub async fn resolve_image(
        &self,
        upload: Option<Upload>,
        keyword: &str,
        current: Option<&str>,
        feeling_lucky: bool,
    ) -> AppResult<String> {
        if let Some(upload) = upload.filter(|u| !u.data.is_empty()) {
            check_image_type(&upload.file_name)?;
            let file_name = unique_file_name(&upload.file_name, Utc::now());
            let key = format!("{}/{}", UPLOADS_DIR, file_name);
            return self.storage.put(&key, &upload.data).await;
        }

        if feeling_lucky {
            if let Some(key) = self.search_image(keyword).await {
                return Ok(key);
            }
        }

        Ok(current.unwrap_or(DEFAULT_IMAGE).to_string())
    }

    async fn search_image(&self, keyword: &str) -> Option<String> {
        let Some(search) = &self.search else {
            tracing::warn!("Image search requested for '{}' but not configured", keyword);
            return None;
        };

        tracing::info!("Fetching an image for '{}' from image search", keyword);
        let found = match search.fetch_first(keyword).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Image search failed for '{}': {}", keyword, e);
                return None;
            }
        };

        let file_name = unique_file_name(&format!("{}.{}", keyword, found.extension), Utc::now());
        let key = format!("{}/{}", SEARCH_DIR, file_name);
        match self.storage.put(&key, &found.data).await {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!("Failed to store searched image for '{}': {}", keyword, e);
                None
            }
        }
    }

    /// Removes a replaced or deleted item image. The placeholder and remote
    /// URLs are never touched; failures are logged only.
    pub async fn discard(&self, reference: &str) {
        if Self::is_default(reference) || reference.contains("://") {
            return;
        }
        if let Err(e) = self.storage.delete(reference).await {
            tracing::warn!("Could not remove image {}: {}", reference, e);
        }
    }
}

/// Rejects uploads whose extension is not an image type.
fn check_image_type(file_name: &str) -> AppResult<()> {
    let allowed = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if allowed {
        Ok(())
    } else {
        tracing::warn!("Rejected upload {:?}: not an image type", file_name);
        Err(AppError::Validation(format!(
            "Unsupported image type, expected one of: {}",
            IMAGE_EXTENSIONS.join(", ")
        )))
    }
}

/// Sanitises a client file name and appends a timestamp before the extension,
/// e.g. `blue pen.JPG` → `blue_pen_20261016093000123456.jpg`.
pub fn unique_file_name(original: &str, now: DateTime<Utc>) -> String {
    let base = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let path = Path::new(base);

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let stem = UNSAFE_FILENAME_CHARS.replace_all(stem, "_");
    let stem = stem.trim_matches(|c| c == '_' || c == '.');
    let stem = if stem.is_empty() { "image" } else { stem };

    let suffix = now.format("%Y%m%d%H%M%S%6f");

    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| UNSAFE_FILENAME_CHARS.replace_all(e, "").to_ascii_lowercase())
        .filter(|e| !e.is_empty())
    {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext),
        None => format!("{}_{}", stem, suffix),
    }
}
