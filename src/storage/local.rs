use std::path::PathBuf;

use crate::error::{AppError, AppResult};

use super::{relative_key, StorageBackend};

/// Files under the static asset tree on local disk
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, key: &str) -> AppResult<PathBuf> {
        relative_key(key)
            .map(|rel| self.root.join(rel))
            .ok_or_else(|| AppError::Storage(format!("Invalid storage key: {}", key)))
    }
}

#[async_trait::async_trait]
impl StorageBackend for LocalBackend {
    async fn put(&self, key: &str, data: &[u8]) -> AppResult<String> {
        let path = self.full_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create {:?}: {}", parent, e)))?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write {:?}: {}", path, e)))?;

        tracing::info!("Stored image: key={}, size={}", key, data.len());
        Ok(key.to_string())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.full_path(key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to remove {:?}: {}", path, e)))?;

        tracing::info!("Removed image: key={}", key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> bool {
        match self.full_path(key) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}
