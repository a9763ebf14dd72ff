// Storage abstraction for image files

pub mod local;

pub use local::LocalBackend;

use std::path::{Component, Path, PathBuf};

use crate::error::AppResult;

/// Image storage keyed by paths relative to the static asset root
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write a file at `key`, creating parent directories. Returns the key.
    async fn put(&self, key: &str, data: &[u8]) -> AppResult<String>;

    /// Remove the file at `key`
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Whether a file exists at `key`
    async fn exists(&self, key: &str) -> bool;
}

/// Turns a storage key into a relative path, rejecting anything that could
/// escape the root (absolute paths, `..`, prefixes).
pub fn relative_key(key: &str) -> Option<PathBuf> {
    let path = Path::new(key);
    if key.is_empty() {
        return None;
    }
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_key_accepts_nested_paths() {
        assert_eq!(
            relative_key("images/uploads/pen.jpg"),
            Some(PathBuf::from("images/uploads/pen.jpg"))
        );
        assert_eq!(
            relative_key("./images/a.png"),
            Some(PathBuf::from("images/a.png"))
        );
    }

    #[test]
    fn test_relative_key_rejects_escapes() {
        assert_eq!(relative_key("../etc/passwd"), None);
        assert_eq!(relative_key("images/../../secret"), None);
        assert_eq!(relative_key("/etc/passwd"), None);
        assert_eq!(relative_key(""), None);
        assert_eq!(relative_key("."), None);
    }
}
