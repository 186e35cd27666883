//! Local filesystem storage backend.
//!
//! Keys map directly to files under a configured root directory. URLs are
//! relative paths under the configured base URL, served by the surrounding
//! application; they never expire.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};
use crate::storage::{PutResult, StorageBackend};

pub struct LocalBackend {
    root: PathBuf,
    base_url: String,
}

impl LocalBackend {
    /// Create the backend, ensuring the root directory exists.
    pub fn new(root: PathBuf, base_url: String) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve a key to its path under the root. Keys with path separators
    /// or parent components are rejected outright.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains('/') || key.contains('\\') || key.contains("..") {
            return Err(EngineError::Storage(format!("invalid storage key: {key}")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<PutResult> {
        let path = self.path_for(key)?;
        std::fs::write(&path, bytes)?;
        Ok(PutResult {
            url: format!("{}/{}", self.base_url, key),
            size: bytes.len() as u64,
        })
    }

    async fn url(&self, key: &str) -> Result<String> {
        self.path_for(key)?;
        Ok(format!("{}/{}", self.base_url, key))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key)?.exists())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            // Already gone counts as success for idempotence.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    async fn size(&self, key: &str) -> Result<Option<u64>> {
        let path = self.path_for(key)?;
        match std::fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, key: &str, destination: &Path) -> Result<()> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Err(EngineError::NotFound(format!("stored object: {key}")));
        }
        std::fs::copy(&path, destination)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backend() -> (TempDir, LocalBackend) {
        let tmp = TempDir::new().unwrap();
        let backend =
            LocalBackend::new(tmp.path().join("store"), "/recordings".to_string()).unwrap();
        (tmp, backend)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (tmp, backend) = backend();
        let bytes = b"\x00\x01binary audio\xff";

        let result = backend.put("clip.webm", bytes, "audio/webm").await.unwrap();
        assert_eq!(result.size, bytes.len() as u64);
        assert_eq!(result.url, "/recordings/clip.webm");

        let dest = tmp.path().join("fetched.webm");
        backend.get("clip.webm", &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_exists_and_size() {
        let (_tmp, backend) = backend();
        assert!(!backend.exists("missing.webm").await.unwrap());
        assert_eq!(backend.size("missing.webm").await.unwrap(), None);

        backend.put("clip.webm", b"abcd", "audio/webm").await.unwrap();
        assert!(backend.exists("clip.webm").await.unwrap());
        assert_eq!(backend.size("clip.webm").await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_tmp, backend) = backend();
        backend.put("clip.webm", b"abcd", "audio/webm").await.unwrap();

        assert!(backend.delete("clip.webm").await.unwrap());
        // Second delete of the same key still succeeds.
        assert!(backend.delete("clip.webm").await.unwrap());
        assert!(!backend.exists("clip.webm").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let (_tmp, backend) = backend();
        assert!(backend.put("../evil", b"x", "audio/webm").await.is_err());
        assert!(backend.url("a/b").await.is_err());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (tmp, backend) = backend();
        let dest = tmp.path().join("out");
        let err = backend.get("missing.webm", &dest).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
