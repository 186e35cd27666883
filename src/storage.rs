//! Object storage abstraction.
//!
//! One contract, two interchangeable implementations:
//! - **[`LocalBackend`](crate::storage_local::LocalBackend)** — keys map to
//!   files under a configured root; URLs are relative paths served by the
//!   application; no expiry.
//! - **[`S3Backend`](crate::storage_s3::S3Backend)** — keys map to private
//!   bucket objects; URLs are time-limited presigned links that callers must
//!   re-request per use.
//!
//! The backend is chosen once at boot by [`create_backend`] and injected
//! into everything that touches stored bytes. Callers never inspect which
//! variant they hold.
//!
//! Keys are opaque: a generated identifier plus a content-appropriate
//! extension. No consumer other than the backend itself may derive meaning
//! from a key.

use async_trait::async_trait;
use std::path::Path;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::Result;
use crate::storage_local::LocalBackend;
use crate::storage_s3::S3Backend;

/// Outcome of a successful `put`.
#[derive(Debug, Clone)]
pub struct PutResult {
    /// URL the stored object can be fetched from. For the S3 backend this
    /// is a presigned link; do not cache it beyond its validity window.
    pub url: String,
    /// Stored size in bytes.
    pub size: u64,
}

/// Uniform contract over object storage.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend identifier (`"local"` or `"s3"`), for status output only.
    fn name(&self) -> &str;

    /// Store `bytes` under `key`, overwriting any existing object.
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<PutResult>;

    /// A URL directly fetchable by a browser or client, with no further
    /// backend calls.
    async fn url(&self, key: &str) -> Result<String>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Remove the object. A key that is already gone counts as success.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Object size in bytes, or `None` if the key does not exist.
    async fn size(&self, key: &str) -> Result<Option<u64>>;

    /// Fetch the object's bytes to a local destination path, for consumers
    /// that need filesystem access (e.g. transcription). The caller owns
    /// cleanup of the destination.
    async fn get(&self, key: &str, destination: &Path) -> Result<()>;
}

/// Choose and construct the storage backend once, at boot.
///
/// S3 is used only when both `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY`
/// are present in the environment and a bucket is configured; otherwise the
/// local backend is selected silently. Switching backends mid-lifetime would
/// orphan keys stored under the other namespace, so this decision is made
/// exactly once and the result injected everywhere.
pub fn create_backend(config: &StorageConfig) -> Result<Box<dyn StorageBackend>> {
    let have_creds = std::env::var("AWS_ACCESS_KEY_ID").is_ok()
        && std::env::var("AWS_SECRET_ACCESS_KEY").is_ok();

    if have_creds && !config.s3.bucket.is_empty() {
        Ok(Box::new(S3Backend::new(config.s3.clone())?))
    } else {
        Ok(Box::new(LocalBackend::new(
            config.root.clone(),
            config.base_url.clone(),
        )?))
    }
}

/// Generate an opaque storage key, preserving the original file extension
/// so content type can be inferred from the stored name alone.
pub fn new_storage_key(original_name: &str) -> String {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("bin");
    format!("{}.{}", Uuid::new_v4(), ext)
}

/// Detect an audio MIME type from a key's extension.
pub fn detect_audio_content_type(key: &str) -> String {
    match key.rsplit('.').next() {
        Some("webm") => "audio/webm".to_string(),
        Some("mp3") => "audio/mpeg".to_string(),
        Some("wav") => "audio/wav".to_string(),
        Some("m4a") => "audio/mp4".to_string(),
        Some("ogg") => "audio/ogg".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_storage_key_keeps_extension() {
        let key = new_storage_key("meeting notes.webm");
        assert!(key.ends_with(".webm"));
        assert!(!key.contains(' '));
    }

    #[test]
    fn test_new_storage_key_rejects_odd_extension() {
        let key = new_storage_key("../../etc/passwd.a/b");
        assert!(key.ends_with(".bin"));
    }

    #[test]
    fn test_detect_audio_content_type() {
        assert_eq!(detect_audio_content_type("a.mp3"), "audio/mpeg");
        assert_eq!(detect_audio_content_type("a.webm"), "audio/webm");
        assert_eq!(
            detect_audio_content_type("noext"),
            "application/octet-stream"
        );
    }
}
