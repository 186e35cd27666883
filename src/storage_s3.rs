//! Amazon S3 storage backend.
//!
//! Talks to the S3 REST API directly with AWS Signature V4 authentication,
//! using only pure-Rust dependencies (`hmac`, `sha2`) for signing. Objects
//! are private by default; read access goes through presigned GET URLs with
//! a bounded validity window, so callers must re-request a URL per use
//! rather than caching it.
//!
//! Supports custom endpoints for S3-compatible services (MinIO, LocalStack).
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID` — required
//! - `AWS_SECRET_ACCESS_KEY` — required
//! - `AWS_SESSION_TOKEN` — optional (for temporary credentials / IAM roles)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;

use crate::config::S3StorageConfig;
use crate::error::{EngineError, Result};
use crate::storage::{PutResult, StorageBackend};

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials loaded from environment variables.
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").map_err(|_| {
            EngineError::BackendUnavailable("AWS_ACCESS_KEY_ID environment variable not set".into())
        })?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| {
            EngineError::BackendUnavailable(
                "AWS_SECRET_ACCESS_KEY environment variable not set".into(),
            )
        })?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

pub struct S3Backend {
    config: S3StorageConfig,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3Backend {
    /// Construct the backend, reading credentials from the environment once.
    pub fn new(config: S3StorageConfig) -> Result<Self> {
        let creds = AwsCredentials::from_env()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Storage(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            creds,
            client,
        })
    }

    /// Compute the S3 hostname for the configured bucket and region.
    ///
    /// A custom `endpoint_url` (MinIO, LocalStack) takes precedence over the
    /// standard `<bucket>.s3.<region>.amazonaws.com` virtual-hosted form.
    fn host(&self) -> String {
        if let Some(ref endpoint) = self.config.endpoint_url {
            endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string()
        } else {
            format!(
                "{}.s3.{}.amazonaws.com",
                self.config.bucket, self.config.region
            )
        }
    }

    /// Full object key under the configured prefix.
    fn object_key(&self, key: &str) -> String {
        let prefix = self.config.prefix.trim_matches('/');
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", prefix, key)
        }
    }

    fn object_url(&self, key: &str) -> (String, String) {
        let encoded_key = self
            .object_key(key)
            .split('/')
            .map(uri_encode)
            .collect::<Vec<_>>()
            .join("/");
        let canonical_uri = format!("/{}", encoded_key);
        let url = format!("https://{}{}", self.host(), canonical_uri);
        (url, canonical_uri)
    }

    /// Build SigV4 authorization headers for a header-signed request.
    fn sign_headers(
        &self,
        method: &str,
        canonical_uri: &str,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Vec<(String, String)> {
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let mut headers = vec![
            ("host".to_string(), self.host()),
            ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method, canonical_uri, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.config.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        // Only the signed trio (plus the token) goes on the wire here; the
        // host header is set by the HTTP client itself.
        let mut out = vec![
            ("Authorization".to_string(), authorization),
            ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
            ("x-amz-date".to_string(), amz_date),
        ];
        if let Some(ref token) = self.creds.session_token {
            out.push(("x-amz-security-token".to_string(), token.clone()));
        }
        out
    }

    /// Build a presigned GET URL valid for `expires_secs` from `now`.
    ///
    /// Query-string SigV4: only the `host` header is signed and the payload
    /// is `UNSIGNED-PAYLOAD`, per the AWS presigned-URL specification.
    fn presign_get(&self, key: &str, now: DateTime<Utc>, expires_secs: u64) -> String {
        let (url, canonical_uri) = self.object_url(key);

        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let credential = format!("{}/{}", self.creds.access_key_id, credential_scope);

        let mut query_params = vec![
            (
                "X-Amz-Algorithm".to_string(),
                "AWS4-HMAC-SHA256".to_string(),
            ),
            ("X-Amz-Credential".to_string(), credential),
            ("X-Amz-Date".to_string(), amz_date.clone()),
            ("X-Amz-Expires".to_string(), expires_secs.to_string()),
            ("X-Amz-SignedHeaders".to_string(), "host".to_string()),
        ];
        if let Some(ref token) = self.creds.session_token {
            query_params.push(("X-Amz-Security-Token".to_string(), token.clone()));
        }
        query_params.sort_by(|a, b| a.0.cmp(&b.0));

        let canonical_querystring: String = query_params
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_headers = format!("host:{}\n", self.host());
        let canonical_request = format!(
            "GET\n{}\n{}\n{}\nhost\nUNSIGNED-PAYLOAD",
            canonical_uri, canonical_querystring, canonical_headers
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.config.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        format!(
            "{}?{}&X-Amz-Signature={}",
            url, canonical_querystring, signature
        )
    }

    async fn send_signed(
        &self,
        method: reqwest::Method,
        key: &str,
        body: Option<(Vec<u8>, &str)>,
    ) -> Result<reqwest::Response> {
        let (url, canonical_uri) = self.object_url(key);
        let payload_hash = match body {
            Some((ref bytes, _)) => hex_sha256(bytes),
            None => hex_sha256(b""),
        };

        let headers = self.sign_headers(method.as_str(), &canonical_uri, &payload_hash, Utc::now());

        let mut req = self.client.request(method, &url);
        for (name, value) in &headers {
            req = req.header(name, value);
        }
        if let Some((bytes, content_type)) = body {
            req = req.header("Content-Type", content_type).body(bytes);
        }

        req.send().await.map_err(|e| {
            EngineError::BackendUnavailable(format!(
                "S3 request failed for s3://{}/{}: {}",
                self.config.bucket,
                self.object_key(key),
                e
            ))
        })
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        "s3"
    }

    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<PutResult> {
        let size = bytes.len() as u64;
        let resp = self
            .send_signed(reqwest::Method::PUT, key, Some((bytes.to_vec(), content_type)))
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::Storage(format!(
                "S3 PutObject failed (HTTP {}): {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let url = self.url(key).await?;
        Ok(PutResult { url, size })
    }

    async fn url(&self, key: &str) -> Result<String> {
        Ok(self.presign_get(key, Utc::now(), self.config.url_expiry_secs))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let resp = self.send_signed(reqwest::Method::HEAD, key, None).await?;
        if resp.status().is_success() {
            Ok(true)
        } else if resp.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(EngineError::Storage(format!(
                "S3 HeadObject failed (HTTP {}) for key '{}'",
                resp.status(),
                key
            )))
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let resp = self.send_signed(reqwest::Method::DELETE, key, None).await?;
        // S3 returns 204 for missing keys too, which suits the idempotence
        // contract. Anything else is reported but not raised.
        if resp.status().is_success() || resp.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(true)
        } else {
            eprintln!(
                "Warning: S3 DeleteObject failed (HTTP {}) for key '{}'",
                resp.status(),
                key
            );
            Ok(false)
        }
    }

    async fn size(&self, key: &str) -> Result<Option<u64>> {
        let resp = self.send_signed(reqwest::Method::HEAD, key, None).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(EngineError::Storage(format!(
                "S3 HeadObject failed (HTTP {}) for key '{}'",
                resp.status(),
                key
            )));
        }
        let size = resp
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        Ok(size)
    }

    async fn get(&self, key: &str, destination: &Path) -> Result<()> {
        let resp = self.send_signed(reqwest::Method::GET, key, None).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::NotFound(format!("stored object: {key}")));
        }
        if !resp.status().is_success() {
            return Err(EngineError::Storage(format!(
                "S3 GetObject failed (HTTP {}) for key '{}'",
                resp.status(),
                key
            )));
        }
        let bytes = resp.bytes().await.map_err(|e| {
            EngineError::BackendUnavailable(format!("S3 GetObject body read failed: {e}"))
        })?;
        std::fs::write(destination, &bytes)?;
        Ok(())
    }
}

// ============ AWS SigV4 Helpers ============

/// Compute the hex-encoded SHA-256 hash of data.
fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute HMAC-SHA256 of data with the given key.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Compute hex-encoded HMAC-SHA256.
fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986 (used in SigV4 canonical requests).
///
/// Encodes all characters except unreserved characters:
/// `A-Z a-z 0-9 - _ . ~`
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}
