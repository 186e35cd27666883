//! Generative text backend abstraction.
//!
//! Defines the [`GenerativeBackend`] trait and the concrete
//! [`GeminiBackend`] implementation over the Google Generative Language
//! REST API. The backend receives a fully built prompt and returns the raw
//! reply text; reply parsing and markup normalization live in
//! [`merge`](crate::merge).
//!
//! # Model Allow-List
//!
//! Callers may request a model, but only identifiers on the configured
//! allow-list are honored. Anything else is silently replaced by the best
//! available default (the first allow-list entry), and the substituted
//! identifier is what gets reported back to the caller.
//!
//! # Configuration
//!
//! The API key comes from the `GEMINI_API_KEY` environment variable. When
//! it is absent the backend reports itself as disabled and every call
//! fails with a backend-unavailable error; merge requests degrade to a
//! static fallback body at the next layer up.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenAiConfig;
use crate::error::{EngineError, Result};

const GENERATE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Trait for generative text backends. Swappable and mockable.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Whether the backend has credentials and can serve requests.
    fn enabled(&self) -> bool;

    /// Map a caller-requested model to the identifier that will actually
    /// serve the request (allow-listed, or the default substituted).
    fn resolve_model(&self, preferred: Option<&str>) -> String;

    /// Send a prompt and return the raw reply text.
    async fn generate(&self, prompt: &str, preferred_model: Option<&str>) -> Result<String>;
}

/// Generative backend over the Gemini `generateContent` REST endpoint.
pub struct GeminiBackend {
    api_key: Option<String>,
    allowed_models: Vec<String>,
    timeout: Duration,
}

impl GeminiBackend {
    /// Build the backend from config, reading `GEMINI_API_KEY` once.
    pub fn from_env(config: &GenAiConfig) -> Self {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        Self {
            api_key,
            allowed_models: config.allowed_models.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    #[cfg(test)]
    fn with_models(models: Vec<String>) -> Self {
        Self {
            api_key: None,
            allowed_models: models,
            timeout: Duration::from_secs(60),
        }
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    fn resolve_model(&self, preferred: Option<&str>) -> String {
        if let Some(requested) = preferred {
            if self.allowed_models.iter().any(|m| m == requested) {
                return requested.to_string();
            }
        }
        self.allowed_models
            .first()
            .cloned()
            .unwrap_or_else(|| "models/gemini-2.5-flash".to_string())
    }

    async fn generate(&self, prompt: &str, preferred_model: Option<&str>) -> Result<String> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            EngineError::BackendUnavailable("GEMINI_API_KEY environment variable not set".into())
        })?;

        let model = self.resolve_model(preferred_model);
        let url = format!("{}/{}:generateContent", GENERATE_URL, model);

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| EngineError::BackendUnavailable(format!("HTTP client error: {e}")))?;

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let resp = client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                EngineError::BackendUnavailable(format!("generative API request failed: {e}"))
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body_text = resp.text().await.unwrap_or_default();
            return Err(EngineError::BackendUnavailable(format!(
                "generative API error {}: {}",
                status,
                body_text.chars().take(500).collect::<String>()
            )));
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| {
            EngineError::BackendUnavailable(format!("generative API response read failed: {e}"))
        })?;

        parse_generate_response(&json)
    }
}

/// Extract the reply text from a `generateContent` response.
///
/// Concatenates all text parts of the first candidate.
fn parse_generate_response(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            EngineError::BackendUnavailable(
                "invalid generative API response: missing candidates".into(),
            )
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        return Err(EngineError::BackendUnavailable(
            "generative API returned no text".into(),
        ));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> GeminiBackend {
        GeminiBackend::with_models(vec![
            "models/gemini-2.5-flash".to_string(),
            "models/gemini-2.5-pro".to_string(),
        ])
    }

    #[test]
    fn test_resolve_model_allowed() {
        let b = backend();
        assert_eq!(
            b.resolve_model(Some("models/gemini-2.5-pro")),
            "models/gemini-2.5-pro"
        );
    }

    #[test]
    fn test_resolve_model_substitutes_default() {
        let b = backend();
        assert_eq!(
            b.resolve_model(Some("models/gemini-1.0-evil")),
            "models/gemini-2.5-flash"
        );
        assert_eq!(b.resolve_model(None), "models/gemini-2.5-flash");
    }

    #[test]
    fn test_parse_generate_response() {
        let json = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "hello " }, { "text": "world" }] }
            }]
        });
        assert_eq!(parse_generate_response(&json).unwrap(), "hello world");
    }

    #[test]
    fn test_parse_generate_response_missing_candidates() {
        let json = serde_json::json!({ "error": "nope" });
        assert!(parse_generate_response(&json).is_err());
    }
}
