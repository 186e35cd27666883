//! Speech-to-text over the ElevenLabs API.
//!
//! Sends audio bytes as a multipart upload and returns the transcript with
//! detected-language metadata. Calls carry a bounded timeout and are never
//! retried automatically; a timeout or non-2xx status surfaces as a
//! backend-unavailable failure with a human-readable message.
//!
//! The API key comes from the `ELEVENLABS_API_KEY` environment variable.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::config::SttConfig;
use crate::error::{EngineError, Result};

const STT_URL: &str = "https://api.elevenlabs.io/v1/speech-to-text";

/// Transcription result for one audio object.
#[derive(Debug, Clone, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub language_code: String,
    #[serde(default)]
    pub language_probability: f64,
    #[serde(default)]
    pub words: Vec<TranscriptWord>,
}

/// One word-level timestamp entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptWord {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
}

/// Transcribe a local audio file.
///
/// The file is read fully into memory and posted as multipart form data
/// along with the configured model and tagging options. Word timestamps
/// are always requested at word granularity.
pub async fn transcribe_file(config: &SttConfig, audio_path: &Path) -> Result<Transcript> {
    let api_key = std::env::var("ELEVENLABS_API_KEY").map_err(|_| {
        EngineError::BackendUnavailable("ELEVENLABS_API_KEY environment variable not set".into())
    })?;

    if !audio_path.exists() {
        return Err(EngineError::NotFound(format!(
            "audio file: {}",
            audio_path.display()
        )));
    }

    let bytes = std::fs::read(audio_path)?;
    let file_name = audio_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("audio.webm")
        .to_string();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| EngineError::BackendUnavailable(format!("HTTP client error: {e}")))?;

    let form = reqwest::multipart::Form::new()
        .part(
            "file",
            reqwest::multipart::Part::bytes(bytes).file_name(file_name),
        )
        .text("model_id", config.model_id.clone())
        .text("tag_audio_events", config.tag_audio_events.to_string())
        .text("timestamps_granularity", "word")
        .text("diarize", config.diarize.to_string());

    let resp = client
        .post(STT_URL)
        .header("xi-api-key", api_key)
        .multipart(form)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                EngineError::BackendUnavailable(
                    "speech-to-text request timed out; the audio file may be too long".into(),
                )
            } else {
                EngineError::BackendUnavailable(format!("speech-to-text request failed: {e}"))
            }
        })?;

    if !resp.status().is_success() {
        let status = resp.status();
        let detail = resp.text().await.unwrap_or_default();
        let detail = if detail.is_empty() {
            format!("HTTP {status}")
        } else {
            detail.chars().take(500).collect()
        };
        return Err(EngineError::BackendUnavailable(format!(
            "speech-to-text API error: {detail}"
        )));
    }

    let transcript: Transcript = resp.json().await.map_err(|e| {
        EngineError::BackendUnavailable(format!("speech-to-text response parse failed: {e}"))
    })?;

    Ok(transcript)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_deserializes_with_missing_fields() {
        let json = r#"{"text":"hello world","language_code":"en"}"#;
        let t: Transcript = serde_json::from_str(json).unwrap();
        assert_eq!(t.text, "hello world");
        assert_eq!(t.language_code, "en");
        assert_eq!(t.language_probability, 0.0);
        assert!(t.words.is_empty());
    }

    #[test]
    fn test_transcript_words() {
        let json = r#"{"text":"hi","words":[{"text":"hi","start":0.1,"end":0.4}]}"#;
        let t: Transcript = serde_json::from_str(json).unwrap();
        assert_eq!(t.words.len(), 1);
        assert_eq!(t.words[0].text, "hi");
    }
}
