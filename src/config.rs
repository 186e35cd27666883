use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub genai: GenAiConfig,
    #[serde(default)]
    pub stt: SttConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Storage backend settings. The local section always applies as the
/// fallback; the S3 section is only consulted when AWS credentials are
/// present in the environment at construction time.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub s3: S3StorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            base_url: default_base_url(),
            s3: S3StorageConfig::default(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/recordings")
}
fn default_base_url() -> String {
    "/recordings".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3StorageConfig {
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Presigned GET URL validity window, in seconds.
    #[serde(default = "default_url_expiry")]
    pub url_expiry_secs: u64,
    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,
}

impl Default for S3StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: default_region(),
            prefix: default_prefix(),
            endpoint_url: None,
            url_expiry_secs: default_url_expiry(),
            timeout_secs: default_storage_timeout(),
        }
    }
}

fn default_region() -> String {
    "eu-central-1".to_string()
}
fn default_prefix() -> String {
    "recordings".to_string()
}
fn default_url_expiry() -> u64 {
    3600
}
fn default_storage_timeout() -> u64 {
    30
}

/// Generative text backend settings. The API key itself comes from the
/// `GEMINI_API_KEY` environment variable, never from the config file.
#[derive(Debug, Deserialize, Clone)]
pub struct GenAiConfig {
    /// Models a caller may request. Anything outside this list is silently
    /// replaced by the first entry.
    #[serde(default = "default_allowed_models")]
    pub allowed_models: Vec<String>,
    #[serde(default = "default_genai_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenAiConfig {
    fn default() -> Self {
        Self {
            allowed_models: default_allowed_models(),
            timeout_secs: default_genai_timeout(),
        }
    }
}

fn default_allowed_models() -> Vec<String> {
    vec![
        "models/gemini-2.5-flash".to_string(),
        "models/gemini-2.5-pro".to_string(),
    ]
}
fn default_genai_timeout() -> u64 {
    60
}

/// Speech-to-text backend settings. The API key comes from the
/// `ELEVENLABS_API_KEY` environment variable.
#[derive(Debug, Deserialize, Clone)]
pub struct SttConfig {
    #[serde(default = "default_stt_model")]
    pub model_id: String,
    #[serde(default)]
    pub tag_audio_events: bool,
    #[serde(default)]
    pub diarize: bool,
    #[serde(default = "default_stt_timeout")]
    pub timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model_id: default_stt_model(),
            tag_audio_events: false,
            diarize: false,
            timeout_secs: default_stt_timeout(),
        }
    }
}

fn default_stt_model() -> String {
    "scribe_v1".to_string()
}
fn default_stt_timeout() -> u64 {
    60
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}
