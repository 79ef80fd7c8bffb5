use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::logi;

pub const GEMINI_KEY_VAR: &str = "GEMINI_API_KEY";
pub const DREAM_KEY_VAR: &str = "DREAM_API_KEY";
pub const ELEVENLABS_KEY_VAR: &str = "ELEVENLABS_API_KEY";
pub const BIND_VAR: &str = "TOPIC_SHORTS_BIND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsBackend {
    Piper,
    Elevenlabs,
}

/// Server and pipeline settings. Every field has a default so `config.json`
/// may be partial or missing entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: String,
    pub videos_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub image_dir: PathBuf,
    pub clips_dir: PathBuf,
    pub gemini_model: String,
    pub dream_base_url: String,
    pub style_id: u32,
    pub image_width: u32,
    pub image_height: u32,
    pub poll_interval_secs: u64,
    pub poll_timeout_secs: u64,
    pub tts_backend: TtsBackend,
    pub piper_model: String,
    pub speech_speed: f32,
    pub eleven_voice_id: String,
    pub eleven_model_id: String,
    pub max_concurrent_jobs: usize,
    pub min_scenes: usize,
    pub fps: u32,
    #[serde(skip)]
    pub elevenlabs_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            videos_dir: PathBuf::from("videos"),
            audio_dir: PathBuf::from("audio_files"),
            image_dir: PathBuf::from("image_files"),
            clips_dir: PathBuf::from("clips"),
            gemini_model: "gemini-1.5-flash".to_string(),
            dream_base_url: "https://api.luan.tools/api/tasks/".to_string(),
            style_id: 1,
            image_width: 540,
            image_height: 960,
            poll_interval_secs: 3,
            poll_timeout_secs: 600,
            tts_backend: TtsBackend::Piper,
            piper_model: "en_US-lessac-medium.onnx".to_string(),
            speech_speed: 1.0,
            eleven_voice_id: "JBFqnCBsd6RMkjVDRZzb".to_string(),
            eleven_model_id: "eleven_multilingual_v2".to_string(),
            max_concurrent_jobs: 2,
            min_scenes: 1,
            fps: 24,
            elevenlabs_key: None,
        }
    }
}

impl Config {
    /// Reads `path` if it exists, otherwise falls back to defaults.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if fs::metadata(path).await.is_err() {
            logi(format!("No config at {}; using defaults", path.display()));
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)?;

        if config.fps == 0 {
            anyhow::bail!("config.json: fps must be positive");
        }
        if config.speech_speed <= 0.0 {
            anyhow::bail!("config.json: speech_speed must be positive");
        }
        if config.poll_interval_secs == 0 {
            anyhow::bail!("config.json: poll_interval_secs must be positive");
        }

        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var(BIND_VAR) {
            if !bind.trim().is_empty() {
                self.bind_addr = bind.trim().to_string();
            }
        }
        self.elevenlabs_key = non_empty(std::env::var(ELEVENLABS_KEY_VAR).ok());
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    /// Zero-clip videos are never produced, whatever the configured minimum.
    pub fn effective_min_scenes(&self) -> usize {
        self.min_scenes.max(1)
    }
}

/// The two remote-service keys a job needs.
#[derive(Clone)]
pub struct Credentials {
    pub gemini_key: String,
    pub dream_key: String,
}

impl Credentials {
    pub fn from_env() -> Option<Self> {
        Self::from_values(
            std::env::var(GEMINI_KEY_VAR).ok(),
            std::env::var(DREAM_KEY_VAR).ok(),
        )
    }

    /// Both keys must be present and non-blank.
    pub fn from_values(gemini: Option<String>, dream: Option<String>) -> Option<Self> {
        Some(Self {
            gemini_key: non_empty(gemini)?,
            dream_key: non_empty(dream)?,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("gemini_key", &"<redacted>")
            .field("dream_key", &"<redacted>")
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
