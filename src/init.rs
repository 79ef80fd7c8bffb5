use crate::config::{Config, TtsBackend};
use crate::logi;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    for dir in [&cfg.videos_dir, &cfg.audio_dir, &cfg.image_dir, &cfg.clips_dir] {
        if !Path::new(dir).exists() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

async fn tool_runs(program: &str, arg: &str) -> bool {
    match tokio::process::Command::new(program)
        .arg(arg)
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

pub async fn check_ffmpeg() -> bool {
    tool_runs("ffmpeg", "-version").await && tool_runs("ffprobe", "-version").await
}

/// Only meaningful for the local Piper backend.
pub async fn check_tts(cfg: &Config) -> bool {
    match cfg.tts_backend {
        TtsBackend::Piper => tool_runs("piper", "--help").await,
        TtsBackend::Elevenlabs => cfg.elevenlabs_key.is_some(),
    }
}
