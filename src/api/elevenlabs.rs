use crate::api::tts::Narrator;
use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use tokio::fs;

/// ElevenLabs HTTP text-to-speech, selected with `tts_backend = "elevenlabs"`.
pub struct ElevenLabsNarrator {
    client: Client,
    api_key: String,
    voice_id: String,
    model_id: String,
    base_url: String,
}

impl ElevenLabsNarrator {
    pub fn new(client: Client, cfg: &Config) -> Result<Self> {
        let api_key = cfg
            .elevenlabs_key
            .clone()
            .context("ELEVENLABS_API_KEY missing for the elevenlabs TTS backend")?;
        Ok(Self {
            client,
            api_key,
            voice_id: cfg.eleven_voice_id.clone(),
            model_id: cfg.eleven_model_id.clone(),
            base_url: "https://api.elevenlabs.io".to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Narrator for ElevenLabsNarrator {
    fn extension(&self) -> &'static str {
        "mp3"
    }

    async fn synthesize(&self, text: &str, out_mp3_path: &Path) -> Result<()> {
        let url = format!(
            "{}/v1/text-to-speech/{}?output_format=mp3_44100_128",
            self.base_url, self.voice_id
        );

        let body = serde_json::json!({
            "text": text,
            "model_id": self.model_id,
        });

        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .timeout(std::time::Duration::from_secs(300))
            .send()
            .await
            .context("ElevenLabs request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("ElevenLabs TTS failed HTTP {}", resp.status().as_u16());
        }

        let bytes = resp.bytes().await.context("ElevenLabs response read failed")?;
        if let Some(parent) = out_mp3_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }
        fs::write(out_mp3_path, &bytes).await?;
        Ok(())
    }
}
