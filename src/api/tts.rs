use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::script::{AssetMap, Script};
use crate::{logok, logw};
use anyhow::Context;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Speech engine writing one narration file per call.
#[async_trait]
pub trait Narrator: Send + Sync {
    /// File extension of what `synthesize` writes, without the dot.
    fn extension(&self) -> &'static str;

    async fn synthesize(&self, text: &str, out_path: &Path) -> anyhow::Result<()>;
}

/// Local Piper TTS process with a fixed EN-US voice model.
pub struct PiperNarrator {
    binary: String,
    model: String,
    speed: f32,
}

impl PiperNarrator {
    pub fn new(cfg: &Config) -> Self {
        Self {
            binary: "piper".to_string(),
            model: cfg.piper_model.clone(),
            speed: cfg.speech_speed,
        }
    }

    /// Piper stretches time by `length_scale`, so faster speech is a smaller scale.
    fn length_scale(&self) -> f32 {
        if self.speed > 0.0 { 1.0 / self.speed } else { 1.0 }
    }
}

#[async_trait]
impl Narrator for PiperNarrator {
    fn extension(&self) -> &'static str {
        "wav"
    }

    async fn synthesize(&self, text: &str, out_path: &Path) -> anyhow::Result<()> {
        let mut child = Command::new(&self.binary)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_file")
            .arg(out_path)
            .arg("--length_scale")
            .arg(format!("{:.3}", self.length_scale()))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.binary))?;

        {
            let stdin = child.stdin.as_mut().context("Failed to open piper stdin")?;
            stdin.write_all(text.as_bytes()).await?;
            stdin.shutdown().await.ok();
        }
        drop(child.stdin.take());

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "piper exited with {}: {}",
                output.status,
                stderr.trim().chars().take(400).collect::<String>()
            );
        }

        if fs::metadata(out_path).await.is_err() {
            anyhow::bail!("piper wrote no file at {}", out_path.display());
        }
        Ok(())
    }
}

/// One narration file per scene into `out_dir`. Failed scenes are logged and
/// left out; only cancellation and an unusable output directory abort.
pub async fn narrate_script(
    narrator: &dyn Narrator,
    script: &Script,
    out_dir: &Path,
    cancel: &CancelToken,
) -> Result<AssetMap> {
    fs::create_dir_all(out_dir).await?;

    let mut audio = AssetMap::new();
    for (scene, data) in script.iter() {
        cancel.check()?;
        if data.narration_text.trim().is_empty() {
            logw(format!("Scene {} has no narration text; skipping", scene));
            continue;
        }

        let out_path = out_dir.join(format!("{}.{}", scene.file_stem(), narrator.extension()));
        match narrator.synthesize(&data.narration_text, &out_path).await {
            Ok(()) => {
                logok(format!("Generated audio for scene {}: {}", scene, out_path.display()));
                audio.insert(scene.clone(), out_path);
            }
            Err(err) => {
                logw(format!("Error generating audio for scene {}: {:#}", scene, err));
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(audio)
}
