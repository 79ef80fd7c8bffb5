use crate::api::dream::{self, DreamIllustrator, Illustrator};
use crate::api::elevenlabs::ElevenLabsNarrator;
use crate::api::gemini::{GeminiScriptWriter, ScriptWriter};
use crate::api::tts::{self, Narrator, PiperNarrator};
use crate::assembler::{self, FfmpegToolkit, MediaToolkit};
use crate::cancel::CancelToken;
use crate::config::{Config, Credentials, TtsBackend};
use crate::error::{PipelineError, Result};
use crate::job::{JobId, JobRecord, JobStatus, JobStore};
use crate::{logi, logok, logw};
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;

/// The four external collaborators a job runs through.
#[derive(Clone)]
pub struct Stages {
    pub writer: Arc<dyn ScriptWriter>,
    pub narrator: Arc<dyn Narrator>,
    pub illustrator: Arc<dyn Illustrator>,
    pub toolkit: Arc<dyn MediaToolkit>,
}

impl Stages {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        let narrator: Arc<dyn Narrator> = match cfg.tts_backend {
            TtsBackend::Piper => Arc::new(PiperNarrator::new(cfg)),
            TtsBackend::Elevenlabs => Arc::new(ElevenLabsNarrator::new(client.clone(), cfg)?),
        };

        Ok(Self {
            writer: Arc::new(GeminiScriptWriter::new(client.clone(), cfg)),
            narrator,
            illustrator: Arc::new(DreamIllustrator::new(client, cfg)),
            toolkit: Arc::new(FfmpegToolkit::new(cfg.fps)),
        })
    }
}

/// Per-job filesystem layout.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPaths {
    pub video: PathBuf,
    pub audio_dir: PathBuf,
    pub image_dir: PathBuf,
    pub clips_dir: PathBuf,
}

impl JobPaths {
    pub fn new(cfg: &Config, job: &JobId) -> Self {
        Self {
            video: cfg.videos_dir.join(format!("{}.mp4", job)),
            audio_dir: cfg.audio_dir.join(job.as_str()),
            image_dir: cfg.image_dir.join(job.as_str()),
            clips_dir: cfg.clips_dir.join(job.as_str()),
        }
    }
}

/// Runs topic -> script -> audio -> images -> video for one job, recording
/// each stage transition in the job store.
pub struct Pipeline {
    cfg: Config,
    credentials: Option<Credentials>,
    stages: Stages,
}

impl Pipeline {
    pub fn new(cfg: Config, credentials: Option<Credentials>, stages: Stages) -> Self {
        Self {
            cfg,
            credentials,
            stages,
        }
    }

    pub fn from_config(cfg: Config, credentials: Option<Credentials>) -> anyhow::Result<Self> {
        let stages = Stages::from_config(&cfg)?;
        Ok(Self::new(cfg, credentials, stages))
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Runs every stage and leaves the store at the last non-terminal
    /// status reached. Returns the output video path.
    pub async fn run(
        &self,
        job: &JobId,
        topic: &str,
        store: &dyn JobStore,
        cancel: &CancelToken,
    ) -> Result<PathBuf> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or(PipelineError::MissingApiKeys)?;
        let paths = JobPaths::new(&self.cfg, job);

        let enter = |status: JobStatus| -> Result<()> {
            cancel.check()?;
            logi(format!("[{}] {}", job, status.label()));
            store.set(job, JobRecord::at(status));
            Ok(())
        };

        enter(JobStatus::GeneratingScript)?;
        logi(format!("[{}] Generating script for topic: {}", job, topic));
        let script = self
            .stages
            .writer
            .write_script(&creds.gemini_key, topic)
            .await
            .ok_or(PipelineError::NoScript)?;
        logok(format!("[{}] Script generated: {} scenes", job, script.len()));

        enter(JobStatus::GeneratingAudio)?;
        let audio =
            tts::narrate_script(self.stages.narrator.as_ref(), &script, &paths.audio_dir, cancel)
                .await?;
        logok(format!("[{}] Audio files generated: {}/{}", job, audio.len(), script.len()));

        enter(JobStatus::GeneratingImages)?;
        let images = dream::illustrate_script(
            self.stages.illustrator.as_ref(),
            &creds.dream_key,
            &script,
            &paths.image_dir,
            cancel,
        )
        .await?;
        logok(format!("[{}] Image files generated: {}/{}", job, images.len(), script.len()));

        enter(JobStatus::CreatingVideo)?;
        let video = assembler::assemble_video(
            self.stages.toolkit.as_ref(),
            &script,
            &images,
            &audio,
            &paths.clips_dir,
            &paths.video,
            self.cfg.effective_min_scenes(),
            cancel,
        )
        .await?;

        Ok(video.path)
    }

    /// `run`, then the terminal record: Completed with the video path, or
    /// Failed with the error text. The terminal record is also returned.
    pub async fn execute(
        &self,
        job: &JobId,
        topic: &str,
        store: &dyn JobStore,
        cancel: &CancelToken,
    ) -> JobRecord {
        let record = match self.run(job, topic, store, cancel).await {
            Ok(path) => {
                logok(format!("[{}] Video created successfully: {}", job, path.display()));
                JobRecord::completed(path)
            }
            Err(err) => {
                logw(format!("[{}] Job failed: {}", job, err));
                JobRecord::failed(err)
            }
        };
        store.set(job, record.clone());
        record
    }
}
