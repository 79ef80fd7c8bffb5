use anyhow::Result;
use std::sync::Arc;
use topic_shorts::config::{Config, Credentials};
use topic_shorts::init;
use topic_shorts::job::MemoryJobStore;
use topic_shorts::manager::JobManager;
use topic_shorts::pipeline::Pipeline;
use topic_shorts::server;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    dotenvy::dotenv().ok();

    let mut cfg = Config::load("config.json").await?;
    cfg.apply_env_overrides();

    init::ensure_directories(&cfg).await?;
    if !init::check_ffmpeg().await {
        warn!("FFmpeg/ffprobe not found in PATH. Please install FFmpeg.");
    }
    if !init::check_tts(&cfg).await {
        warn!("TTS backend {:?} is not usable; narration will fail", cfg.tts_backend);
    }

    let credentials = Credentials::from_env();
    if credentials.is_none() {
        warn!("GEMINI_API_KEY and DREAM_API_KEY must both be set; jobs will fail until they are");
    }

    let bind_addr = cfg.bind_addr.clone();
    let max_jobs = cfg.max_concurrent_jobs;
    let pipeline = Pipeline::from_config(cfg, credentials)?;
    let manager = JobManager::new(Arc::new(pipeline), Arc::new(MemoryJobStore::new()), max_jobs);

    info!("Running up to {} jobs at once", max_jobs.max(1));
    server::start_server(&bind_addr, manager).await
}
