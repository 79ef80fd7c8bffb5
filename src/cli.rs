use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use topic_shorts::cancel::CancelToken;
use topic_shorts::config::{Config, Credentials};
use topic_shorts::init;
use topic_shorts::job::{JobRecord, JobStatus, JobStore, MemoryJobStore};
use topic_shorts::pipeline::Pipeline;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "topic-shorts-cli")]
#[command(about = "Generate one narrated short video for a topic", long_about = None)]
struct Args {
    /// Topic of the video
    #[arg(default_value = "Greek Mythology")]
    topic: String,

    /// Settings file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Copy the finished video here as well
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config).await?;
    cfg.apply_env_overrides();
    init::ensure_directories(&cfg).await?;

    let Some(credentials) = Credentials::from_env() else {
        eprintln!("Please set the GEMINI_API_KEY and DREAM_API_KEY environment variables.");
        std::process::exit(1);
    };

    let pipeline = Pipeline::from_config(cfg, Some(credentials))?;
    let store = MemoryJobStore::new();
    let job = store.create(JobRecord::at(JobStatus::Started));

    info!("Generating video for topic: {}", args.topic);
    let record = pipeline
        .execute(&job, &args.topic, &store, &CancelToken::never())
        .await;

    let Some(video) = record.finished_video() else {
        error!(
            "Failed to create video: {}",
            record.error.as_deref().unwrap_or("unknown error")
        );
        std::process::exit(1);
    };

    if let Some(dest) = &args.output {
        tokio::fs::copy(video, dest)
            .await
            .with_context(|| format!("Failed to copy video to {}", dest.display()))?;
        info!("Video created successfully: {}", dest.display());
    } else {
        info!("Video created successfully: {}", video.display());
    }
    Ok(())
}
