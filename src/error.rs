use std::time::Duration;
use thiserror::Error;

/// Step-level failures of a job. The orchestrator records `to_string()` of
/// whatever reaches it as the job's error text.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("API keys not set")]
    MissingApiKeys,

    #[error("Script generation failed: no script returned")]
    NoScript,

    #[error("Not enough scenes for a video: built {built}, need at least {required}")]
    NotEnoughScenes { built: usize, required: usize },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Remote task error: {0}")]
    RemoteTask(String),

    #[error("Remote task did not finish within {0:?}")]
    PollTimeout(Duration),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
