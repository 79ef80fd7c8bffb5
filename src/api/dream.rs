//! Client for the Dream (luan.tools) image-generation task API.
//!
//! A generation is a remote task: it is created empty, given an input spec,
//! then polled until it reaches `completed` or `failed`. On completion the
//! task carries a URL of the finished image, which is downloaded next to the
//! job's other assets.

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::script::{AssetMap, Script};
use crate::{logi, logok, logw};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::time::Instant;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Pending,
    Generating,
    Completed,
    Failed,
    /// Anything the service reports that we do not know; treated as still running.
    Unknown,
}

impl TaskState {
    pub fn parse(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "created" | "input" => TaskState::Created,
            "pending" => TaskState::Pending,
            "generating" => TaskState::Generating,
            "completed" => TaskState::Completed,
            "failed" => TaskState::Failed,
            _ => TaskState::Unknown,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TaskSnapshot {
    state: String,
    #[serde(default)]
    result: Option<String>,
}

/// How long and how often a remote task is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            interval: cfg.poll_interval(),
            timeout: cfg.poll_timeout(),
        }
    }
}

/// Renders one image prompt into `out_path`.
#[async_trait]
pub trait Illustrator: Send + Sync {
    async fn illustrate(
        &self,
        api_key: &str,
        prompt: &str,
        out_path: &Path,
        cancel: &CancelToken,
    ) -> Result<()>;
}

pub struct DreamIllustrator {
    client: Client,
    base_url: String,
    style_id: u32,
    width: u32,
    height: u32,
    poll: PollPolicy,
}

impl DreamIllustrator {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            base_url: cfg.dream_base_url.clone(),
            style_id: cfg.style_id,
            width: cfg.image_width,
            height: cfg.image_height,
            poll: PollPolicy::from_config(cfg),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    fn tasks_url(&self) -> String {
        if self.base_url.ends_with('/') {
            self.base_url.clone()
        } else {
            format!("{}/", self.base_url)
        }
    }

    fn task_url(&self, task_id: &str) -> String {
        format!("{}{}", self.tasks_url(), task_id)
    }

    async fn create_task(&self, api_key: &str) -> Result<String> {
        let task: CreatedTask = self
            .client
            .post(self.tasks_url())
            .header("Authorization", format!("bearer {}", api_key))
            .json(&json!({"use_target_image": false}))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(task.id)
    }

    async fn submit_spec(&self, api_key: &str, task_id: &str, prompt: &str) -> Result<()> {
        let body = json!({
            "input_spec": {
                "style": self.style_id,
                "prompt": prompt,
                "width": self.width,
                "height": self.height,
            }
        });
        self.client
            .put(self.task_url(task_id))
            .header("Authorization", format!("bearer {}", api_key))
            .json(&body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn fetch_task(&self, api_key: &str, task_id: &str) -> Result<TaskSnapshot> {
        let snapshot = self
            .client
            .get(self.task_url(task_id))
            .header("Authorization", format!("bearer {}", api_key))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(snapshot)
    }

    /// Polls until the task is terminal; returns the result image URL.
    /// A timeout too large to represent means no deadline.
    pub async fn wait_for_result(
        &self,
        api_key: &str,
        task_id: &str,
        cancel: &CancelToken,
    ) -> Result<String> {
        let deadline = Instant::now().checked_add(self.poll.timeout);
        loop {
            cancel.check()?;
            let snapshot = self.fetch_task(api_key, task_id).await?;
            match TaskState::parse(&snapshot.state) {
                TaskState::Completed => {
                    return snapshot.result.filter(|url| !url.is_empty()).ok_or_else(|| {
                        PipelineError::RemoteTask(format!("task {} completed without a result", task_id))
                    });
                }
                TaskState::Failed => {
                    return Err(PipelineError::RemoteTask(format!(
                        "task {} reported failure",
                        task_id
                    )));
                }
                state => tracing::debug!(task_id = task_id, ?state, "image task still running"),
            }

            if let Some(deadline) = deadline {
                match Instant::now().checked_add(self.poll.interval) {
                    Some(next) if next <= deadline => {}
                    _ => return Err(PipelineError::PollTimeout(self.poll.timeout)),
                }
            }
            cancel.sleep(self.poll.interval).await?;
        }
    }

    async fn download(&self, url: &str, out_path: &Path) -> Result<()> {
        let bytes = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(out_path, &bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl Illustrator for DreamIllustrator {
    async fn illustrate(
        &self,
        api_key: &str,
        prompt: &str,
        out_path: &Path,
        cancel: &CancelToken,
    ) -> Result<()> {
        let task_id = self.create_task(api_key).await?;
        self.submit_spec(api_key, &task_id, prompt).await?;
        logi(format!("Dream task {} submitted", task_id));

        let url = self.wait_for_result(api_key, &task_id, cancel).await?;
        self.download(&url, out_path).await
    }
}

/// One image per scene into `out_dir`. Failed scenes are logged and left
/// out; only cancellation and an unusable output directory abort.
pub async fn illustrate_script(
    illustrator: &dyn Illustrator,
    api_key: &str,
    script: &Script,
    out_dir: &Path,
    cancel: &CancelToken,
) -> Result<AssetMap> {
    fs::create_dir_all(out_dir).await?;

    let mut images = AssetMap::new();
    for (scene, data) in script.iter() {
        cancel.check()?;
        let out_path = out_dir.join(format!("{}.jpg", scene.file_stem()));
        match illustrator
            .illustrate(api_key, &data.image_prompt, &out_path, cancel)
            .await
        {
            Ok(()) => {
                logok(format!("Image for scene {} saved: {}", scene, out_path.display()));
                images.insert(scene.clone(), out_path);
            }
            Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(err) => logw(format!("Error generating image for scene {}: {}", scene, err)),
        }
    }

    Ok(images)
}
