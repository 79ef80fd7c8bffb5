use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// 128 random bits, hex encoded.
    pub fn random() -> Self {
        let bytes: [u8; 16] = rand::thread_rng().r#gen();
        Self(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "Started")]
    Started,
    #[serde(rename = "Generating script")]
    GeneratingScript,
    #[serde(rename = "Generating audio")]
    GeneratingAudio,
    #[serde(rename = "Generating images")]
    GeneratingImages,
    #[serde(rename = "Creating video")]
    CreatingVideo,
    #[serde(rename = "Completed")]
    Completed,
    #[serde(rename = "Failed")]
    Failed,
}

impl JobStatus {
    pub fn label(self) -> &'static str {
        match self {
            JobStatus::Started => "Started",
            JobStatus::GeneratingScript => "Generating script",
            JobStatus::GeneratingAudio => "Generating audio",
            JobStatus::GeneratingImages => "Generating images",
            JobStatus::CreatingVideo => "Creating video",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
        }
    }

    pub fn progress(self) -> Option<u8> {
        match self {
            JobStatus::Started => Some(0),
            JobStatus::GeneratingScript => Some(25),
            JobStatus::GeneratingAudio => Some(50),
            JobStatus::GeneratingImages => Some(75),
            JobStatus::CreatingVideo => Some(90),
            JobStatus::Completed => Some(100),
            JobStatus::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// What `GET /video_status/{id}` returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "video_path", default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl JobRecord {
    /// Record for a non-terminal stage.
    pub fn at(status: JobStatus) -> Self {
        Self {
            status,
            progress: status.progress(),
            error: None,
            output_path: None,
        }
    }

    pub fn completed(output_path: PathBuf) -> Self {
        Self {
            output_path: Some(output_path),
            ..Self::at(JobStatus::Completed)
        }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::at(JobStatus::Failed)
        }
    }

    /// Output file, only once the job has completed.
    pub fn finished_video(&self) -> Option<&PathBuf> {
        match self.status {
            JobStatus::Completed => self.output_path.as_ref(),
            _ => None,
        }
    }
}

/// Process-lifetime store of job records keyed by job id.
pub trait JobStore: Send + Sync {
    /// Stores `record` under a fresh id not already present.
    fn create(&self, record: JobRecord) -> JobId;
    fn set(&self, id: &JobId, record: JobRecord);
    fn get(&self, id: &JobId) -> Option<JobRecord>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    records: Mutex<HashMap<JobId, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn create(&self, record: JobRecord) -> JobId {
        let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut id = JobId::random();
        while guard.contains_key(&id) {
            id = JobId::random();
        }
        guard.insert(id.clone(), record);
        id
    }

    fn set(&self, id: &JobId, record: JobRecord) {
        let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(id.clone(), record);
    }

    fn get(&self, id: &JobId) -> Option<JobRecord> {
        let guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        guard.get(id).cloned()
    }

    fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
