use crate::cancel::{CancelHandle, CancelToken, cancel_pair};
use crate::error::PipelineError;
use crate::job::{JobId, JobRecord, JobStatus, JobStore};
use crate::{logi, logw};
use crate::pipeline::Pipeline;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;

struct RunningJob {
    cancel: CancelHandle,
    done: watch::Receiver<Option<JobRecord>>,
    handle: JoinHandle<()>,
}

struct Inner {
    store: Arc<dyn JobStore>,
    pipeline: Arc<Pipeline>,
    permits: Arc<Semaphore>,
    running: Mutex<HashMap<JobId, RunningJob>>,
}

/// Spawns one task per submitted job, bounded by a semaphore, and keeps a
/// handle per unfinished job so it can be awaited or cancelled.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

impl JobManager {
    pub fn new(pipeline: Arc<Pipeline>, store: Arc<dyn JobStore>, max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                pipeline,
                permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
                running: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.inner.store
    }

    /// Records the job as Started and returns its id right away; the
    /// pipeline runs in the background once a permit is free.
    pub fn submit(&self, topic: impl Into<String>) -> JobId {
        let topic = topic.into();
        let id = self.inner.store.create(JobRecord::at(JobStatus::Started));
        let (cancel, token) = cancel_pair();
        let (done_tx, done_rx) = watch::channel(None);

        // Held across spawn so the task cannot deregister before it is registered.
        let mut running = self.inner.running.lock().unwrap_or_else(|e| e.into_inner());

        let inner = Arc::clone(&self.inner);
        let job = id.clone();
        let handle = tokio::spawn(async move {
            let record = tokio::select! {
                record = run_when_permitted(&inner, &job, topic, token.clone()) => record,
                _ = token.cancelled() => {
                    let record = JobRecord::failed(PipelineError::Cancelled);
                    inner.store.set(&job, record.clone());
                    record
                }
            };
            logi(format!("[{}] Finished with status {}", job, record.status.label()));

            inner
                .running
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&job);
            done_tx.send_replace(Some(record));
        });

        running.insert(
            id.clone(),
            RunningJob {
                cancel,
                done: done_rx,
                handle,
            },
        );
        logi(format!("[{}] Submitted", id));
        id
    }

    pub fn status(&self, id: &JobId) -> Option<JobRecord> {
        self.inner.store.get(id)
    }

    /// Waits for the job to reach a terminal state. `None` for unknown ids.
    pub async fn wait(&self, id: &JobId) -> Option<JobRecord> {
        let done = {
            let running = self.inner.running.lock().unwrap_or_else(|e| e.into_inner());
            running.get(id).map(|job| job.done.clone())
        };

        if let Some(mut done) = done {
            if let Ok(record) = done.wait_for(Option::is_some).await {
                return record.clone();
            }
        }
        self.inner.store.get(id)
    }

    /// Signals cancellation; `false` if the job is unknown or already finished.
    pub fn cancel(&self, id: &JobId) -> bool {
        let running = self.inner.running.lock().unwrap_or_else(|e| e.into_inner());
        match running.get(id) {
            Some(job) => {
                logi(format!("[{}] Cancellation requested", id));
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active_jobs(&self) -> usize {
        self.inner
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Cancels every unfinished job and waits for their tasks to exit.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut running = self.inner.running.lock().unwrap_or_else(|e| e.into_inner());
            running
                .drain()
                .map(|(_, job)| {
                    job.cancel.cancel();
                    job.handle
                })
                .collect()
        };
        for handle in handles {
            handle.await.ok();
        }
    }
}

/// Aborts the pipeline task when the job's own task stops waiting on it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn run_when_permitted(
    inner: &Arc<Inner>,
    job: &JobId,
    topic: String,
    token: CancelToken,
) -> JobRecord {
    let _permit = match Arc::clone(&inner.permits).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            let record = JobRecord::failed("Job queue closed");
            inner.store.set(job, record.clone());
            return record;
        }
    };

    let pipeline = Arc::clone(&inner.pipeline);
    let store = Arc::clone(&inner.store);
    let worker_job = job.clone();
    let mut worker = AbortOnDrop(tokio::spawn(async move {
        pipeline
            .execute(&worker_job, &topic, store.as_ref(), &token)
            .await
    }));

    match (&mut worker.0).await {
        Ok(record) => record,
        Err(err) => {
            logw(format!("[{}] Pipeline task died: {}", job, err));
            let record = JobRecord::failed(format!("Job aborted: {}", err));
            inner.store.set(job, record.clone());
            record
        }
    }
}
