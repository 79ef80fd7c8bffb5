use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Notify;
use topic_shorts::api::dream::Illustrator;
use topic_shorts::api::gemini::ScriptWriter;
use topic_shorts::api::tts::Narrator;
use topic_shorts::assembler::MediaToolkit;
use topic_shorts::cancel::CancelToken;
use topic_shorts::config::{Config, Credentials};
use topic_shorts::job::{JobId, MemoryJobStore};
use topic_shorts::manager::JobManager;
use topic_shorts::pipeline::{Pipeline, Stages};
use topic_shorts::script::Script;
use topic_shorts::server;
use tower::ServiceExt;

const GREEK_SCRIPT: &str = r#"{
    "1": {"image": "Mount Olympus at dawn", "text": "Twelve gods ruled from one mountain."},
    "2": {"image": "Poseidon raising a storm", "text": "The sea answered to Poseidon."},
    "3": {"image": "Hades on a dark throne", "text": "Below, Hades kept the dead."}
}"#;

/// Returns the Greek script, optionally waiting for a release first.
struct StubWriter {
    gate: Option<Notify>,
}

#[async_trait]
impl ScriptWriter for StubWriter {
    async fn write_script(&self, _api_key: &str, _topic: &str) -> Option<Script> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Script::from_json(GREEK_SCRIPT).ok()
    }
}

struct StubNarrator;

#[async_trait]
impl Narrator for StubNarrator {
    fn extension(&self) -> &'static str {
        "wav"
    }

    async fn synthesize(&self, text: &str, out_path: &Path) -> anyhow::Result<()> {
        fs::write(out_path, text).await?;
        Ok(())
    }
}

struct StubIllustrator;

#[async_trait]
impl Illustrator for StubIllustrator {
    async fn illustrate(
        &self,
        _api_key: &str,
        prompt: &str,
        out_path: &Path,
        _cancel: &CancelToken,
    ) -> topic_shorts::error::Result<()> {
        fs::write(out_path, prompt).await?;
        Ok(())
    }
}

struct StubToolkit;

#[async_trait]
impl MediaToolkit for StubToolkit {
    async fn probe_duration(&self, _media: &Path) -> anyhow::Result<f64> {
        Ok(4.0)
    }

    async fn render_still_clip(
        &self,
        _image: &Path,
        _audio: &Path,
        _duration: f64,
        out: &Path,
    ) -> anyhow::Result<()> {
        fs::write(out, b"clip").await?;
        Ok(())
    }

    async fn concat_clips(&self, clips: &[PathBuf], _work_dir: &Path, out: &Path) -> anyhow::Result<()> {
        fs::write(out, format!("MP4 with {} clips", clips.len())).await?;
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    manager: JobManager,
    app: Router,
    writer: Arc<StubWriter>,
}

fn harness(with_keys: bool, gated: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let cfg = Config {
        videos_dir: dir.path().join("videos"),
        audio_dir: dir.path().join("audio_files"),
        image_dir: dir.path().join("image_files"),
        clips_dir: dir.path().join("clips"),
        ..Config::default()
    };
    let writer = Arc::new(StubWriter {
        gate: gated.then(Notify::new),
    });
    let stages = Stages {
        writer: writer.clone(),
        narrator: Arc::new(StubNarrator),
        illustrator: Arc::new(StubIllustrator),
        toolkit: Arc::new(StubToolkit),
    };
    let credentials = if with_keys {
        Credentials::from_values(Some("gemini".into()), Some("dream".into()))
    } else {
        None
    };

    let pipeline = Pipeline::new(cfg, credentials, stages);
    let manager = JobManager::new(Arc::new(pipeline), Arc::new(MemoryJobStore::new()), 2);
    let app = server::create_router(manager.clone());
    Harness {
        _dir: dir,
        manager,
        app,
        writer,
    }
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, headers, body)
}

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

fn submit(topic: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate_video")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(topic.to_string()))
        .unwrap()
}

fn get(uri: String) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn empty_topic_is_rejected_without_a_job() {
    let h = harness(true, false);

    let (status, _, body) = call(&h.app, submit(json!({"topic": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body), json!({"error": "No topic provided"}));

    let (status, _, _) = call(&h.app, submit(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let no_json = Request::builder()
        .method("POST")
        .uri("/generate_video")
        .body(Body::from("topic=Greek"))
        .unwrap();
    let (status, _, _) = call(&h.app, no_json).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(h.manager.store().is_empty());
}

#[tokio::test]
async fn unknown_job_reports_not_found() {
    let h = harness(true, false);

    let (status, _, body) = call(&h.app, get("/video_status/unknown".into())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({"status": "Not found"}));

    let (status, _, body) = call(&h.app, get("/download_video/unknown".into())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body), json!({"error": "Video not ready or not found"}));
}

#[tokio::test]
async fn greek_mythology_end_to_end() {
    let h = harness(true, false);

    let (status, _, body) = call(&h.app, submit(json!({"topic": "Greek Mythology"}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = json_body(&body)["task_id"].as_str().unwrap().to_string();

    let record = h.manager.wait(&JobId::from(task_id.clone())).await.unwrap();
    assert_eq!(record.error, None);

    let (status, _, body) = call(&h.app, get(format!("/video_status/{}", task_id))).await;
    assert_eq!(status, StatusCode::OK);
    let record = json_body(&body);
    assert_eq!(record["status"], "Completed");
    assert_eq!(record["progress"], 100);
    assert!(record["video_path"].as_str().unwrap().ends_with(&format!("{}.mp4", task_id)));

    let (status, headers, body) = call(&h.app, get(format!("/download_video/{}", task_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert!(
        headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment")
    );
    assert_eq!(body, b"MP4 with 3 clips");
}

#[tokio::test]
async fn vanished_video_is_not_ready() {
    let h = harness(true, false);

    let (_, _, body) = call(&h.app, submit(json!({"topic": "Greek Mythology"}))).await;
    let task_id = json_body(&body)["task_id"].as_str().unwrap().to_string();
    let record = h.manager.wait(&JobId::from(task_id.clone())).await.unwrap();
    let video = record.finished_video().unwrap().clone();

    fs::remove_file(&video).await.unwrap();

    let (_, _, body) = call(&h.app, get(format!("/video_status/{}", task_id))).await;
    assert_eq!(json_body(&body)["status"], "Completed");

    let (status, _, body) = call(&h.app, get(format!("/download_video/{}", task_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body), json!({"error": "Video not ready or not found"}));
}

#[tokio::test]
async fn download_waits_for_completion() {
    let h = harness(true, true);

    let (status, _, body) = call(&h.app, submit(json!({"topic": "Greek Mythology"}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = json_body(&body)["task_id"].as_str().unwrap().to_string();

    let (status, _, _) = call(&h.app, get(format!("/download_video/{}", task_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, _, body) = call(&h.app, get(format!("/video_status/{}", task_id))).await;
    let running = json_body(&body)["status"].as_str().unwrap().to_string();
    assert!(running == "Started" || running == "Generating script");

    if let Some(gate) = &h.writer.gate {
        gate.notify_one();
    }
    h.manager.wait(&JobId::from(task_id.clone())).await.unwrap();

    let (status, _, _) = call(&h.app, get(format!("/download_video/{}", task_id))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_keys_fail_the_job_not_the_request() {
    let h = harness(false, false);

    let (status, _, body) = call(&h.app, submit(json!({"topic": "Greek Mythology"}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = json_body(&body)["task_id"].as_str().unwrap().to_string();
    h.manager.wait(&JobId::from(task_id.clone())).await.unwrap();

    let (_, _, body) = call(&h.app, get(format!("/video_status/{}", task_id))).await;
    assert_eq!(json_body(&body), json!({"status": "Failed", "error": "API keys not set"}));

    let (status, _, _) = call(&h.app, get(format!("/download_video/{}", task_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_and_health_endpoints() {
    let h = harness(true, true);

    let (_, _, body) = call(&h.app, submit(json!({"topic": "Greek Mythology"}))).await;
    let task_id = json_body(&body)["task_id"].as_str().unwrap().to_string();

    let (status, _, body) = call(&h.app, get("/health".into())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({"status": "ok", "active_jobs": 1}));

    let cancel = Request::builder()
        .method("POST")
        .uri(format!("/cancel_video/{}", task_id))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = call(&h.app, cancel).await;
    assert_eq!(status, StatusCode::OK);

    let record = h.manager.wait(&JobId::from(task_id.clone())).await.unwrap();
    assert_eq!(record.error.as_deref(), Some("Job cancelled"));

    let again = Request::builder()
        .method("POST")
        .uri(format!("/cancel_video/{}", task_id))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = call(&h.app, again).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body), json!({"error": "Job already finished"}));
}
