use crate::job::JobId;
use crate::{logi, logw};
use crate::manager::JobManager;
use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::fs;
use tower_http::cors::CorsLayer;

pub fn create_router(manager: JobManager) -> Router {
    Router::new()
        .route("/generate_video", post(generate_video))
        .route("/video_status/:task_id", get(video_status))
        .route("/download_video/:task_id", get(download_video))
        .route("/cancel_video/:task_id", post(cancel_video))
        .route("/health", get(health))
        .with_state(manager)
        .layer(CorsLayer::permissive())
}

pub async fn start_server(bind_addr: &str, manager: JobManager) -> Result<()> {
    let app = create_router(manager.clone());
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    logi(format!("Status API listening on http://{}", listener.local_addr()?));

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .context("HTTP server failed")?;

    logi("Shutting down; cancelling unfinished jobs");
    manager.shutdown().await;
    Ok(())
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}

/// The topic, if present as a non-blank string.
fn topic_from(payload: Option<Json<Value>>) -> Option<String> {
    let Json(body) = payload?;
    let topic = body.get("topic")?.as_str()?.trim();
    if topic.is_empty() {
        return None;
    }
    Some(topic.to_string())
}

async fn generate_video(
    State(manager): State<JobManager>,
    payload: Option<Json<Value>>,
) -> Response {
    let Some(topic) = topic_from(payload) else {
        return error_json(StatusCode::BAD_REQUEST, "No topic provided");
    };

    let task_id = manager.submit(topic);
    (StatusCode::ACCEPTED, Json(json!({"task_id": task_id}))).into_response()
}

async fn video_status(State(manager): State<JobManager>, Path(task_id): Path<String>) -> Response {
    match manager.status(&JobId::from(task_id)) {
        Some(record) => Json(record).into_response(),
        None => Json(json!({"status": "Not found"})).into_response(),
    }
}

async fn download_video(State(manager): State<JobManager>, Path(task_id): Path<String>) -> Response {
    let id = JobId::from(task_id);
    let not_ready = || error_json(StatusCode::NOT_FOUND, "Video not ready or not found");

    let Some(record) = manager.status(&id) else {
        return not_ready();
    };
    let Some(path) = record.finished_video() else {
        return not_ready();
    };

    match fs::read(path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "video/mp4".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}.mp4\"", id),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(err) => {
            logw(format!("[{}] Completed video unreadable at {}: {}", id, path.display(), err));
            not_ready()
        }
    }
}

async fn cancel_video(State(manager): State<JobManager>, Path(task_id): Path<String>) -> Response {
    let id = JobId::from(task_id);
    if manager.cancel(&id) {
        return Json(json!({"task_id": id, "cancelled": true})).into_response();
    }

    let message = match manager.status(&id) {
        Some(record) if record.status.is_terminal() => "Job already finished",
        _ => "Job not found",
    };
    error_json(StatusCode::NOT_FOUND, message)
}

async fn health(State(manager): State<JobManager>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "active_jobs": manager.active_jobs(),
    }))
}
