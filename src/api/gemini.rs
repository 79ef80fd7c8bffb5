use crate::config::Config;
use crate::script::Script;
use crate::{logi, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Produces the scene script for a topic. `None` means no usable script;
/// implementations log the reason themselves.
#[async_trait]
pub trait ScriptWriter: Send + Sync {
    async fn write_script(&self, api_key: &str, topic: &str) -> Option<Script>;
}

pub fn script_prompt(topic: &str) -> String {
    format!(
        "You are part of a short video generation pipeline. Create a script for a video about the following topic:\n\n{}\n\nThink like a script writer who has 2 available tools (text-to-speech and text-to-image). Use hooks to grab attention in the first scene.\n\nYour output should be in JSON format with scene number as key. Use the following format:\n\n{{\n\"1\": {{\n    \"image\": \"Write a prompt for generating an image relevant to the scene\",\n    \"text\": \"Narration text for text-to-speech\"\n}},\n\"2\": {{\n    \"image\": \"...\",\n    \"text\": \"...\"\n}},\n...\n}}\n\nCreate as many scenes as necessary to cover the topic comprehensively, typically between 3 to 7 scenes.\nEnsure each scene's text is concise and suitable for a short video (around 20-30 seconds per scene).\n",
        topic
    )
}

fn gemini_extract_text(resp_json: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(resp_json).ok()?;

    if let Some(err) = root.get("error") {
        if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
            logw(format!("Gemini error message: {}", msg));
        }
        if let Some(status) = err.get("status").and_then(|v| v.as_str()) {
            logw(format!("Gemini error status: {}", status));
        }
        return None;
    }

    if let Some(reason) = root
        .get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(|v| v.as_str())
    {
        logw(format!("Gemini blocked the prompt: {}", reason));
        return None;
    }

    let candidates = root.get("candidates")?.as_array()?;
    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array());
        if let Some(parts) = parts {
            let text: String = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|v| v.as_str()))
                .collect();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    None
}

pub struct GeminiScriptWriter {
    client: Client,
    base_url: String,
    model: String,
}

impl GeminiScriptWriter {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            base_url: GEMINI_BASE.to_string(),
            model: cfg.gemini_model.clone(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request_script(&self, api_key: &str, topic: &str) -> Result<Script> {
        let url = format!(
            "{}/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": script_prompt(topic)}]}],
            "generationConfig": {"responseMimeType": "application/json"},
        });

        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .timeout(Duration::from_secs(300))
            .send()
            .await
            .context("Gemini request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            if !raw.is_empty() {
                let snippet = raw.chars().take(800).collect::<String>();
                logw(format!("Gemini raw body: {}", snippet));
            }
            anyhow::bail!("Gemini HTTP {}", status.as_u16());
        }

        let text = gemini_extract_text(&raw).context("Gemini response carried no text")?;
        Script::from_json(&text)
    }
}

#[async_trait]
impl ScriptWriter for GeminiScriptWriter {
    async fn write_script(&self, api_key: &str, topic: &str) -> Option<Script> {
        match self.request_script(api_key, topic).await {
            Ok(script) => {
                logi(format!("Gemini script received: {} scenes", script.len()));
                Some(script)
            }
            Err(err) => {
                logw(format!("Script generation failed for {:?}: {:#}", topic, err));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path as UrlPath, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    /// Path segment, API key header and body of the last request.
    type Seen = Arc<Mutex<Option<(String, String, Value)>>>;

    async fn serve_mock(status: StatusCode) -> (String, Seen) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/v1beta/models", listener.local_addr().unwrap());
        let seen: Seen = Arc::new(Mutex::new(None));

        let app = Router::new()
            .route(
                "/v1beta/models/:call",
                post(
                    move |State(seen): State<Seen>,
                          UrlPath(call): UrlPath<String>,
                          headers: HeaderMap,
                          Json(body): Json<Value>| async move {
                        let key = headers
                            .get("x-goog-api-key")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        *seen.lock().unwrap() = Some((call, key, body));

                        let script = r#"{"1": {"image": "Mount Olympus", "text": "The gods gather."},
                                         "2": {"image": "Trojan horse", "text": "Troy falls."}}"#;
                        (
                            status,
                            Json(json!({"candidates": [{"content": {"parts": [{"text": script}]}}]})),
                        )
                    },
                ),
            )
            .with_state(seen.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (base, seen)
    }

    #[test]
    fn prompt_names_topic_and_format() {
        let prompt = script_prompt("Greek Mythology");
        assert!(prompt.contains("Greek Mythology"));
        assert!(prompt.contains("\"image\""));
        assert!(prompt.contains("\"text\""));
        assert!(prompt.contains("between 3 to 7 scenes"));
    }

    #[test]
    fn extracts_candidate_text() {
        let body = r#"{"candidates": [{"content": {"parts": [
            {"text": "{\"1\": {\"image\": \"olympus\","},
            {"text": " \"text\": \"Gods.\"}}"}
        ]}}]}"#;
        let text = gemini_extract_text(body).unwrap();
        let script = Script::from_json(&text).unwrap();
        assert_eq!(script.len(), 1);
    }

    #[test]
    fn error_and_blocked_bodies_yield_nothing() {
        assert!(gemini_extract_text(r#"{"error": {"message": "bad key", "status": "PERMISSION_DENIED"}}"#).is_none());
        assert!(gemini_extract_text(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).is_none());
        assert!(gemini_extract_text(r#"{"candidates": []}"#).is_none());
        assert!(gemini_extract_text("<html>").is_none());
    }

    #[tokio::test]
    async fn sends_key_and_json_mode_then_parses_scenes() {
        let (base, seen) = serve_mock(StatusCode::OK).await;
        let writer = GeminiScriptWriter::new(Client::new(), &Config::default()).with_base_url(base);

        let script = writer.write_script("gemini-key", "Greek Mythology").await.unwrap();
        assert_eq!(script.len(), 2);
        assert_eq!(
            script.get(&"2".into()).unwrap().narration_text,
            "Troy falls."
        );

        let (call, key, body) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(call, "gemini-1.5-flash:generateContent");
        assert_eq!(key, "gemini-key");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(prompt.contains("Greek Mythology"));
    }

    #[tokio::test]
    async fn error_status_gives_no_script() {
        let (base, seen) = serve_mock(StatusCode::INTERNAL_SERVER_ERROR).await;
        let writer = GeminiScriptWriter::new(Client::new(), &Config::default()).with_base_url(base);

        assert!(writer.write_script("gemini-key", "Greek Mythology").await.is_none());
        assert!(seen.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn unreachable_service_gives_no_script() {
        let writer = GeminiScriptWriter::new(Client::new(), &Config::default())
            .with_base_url("http://127.0.0.1:9");
        assert!(writer.write_script("key", "Greek Mythology").await.is_none());
    }
}
