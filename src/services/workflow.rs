// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client for the remote workflow service.
//!
//! Two-stage protocol:
//! - Upload a file and get back its storage path
//! - Trigger a workflow run with a tweak pointing at that path
//!
//! The run response is a nested envelope whose interesting part is free
//! text, usually a JSON document wrapped in a markdown code fence.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::{WorkflowConfig, WorkflowTarget};
use crate::error::AppError;

const API_KEY_HEADER: &str = "x-api-key";
const UPLOAD_PATH: &str = "/api/v2/files";
/// Upstream error bodies are cut to this many characters.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Keys that may carry the storage path in an upload response, in order.
const UPLOAD_PATH_KEYS: [&str; 4] = ["path", "file_path", "file_id", "id"];

/// Where the run envelope may hold the output text, in order.
const RESPONSE_TEXT_POINTERS: [&str; 3] = [
    "/outputs/0/outputs/0/results/text/data/text",
    "/outputs/0/outputs/0/results/message/text",
    "/outputs/0/outputs/0/outputs/message/message",
];

static CODE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:json)?").expect("code fence regex"));

/// The workflows this app runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowKind {
    /// Profile document in, recommended events out.
    Events,
    /// Lab report PDF in, analysis out.
    LabReport,
}

impl WorkflowKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowKind::Events => "events",
            WorkflowKind::LabReport => "lab_report",
        }
    }

    fn target(self, config: &WorkflowConfig) -> &WorkflowTarget {
        match self {
            WorkflowKind::Events => &config.events,
            WorkflowKind::LabReport => &config.lab_report,
        }
    }
}

/// Workflow service HTTP client.
#[derive(Clone)]
pub struct WorkflowClient {
    http: reqwest::Client,
    config: Arc<WorkflowConfig>,
}

impl WorkflowClient {
    pub fn new(config: WorkflowConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    /// Upload a file and return its storage path on the service.
    pub async fn upload_file(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String, AppError> {
        let url = format!("{}{}", self.config.base_url, UPLOAD_PATH);
        let size = bytes.len();

        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .map_err(|e| AppError::Workflow(format!("Invalid content type {}: {}", content_type, e)))?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Workflow(format!("Upload request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, filename, "Workflow upload rejected");
            return Err(AppError::Workflow(format!(
                "Upload failed with HTTP {}: {}",
                status,
                truncate(&body, MAX_ERROR_BODY_CHARS)
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::Workflow(format!("Upload response is not JSON: {}", e)))?;

        let path = extract_upload_path(&body).ok_or_else(|| {
            AppError::Workflow(format!(
                "Upload response has no file path: {}",
                truncate(&body.to_string(), MAX_ERROR_BODY_CHARS)
            ))
        })?;

        tracing::info!(filename, size, path = %path, "Uploaded file to workflow service");
        Ok(path)
    }

    /// Serialize `document` and upload it as a JSON file.
    pub async fn upload_json<T: Serialize>(
        &self,
        document: &T,
        filename: &str,
    ) -> Result<String, AppError> {
        let bytes = serde_json::to_vec(document)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON encode failed: {}", e)))?;
        self.upload_file(bytes, filename, "application/json").await
    }

    pub async fn upload_pdf(&self, bytes: Vec<u8>, filename: &str) -> Result<String, AppError> {
        self.upload_file(bytes, filename, "application/pdf").await
    }

    /// Trigger a workflow run on an uploaded file and return the raw envelope.
    ///
    /// With endpoint probing enabled every candidate URL is tried once, in
    /// order; only a 2xx JSON response counts. Otherwise just the pinned URL
    /// is used.
    pub async fn run(&self, kind: WorkflowKind, file_path: &str) -> Result<Value, AppError> {
        let target = kind.target(&self.config);
        let payload = run_payload(target, file_path);
        let candidates = run_candidates(
            &self.config.base_url,
            &target.workflow_id,
            self.config.probe_endpoints,
        );

        let mut last_miss = String::new();
        for url in &candidates {
            match self.try_run(url, &payload).await {
                Ok(envelope) => {
                    tracing::info!(workflow = kind.as_str(), url = %url, "Workflow run completed");
                    return Ok(envelope);
                }
                Err(miss) => {
                    tracing::warn!(workflow = kind.as_str(), url = %url, reason = %miss, "Workflow endpoint missed");
                    last_miss = miss;
                }
            }
        }

        Err(AppError::Workflow(format!(
            "No workflow endpoint accepted the {} run ({} tried): {}",
            kind.as_str(),
            candidates.len(),
            last_miss
        )))
    }

    /// Run a workflow and pull the JSON payload out of its response text.
    pub async fn run_and_extract(
        &self,
        kind: WorkflowKind,
        file_path: &str,
    ) -> Result<Value, AppError> {
        let envelope = self.run(kind, file_path).await?;
        Ok(extract_payload(&envelope))
    }

    /// One attempt against one URL. `Err` carries the reason it was a miss.
    async fn try_run(&self, url: &str, payload: &Value) -> Result<Value, String> {
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!(
                "HTTP {}: {}",
                status,
                truncate(&body, MAX_ERROR_BODY_CHARS)
            ));
        }
        if !is_json {
            return Err(format!("HTTP {} with non-JSON body (likely a login page)", status));
        }

        response
            .json()
            .await
            .map_err(|e| format!("invalid JSON body: {}", e))
    }
}

/// Request body for a run, injecting `file_path` at the target's tweak node.
fn run_payload(target: &WorkflowTarget, file_path: &str) -> Value {
    let mut tweaks = Map::new();
    tweaks.insert(target.tweak_node.clone(), json!({ "path": [file_path] }));

    json!({
        "output_type": "text",
        "input_type": "text",
        "input_value": "no input",
        "session_id": uuid::Uuid::new_v4().to_string(),
        "tweaks": tweaks,
    })
}

/// Run endpoint URLs to try, pinned shape first.
pub fn run_candidates(base_url: &str, workflow_id: &str, probe: bool) -> Vec<String> {
    let base = base_url.trim_end_matches('/');
    let pinned = format!("{}/api/v1/run/{}?stream=false", base, workflow_id);
    if !probe {
        return vec![pinned];
    }

    let mut urls = Vec::with_capacity(8);
    for prefix in ["/api/v1", "/v1"] {
        for slash in ["", "/"] {
            for query in ["?stream=false", ""] {
                urls.push(format!("{}{}/run/{}{}{}", base, prefix, workflow_id, slash, query));
            }
        }
    }
    urls
}

/// Find the storage path in an upload response.
///
/// Tries the known keys on an object, then `path` on the first element of a
/// list.
pub fn extract_upload_path(body: &Value) -> Option<String> {
    match body {
        Value::Object(map) => UPLOAD_PATH_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(non_empty_scalar)),
        Value::Array(items) => items
            .first()
            .and_then(|first| first.get("path"))
            .and_then(non_empty_scalar),
        _ => None,
    }
}

/// The output text of a run envelope: first non-empty candidate path wins.
pub fn response_text(envelope: &Value) -> Option<&str> {
    RESPONSE_TEXT_POINTERS.iter().find_map(|pointer| {
        envelope
            .pointer(pointer)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    })
}

/// Parse a JSON object or array out of free text.
///
/// Code fences are stripped first; if the rest is not JSON, one value is
/// read starting at each `{` or `[` in turn and the first that parses wins.
/// Text after that value is ignored.
pub fn parse_payload_text(text: &str) -> Option<Value> {
    let stripped = CODE_FENCE_RE.replace_all(text, "");
    let trimmed = stripped.trim();

    if let Some(value) = serde_json::from_str(trimmed).ok().and_then(structured) {
        return Some(value);
    }

    trimmed
        .match_indices(['{', '['])
        .find_map(|(start, _)| leading_value(&trimmed[start..]))
}

/// Parse the single JSON object or array at the start of `text`.
fn leading_value(text: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()?
        .ok()
        .and_then(structured)
}

fn structured(value: Value) -> Option<Value> {
    (value.is_object() || value.is_array()).then_some(value)
}

/// Extract the JSON payload from a run envelope.
///
/// Never fails: anything unexpected yields an empty object.
pub fn extract_payload(envelope: &Value) -> Value {
    let Some(text) = response_text(envelope) else {
        tracing::warn!("Workflow response has no output text");
        return Value::Object(Map::new());
    };

    parse_payload_text(text).unwrap_or_else(|| {
        tracing::warn!(
            text = %truncate(text, MAX_ERROR_BODY_CHARS),
            "Workflow output text is not JSON"
        );
        Value::Object(Map::new())
    })
}

fn non_empty_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
