// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use healthcal::config::Config;
use healthcal::db::Database;
use healthcal::routes::create_router;
use healthcal::services::{RecommendationService, WorkflowClient};
use healthcal::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Nothing listens here; used when a test never reaches the workflow service.
#[allow(dead_code)]
pub const UNREACHABLE_WORKFLOW_URL: &str = "http://127.0.0.1:9";

/// A test app backed by a throwaway SQLite file.
///
/// Keep the returned `TempDir` alive for the duration of the test.
#[allow(dead_code)]
pub async fn create_test_app(workflow_base_url: &str) -> (Router, Arc<AppState>, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config::test_default(dir.path().join("test.db"), workflow_base_url);

    let db = Database::new(config.database_path.clone());
    db.init_schema().await.expect("schema");

    let workflow = WorkflowClient::new(config.workflow.clone()).expect("workflow client");
    let recommendations = RecommendationService::new(workflow, db.clone());

    let state = Arc::new(AppState {
        config,
        db,
        recommendations,
    });

    (create_router(state.clone()), state, dir)
}

#[allow(dead_code)]
pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

#[allow(dead_code)]
pub fn form_request(uri: &str, body: &str, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = session {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[allow(dead_code)]
pub fn get_request(uri: &str, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = session {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// `name=value` of the session cookie set by a response, if any.
#[allow(dead_code)]
pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("healthcal_session="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

#[allow(dead_code)]
pub async fn register(app: &Router, username: &str, password: &str) -> StatusCode {
    let body = format!(
        "first_name=Test&last_name=User&email={u}%40example.com&username={u}&password={p}&password2={p}",
        u = username,
        p = password
    );
    send(app, form_request("/register", &body, None)).await.status()
}

/// Register and log in, returning the session cookie.
#[allow(dead_code)]
pub async fn register_and_login(app: &Router, username: &str, password: &str) -> String {
    assert_eq!(register(app, username, password).await, StatusCode::CREATED);

    let body = format!("username={}&password={}", username, password);
    let response = send(app, form_request("/login", &body, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    session_cookie(&response).expect("login should set the session cookie")
}

/// Run envelope carrying `text` at the usual output path.
#[allow(dead_code)]
pub fn run_envelope(text: &str) -> Value {
    json!({
        "session_id": "s",
        "outputs": [{
            "inputs": {"input_value": "no input"},
            "outputs": [{
                "results": {"text": {"data": {"text": text}}}
            }]
        }]
    })
}

/// Multipart body with one file field. Returns (content type, body).
#[allow(dead_code)]
pub fn multipart_body(field: &str, filename: &str, content: &[u8]) -> (String, Vec<u8>) {
    let boundary = "healthcal-test-boundary";
    let mut body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"{n}\"\r\nContent-Type: application/pdf\r\n\r\n",
        b = boundary,
        f = field,
        n = filename
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    (format!("multipart/form-data; boundary={}", boundary), body)
}

/// Single-page PDF with each entry of `lines` on its own text line.
#[allow(dead_code)]
pub fn lab_report_pdf(lines: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 11.into()]),
        Operation::new("Td", vec![50.into(), 760.into()]),
    ];
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            operations.push(Operation::new("Td", vec![0.into(), (-18).into()]));
        }
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
    }
    operations.push(Operation::new("ET", vec![]));

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
