// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile save, event refresh through the workflow service, and the
//! monthly events view.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header as header_eq, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::*;

const PROFILE_FORM: &str =
    "age=40&gender=female&city=Athens&conditions=diabetes&conditions=hypertension&interests=walking";

async fn mount_profile_upload(server: &MockServer, username: &str) {
    Mock::given(method("POST"))
        .and(path("/api/v2/files"))
        .and(header_eq("x-api-key", "test-api-key"))
        .and(body_string_contains(format!("\"username\":\"{}\"", username)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"path": format!("{0}/{0}.json", username)})),
        )
        .mount(server)
        .await;
}

fn events_text(events: serde_json::Value) -> String {
    format!(
        "Here you go:\n```json\n{}\n```",
        json!({ "recommended_events": events })
    )
}

#[tokio::test]
async fn test_profile_save_refreshes_events() {
    let server = MockServer::start().await;
    let (app, state, _dir) = create_test_app(&server.uri()).await;
    let session = register_and_login(&app, "maria", "pw").await;

    mount_profile_upload(&server, "maria").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/run/events-flow"))
        .and(query_param("stream", "false"))
        .and(body_partial_json(json!({
            "input_value": "no input",
            "tweaks": {"File-TeORO": {"path": ["maria/maria.json"]}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(run_envelope(&events_text(json!([
            {"name": "Morning walk", "date": "2024-03-05 10:00", "text": "Gentle walk"},
            {"name": "", "date": "2024-03-05", "text": "Talk on nutrition"},
            {"name": "Yoga", "date": "2024-03-20"},
            {"name": "Next month", "date": "2024-04-01"},
            {"name": "No date"}
        ])))))
        .expect(1)
        .mount(&server)
        .await;

    let response = send(&app, form_request("/profile", PROFILE_FORM, Some(&session))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["flash"]["level"], "success");
    assert_eq!(json["redirect"], "/profile");

    let profile = state.db.get_profile("maria").await.unwrap().unwrap();
    assert_eq!(profile.age, Some(40));
    assert_eq!(profile.condition_type.as_deref(), Some("diabetes,hypertension"));

    let response = send(&app, get_request("/events?year=2024&month=3", Some(&session))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["year"], 2024);
    assert_eq!(json["month"], 3);

    let events = json["events"].as_object().unwrap();
    assert_eq!(events.len(), 2);
    let fifth = events["2024-03-05"].as_array().unwrap();
    assert_eq!(fifth.len(), 2);
    // Date-only sorts ahead of the timed event on the same day
    assert_eq!(fifth[0]["name"], "Event");
    assert_eq!(fifth[0]["description"], "Talk on nutrition");
    assert_eq!(fifth[1]["name"], "Morning walk");
    assert_eq!(fifth[1]["description"], "Gentle walk");
    assert_eq!(events["2024-03-20"][0]["name"], "Yoga");

    let response = send(&app, get_request("/events?year=2024&month=4", Some(&session))).await;
    let json = body_json(response).await;
    assert_eq!(json["events"]["2024-04-01"][0]["name"], "Next month");

    let response = send(&app, get_request("/", Some(&session))).await;
    assert_eq!(body_json(response).await["has_profile"], true);
}

#[tokio::test]
async fn test_second_refresh_replaces_events() {
    let server = MockServer::start().await;
    let (app, state, _dir) = create_test_app(&server.uri()).await;
    let session = register_and_login(&app, "maria", "pw").await;
    mount_profile_upload(&server, "maria").await;

    Mock::given(method("POST"))
        .and(path("/api/v1/run/events-flow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(run_envelope(&events_text(json!([
            {"name": "Old one", "date": "2024-03-01"},
            {"name": "Old two", "date": "2024-03-02"}
        ])))))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    send(&app, form_request("/profile", PROFILE_FORM, Some(&session))).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/run/events-flow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(run_envelope(&events_text(json!([
            {"name": "New", "date": "2024-03-10"}
        ])))))
        .mount(&server)
        .await;
    send(&app, form_request("/profile", PROFILE_FORM, Some(&session))).await;

    let events = state
        .db
        .events_in_range("maria", "2024-03-01", "2024-04-01")
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name.as_deref(), Some("New"));
}

#[tokio::test]
async fn test_missing_event_list_keeps_stored_events() {
    let server = MockServer::start().await;
    let (app, state, _dir) = create_test_app(&server.uri()).await;
    let session = register_and_login(&app, "maria", "pw").await;
    mount_profile_upload(&server, "maria").await;

    state
        .db
        .replace_events(
            "maria",
            vec![healthcal::models::Event {
                name: Some("Kept".to_string()),
                date: Some("2024-03-03".to_string()),
                ..Default::default()
            }],
        )
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/api/v1/run/events-flow"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(run_envelope("I could not find any events.")),
        )
        .mount(&server)
        .await;

    let response = send(&app, form_request("/profile", PROFILE_FORM, Some(&session))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["flash"]["level"], "info");

    let events = state
        .db
        .events_in_range("maria", "2024-03-01", "2024-04-01")
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_workflow_failure_still_saves_profile() {
    let server = MockServer::start().await;
    let (app, _state, _dir) = create_test_app(&server.uri()).await;
    let session = register_and_login(&app, "maria", "pw").await;

    Mock::given(method("POST"))
        .and(path("/api/v2/files"))
        .respond_with(ResponseTemplate::new(500).set_body_string("storage offline"))
        .mount(&server)
        .await;

    let response = send(&app, form_request("/profile", PROFILE_FORM, Some(&session))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["flash"]["level"], "danger");
    let message = json["flash"]["message"].as_str().unwrap();
    assert!(message.starts_with("Error communicating with the backend"));
    assert!(message.contains("storage offline"));

    let response = send(&app, get_request("/profile", Some(&session))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["complete"], true);
    assert_eq!(json["city"], "Athens");
    assert_eq!(json["first_name"], "Test");
    assert_eq!(json["condition_list"], json!(["diabetes", "hypertension"]));
    assert_eq!(json["interest_list"], json!(["walking"]));
}

#[tokio::test]
async fn test_invalid_age_is_rejected_without_saving() {
    let (app, state, _dir) = create_test_app(UNREACHABLE_WORKFLOW_URL).await;
    let session = register_and_login(&app, "maria", "pw").await;

    let response = send(
        &app,
        form_request("/profile", "age=forty&gender=female&city=Athens", Some(&session)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["flash"]["message"],
        "Age must be a whole number."
    );
    assert!(state.db.get_profile("maria").await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_profile_page() {
    let (app, _state, _dir) = create_test_app(UNREACHABLE_WORKFLOW_URL).await;
    let session = register_and_login(&app, "maria", "pw").await;

    let response = send(&app, get_request("/profile", Some(&session))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["user"], "maria");
    assert_eq!(json["complete"], false);
    assert_eq!(json["condition_list"], json!([]));
}

#[tokio::test]
async fn test_events_default_to_current_month() {
    let (app, _state, _dir) = create_test_app(UNREACHABLE_WORKFLOW_URL).await;
    let session = register_and_login(&app, "maria", "pw").await;

    let response = send(&app, get_request("/events?year=abc&month=13", Some(&session))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;

    let today = chrono::Local::now().date_naive();
    assert_eq!(json["year"], chrono::Datelike::year(&today));
    assert_eq!(json["month"], chrono::Datelike::month(&today));
    assert_eq!(json["events"], json!({}));
}

// ─── Lab report upload ───────────────────────────────────────

fn multipart_request(session: &str, field: &str, filename: &str, content: &[u8]) -> Request<Body> {
    let (content_type, body) = multipart_body(field, filename, content);
    Request::builder()
        .method("POST")
        .uri("/profile/pdf")
        .header(header::CONTENT_TYPE, content_type)
        .header(header::COOKIE, session)
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_lab_report_without_file() {
    let (app, _state, _dir) = create_test_app(UNREACHABLE_WORKFLOW_URL).await;
    let session = register_and_login(&app, "maria", "pw").await;

    let response = send(&app, multipart_request(&session, "pdf_file", "", b"")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["flash"]["message"], "No PDF file was selected.");
    assert!(json.get("analysis").is_none());

    let response = send(&app, multipart_request(&session, "other", "a.pdf", b"x")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_lab_report_is_forwarded_to_workflow() {
    let server = MockServer::start().await;
    let (app, _state, _dir) = create_test_app(&server.uri()).await;
    let session = register_and_login(&app, "maria", "pw").await;

    Mock::given(method("POST"))
        .and(path("/api/v2/files"))
        .and(body_string_contains("report.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"path": "uploads/report.pdf"}])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/run/lab-report-flow"))
        .and(body_partial_json(json!({
            "tweaks": {"File-Kgijo": {"path": ["uploads/report.pdf"]}}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(run_envelope("{\"hba1c\": {\"value\": 6.1, \"flag\": \"high\"}}")),
        )
        .expect(1)
        .mount(&server)
        .await;

    // Not a real PDF: local parsing fails but the workflow still runs
    let response = send(&app, multipart_request(&session, "pdf_file", "report.pdf", b"not a pdf")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["flash"]["level"], "success");
    assert_eq!(json["analysis"]["hba1c"]["flag"], "high");
    assert!(json.get("lab_values").is_none());
}

#[tokio::test]
async fn test_lab_report_workflow_error() {
    let server = MockServer::start().await;
    let (app, _state, _dir) = create_test_app(&server.uri()).await;
    let session = register_and_login(&app, "maria", "pw").await;

    Mock::given(method("POST"))
        .and(path("/api/v2/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"file_path": "uploads/r.pdf"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/run/lab-report-flow"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>login</html>", "text/html"))
        .mount(&server)
        .await;

    let response = send(&app, multipart_request(&session, "pdf_file", "r.pdf", b"%PDF-broken")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["flash"]["level"], "danger");
    assert!(json["flash"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Error while analyzing the PDF"));
    assert!(json.get("analysis").is_none());
}

#[tokio::test]
async fn test_lab_report_values_are_read_from_pdf() {
    let server = MockServer::start().await;
    let (app, _state, _dir) = create_test_app(&server.uri()).await;
    let session = register_and_login(&app, "maria", "pw").await;

    Mock::given(method("POST"))
        .and(path("/api/v2/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"path": "uploads/labs.pdf"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/run/lab-report-flow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(run_envelope("{\"summary\": \"ok\"}")))
        .mount(&server)
        .await;

    let pdf = lab_report_pdf(&["City Lab", "Glucose 95 mg/dL", "HbA1c: 5.6 %", "LDL Cholesterol 130 mg/dL"]);
    let response = send(&app, multipart_request(&session, "pdf_file", "labs.pdf", &pdf)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["flash"]["level"], "success");
    let labs = &json["lab_values"];
    assert_eq!(labs["glucose"]["value"], 95.0);
    assert_eq!(labs["glucose"]["unit"], "mg/dL");
    assert_eq!(labs["hba1c"]["value"], 5.6);
    assert_eq!(labs["hba1c"]["unit"], "%");
    assert_eq!(labs["ldl"]["raw_line"], "LDL Cholesterol 130 mg/dL");
    assert_eq!(json["analysis"]["summary"], "ok");
}
