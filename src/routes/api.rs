// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Routes for logged-in users.

use crate::calendar::{self, CalendarEntry, DATE_KEY_FORMAT};
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::UserProfile;
use crate::routes::flash::{Flash, FlashResponse};
use crate::services::lab_report::{self, LabValues};
use crate::services::RefreshOutcome;
use crate::AppState;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::Form;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Largest accepted lab report upload.
const MAX_PDF_BYTES: usize = 20 * 1024 * 1024;

/// Multipart field carrying the lab report.
const PDF_FIELD: &str = "pdf_file";

/// App routes (require a session).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(home))
        .route("/about", get(about))
        .route("/profile", get(get_profile).post(update_profile))
        .route(
            "/profile/pdf",
            post(upload_lab_report).layer(DefaultBodyLimit::max(MAX_PDF_BYTES)),
        )
        .route("/events", get(get_events))
}

// ─── Home / About ────────────────────────────────────────────

#[derive(Serialize)]
pub struct HomeResponse {
    pub user: String,
    pub has_profile: bool,
}

async fn home(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<HomeResponse>> {
    let has_profile = state.db.user_has_profile(&user.username).await?;
    Ok(Json(HomeResponse {
        user: user.username,
        has_profile,
    }))
}

#[derive(Serialize)]
pub struct AboutResponse {
    pub user: String,
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

async fn about(Extension(user): Extension<AuthUser>) -> Json<AboutResponse> {
    Json(AboutResponse {
        user: user.username,
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        description: "Personalized health events, recommended from your profile and lab results.",
    })
}

// ─── Profile ─────────────────────────────────────────────────

/// Profile as shown on the profile page.
#[derive(Serialize)]
pub struct ProfileResponse {
    pub user: String,
    pub first_name: String,
    pub last_name: String,
    pub complete: bool,
    #[serde(flatten)]
    pub profile: UserProfile,
    pub condition_list: Vec<String>,
    pub interest_list: Vec<String>,
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ProfileResponse>> {
    let account = state
        .db
        .get_user(&user.username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.username)))?;
    let profile = state
        .db
        .get_profile(&user.username)
        .await?
        .unwrap_or_default();

    Ok(Json(ProfileResponse {
        user: user.username,
        first_name: account.first_name,
        last_name: account.last_name,
        complete: profile.is_complete(),
        condition_list: profile.condition_list(),
        interest_list: profile.interest_list(),
        profile,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    age: Option<String>,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    city: Option<String>,
    /// Repeated `conditions=` fields
    #[serde(default)]
    conditions: Vec<String>,
    /// Repeated `interests=` fields
    #[serde(default)]
    interests: Vec<String>,
}

/// Save the profile, then refresh recommendations from the workflow.
///
/// The save stands even when the workflow fails; that failure only
/// changes the flash message.
async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Form(form): Form<ProfileForm>,
) -> Result<(StatusCode, Json<FlashResponse>)> {
    let age = match form.age.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        None => None,
        Some(raw) => match raw.parse::<u32>() {
            Ok(age) => Some(age),
            Err(_) => {
                return Ok((
                    StatusCode::BAD_REQUEST,
                    Json(FlashResponse::stay(Flash::warning(
                        "Age must be a whole number.",
                    ))),
                ));
            }
        },
    };

    let profile = UserProfile::from_parts(
        age,
        form.gender,
        &form.conditions,
        form.city,
        &form.interests,
    );
    state.db.upsert_profile(&user.username, &profile).await?;
    tracing::info!(username = %user.username, complete = profile.is_complete(), "Profile saved");

    let flash = match state
        .recommendations
        .refresh_events(&user.username, &profile)
        .await
    {
        Ok(RefreshOutcome::Replaced(_)) => {
            Flash::success("Your details were saved and your events were updated!")
        }
        Ok(RefreshOutcome::NoEvents) => Flash::info("Your details were saved."),
        Err(e) => {
            tracing::error!(username = %user.username, error = %e, "Event refresh failed");
            Flash::danger(format!("Error communicating with the backend: {}", e))
        }
    };

    Ok((
        StatusCode::OK,
        Json(FlashResponse::redirect(flash, "/profile")),
    ))
}

// ─── Lab Report ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct LabReportResponse {
    pub flash: Flash,
    /// Values recognized locally in the PDF text, when it could be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_values: Option<LabValues>,
    /// Payload returned by the lab report workflow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
}

impl LabReportResponse {
    fn flash_only(flash: Flash) -> Self {
        Self {
            flash,
            lab_values: None,
            analysis: None,
        }
    }
}

/// Upload a lab report PDF for analysis.
async fn upload_lab_report(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<LabReportResponse>)> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(PDF_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Could not read upload: {}", e)))?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let Some((filename, bytes)) = upload.filter(|(name, _)| !name.trim().is_empty()) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(LabReportResponse::flash_only(Flash::warning(
                "No PDF file was selected.",
            ))),
        ));
    };

    tracing::info!(username = %user.username, filename = %filename, size = bytes.len(), "Lab report received");

    let local_bytes = bytes.clone();
    let lab_values =
        match tokio::task::spawn_blocking(move || lab_report::parse_lab_report(&local_bytes))
            .await?
        {
            Ok(values) => {
                tracing::debug!(filename = %filename, table = %lab_report::to_csv(&values), "Recognized lab values");
                Some(values)
            }
            Err(e) => {
                tracing::warn!(filename = %filename, error = %e, "Local lab report parsing failed");
                None
            }
        };

    let response = match state
        .recommendations
        .analyze_lab_report(&filename, bytes)
        .await
    {
        Ok(analysis) => LabReportResponse {
            flash: Flash::success("The PDF was analyzed successfully!"),
            lab_values,
            analysis: Some(analysis),
        },
        Err(e) => {
            tracing::error!(username = %user.username, error = %e, "Lab report analysis failed");
            LabReportResponse {
                flash: Flash::danger(format!("Error while analyzing the PDF: {}", e)),
                lab_values,
                analysis: None,
            }
        }
    };

    Ok((StatusCode::OK, Json(response)))
}

// ─── Events ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct EventsQuery {
    year: Option<String>,
    month: Option<String>,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub user: String,
    pub year: i32,
    pub month: u32,
    /// Events keyed by `YYYY-MM-DD`
    pub events: BTreeMap<String, Vec<CalendarEntry>>,
}

/// A user's events for one month, bucketed by day.
async fn get_events(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>> {
    let today = chrono::Local::now().date_naive();
    let (year, month) =
        calendar::resolve_year_month(query.year.as_deref(), query.month.as_deref(), today);

    let (start, end) = calendar::month_bounds(year, month).ok_or_else(|| {
        AppError::BadRequest(format!("Invalid month {}-{}", year, month))
    })?;

    let events = state
        .db
        .events_in_range(
            &user.username,
            &start.format(DATE_KEY_FORMAT).to_string(),
            &end.format(DATE_KEY_FORMAT).to_string(),
        )
        .await?;

    Ok(Json(EventsResponse {
        user: user.username,
        year,
        month,
        events: calendar::bucket_by_date(&events),
    }))
}
