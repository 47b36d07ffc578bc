// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Recommendation orchestration: moves profiles and lab reports through the
//! workflow service and stores what comes back.

use serde_json::Value;

use crate::db::Database;
use crate::error::AppError;
use crate::models::event::recommended_events;
use crate::models::{ProfileDocument, UserProfile};
use crate::services::workflow::{WorkflowClient, WorkflowKind};

/// What a profile refresh did to the user's events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Stored events were replaced with this many new ones.
    Replaced(usize),
    /// The workflow returned no event list; stored events are untouched.
    NoEvents,
}

/// Service tying the workflow client to the event store.
#[derive(Clone)]
pub struct RecommendationService {
    workflow: WorkflowClient,
    db: Database,
}

impl RecommendationService {
    pub fn new(workflow: WorkflowClient, db: Database) -> Self {
        Self { workflow, db }
    }

    /// Send the profile to the events workflow and store its recommendations.
    pub async fn refresh_events(
        &self,
        username: &str,
        profile: &UserProfile,
    ) -> Result<RefreshOutcome, AppError> {
        let document = ProfileDocument::new(username, profile);
        let filename = format!("{}.json", username);

        let path = self.workflow.upload_json(&document, &filename).await?;
        let payload = self
            .workflow
            .run_and_extract(WorkflowKind::Events, &path)
            .await?;

        let Some(events) = recommended_events(&payload) else {
            tracing::info!(username, "Events workflow returned no recommendations");
            return Ok(RefreshOutcome::NoEvents);
        };

        let count = self.db.replace_events(username, events).await?;
        tracing::info!(username, count, "Stored recommended events");
        Ok(RefreshOutcome::Replaced(count))
    }

    /// Send a lab report PDF to the lab report workflow.
    ///
    /// Returns the extracted payload (`{}` when the response had none).
    pub async fn analyze_lab_report(
        &self,
        filename: &str,
        pdf_bytes: Vec<u8>,
    ) -> Result<Value, AppError> {
        let path = self.workflow.upload_pdf(pdf_bytes, filename).await?;
        self.workflow
            .run_and_extract(WorkflowKind::LabReport, &path)
            .await
    }
}
