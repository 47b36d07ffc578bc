// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! healthcal API Server
//!
//! Stores accounts and health profiles, forwards profiles and lab reports to
//! the workflow service, and serves the recommended events it returns.

use healthcal::{
    config::Config,
    db::Database,
    services::{RecommendationService, WorkflowClient},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting healthcal API");

    // Open the database and make sure the schema is current
    let db = Database::new(config.database_path.clone());
    db.init_schema()
        .await
        .expect("Failed to initialize database schema");

    let workflow =
        WorkflowClient::new(config.workflow.clone()).expect("Failed to build workflow client");
    tracing::info!(
        base_url = %config.workflow.base_url,
        probe_endpoints = config.workflow.probe_endpoints,
        "Workflow client initialized"
    );

    let recommendations = RecommendationService::new(workflow, db.clone());

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        recommendations,
    });

    // Build router
    let app = healthcal::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("healthcal=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
