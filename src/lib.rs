// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! healthcal: personalized health event calendar
//!
//! This crate provides the backend API: accounts and health profiles stored
//! in SQLite, lab report and profile uploads to a remote workflow service,
//! and the recommended events it returns, bucketed for calendar display.

pub mod calendar;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::Database;
use services::RecommendationService;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub recommendations: RecommendationService,
}
