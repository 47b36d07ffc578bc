// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod lab_report;
pub mod password;
pub mod recommendations;
pub mod workflow;

pub use recommendations::{RecommendationService, RefreshOutcome};
pub use workflow::{WorkflowClient, WorkflowKind};
