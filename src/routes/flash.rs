// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! One-shot user messages returned alongside form responses.

use serde::Serialize;

/// Severity of a flash message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Danger,
}

/// A message for the user about the outcome of a form submission.
#[derive(Debug, Clone, Serialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn new(level: FlashLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(FlashLevel::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(FlashLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(FlashLevel::Warning, message)
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Self::new(FlashLevel::Danger, message)
    }
}

/// Form response: a flash message and where the client should go next.
#[derive(Debug, Serialize)]
pub struct FlashResponse {
    pub flash: Flash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

impl FlashResponse {
    /// Stay on the current page.
    pub fn stay(flash: Flash) -> Self {
        Self {
            flash,
            redirect: None,
        }
    }

    pub fn redirect(flash: Flash, to: &str) -> Self {
        Self {
            flash,
            redirect: Some(to.to_string()),
        }
    }
}
