// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup and handed to the components that need
//! it. The workflow client gets its own [`WorkflowConfig`] rather than reading
//! globals.

use std::env;
use std::path::PathBuf;

/// Tweak node for the events workflow's file input.
pub const DEFAULT_EVENTS_TWEAK: &str = "File-TeORO";
/// Tweak node for the lab report workflow's file input.
pub const DEFAULT_LAB_REPORT_TWEAK: &str = "File-Kgijo";

const DEFAULT_WORKFLOW_TIMEOUT_SECS: u64 = 60;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Public URL the app is served from (decides the cookie `Secure` flag)
    pub public_url: String,
    /// SQLite database file
    pub database_path: PathBuf,
    /// HMAC key for session tokens (raw bytes)
    pub session_signing_key: Vec<u8>,
    /// Remote workflow service settings
    pub workflow: WorkflowConfig,
}

/// Connection settings for the remote workflow service.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Service root, without trailing slash
    pub base_url: String,
    /// Sent as `x-api-key`
    pub api_key: String,
    pub events: WorkflowTarget,
    pub lab_report: WorkflowTarget,
    pub timeout_secs: u64,
    /// Try alternative run endpoint shapes when the pinned one misses.
    pub probe_endpoints: bool,
}

/// A single remote workflow and the node its uploaded file is injected into.
#[derive(Debug, Clone)]
pub struct WorkflowTarget {
    pub workflow_id: String,
    pub tweak_node: String,
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            database_path: database_path_from_env(),
            session_signing_key: required("SESSION_SIGNING_KEY")?.into_bytes(),
            workflow: WorkflowConfig::from_env()?,
        })
    }

    /// Config for tests, pointing the workflow client at `workflow_base_url`.
    pub fn test_default(database_path: PathBuf, workflow_base_url: &str) -> Self {
        Self {
            port: 8080,
            public_url: "http://localhost:8080".to_string(),
            database_path,
            session_signing_key: b"test_session_key_32_bytes_min!!!".to_vec(),
            workflow: WorkflowConfig {
                base_url: workflow_base_url.trim_end_matches('/').to_string(),
                api_key: "test-api-key".to_string(),
                events: WorkflowTarget {
                    workflow_id: "events-flow".to_string(),
                    tweak_node: DEFAULT_EVENTS_TWEAK.to_string(),
                },
                lab_report: WorkflowTarget {
                    workflow_id: "lab-report-flow".to_string(),
                    tweak_node: DEFAULT_LAB_REPORT_TWEAK.to_string(),
                },
                timeout_secs: 5,
                probe_endpoints: false,
            },
        }
    }

    /// Whether session cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.public_url.starts_with("https://")
    }
}

impl WorkflowConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: required("WORKFLOW_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            api_key: required("WORKFLOW_API_KEY")?,
            events: WorkflowTarget {
                workflow_id: required("WORKFLOW_EVENTS_ID")?,
                tweak_node: env::var("WORKFLOW_EVENTS_TWEAK")
                    .unwrap_or_else(|_| DEFAULT_EVENTS_TWEAK.to_string()),
            },
            lab_report: WorkflowTarget {
                workflow_id: required("WORKFLOW_LAB_REPORT_ID")?,
                tweak_node: env::var("WORKFLOW_LAB_REPORT_TWEAK")
                    .unwrap_or_else(|_| DEFAULT_LAB_REPORT_TWEAK.to_string()),
            },
            timeout_secs: env::var("WORKFLOW_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_WORKFLOW_TIMEOUT_SECS),
            probe_endpoints: env::var("WORKFLOW_PROBE_ENDPOINTS")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(false),
        })
    }
}

/// `DB_PATH` wins; on Azure App Service (`WEBSITE_SITE_NAME` set) the default
/// lives under `/home`, which survives redeploys.
fn database_path_from_env() -> PathBuf {
    if let Ok(path) = env::var("DB_PATH") {
        return PathBuf::from(path);
    }
    if env::var("WEBSITE_SITE_NAME").is_ok() {
        PathBuf::from("/home/users.db")
    } else {
        PathBuf::from("users.db")
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
