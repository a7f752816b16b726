//! Configuration for the sync reporter.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SyncError};
use crate::proto::ToolTrigger;

/// Default number of publish workers.
pub const DEFAULT_WORKER_COUNT: usize = 10;

/// Default capacity of the work queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default retry budget for failed publishes. Declared only; the pipeline does not retry.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Reporter configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Base URL of the aggregation service, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Bearer token sent with every call.
    #[serde(default)]
    pub token: Option<String>,
    /// Tenant sent as `x-tenant-id`.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Development-only user override sent as `x-mock-user`.
    #[serde(default)]
    pub mock_user: Option<String>,

    /// Create one remote session per manifest instead of a single global one.
    #[serde(default)]
    pub enable_multi_project_sync: bool,

    pub project_name: String,
    #[serde(default)]
    pub project_version: String,
    /// `manual` or `ci`.
    #[serde(default = "default_trigger")]
    pub trigger: String,

    #[serde(default)]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub git_ref_name: Option<String>,
    #[serde(default)]
    pub git_ref_type: Option<String>,
    #[serde(default)]
    pub git_sha: Option<String>,

    /// Number of publish workers; 0 selects the default.
    #[serde(default)]
    pub worker_count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-call deadline enforced by the transport.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_tool_name")]
    pub tool_name: String,
    #[serde(default = "default_tool_version")]
    pub tool_version: String,
}

fn default_trigger() -> String {
    "manual".to_string()
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_tool_name() -> String {
    "insight-sync".to_string()
}

fn default_tool_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl SyncConfig {
    /// Creates a configuration with defaults for everything but the endpoint and project.
    #[must_use]
    pub fn new(base_url: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            tenant_id: None,
            mock_user: None,
            enable_multi_project_sync: false,
            project_name: project_name.into(),
            project_version: String::new(),
            trigger: default_trigger(),
            git_ref: None,
            git_ref_name: None,
            git_ref_type: None,
            git_sha: None,
            worker_count: 0,
            queue_capacity: default_queue_capacity(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            tool_name: default_tool_name(),
            tool_version: default_tool_version(),
        }
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    /// Returns an error if the document is malformed or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML config file and applies environment overrides.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: Self = toml::from_str(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Overrides credentials and tenant headers from the environment.
    ///
    /// Reads `INSIGHT_SYNC_TOKEN`, `INSIGHT_SYNC_TENANT_ID` and `INSIGHT_SYNC_MOCK_USER`.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("INSIGHT_SYNC_TOKEN") {
            self.token = Some(token);
        }
        if let Ok(tenant) = std::env::var("INSIGHT_SYNC_TENANT_ID") {
            self.tenant_id = Some(tenant);
        }
        if let Ok(user) = std::env::var("INSIGHT_SYNC_MOCK_USER") {
            self.mock_user = Some(user);
        }
    }

    /// Checks required fields.
    ///
    /// # Errors
    /// Returns `SyncError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(SyncError::Config("base_url is required".to_string()));
        }
        if self.project_name.trim().is_empty() {
            return Err(SyncError::Config("project_name is required".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(SyncError::Config("queue_capacity must be greater than 0".to_string()));
        }
        self.tool_trigger()?;
        Ok(())
    }

    /// Worker count with the default applied.
    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count == 0 { DEFAULT_WORKER_COUNT } else { self.worker_count }
    }

    /// Parses the configured trigger.
    ///
    /// # Errors
    /// Returns `SyncError::Config` for unknown trigger names.
    pub fn tool_trigger(&self) -> Result<ToolTrigger> {
        match self.trigger.to_ascii_lowercase().as_str() {
            "" | "manual" => Ok(ToolTrigger::Manual),
            "ci" => Ok(ToolTrigger::Ci),
            other => Err(SyncError::Config(format!("unknown trigger: {other}"))),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
