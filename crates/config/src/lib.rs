//! Configuration loading, validation, and management for Forgeloop.
//!
//! Loads configuration from a TOML file with environment variable
//! overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(String),

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub guardian: GuardianConfig,

    #[serde(default)]
    pub planner: PlannerConfig,
}

impl AppConfig {
    /// Load from a TOML file, falling back to defaults when the file is
    /// missing, then apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?
        } else {
            debug!(path = %path.display(), "Config file missing, using defaults");
            Self::default()
        };

        config.apply_env_from(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup. Factored out of
    /// `load` so the override logic is testable without touching the
    /// process environment.
    fn apply_env_from<F: Fn(&str) -> Option<String>>(&mut self, get: F) {
        if let Some(path) = get("FORGELOOP_QUEUE_PATH") {
            self.queue.path = path;
        }
        if let Some(url) = get("FORGELOOP_API_URL") {
            self.planner.api_url = url;
        }
        if let Some(key) = get("FORGELOOP_API_KEY") {
            self.planner.api_key = Some(key);
        }
        if let Some(model) = get("FORGELOOP_MODEL") {
            self.planner.model = model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.task_timeout_s == 0 {
            return Err(ConfigError::Invalid(
                "worker.task_timeout_s must be greater than zero".into(),
            ));
        }
        if !(self.worker.poll_interval_s > 0.0) {
            return Err(ConfigError::Invalid(
                "worker.poll_interval_s must be greater than zero".into(),
            ));
        }
        if self.guardian.crash_threshold == 0 {
            return Err(ConfigError::Invalid(
                "guardian.crash_threshold must be greater than zero".into(),
            ));
        }
        if self.planner.model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "planner.model must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Path of the SQLite queue file.
    #[serde(default = "default_queue_path")]
    pub path: String,
}

fn default_queue_path() -> String {
    ".data/tasks.sqlite".into()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_queue_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Idle sleep between queue polls, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_s: f64,

    /// Hard per-task deadline, in seconds.
    #[serde(default = "default_task_timeout")]
    pub task_timeout_s: u64,
}

fn default_poll_interval() -> f64 {
    1.0
}
fn default_task_timeout() -> u64 {
    300
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_s)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_s)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_s: default_poll_interval(),
            task_timeout_s: default_task_timeout(),
        }
    }
}

/// What the guardian does after a clean worker exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicyConfig {
    /// Stop supervising on a clean exit.
    OnCrash,
    /// Always restart after the delay.
    Always,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardianConfig {
    /// Consecutive non-zero exits before a rollback.
    #[serde(default = "default_crash_threshold")]
    pub crash_threshold: u32,

    /// Backoff between restarts, in seconds.
    #[serde(default = "default_restart_delay")]
    pub restart_delay_s: u64,

    /// Single-line file holding the last known good revision.
    #[serde(default = "default_marker_path")]
    pub marker_path: String,

    /// Directory for per-crash report files.
    #[serde(default = "default_crash_log_dir")]
    pub crash_log_dir: String,

    #[serde(default = "default_policy")]
    pub policy: RestartPolicyConfig,
}

fn default_crash_threshold() -> u32 {
    3
}
fn default_restart_delay() -> u64 {
    5
}
fn default_marker_path() -> String {
    ".last_known_good_revision".into()
}
fn default_crash_log_dir() -> String {
    "logs".into()
}
fn default_policy() -> RestartPolicyConfig {
    RestartPolicyConfig::OnCrash
}

impl GuardianConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_s)
    }
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            crash_threshold: default_crash_threshold(),
            restart_delay_s: default_restart_delay(),
            marker_path: default_marker_path(),
            crash_log_dir: default_crash_log_dir(),
            policy: default_policy(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Base URL of an OpenAI-compatible endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API key; optional for local endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_api_url() -> String {
    "http://localhost:11434/v1".into()
}
fn default_model() -> String {
    "llama3.1".into()
}
fn default_temperature() -> f32 {
    0.2
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

impl std::fmt::Debug for PlannerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannerConfig")
            .field("api_url", &self.api_url)
            .field(
                "api_key",
                &if self.api_key.is_some() {
                    "[REDACTED]"
                } else {
                    "None"
                },
            )
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}
