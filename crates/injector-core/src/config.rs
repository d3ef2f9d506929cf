//! Injector configuration
//!
//! Loaded from YAML, TOML or JSON by file extension. Every field has a
//! default and unknown keys are rejected.

use crate::error::ConfigError;
use injector_queue::{MetricsConfig, QueueConfig};
use injector_repair::RetryWithBackoff;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Injector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InjectorConfig {
    /// Concurrent workers
    pub max_workers: usize,
    /// Default directory for generated files
    pub output_directory: PathBuf,
    /// Diagnose and repair failed tasks before giving up
    pub self_repair_enabled: bool,
    /// Repairs allowed per task
    pub max_retries: u32,
    /// Deadline for one task attempt
    pub task_timeout_secs: u64,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Finished standalone tasks kept for status queries
    pub max_retained_tasks: usize,
    /// Snapshot file for daemon restarts and CLI queries
    pub state_file: Option<PathBuf>,
    pub persist_interval_secs: u64,
    pub metrics: MetricsConfig,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            output_directory: std::env::temp_dir().join("generated_assets"),
            self_repair_enabled: true,
            max_retries: 3,
            task_timeout_secs: 300,
            backoff_base_ms: 1000,
            backoff_cap_ms: 30_000,
            max_retained_tasks: 10_000,
            state_file: None,
            persist_interval_secs: 5,
            metrics: MetricsConfig::default(),
        }
    }
}

impl InjectorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`, or defaults when `None`
    ///
    /// # Errors
    /// - `ConfigError::Io` / `ConfigError::Parse` for unreadable files
    /// - `ConfigError::UnsupportedFormat` for unknown extensions
    /// - `ConfigError::Invalid` when validation fails
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => read_document::<Self>(path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency
    ///
    /// # Errors
    /// - `ConfigError::Invalid` naming the first problem
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be at least 1".into()));
        }
        if self.task_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "task_timeout_secs must be at least 1".into(),
            ));
        }
        if self.backoff_base_ms > self.backoff_cap_ms {
            return Err(ConfigError::Invalid(
                "backoff_base_ms exceeds backoff_cap_ms".into(),
            ));
        }
        if self.max_retained_tasks == 0 {
            return Err(ConfigError::Invalid(
                "max_retained_tasks must be at least 1".into(),
            ));
        }
        if self.persist_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "persist_interval_secs must be at least 1".into(),
            ));
        }
        self.metrics.validate().map_err(ConfigError::Invalid)
    }

    /// With worker count
    #[inline]
    #[must_use]
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    /// With output directory
    #[inline]
    #[must_use]
    pub fn with_output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_directory = dir.into();
        self
    }

    /// With self-repair toggled
    #[inline]
    #[must_use]
    pub fn with_self_repair(mut self, enabled: bool) -> Self {
        self.self_repair_enabled = enabled;
        self
    }

    /// With repair budget
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// With per-attempt deadline
    #[inline]
    #[must_use]
    pub fn with_task_timeout_secs(mut self, secs: u64) -> Self {
        self.task_timeout_secs = secs;
        self
    }

    /// With retry backoff bounds
    #[inline]
    #[must_use]
    pub fn with_backoff_ms(mut self, base: u64, cap: u64) -> Self {
        self.backoff_base_ms = base;
        self.backoff_cap_ms = cap;
        self
    }

    /// With retention limit for finished tasks
    #[inline]
    #[must_use]
    pub fn with_max_retained_tasks(mut self, limit: usize) -> Self {
        self.max_retained_tasks = limit;
        self
    }

    /// With state snapshot file
    #[inline]
    #[must_use]
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    /// Queue settings derived from this config
    #[must_use]
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig::default()
            .with_max_retries(self.max_retries)
            .with_max_retained_tasks(self.max_retained_tasks)
    }

    /// Backoff routine derived from this config
    #[must_use]
    pub fn backoff(&self) -> RetryWithBackoff {
        RetryWithBackoff::new(self.backoff_base_ms, self.backoff_cap_ms)
    }

    #[inline]
    #[must_use]
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    #[inline]
    #[must_use]
    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs)
    }
}

/// Read a YAML, TOML or JSON document chosen by extension
pub(crate) fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(path, &text)
}

pub(crate) fn parse_document<T: DeserializeOwned>(path: &Path, text: &str) -> Result<T, ConfigError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("yaml" | "yml") => serde_yaml::from_str(text).map_err(|e| ConfigError::parse(path, e)),
        Some("toml") => toml::from_str(text).map_err(|e| ConfigError::parse(path, e)),
        Some("json") => serde_json::from_str(text).map_err(|e| ConfigError::parse(path, e)),
        _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
}
