//! Error types for the injector
//!
//! Provides error handling for:
//! - Configuration and input document loading
//! - State snapshot persistence
//! - Task handler failures (fed to self-repair)
//! - Queue and batch operations, composed into [`InjectorError`]

use injector_queue::{BatchError, QueueError};
use injector_repair::RepairContext;
use serde_json::Value;
use std::any::Any;
use std::io;
use std::path::{Path, PathBuf};

/// Main injector error type
#[derive(Debug, thiserror::Error)]
pub enum InjectorError {
    /// Queue operation failed
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Batch operation failed
    #[error("batch error: {0}")]
    Batch(#[from] BatchError),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State snapshot could not be read or written
    #[error("state error: {0}")]
    State(#[from] StateError),
}

impl InjectorError {
    /// Caller supplied something malformed
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::Queue(QueueError::InvalidSpec(_))
                | Self::Batch(BatchError::BatchEmpty | BatchError::InvalidTask { .. })
                | Self::Config(_)
        )
    }

    /// Referenced task or batch does not exist
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Queue(QueueError::TaskNotFound(_)) | Self::Batch(BatchError::BatchNotFound(_))
        )
    }
}

/// Configuration and input document errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File contents did not deserialize
    #[error("cannot parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Values are inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Extension is not yaml, yml, toml or json
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(PathBuf),
}

impl ConfigError {
    pub(crate) fn parse(path: &Path, message: impl ToString) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

/// State snapshot errors
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state file io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("state file is corrupt: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StateError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A task attempt failed
///
/// The message and context are what self-repair diagnoses.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    pub context: RepairContext,
}

impl HandlerError {
    /// Failure with no context
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: RepairContext::new(),
        }
    }

    /// Add a context fact
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    /// Attempt exceeded its deadline
    pub fn timeout() -> Self {
        Self::new("TimeoutError: task exceeded deadline")
    }

    /// Handler panicked; the payload text is kept when it is a string
    pub fn panicked(payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string payload".into());
        Self::new(format!("handler panicked: {detail}"))
    }

    /// Filesystem failure, with the context the matching repair needs
    pub fn io(path: &Path, source: &io::Error) -> Self {
        let error = Self::new(format!("{source}: {}", path.display()));
        let path_value = path.to_string_lossy().into_owned();
        match source.kind() {
            io::ErrorKind::NotFound => error
                .with("missing_path", path_value)
                .with("is_directory", false),
            io::ErrorKind::PermissionDenied => error.with("file_path", path_value),
            _ => error.with("path", path_value),
        }
    }
}
