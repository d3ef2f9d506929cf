//! Error types for repair routines
//!
//! These never escape [`crate::SelfRepair::attempt_repair`]; the executor
//! catches them and rolls the snapshot back.

use std::path::PathBuf;

/// Errors raised inside a repair routine or while snapshotting its state
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    /// Context lacks a key the routine needs
    #[error("missing context key: {0}")]
    MissingContext(&'static str),

    /// Context key has the wrong shape
    #[error("invalid context value for '{key}': {reason}")]
    InvalidContext { key: &'static str, reason: String },

    /// Filesystem failure
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RepairError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create invalid-context error
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidContext {
            key,
            reason: reason.into(),
        }
    }
}
