//! Error types for the queue and batch coordinator
//!
//! An empty queue is not an error: [`crate::TaskQueue::next`] returns `None`.

use crate::types::{BatchId, TaskId, TaskStatus};

/// Task queue errors
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Malformed submission; nothing was enqueued
    #[error("invalid task specification: {0}")]
    InvalidSpec(String),

    /// Unknown or evicted task
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Status change not allowed from the current status
    #[error("illegal transition for task {id}: {from} -> {to}")]
    IllegalTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}

impl QueueError {
    /// Create invalid-spec error
    #[inline]
    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        Self::InvalidSpec(reason.into())
    }
}

/// Batch coordinator errors
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Batch created with no tasks
    #[error("batch has no tasks")]
    BatchEmpty,

    /// One member failed validation; nothing was enqueued
    #[error("invalid task at index {index}: {source}")]
    InvalidTask {
        index: usize,
        #[source]
        source: QueueError,
    },

    /// Unknown batch
    #[error("batch not found: {0}")]
    BatchNotFound(BatchId),
}
