//! Core queue types
//!
//! Identifiers, priorities, statuses and the [`Task`] record itself.

use crate::error::QueueError;
use crate::spec::{TaskSpec, TaskType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use ulid::Ulid;

/// Unique task identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Ulid);

impl TaskId {
    /// Generate new task ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Unique batch identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Ulid);

impl BatchId {
    /// Generate new batch ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BatchId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Task priority; variants are declared lowest first so `Ord` matches urgency
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    #[serde(alias = "medium")]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// All priorities, most urgent first
    pub const DESCENDING: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Lowercase name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" | "medium" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(QueueError::invalid_spec(format!("unknown priority '{other}'"))),
        }
    }
}

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting in the queue
    Pending,
    /// Claimed by a worker
    Running,
    /// Repaired after a failure, waiting to be re-run
    Retrying,
    /// Finished successfully
    Succeeded,
    /// Finished with an unrecoverable failure
    Failed,
}

impl TaskStatus {
    /// Whether the task will never run again
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// Lowercase name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Retrying => "retrying",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of requested work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique ID
    pub id: TaskId,
    /// Validated specification (carries the task type)
    pub spec: TaskSpec,
    /// Fixed at enqueue time
    pub priority: Priority,
    /// Lifecycle status
    pub status: TaskStatus,
    /// Tie-break key; bumped on every (re)enqueue
    pub sequence: u64,
    /// Owning batch, if any
    pub batch_id: Option<BatchId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Last failure message
    pub error_message: Option<String>,
    /// Repairs performed so far
    pub retry_count: u32,
    /// Repair budget
    pub max_retries: u32,
    /// File produced by the task, if any
    pub output_path: Option<PathBuf>,
}

impl Task {
    /// Create a pending task
    #[must_use]
    pub fn new(spec: TaskSpec, priority: Priority, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            spec,
            priority,
            status: TaskStatus::Pending,
            sequence: 0,
            batch_id: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            error_message: None,
            retry_count: 0,
            max_retries,
            output_path: None,
        }
    }

    /// Task type tag
    #[inline]
    #[must_use]
    pub fn task_type(&self) -> TaskType {
        self.spec.task_type()
    }

    /// Whether another repair-and-retry is allowed
    #[inline]
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub(crate) fn transition(&mut self, to: TaskStatus) -> Result<(), QueueError> {
        let allowed = matches!(
            (self.status, to),
            (TaskStatus::Pending | TaskStatus::Retrying, TaskStatus::Running)
                | (
                    TaskStatus::Running,
                    TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Retrying
                )
                | (TaskStatus::Retrying, TaskStatus::Failed)
        );
        if !allowed {
            return Err(QueueError::IllegalTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }

        let now = Utc::now();
        match to {
            TaskStatus::Running => self.started_at = Some(now),
            TaskStatus::Succeeded | TaskStatus::Failed => self.completed_at = Some(now),
            TaskStatus::Pending | TaskStatus::Retrying => {}
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}
