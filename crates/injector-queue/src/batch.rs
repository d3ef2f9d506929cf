//! Batch job coordinator
//!
//! Groups tasks submitted together. A batch owns its member IDs only; the
//! aggregate status is recomputed from member statuses on every query.

use crate::error::BatchError;
use crate::queue::TaskQueue;
use crate::spec::TaskSpec;
use crate::types::{BatchId, Priority, Task, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A named group of tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: BatchId,
    pub name: String,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    /// Members in input order
    pub task_ids: Vec<TaskId>,
}

/// Aggregate batch status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl BatchStatus {
    /// Whether no member will run again
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Succeeded | BatchStatus::Failed)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Running => "running",
            BatchStatus::Succeeded => "succeeded",
            BatchStatus::Failed => "failed",
        })
    }
}

/// Batch status with progress and member snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub id: BatchId,
    pub name: String,
    pub priority: Priority,
    pub status: BatchStatus,
    /// Succeeded / total
    pub progress: f64,
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub created_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
}

impl BatchReport {
    /// Aggregate member snapshots; members missing from `tasks` count as
    /// not started
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(job: &BatchJob, tasks: Vec<Task>) -> Self {
        let count = |pred: fn(TaskStatus) -> bool| tasks.iter().filter(|t| pred(t.status)).count();
        let pending = count(|s| s == TaskStatus::Pending);
        let running = count(|s| matches!(s, TaskStatus::Running | TaskStatus::Retrying));
        let succeeded = count(|s| s == TaskStatus::Succeeded);
        let failed = count(|s| s == TaskStatus::Failed);
        let total = job.task_ids.len();

        let status = if failed > 0 {
            BatchStatus::Failed
        } else if succeeded == total {
            BatchStatus::Succeeded
        } else if running > 0 || succeeded > 0 {
            BatchStatus::Running
        } else {
            BatchStatus::Pending
        };

        let progress = if total == 0 {
            0.0
        } else {
            succeeded as f64 / total as f64
        };

        Self {
            id: job.id,
            name: job.name.clone(),
            priority: job.priority,
            status,
            progress,
            total,
            pending,
            running,
            succeeded,
            failed,
            created_at: job.created_at,
            tasks,
        }
    }
}

/// Creates batches and reports their aggregate status
#[derive(Debug)]
pub struct BatchCoordinator {
    queue: Arc<TaskQueue>,
    batches: DashMap<BatchId, BatchJob>,
}

impl BatchCoordinator {
    /// Create coordinator over a shared queue
    #[must_use]
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self {
            queue,
            batches: DashMap::new(),
        }
    }

    /// Underlying queue
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// Validate every member, then enqueue them all in input order
    ///
    /// # Errors
    /// - `BatchError::BatchEmpty` for zero tasks
    /// - `BatchError::InvalidTask` for the first malformed member; nothing
    ///   is enqueued
    pub fn create_batch(
        &self,
        name: impl Into<String>,
        tasks: Vec<(String, Value)>,
        priority: Priority,
    ) -> Result<BatchId, BatchError> {
        if tasks.is_empty() {
            return Err(BatchError::BatchEmpty);
        }

        let specs = tasks
            .into_iter()
            .enumerate()
            .map(|(index, (task_type, spec))| {
                TaskSpec::parse(&task_type, spec)
                    .map_err(|source| BatchError::InvalidTask { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let id = BatchId::new();
        let task_ids = self.queue.enqueue_all(id, specs, priority);
        let job = BatchJob {
            id,
            name: name.into(),
            priority,
            created_at: Utc::now(),
            task_ids,
        };

        tracing::info!(
            "Created batch '{}' ({}) with {} task(s)",
            job.name,
            id,
            job.task_ids.len()
        );
        self.batches.insert(id, job);
        Ok(id)
    }

    /// Aggregate status of a batch
    ///
    /// # Errors
    /// - `BatchError::BatchNotFound` for unknown IDs
    pub fn batch_status(&self, id: BatchId) -> Result<BatchReport, BatchError> {
        let job = self
            .batches
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(BatchError::BatchNotFound(id))?;

        let tasks = job
            .task_ids
            .iter()
            .filter_map(|task_id| self.queue.get(*task_id))
            .collect();
        Ok(BatchReport::new(&job, tasks))
    }

    /// Batch definition, if known
    #[must_use]
    pub fn get(&self, id: BatchId) -> Option<BatchJob> {
        self.batches.get(&id).map(|entry| entry.value().clone())
    }

    /// Every batch, oldest first
    #[must_use]
    pub fn batches(&self) -> Vec<BatchJob> {
        let mut jobs: Vec<BatchJob> = self.batches.iter().map(|e| e.value().clone()).collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// Number of batches
    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Whether no batch exists
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Replace all batch definitions with restored ones
    pub fn restore(&self, jobs: Vec<BatchJob>) {
        self.batches.clear();
        for job in jobs {
            self.batches.insert(job.id, job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueConfig;
    use serde_json::json;

    fn coordinator() -> BatchCoordinator {
        BatchCoordinator::new(Arc::new(TaskQueue::new(QueueConfig::default())))
    }

    fn prefab(name: &str) -> (String, Value) {
        ("generate_prefab".into(), json!({ "name": name }))
    }

    #[test]
    fn empty_batch_is_rejected() {
        let batches = coordinator();
        assert!(matches!(
            batches.create_batch("empty", vec![], Priority::Normal),
            Err(BatchError::BatchEmpty)
        ));
        assert!(batches.is_empty());
    }

    #[test]
    fn invalid_member_enqueues_nothing() {
        let batches = coordinator();
        let err = batches
            .create_batch(
                "mixed",
                vec![prefab("A"), ("unknown".into(), json!({}))],
                Priority::Normal,
            )
            .unwrap_err();

        assert!(matches!(err, BatchError::InvalidTask { index: 1, .. }));
        assert_eq!(batches.queue().depth(), 0);
    }

    #[test]
    fn members_keep_input_order() {
        let batches = coordinator();
        let id = batches
            .create_batch("ordered", vec![prefab("A"), prefab("B"), prefab("C")], Priority::Low)
            .unwrap();
        let job = batches.get(id).unwrap();

        for expected in &job.task_ids {
            assert_eq!(batches.queue().next().unwrap().id, *expected);
        }
    }

    #[test]
    fn new_batch_is_pending() {
        let batches = coordinator();
        let id = batches
            .create_batch("fresh", vec![prefab("A")], Priority::High)
            .unwrap();

        let report = batches.batch_status(id).unwrap();
        assert_eq!(report.status, BatchStatus::Pending);
        assert_eq!(report.total, 1);
        assert_eq!(report.progress, 0.0);
        assert_eq!(report.tasks[0].batch_id, Some(id));
    }

    #[test]
    fn unknown_batch_is_not_found() {
        assert!(matches!(
            coordinator().batch_status(BatchId::new()),
            Err(BatchError::BatchNotFound(_))
        ));
    }
}
