//! Prefab injector
//!
//! Owns the queue, batch coordinator, self-repair executor, metrics and the
//! worker pool. Constructed explicitly and shared by `Arc`; workers run only
//! between [`PrefabInjector::start`] and [`PrefabInjector::stop`].

use crate::config::InjectorConfig;
use crate::error::InjectorError;
use crate::handlers::HandlerRegistry;
use crate::state::{StateSnapshot, StateStore};
use crate::worker::{WorkerPool, WorkerShared};
use injector_queue::{
    BatchCoordinator, BatchId, BatchReport, MetricsRecorder, Priority, QueueMetrics, Task,
    TaskId, TaskQueue,
};
use injector_repair::{RepairRecord, SelfRepair};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Repair attempts reported with metrics
const RECENT_REPAIRS: usize = 10;

/// Interval between terminal-state checks in the wait helpers
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Metrics report for the whole injector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectorMetrics {
    #[serde(flatten)]
    pub queue: QueueMetrics,
    pub active_workers: usize,
    pub worker_count: usize,
    pub batch_jobs: usize,
    pub self_repair_enabled: bool,
    pub recent_repairs: Vec<RepairRecord>,
}

/// Priority task injector with batch jobs and self-repair
#[derive(Debug)]
pub struct PrefabInjector {
    shared: Arc<WorkerShared>,
    batches: BatchCoordinator,
    pool: Mutex<Option<WorkerPool>>,
}

impl PrefabInjector {
    /// Create injector with built-in handlers and repair routines
    ///
    /// # Errors
    /// - `InjectorError::Config` if the configuration is invalid
    pub fn new(config: InjectorConfig) -> Result<Self, InjectorError> {
        let repair = SelfRepair::with_backoff(config.backoff());
        Self::with_parts(config, HandlerRegistry::with_defaults(), repair)
    }

    /// Create injector with custom handlers and repair executor
    ///
    /// # Errors
    /// - `InjectorError::Config` if the configuration is invalid
    pub fn with_parts(
        config: InjectorConfig,
        handlers: HandlerRegistry,
        repair: SelfRepair,
    ) -> Result<Self, InjectorError> {
        config.validate()?;

        let queue = Arc::new(TaskQueue::new(config.queue_config()));
        let shared = Arc::new(WorkerShared {
            metrics: Arc::new(MetricsRecorder::new(config.metrics)),
            config: Arc::new(config),
            queue: queue.clone(),
            repair: Arc::new(repair),
            handlers: Arc::new(handlers),
            active: AtomicUsize::new(0),
        });

        Ok(Self {
            shared,
            batches: BatchCoordinator::new(queue),
            pool: Mutex::new(None),
        })
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &InjectorConfig {
        &self.shared.config
    }

    #[inline]
    #[must_use]
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.shared.queue
    }

    #[inline]
    #[must_use]
    pub fn repair(&self) -> &SelfRepair {
        &self.shared.repair
    }

    /// Spawn the worker pool; no-op if already running
    pub async fn start(&self) {
        let mut pool = self.pool.lock().await;
        if pool.is_none() {
            *pool = Some(WorkerPool::spawn(&self.shared, self.shared.config.max_workers));
        }
    }

    /// Stop workers after their current task; no-op if not running
    pub async fn stop(&self) {
        let pool = self.pool.lock().await.take();
        if let Some(pool) = pool {
            pool.shutdown().await;
        }
    }

    /// Whether the worker pool is running
    pub async fn is_running(&self) -> bool {
        self.pool.lock().await.is_some()
    }

    /// Submit one task
    ///
    /// # Errors
    /// - `InjectorError::Queue` with `InvalidSpec` for malformed submissions
    pub fn submit(
        &self,
        task_type: &str,
        spec: Value,
        priority: Priority,
    ) -> Result<TaskId, InjectorError> {
        Ok(self.shared.queue.submit(task_type, spec, priority)?)
    }

    /// Submit a batch of tasks sharing one priority
    ///
    /// # Errors
    /// - `InjectorError::Batch` for empty batches or malformed members
    pub fn create_batch(
        &self,
        name: &str,
        tasks: Vec<(String, Value)>,
        priority: Priority,
    ) -> Result<BatchId, InjectorError> {
        Ok(self.batches.create_batch(name, tasks, priority)?)
    }

    /// # Errors
    /// - `InjectorError::Queue` with `TaskNotFound`
    pub fn task_status(&self, id: TaskId) -> Result<Task, InjectorError> {
        Ok(self.shared.queue.status(id)?)
    }

    /// # Errors
    /// - `InjectorError::Batch` with `BatchNotFound`
    pub fn batch_status(&self, id: BatchId) -> Result<BatchReport, InjectorError> {
        Ok(self.batches.batch_status(id)?)
    }

    /// Current metrics and health
    #[must_use]
    pub fn metrics(&self) -> InjectorMetrics {
        let queue = &self.shared.queue;
        InjectorMetrics {
            queue: self.shared.metrics.snapshot(queue.depth(), queue.running()),
            active_workers: self.shared.active.load(Ordering::SeqCst),
            worker_count: self.shared.config.max_workers,
            batch_jobs: self.batches.len(),
            self_repair_enabled: self.shared.config.self_repair_enabled,
            recent_repairs: self.shared.repair.history(RECENT_REPAIRS),
        }
    }

    /// Wait until a task is succeeded or failed
    ///
    /// Workers must be running for this to make progress. The task is
    /// exempt from retention until the wait returns.
    ///
    /// # Errors
    /// - `InjectorError::Queue` with `TaskNotFound`
    pub async fn wait_for_task(&self, id: TaskId) -> Result<Task, InjectorError> {
        let watch = self.shared.queue.watch(id)?;
        loop {
            let task = watch.current()?;
            if task.status.is_terminal() {
                return Ok(task);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Wait until a batch aggregate is succeeded or failed
    ///
    /// A failed member ends the wait even while siblings are still running.
    ///
    /// # Errors
    /// - `InjectorError::Batch` with `BatchNotFound`
    pub async fn wait_for_batch(&self, id: BatchId) -> Result<BatchReport, InjectorError> {
        loop {
            let report = self.batch_status(id)?;
            if report.status.is_terminal() {
                return Ok(report);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Every task, batch and the sequence counter
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        let (tasks, next_sequence) = self.shared.queue.export();
        StateSnapshot {
            tasks,
            batches: self.batches.batches(),
            next_sequence,
        }
    }

    /// Replace all state with a snapshot; returns tasks re-enqueued
    pub fn restore(&self, snapshot: StateSnapshot) -> usize {
        self.shared.metrics.replay(&snapshot.tasks);
        self.batches.restore(snapshot.batches);
        self.shared
            .queue
            .restore(snapshot.tasks, snapshot.next_sequence)
    }

    fn store(&self) -> Option<StateStore> {
        self.shared.config.state_file.as_ref().map(StateStore::new)
    }

    /// Restore from the configured state file, if any
    ///
    /// Returns tasks re-enqueued; `0` when no state file is configured or
    /// it does not exist yet.
    ///
    /// # Errors
    /// - `InjectorError::State` for unreadable or corrupt files
    pub async fn load_state(&self) -> Result<usize, InjectorError> {
        let Some(store) = self.store() else {
            return Ok(0);
        };
        match store.load().await? {
            Some(snapshot) => Ok(self.restore(snapshot)),
            None => Ok(0),
        }
    }

    /// Write the configured state file, if any
    ///
    /// # Errors
    /// - `InjectorError::State` if the file cannot be written
    pub async fn save_state(&self) -> Result<(), InjectorError> {
        if let Some(store) = self.store() {
            store.save(&self.snapshot()).await?;
        }
        Ok(())
    }
}
