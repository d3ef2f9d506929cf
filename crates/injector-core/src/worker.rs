//! Worker pool
//!
//! `max_workers` tokio tasks pulling from the shared queue:
//! - Each worker runs one task to completion before pulling the next
//! - Every attempt runs under the configured deadline; a panicking handler
//!   fails the attempt instead of the worker
//! - Failures go through diagnosis and repair before a retry is scheduled
//! - A `watch` channel signals shutdown; `shutdown` joins every worker

use crate::config::InjectorConfig;
use crate::error::HandlerError;
use crate::handlers::{HandlerContext, HandlerOutput, HandlerRegistry};
use futures::FutureExt;
use injector_queue::{MetricsRecorder, Task, TaskQueue};
use injector_repair::SelfRepair;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// State shared by every worker
#[derive(Debug)]
pub(crate) struct WorkerShared {
    pub(crate) config: Arc<InjectorConfig>,
    pub(crate) queue: Arc<TaskQueue>,
    pub(crate) repair: Arc<SelfRepair>,
    pub(crate) metrics: Arc<MetricsRecorder>,
    pub(crate) handlers: Arc<HandlerRegistry>,
    /// Workers currently running a task
    pub(crate) active: AtomicUsize,
}

/// Running workers and their stop signal
#[derive(Debug)]
pub(crate) struct WorkerPool {
    stop: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers on the current runtime
    pub(crate) fn spawn(shared: &Arc<WorkerShared>, count: usize) -> Self {
        let (stop, stop_rx) = watch::channel(false);
        let handles = (0..count)
            .map(|worker_id| {
                let shared = shared.clone();
                let stop_rx = stop_rx.clone();
                tokio::spawn(async move { shared.run(worker_id, stop_rx).await })
            })
            .collect();

        tracing::info!("Started {} worker(s)", count);
        Self { stop, handles }
    }

    /// Signal every worker and wait for in-flight tasks to finish
    pub(crate) async fn shutdown(self) {
        let _ = self.stop.send(true);
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                tracing::error!("Worker ended abnormally: {}", e);
            }
        }
        tracing::info!("Workers stopped");
    }
}

impl WorkerShared {
    async fn run(&self, worker_id: usize, mut stop: watch::Receiver<bool>) {
        tracing::debug!("Worker {} started", worker_id);
        loop {
            let task = tokio::select! {
                biased;
                _ = stop.wait_for(|stopped| *stopped) => break,
                task = self.queue.wait_next() => task,
            };
            self.process(task, &mut stop).await;
        }
        tracing::debug!("Worker {} exiting", worker_id);
    }

    /// Run one attempt and settle its outcome
    async fn process(&self, task: Task, stop: &mut watch::Receiver<bool>) {
        self.active.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();

        match self.attempt(&task).await {
            Ok(output) => {
                match self.queue.complete(task.id, output.output_path) {
                    Ok(_) => {
                        self.metrics.record_success(started.elapsed());
                        tracing::info!("Task {} succeeded", task.id);
                    }
                    Err(e) => tracing::error!("Cannot complete task {}: {}", task.id, e),
                }
            }
            Err(error) => self.handle_failure(&task, error, stop).await,
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    async fn attempt(&self, task: &Task) -> Result<HandlerOutput, HandlerError> {
        let Some(handler) = self.handlers.get(task.task_type()) else {
            return Err(HandlerError::new(format!(
                "no handler registered for {}",
                task.task_type()
            )));
        };
        let ctx = HandlerContext {
            output_directory: self.config.output_directory.clone(),
        };

        let run = AssertUnwindSafe(handler.handle(task, &ctx)).catch_unwind();
        match tokio::time::timeout(self.config.task_timeout(), run).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => {
                tracing::error!("Handler for task {} panicked", task.id);
                Err(HandlerError::panicked(&*panic))
            }
            Err(_) => Err(HandlerError::timeout()),
        }
    }

    async fn handle_failure(
        &self,
        task: &Task,
        error: HandlerError,
        stop: &mut watch::Receiver<bool>,
    ) {
        tracing::warn!(
            "Task {} failed (attempt {}): {}",
            task.id,
            task.retry_count + 1,
            error
        );

        if self.config.self_repair_enabled && task.can_retry() {
            if let Some(backoff) = self.try_repair(task, &error).await {
                self.schedule_retry(task, &error.message, backoff, stop).await;
                return;
            }
        }

        match self.queue.fail(task.id, error.message) {
            Ok(_) => self.metrics.record_failure(),
            Err(e) => tracing::error!("Cannot fail task {}: {}", task.id, e),
        }
    }

    /// Diagnose and repair off the async runtime; the backoff to wait on
    /// success
    async fn try_repair(&self, task: &Task, error: &HandlerError) -> Option<Duration> {
        let mut context = error.context.clone();
        context.insert("task_id".into(), Value::from(task.id.to_string()));
        context.insert("task_type".into(), Value::from(task.task_type().as_str()));
        context.insert("retry_count".into(), Value::from(task.retry_count));
        context.insert("max_retries".into(), Value::from(task.max_retries));

        let repair = self.repair.clone();
        let message = error.message.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut diagnosis = repair.diagnose(&message, context)?;
            if !repair.attempt_repair(&mut diagnosis) {
                return None;
            }
            let backoff_ms = diagnosis
                .context
                .get("backoff_ms")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            Some(Duration::from_millis(backoff_ms))
        })
        .await;

        match outcome {
            Ok(backoff) => backoff,
            Err(e) => {
                tracing::error!("Repair for task {} panicked: {}", task.id, e);
                None
            }
        }
    }

    async fn schedule_retry(
        &self,
        task: &Task,
        message: &str,
        backoff: Duration,
        stop: &mut watch::Receiver<bool>,
    ) {
        if let Err(e) = self.queue.mark_retrying(task.id, message) {
            tracing::error!("Cannot mark task {} retrying: {}", task.id, e);
            return;
        }

        if !backoff.is_zero() {
            tracing::info!("Retrying task {} in {:?}", task.id, backoff);
            tokio::select! {
                () = tokio::time::sleep(backoff) => {}
                _ = stop.wait_for(|stopped| *stopped) => {}
            }
        }

        if let Err(e) = self.queue.requeue(task.id) {
            tracing::error!("Cannot requeue task {}: {}", task.id, e);
        }
    }
}
