//! Testing utilities for the prefab injector workspace
//!
//! Shared fixtures, scripted handlers and injector setup.

#![allow(missing_docs)]

use async_trait::async_trait;
use injector_core::{
    HandlerContext, HandlerError, HandlerOutput, HandlerRegistry, InjectorConfig, PrefabInjector,
    TaskHandler,
};
use injector_queue::{Task, TaskType};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Fast-retrying config writing into `dir`
pub fn test_config(dir: &Path) -> InjectorConfig {
    InjectorConfig::new()
        .with_max_workers(2)
        .with_output_directory(dir.join("out"))
        .with_task_timeout_secs(5)
        .with_backoff_ms(1, 10)
}

/// Injector over a fresh temp dir (kept alive by the returned guard)
pub fn setup_test_injector() -> (PrefabInjector, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let injector = PrefabInjector::new(test_config(dir.path())).unwrap();
    (injector, dir)
}

pub fn prefab_spec(name: &str) -> Value {
    json!({ "name": name, "components": ["Transform"] })
}

pub fn script_spec(name: &str) -> Value {
    json!({ "name": name, "update_logic": "transform.Rotate(0, 1, 0);" })
}

/// Fails a fixed number of attempts with a scripted error, then succeeds
#[derive(Debug)]
pub struct FlakyHandler {
    task_type: TaskType,
    failures: usize,
    message: String,
    context: Value,
    attempts: AtomicUsize,
}

impl FlakyHandler {
    pub fn new(task_type: TaskType, failures: usize, message: &str) -> Self {
        Self {
            task_type,
            failures,
            message: message.to_string(),
            context: json!({}),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Context attached to each scripted failure
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for FlakyHandler {
    fn task_type(&self) -> TaskType {
        self.task_type
    }

    async fn handle(
        &self,
        _task: &Task,
        _ctx: &HandlerContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            let mut error = HandlerError::new(self.message.clone());
            if let Some(context) = self.context.as_object() {
                error.context = context.clone();
            }
            return Err(error);
        }
        Ok(HandlerOutput::default())
    }
}

/// Sleeps before succeeding
#[derive(Debug)]
pub struct SlowHandler {
    pub task_type: TaskType,
    pub delay: Duration,
}

#[async_trait]
impl TaskHandler for SlowHandler {
    fn task_type(&self) -> TaskType {
        self.task_type
    }

    async fn handle(
        &self,
        _task: &Task,
        _ctx: &HandlerContext,
    ) -> Result<HandlerOutput, HandlerError> {
        tokio::time::sleep(self.delay).await;
        Ok(HandlerOutput::default())
    }
}

/// Panics on every attempt
#[derive(Debug)]
pub struct PanickingHandler {
    pub task_type: TaskType,
}

#[async_trait]
impl TaskHandler for PanickingHandler {
    fn task_type(&self) -> TaskType {
        self.task_type
    }

    async fn handle(
        &self,
        _task: &Task,
        _ctx: &HandlerContext,
    ) -> Result<HandlerOutput, HandlerError> {
        panic!("asset importer crashed");
    }
}

/// Built-in handlers with `handler` replacing its task type
pub fn registry_with(handler: std::sync::Arc<dyn TaskHandler>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::with_defaults();
    registry.register(handler);
    registry
}
