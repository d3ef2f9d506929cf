//! Task handlers
//!
//! One handler per task type, looked up through a [`HandlerRegistry`]:
//! - `generate_prefab` writes a Unity prefab document
//! - `generate_script` writes a C# behaviour script
//! - `optimize_assets` produces an optimized copy of an asset
//! - `validate_project` checks a project directory layout

mod assets;
mod prefab;
mod script;

pub use assets::{OptimizeAssetsHandler, ValidateProjectHandler};
pub use prefab::PrefabHandler;
pub use script::ScriptHandler;

use crate::error::HandlerError;
use async_trait::async_trait;
use injector_queue::{Task, TaskType};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment a handler runs in
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// Used when the spec names no output directory
    pub output_directory: PathBuf,
}

/// What a successful attempt produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerOutput {
    pub output_path: Option<PathBuf>,
}

/// Executes one task type
#[async_trait]
pub trait TaskHandler: Send + Sync + fmt::Debug {
    /// Task type handled
    fn task_type(&self) -> TaskType;

    /// Run one attempt of `task`
    ///
    /// # Errors
    /// Returns `HandlerError` with a message and the context self-repair
    /// needs to act on it
    async fn handle(&self, task: &Task, ctx: &HandlerContext)
        -> Result<HandlerOutput, HandlerError>;
}

/// Handlers keyed by task type
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in handler
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PrefabHandler));
        registry.register(Arc::new(ScriptHandler));
        registry.register(Arc::new(OptimizeAssetsHandler));
        registry.register(Arc::new(ValidateProjectHandler));
        registry
    }

    /// Register a handler, replacing any previous one for its type
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(handler.task_type(), handler);
    }

    #[must_use]
    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&task_type).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

fn unexpected_spec(handler: TaskType, task: &Task) -> HandlerError {
    HandlerError::new(format!(
        "{handler} handler cannot run a {} task",
        task.task_type()
    ))
}

/// Create `dir` and write `contents` to `dir/file_name`
async fn write_output(dir: &Path, file_name: &str, contents: &str) -> Result<PathBuf, HandlerError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| HandlerError::io(dir, &e))?;

    let path = dir.join(file_name);
    tokio::fs::write(&path, contents)
        .await
        .map_err(|e| HandlerError::io(&path, &e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_task_type() {
        let registry = HandlerRegistry::with_defaults();
        assert_eq!(registry.len(), TaskType::ALL.len());
        for task_type in TaskType::ALL {
            let handler = registry.get(task_type).unwrap();
            assert_eq!(handler.task_type(), task_type);
        }
    }
}
