//! Batch definition files
//!
//! ```yaml
//! name: level-1
//! priority: high
//! tasks:
//!   - type: generate_prefab
//!     spec: { name: Door, components: [Collider] }
//!   - type: generate_script
//!     spec: { name: DoorController }
//! ```

use crate::config::read_document;
use crate::error::ConfigError;
use injector_queue::Priority;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// A batch read from disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchFile {
    pub name: String,
    /// Falls back to the caller's priority when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    pub tasks: Vec<BatchFileTask>,
}

/// One raw submission inside a batch file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchFileTask {
    #[serde(rename = "type", alias = "task_type")]
    pub task_type: String,
    #[serde(default = "empty_spec")]
    pub spec: Value,
}

fn empty_spec() -> Value {
    Value::Object(serde_json::Map::new())
}

impl BatchFile {
    /// Load a YAML or JSON batch file
    ///
    /// # Errors
    /// - `ConfigError` if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        read_document(path)
    }

    /// Raw `(task_type, spec)` pairs in file order
    #[must_use]
    pub fn into_tasks(self) -> Vec<(String, Value)> {
        self.tasks
            .into_iter()
            .map(|task| (task.task_type, task.spec))
            .collect()
    }
}
