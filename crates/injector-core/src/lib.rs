//! Injector Core - task orchestration with self-repair
//!
//! Runs queued prefab-generation work:
//! - Worker pool with per-task deadlines
//! - Built-in handlers for prefabs, scripts, assets and project checks
//! - Diagnose-and-repair before retrying failed tasks
//! - YAML/TOML/JSON configuration and JSON state snapshots
//!
//! # Example
//!
//! ```rust,ignore
//! use injector_core::{InjectorConfig, PrefabInjector};
//! use injector_queue::Priority;
//! use serde_json::json;
//!
//! let injector = PrefabInjector::new(InjectorConfig::default())?;
//! injector.start().await;
//!
//! let id = injector.submit("generate_prefab", json!({"name": "Player"}), Priority::High)?;
//! let task = injector.wait_for_task(id).await?;
//! println!("{:?}", task.output_path);
//!
//! injector.stop().await;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod batch_file;
pub mod config;
pub mod error;
pub mod handlers;
pub mod injector;
pub mod state;
mod worker;

pub use batch_file::{BatchFile, BatchFileTask};
pub use config::InjectorConfig;
pub use error::{ConfigError, HandlerError, InjectorError, StateError};
pub use handlers::{HandlerContext, HandlerOutput, HandlerRegistry, TaskHandler};
pub use injector::{InjectorMetrics, PrefabInjector};
pub use state::{StateSnapshot, StateStore};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the injector
    pub use crate::{InjectorConfig, InjectorError, PrefabInjector};
    pub use injector_queue::{BatchStatus, Priority, TaskId, TaskStatus};
}
