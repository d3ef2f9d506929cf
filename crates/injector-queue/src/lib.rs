//! Injector Queue - priority task queue and batch coordination
//!
//! Holds pending work ordered by priority and submission sequence:
//! - Validates submissions into typed [`TaskSpec`]s
//! - Dequeues strictly by priority, FIFO within a priority
//! - Groups tasks into batches with a lazily derived aggregate status
//! - Tracks a trailing error rate and a derived health summary
//!
//! # Example
//!
//! ```rust,ignore
//! use injector_queue::{Priority, QueueConfig, TaskQueue};
//! use serde_json::json;
//!
//! let queue = TaskQueue::new(QueueConfig::default());
//! let id = queue.submit("validate_project", json!({"project_path": "/srv/game"}), Priority::High)?;
//!
//! let task = queue.next().expect("one task pending");
//! assert_eq!(task.id, id);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod batch;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod spec;
pub mod types;

pub use batch::{BatchCoordinator, BatchJob, BatchReport, BatchStatus};
pub use error::{BatchError, QueueError};
pub use metrics::{HealthThresholds, MetricsConfig, MetricsRecorder, QueueMetrics, SystemHealth};
pub use queue::{QueueConfig, TaskQueue, TaskWatch};
pub use spec::{
    OptimizeAssetsSpec, PrefabSpec, ScriptSpec, TaskSpec, TaskType, ValidateProjectSpec,
};
pub use types::{BatchId, Priority, Task, TaskId, TaskStatus};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the queue
    pub use crate::{
        BatchCoordinator, BatchStatus, Priority, QueueConfig, TaskId, TaskQueue, TaskSpec,
        TaskStatus,
    };
}
