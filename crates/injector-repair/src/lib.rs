//! Injector Repair - error diagnosis and self-repair
//!
//! Turns opaque error signals into actionable repairs:
//! - Classifies `(error_message, context)` pairs against a rule table
//! - Runs the matching repair routine behind a state snapshot
//! - Rolls the snapshot back when a routine errors
//! - Re-checks the condition before reporting success
//!
//! # Example
//!
//! ```rust,ignore
//! use injector_repair::{RepairContext, SelfRepair};
//!
//! let repair = SelfRepair::with_defaults();
//! let mut context = RepairContext::new();
//! context.insert("missing_path".into(), "/tmp/out/scene.prefab".into());
//!
//! if let Some(mut diagnosis) = repair.diagnose("No such file or directory", context) {
//!     let fixed = repair.attempt_repair(&mut diagnosis);
//!     println!("repaired: {fixed}");
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod diagnosis;
pub mod error;
pub mod executor;
pub mod routines;
pub mod snapshot;

pub use diagnosis::{Diagnosis, DiagnosisRule, DiagnosisTable, FaultCause, RepairAction, Severity};
pub use error::RepairError;
pub use executor::{RepairOutcome, RepairRecord, SelfRepair};
pub use routines::{
    CleanupScratchSpace, CreateMissingFile, FixPermissions, ReduceBatchSize, RepairRoutine,
    RetryWithBackoff,
};
pub use snapshot::{PathState, Snapshot};

/// Key-value facts about the environment an error happened in
pub type RepairContext = serde_json::Map<String, serde_json::Value>;
