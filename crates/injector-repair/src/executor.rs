//! Self-repair executor
//!
//! Wires the diagnosis table to registered routines and enforces the
//! snapshot discipline: capture, apply, roll back on error, verify.

use crate::diagnosis::{Diagnosis, DiagnosisRule, DiagnosisTable, FaultCause, RepairAction};
use crate::routines::{
    CleanupScratchSpace, CreateMissingFile, FixPermissions, ReduceBatchSize, RepairRoutine,
    RetryWithBackoff,
};
use crate::snapshot::Snapshot;
use crate::RepairContext;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Attempts kept in the history log
const HISTORY_CAPACITY: usize = 50;

/// Result of one repair attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairOutcome {
    /// No routine ran (not auto-repairable, unknown routine, or snapshot failed)
    NotAttempted,
    /// Routine ran and the fault no longer reproduces
    Repaired,
    /// Routine ran cleanly but the fault still reproduces
    Unresolved,
    /// Routine errored; snapshot restored
    RolledBack,
    /// Routine errored and restoring the snapshot also failed
    RollbackFailed,
}

impl RepairOutcome {
    /// Only a verified repair counts as success
    #[inline]
    #[must_use]
    pub fn is_repaired(self) -> bool {
        matches!(self, Self::Repaired)
    }
}

/// History entry for one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairRecord {
    pub timestamp: DateTime<Utc>,
    pub cause: FaultCause,
    pub action: Option<RepairAction>,
    pub outcome: RepairOutcome,
}

/// Diagnoses errors and runs repair routines
#[derive(Debug)]
pub struct SelfRepair {
    table: DiagnosisTable,
    routines: HashMap<RepairAction, Arc<dyn RepairRoutine>>,
    history: Mutex<VecDeque<RepairRecord>>,
}

impl SelfRepair {
    /// Create executor with no rules and no routines
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: DiagnosisTable::new(),
            routines: HashMap::new(),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
        }
    }

    /// Create executor with the built-in table and routines
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::with_backoff(RetryWithBackoff::default())
    }

    /// Built-in table and routines, with custom retry backoff
    #[must_use]
    pub fn with_backoff(backoff: RetryWithBackoff) -> Self {
        let mut repair = Self::new();
        repair.table = DiagnosisTable::with_defaults();
        repair.register_routine(Arc::new(CreateMissingFile));
        repair.register_routine(Arc::new(FixPermissions));
        repair.register_routine(Arc::new(CleanupScratchSpace));
        repair.register_routine(Arc::new(ReduceBatchSize));
        repair.register_routine(Arc::new(backoff));
        repair
    }

    /// Append a classification rule
    pub fn register_rule(&mut self, rule: DiagnosisRule) {
        self.table.register(rule);
    }

    /// Register a routine under its action name, replacing any previous one
    pub fn register_routine(&mut self, routine: Arc<dyn RepairRoutine>) {
        self.routines.insert(routine.action(), routine);
    }

    /// Classification table
    #[inline]
    #[must_use]
    pub fn table(&self) -> &DiagnosisTable {
        &self.table
    }

    /// Classify an error signal
    ///
    /// `None` means "repair not attempted", not failure.
    #[must_use]
    pub fn diagnose(&self, error_message: &str, context: RepairContext) -> Option<Diagnosis> {
        let diagnosis = self.table.classify(error_message, context);
        match &diagnosis {
            Some(d) => tracing::debug!("Diagnosed '{}' as {}", error_message, d.cause),
            None => tracing::debug!("No diagnosis for '{}'", error_message),
        }
        diagnosis
    }

    /// Run the suggested routine; `true` only after verification passes
    ///
    /// Routine errors are caught and rolled back, never propagated. On
    /// success the diagnosis context holds the routine's updates.
    pub fn attempt_repair(&self, diagnosis: &mut Diagnosis) -> bool {
        self.repair(diagnosis).is_repaired()
    }

    /// Like [`Self::attempt_repair`] but reports the detailed outcome
    pub fn repair(&self, diagnosis: &mut Diagnosis) -> RepairOutcome {
        let outcome = self.run(diagnosis);
        self.record(diagnosis, outcome);
        outcome
    }

    fn run(&self, diagnosis: &mut Diagnosis) -> RepairOutcome {
        let Some(action) = diagnosis.action.as_ref() else {
            return RepairOutcome::NotAttempted;
        };
        let Some(routine) = self.routines.get(action) else {
            tracing::warn!("No repair routine registered for '{}'", action);
            return RepairOutcome::NotAttempted;
        };

        let snapshot = match routine
            .affected_paths(&diagnosis.context)
            .and_then(|paths| Snapshot::capture(&diagnosis.context, &paths))
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Skipping {}: cannot snapshot state: {}", action, e);
                return RepairOutcome::NotAttempted;
            }
        };

        if let Err(e) = routine.apply(&mut diagnosis.context) {
            tracing::warn!("Repair {} failed, rolling back: {}", action, e);
            return match snapshot.restore(&mut diagnosis.context) {
                Ok(()) => RepairOutcome::RolledBack,
                Err(restore_err) => {
                    tracing::error!("Rollback of {} failed: {}", action, restore_err);
                    RepairOutcome::RollbackFailed
                }
            };
        }

        if routine.verify(&diagnosis.context, snapshot.context()) {
            tracing::info!("Repair {} resolved {}", action, diagnosis.cause);
            RepairOutcome::Repaired
        } else {
            tracing::info!("Repair {} ran but {} persists", action, diagnosis.cause);
            RepairOutcome::Unresolved
        }
    }

    fn record(&self, diagnosis: &Diagnosis, outcome: RepairOutcome) {
        let mut history = self.history.lock();
        if history.len() == HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(RepairRecord {
            timestamp: Utc::now(),
            cause: diagnosis.cause.clone(),
            action: diagnosis.action.clone(),
            outcome,
        });
    }

    /// Most recent attempts, oldest first
    #[must_use]
    pub fn history(&self, limit: usize) -> Vec<RepairRecord> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }
}

impl Default for SelfRepair {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::Severity;
    use crate::error::RepairError;
    use serde_json::json;

    #[derive(Debug)]
    struct AlwaysFails;

    impl RepairRoutine for AlwaysFails {
        fn action(&self) -> RepairAction {
            RepairAction::new("always_fails")
        }

        fn apply(&self, context: &mut RepairContext) -> Result<(), RepairError> {
            context.insert("half_done".into(), json!(true));
            Err(RepairError::MissingContext("nothing"))
        }

        fn verify(&self, _context: &RepairContext, _before: &RepairContext) -> bool {
            true
        }
    }

    fn custom_executor() -> SelfRepair {
        let mut repair = SelfRepair::new();
        repair.register_rule(
            DiagnosisRule::new(FaultCause::Other("flaky".into()), Severity::High, ["flaky"])
                .repaired_by("always_fails"),
        );
        repair.register_routine(Arc::new(AlwaysFails));
        repair
    }

    #[test]
    fn routine_error_restores_context() {
        let repair = custom_executor();
        let original = json!({ "attempt": 1 }).as_object().cloned().unwrap();
        let mut diagnosis = repair.diagnose("flaky failure", original.clone()).unwrap();

        assert_eq!(repair.repair(&mut diagnosis), RepairOutcome::RolledBack);
        assert_eq!(diagnosis.context, original);
    }

    #[test]
    fn not_repairable_is_not_attempted() {
        let repair = SelfRepair::with_defaults();
        let mut diagnosis = repair
            .diagnose("ModuleNotFoundError: no module named x", RepairContext::new())
            .unwrap();
        assert!(!repair.attempt_repair(&mut diagnosis));
        assert_eq!(repair.history(1)[0].outcome, RepairOutcome::NotAttempted);
    }

    #[test]
    fn unknown_routine_is_not_attempted() {
        let mut repair = SelfRepair::new();
        repair.register_rule(
            DiagnosisRule::new(FaultCause::Other("x".into()), Severity::Medium, ["x"])
                .repaired_by("missing_routine"),
        );
        let mut diagnosis = repair.diagnose("x", RepairContext::new()).unwrap();
        assert_eq!(repair.repair(&mut diagnosis), RepairOutcome::NotAttempted);
    }

    #[test]
    fn history_is_bounded() {
        let repair = custom_executor();
        for _ in 0..(HISTORY_CAPACITY + 5) {
            let mut diagnosis = repair.diagnose("flaky", RepairContext::new()).unwrap();
            repair.repair(&mut diagnosis);
        }
        assert_eq!(repair.history(usize::MAX).len(), HISTORY_CAPACITY);
        assert_eq!(repair.history(10).len(), 10);
    }

    #[test]
    fn backoff_updates_context_on_success() {
        let repair = SelfRepair::with_backoff(RetryWithBackoff::new(10, 100));
        let context = json!({ "retry_count": 0, "max_retries": 2 })
            .as_object()
            .cloned()
            .unwrap();
        let mut diagnosis = repair.diagnose("Connection timeout", context).unwrap();

        assert!(repair.attempt_repair(&mut diagnosis));
        assert_eq!(diagnosis.context["backoff_ms"], json!(10));
        assert_eq!(diagnosis.context["retry_count"], json!(1));
    }
}
