//! Error classification
//!
//! An ordered table of [`DiagnosisRule`]s maps error messages onto a
//! [`FaultCause`] and the [`RepairAction`] that may fix it. Matching is a
//! case-insensitive substring test; the first matching rule wins.

use crate::RepairContext;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified cause of a fault
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCause {
    MissingFile,
    PermissionDenied,
    DependencyMissing,
    DiskSpaceFull,
    MemoryExhausted,
    NetworkTimeout,
    /// Cause registered by a caller-supplied rule
    Other(String),
}

impl FaultCause {
    /// Stable tag for logs and reports
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::MissingFile => "missing_file",
            Self::PermissionDenied => "permission_denied",
            Self::DependencyMissing => "dependency_missing",
            Self::DiskSpaceFull => "disk_space_full",
            Self::MemoryExhausted => "memory_exhausted",
            Self::NetworkTimeout => "network_timeout",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for FaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// How bad a fault is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

/// Name of a repair routine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepairAction(String);

impl RepairAction {
    pub const CREATE_MISSING_FILE: &'static str = "create_missing_file";
    pub const FIX_PERMISSIONS: &'static str = "fix_permissions";
    pub const CLEANUP_SCRATCH_SPACE: &'static str = "cleanup_scratch_space";
    pub const REDUCE_BATCH_SIZE: &'static str = "reduce_batch_size";
    pub const RETRY_WITH_BACKOFF: &'static str = "retry_with_backoff";

    /// Reference a routine by name
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Routine name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the classification table
#[derive(Debug, Clone)]
pub struct DiagnosisRule {
    /// Cause assigned on match
    pub cause: FaultCause,
    /// Severity assigned on match
    pub severity: Severity,
    /// Routine to run; `None` means the fault is not auto-repairable
    pub action: Option<RepairAction>,
    /// Lowercased signal fragments
    patterns: Vec<String>,
}

impl DiagnosisRule {
    /// Create a rule without a repair routine
    #[must_use]
    pub fn new<I, S>(cause: FaultCause, severity: Severity, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            cause,
            severity,
            action: None,
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Attach a repair routine
    #[inline]
    #[must_use]
    pub fn repaired_by(mut self, action: impl Into<String>) -> Self {
        self.action = Some(RepairAction::new(action));
        self
    }

    /// Patterns this rule matches (lowercased)
    #[inline]
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    fn matches(&self, lowered_message: &str) -> bool {
        self.patterns.iter().any(|p| lowered_message.contains(p))
    }
}

/// Ordered, extensible rule table
#[derive(Debug, Clone, Default)]
pub struct DiagnosisTable {
    rules: Vec<DiagnosisRule>,
}

impl DiagnosisTable {
    /// Create empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create table with the built-in rules
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.register(
            DiagnosisRule::new(
                FaultCause::MissingFile,
                Severity::Medium,
                ["FileNotFoundError", "No such file or directory", "entity not found"],
            )
            .repaired_by(RepairAction::CREATE_MISSING_FILE),
        );
        table.register(
            DiagnosisRule::new(
                FaultCause::PermissionDenied,
                Severity::High,
                ["PermissionError", "Permission denied"],
            )
            .repaired_by(RepairAction::FIX_PERMISSIONS),
        );
        table.register(DiagnosisRule::new(
            FaultCause::DependencyMissing,
            Severity::High,
            ["ModuleNotFoundError", "ImportError", "library not found"],
        ));
        table.register(
            DiagnosisRule::new(
                FaultCause::DiskSpaceFull,
                Severity::Critical,
                ["No space left on device", "Disk full"],
            )
            .repaired_by(RepairAction::CLEANUP_SCRATCH_SPACE),
        );
        table.register(
            DiagnosisRule::new(
                FaultCause::MemoryExhausted,
                Severity::Critical,
                ["MemoryError", "Out of memory"],
            )
            .repaired_by(RepairAction::REDUCE_BATCH_SIZE),
        );
        table.register(
            DiagnosisRule::new(
                FaultCause::NetworkTimeout,
                Severity::Medium,
                ["TimeoutError", "Connection timeout", "timed out"],
            )
            .repaired_by(RepairAction::RETRY_WITH_BACKOFF),
        );
        table
    }

    /// Append a rule; earlier rules take precedence
    pub fn register(&mut self, rule: DiagnosisRule) {
        self.rules.push(rule);
    }

    /// Number of rules
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if table is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterate over rules in precedence order
    pub fn iter(&self) -> impl Iterator<Item = &DiagnosisRule> {
        self.rules.iter()
    }

    /// Classify an error signal; `None` if no rule matches
    #[must_use]
    pub fn classify(&self, error_message: &str, context: RepairContext) -> Option<Diagnosis> {
        let lowered = error_message.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| Diagnosis {
                error_message: error_message.to_string(),
                context,
                cause: rule.cause.clone(),
                severity: rule.severity,
                action: rule.action.clone(),
            })
    }
}

/// Classification of one error signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Original error message
    pub error_message: String,
    /// Environment facts; repair routines read and update these
    pub context: RepairContext,
    /// Classified cause
    pub cause: FaultCause,
    /// Severity
    pub severity: Severity,
    /// Suggested repair routine
    pub action: Option<RepairAction>,
}

impl Diagnosis {
    /// Whether a repair routine is suggested
    #[inline]
    #[must_use]
    pub fn auto_repairable(&self) -> bool {
        self.action.is_some()
    }
}
