//! Repair routines
//!
//! Each routine declares the paths it may touch, mutates state in
//! [`RepairRoutine::apply`], and re-checks the fault in
//! [`RepairRoutine::verify`]. Snapshotting and rollback are handled by the
//! executor, so routines only ever move state forward.

use crate::diagnosis::RepairAction;
use crate::error::RepairError;
use crate::RepairContext;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// A repair routine referenced by [`RepairAction`]
pub trait RepairRoutine: Send + Sync + std::fmt::Debug {
    /// Name the diagnosis table uses to reference this routine
    fn action(&self) -> RepairAction;

    /// Paths whose state must be snapshotted before [`Self::apply`]
    ///
    /// # Errors
    /// Returns `RepairError` if the context does not describe a target
    fn affected_paths(&self, _context: &RepairContext) -> Result<Vec<PathBuf>, RepairError> {
        Ok(Vec::new())
    }

    /// Attempt the fix; must be idempotent
    ///
    /// # Errors
    /// Any error triggers rollback to the snapshot
    fn apply(&self, context: &mut RepairContext) -> Result<(), RepairError>;

    /// Check that the fault no longer reproduces
    fn verify(&self, context: &RepairContext, before: &RepairContext) -> bool;
}

fn required_str<'a>(context: &'a RepairContext, key: &'static str) -> Result<&'a str, RepairError> {
    match context.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.as_str()),
        Some(_) => Err(RepairError::invalid(key, "expected non-empty string")),
        None => Err(RepairError::MissingContext(key)),
    }
}

fn optional_u64(context: &RepairContext, key: &'static str) -> Result<Option<u64>, RepairError> {
    match context.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| RepairError::invalid(key, "expected unsigned integer")),
    }
}

fn flag(context: &RepairContext, key: &str) -> bool {
    context.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Creates a missing file (with parents) or directory
///
/// Context: `missing_path`, `is_directory` (default false),
/// `default_content` (default empty).
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateMissingFile;

impl RepairRoutine for CreateMissingFile {
    fn action(&self) -> RepairAction {
        RepairAction::new(RepairAction::CREATE_MISSING_FILE)
    }

    fn affected_paths(&self, context: &RepairContext) -> Result<Vec<PathBuf>, RepairError> {
        let path = Path::new(required_str(context, "missing_path")?);
        let mut paths = vec![path.to_path_buf()];
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() || ancestor.exists() {
                break;
            }
            paths.push(ancestor.to_path_buf());
        }
        Ok(paths)
    }

    fn apply(&self, context: &mut RepairContext) -> Result<(), RepairError> {
        let path = PathBuf::from(required_str(context, "missing_path")?);

        if flag(context, "is_directory") {
            return fs::create_dir_all(&path).map_err(|e| RepairError::io(&path, e));
        }

        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| RepairError::io(parent, e))?;
        }
        let content = context
            .get("default_content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        fs::write(&path, content).map_err(|e| RepairError::io(&path, e))
    }

    fn verify(&self, context: &RepairContext, _before: &RepairContext) -> bool {
        let Ok(path) = required_str(context, "missing_path") else {
            return false;
        };
        let path = Path::new(path);
        if flag(context, "is_directory") {
            path.is_dir()
        } else {
            path.is_file()
        }
    }
}

/// Makes a path owner-accessible
///
/// Context: `file_path`. Sets mode `0o755` on unix; clears read-only
/// elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixPermissions;

impl RepairRoutine for FixPermissions {
    fn action(&self) -> RepairAction {
        RepairAction::new(RepairAction::FIX_PERMISSIONS)
    }

    fn affected_paths(&self, context: &RepairContext) -> Result<Vec<PathBuf>, RepairError> {
        Ok(vec![PathBuf::from(required_str(context, "file_path")?)])
    }

    fn apply(&self, context: &mut RepairContext) -> Result<(), RepairError> {
        let path = PathBuf::from(required_str(context, "file_path")?);
        let mut permissions = fs::metadata(&path)
            .map_err(|e| RepairError::io(&path, e))?
            .permissions();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            permissions.set_mode(0o755);
        }
        #[cfg(not(unix))]
        permissions.set_readonly(false);

        fs::set_permissions(&path, permissions).map_err(|e| RepairError::io(&path, e))
    }

    fn verify(&self, context: &RepairContext, _before: &RepairContext) -> bool {
        let Ok(path) = required_str(context, "file_path") else {
            return false;
        };
        let Ok(metadata) = fs::metadata(path) else {
            return false;
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode() & 0o700 == 0o700
        }
        #[cfg(not(unix))]
        {
            !metadata.permissions().readonly()
        }
    }
}

/// Frees space by deleting regular files directly inside a scratch directory
///
/// Context: `scratch_dir`. Subdirectories are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupScratchSpace;

impl CleanupScratchSpace {
    fn regular_files(dir: &Path) -> Result<Vec<PathBuf>, RepairError> {
        let entries = fs::read_dir(dir).map_err(|e| RepairError::io(dir, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RepairError::io(dir, e))?;
            let file_type = entry.file_type().map_err(|e| RepairError::io(entry.path(), e))?;
            if file_type.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

impl RepairRoutine for CleanupScratchSpace {
    fn action(&self) -> RepairAction {
        RepairAction::new(RepairAction::CLEANUP_SCRATCH_SPACE)
    }

    fn affected_paths(&self, context: &RepairContext) -> Result<Vec<PathBuf>, RepairError> {
        Self::regular_files(Path::new(required_str(context, "scratch_dir")?))
    }

    fn apply(&self, context: &mut RepairContext) -> Result<(), RepairError> {
        let dir = PathBuf::from(required_str(context, "scratch_dir")?);
        for file in Self::regular_files(&dir)? {
            fs::remove_file(&file).map_err(|e| RepairError::io(&file, e))?;
        }
        Ok(())
    }

    fn verify(&self, context: &RepairContext, _before: &RepairContext) -> bool {
        required_str(context, "scratch_dir")
            .and_then(|dir| Self::regular_files(Path::new(dir)))
            .is_ok_and(|files| files.is_empty())
    }
}

/// Halves `batch_size` in the context (minimum 1)
#[derive(Debug, Clone, Copy, Default)]
pub struct ReduceBatchSize;

impl RepairRoutine for ReduceBatchSize {
    fn action(&self) -> RepairAction {
        RepairAction::new(RepairAction::REDUCE_BATCH_SIZE)
    }

    fn apply(&self, context: &mut RepairContext) -> Result<(), RepairError> {
        let size = optional_u64(context, "batch_size")?
            .ok_or(RepairError::MissingContext("batch_size"))?;
        context.insert("batch_size".into(), Value::from((size / 2).max(1)));
        Ok(())
    }

    fn verify(&self, context: &RepairContext, before: &RepairContext) -> bool {
        let after = context.get("batch_size").and_then(Value::as_u64);
        let before = before.get("batch_size").and_then(Value::as_u64);
        matches!((after, before), (Some(a), Some(b)) if a < b)
    }
}

/// Schedules another attempt with exponential backoff
///
/// Context: `retry_count` (default 0), `max_retries` (default 3). When
/// retries remain, bumps `retry_count` and writes `backoff_ms`; the caller
/// waits that long before retrying.
#[derive(Debug, Clone, Copy)]
pub struct RetryWithBackoff {
    /// Delay before the first retry
    pub base_ms: u64,
    /// Upper bound on any delay
    pub cap_ms: u64,
}

impl RetryWithBackoff {
    /// Create with explicit base and cap
    #[inline]
    #[must_use]
    pub fn new(base_ms: u64, cap_ms: u64) -> Self {
        Self { base_ms, cap_ms }
    }

    /// Delay for the given attempt number
    #[must_use]
    pub fn delay_ms(&self, retry_count: u64) -> u64 {
        let factor = u32::try_from(retry_count)
            .ok()
            .and_then(|shift| 1u64.checked_shl(shift))
            .unwrap_or(u64::MAX);
        self.base_ms.saturating_mul(factor).min(self.cap_ms)
    }
}

impl Default for RetryWithBackoff {
    fn default() -> Self {
        Self::new(1_000, 30_000)
    }
}

impl RepairRoutine for RetryWithBackoff {
    fn action(&self) -> RepairAction {
        RepairAction::new(RepairAction::RETRY_WITH_BACKOFF)
    }

    fn apply(&self, context: &mut RepairContext) -> Result<(), RepairError> {
        let retry_count = optional_u64(context, "retry_count")?.unwrap_or(0);
        let max_retries = optional_u64(context, "max_retries")?.unwrap_or(3);

        if retry_count >= max_retries {
            return Ok(());
        }

        context.insert("backoff_ms".into(), Value::from(self.delay_ms(retry_count)));
        context.insert("retry_count".into(), Value::from(retry_count + 1));
        Ok(())
    }

    fn verify(&self, context: &RepairContext, before: &RepairContext) -> bool {
        let after = context.get("retry_count").and_then(Value::as_u64).unwrap_or(0);
        let prior = before.get("retry_count").and_then(Value::as_u64).unwrap_or(0);
        let max_retries = context.get("max_retries").and_then(Value::as_u64).unwrap_or(3);
        after > prior && after <= max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(value: serde_json::Value) -> RepairContext {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn create_missing_file_writes_default_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.prefab");
        let mut ctx = context(json!({
            "missing_path": path.to_str().unwrap(),
            "default_content": "stub",
        }));
        let before = ctx.clone();

        let affected = CreateMissingFile.affected_paths(&ctx).unwrap();
        assert_eq!(affected, vec![path.clone(), dir.path().join("nested")]);

        CreateMissingFile.apply(&mut ctx).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "stub");
        assert!(CreateMissingFile.verify(&ctx, &before));

        // Idempotent: existing content is kept
        fs::write(&path, "edited").unwrap();
        CreateMissingFile.apply(&mut ctx).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "edited");
    }

    #[test]
    fn create_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assets");
        let mut ctx = context(json!({
            "missing_path": path.to_str().unwrap(),
            "is_directory": true,
        }));
        let before = ctx.clone();

        CreateMissingFile.apply(&mut ctx).unwrap();
        assert!(path.is_dir());
        assert!(CreateMissingFile.verify(&ctx, &before));
    }

    #[test]
    fn create_missing_file_requires_path() {
        let mut ctx = RepairContext::new();
        assert!(matches!(
            CreateMissingFile.apply(&mut ctx),
            Err(RepairError::MissingContext("missing_path"))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn fix_permissions_sets_owner_bits() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool.sh");
        fs::write(&path, "#!/bin/sh").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o400)).unwrap();

        let mut ctx = context(json!({ "file_path": path.to_str().unwrap() }));
        let before = ctx.clone();
        assert!(!FixPermissions.verify(&ctx, &before));

        FixPermissions.apply(&mut ctx).unwrap();
        assert!(FixPermissions.verify(&ctx, &before));
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o755);
    }

    #[test]
    fn fix_permissions_fails_for_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");
        let mut ctx = context(json!({ "file_path": path.to_str().unwrap() }));
        assert!(matches!(FixPermissions.apply(&mut ctx), Err(RepairError::Io { .. })));
    }

    #[test]
    fn cleanup_scratch_space_keeps_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.tmp"), "a").unwrap();
        fs::write(dir.path().join("b.tmp"), "b").unwrap();
        fs::create_dir(dir.path().join("keep")).unwrap();

        let mut ctx = context(json!({ "scratch_dir": dir.path().to_str().unwrap() }));
        let before = ctx.clone();

        assert_eq!(CleanupScratchSpace.affected_paths(&ctx).unwrap().len(), 2);
        CleanupScratchSpace.apply(&mut ctx).unwrap();

        assert!(CleanupScratchSpace.verify(&ctx, &before));
        assert!(dir.path().join("keep").is_dir());
    }

    #[test]
    fn reduce_batch_size_halves_until_one() {
        let mut ctx = context(json!({ "batch_size": 8 }));
        let before = ctx.clone();
        ReduceBatchSize.apply(&mut ctx).unwrap();
        assert_eq!(ctx["batch_size"], json!(4));
        assert!(ReduceBatchSize.verify(&ctx, &before));

        let mut ctx = context(json!({ "batch_size": 1 }));
        let before = ctx.clone();
        ReduceBatchSize.apply(&mut ctx).unwrap();
        assert_eq!(ctx["batch_size"], json!(1));
        assert!(!ReduceBatchSize.verify(&ctx, &before));
    }

    #[test]
    fn reduce_batch_size_rejects_non_integer() {
        let mut ctx = context(json!({ "batch_size": "big" }));
        assert!(matches!(
            ReduceBatchSize.apply(&mut ctx),
            Err(RepairError::InvalidContext { key: "batch_size", .. })
        ));
    }

    #[test]
    fn retry_with_backoff_doubles_delay() {
        let routine = RetryWithBackoff::new(100, 1_000);
        assert_eq!(routine.delay_ms(0), 100);
        assert_eq!(routine.delay_ms(2), 400);
        assert_eq!(routine.delay_ms(10), 1_000);
        assert_eq!(routine.delay_ms(200), 1_000);

        let mut ctx = context(json!({ "retry_count": 1, "max_retries": 3 }));
        let before = ctx.clone();
        routine.apply(&mut ctx).unwrap();
        assert_eq!(ctx["retry_count"], json!(2));
        assert_eq!(ctx["backoff_ms"], json!(200));
        assert!(routine.verify(&ctx, &before));
    }

    #[test]
    fn retry_with_backoff_exhausted_is_unresolved() {
        let routine = RetryWithBackoff::default();
        let mut ctx = context(json!({ "retry_count": 3, "max_retries": 3 }));
        let before = ctx.clone();
        routine.apply(&mut ctx).unwrap();
        assert_eq!(ctx, before);
        assert!(!routine.verify(&ctx, &before));
    }
}
