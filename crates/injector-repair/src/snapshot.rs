//! Backup-before-mutate snapshots
//!
//! A [`Snapshot`] records the repair context and the on-disk state of every
//! path a routine declares it may touch. Restoring puts both back exactly.

use crate::error::RepairError;
use crate::RepairContext;
use std::fs::{self, Permissions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Captured state of one filesystem path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathState {
    /// Nothing existed at the path
    Absent,
    /// Regular file with its bytes and permissions
    File {
        contents: Vec<u8>,
        permissions: Permissions,
    },
    /// Directory with its permissions (children are not captured)
    Directory { permissions: Permissions },
}

impl PathState {
    /// Read the current state of `path`
    ///
    /// # Errors
    /// Returns `RepairError::Io` if the path exists but cannot be read
    pub fn capture(path: &Path) -> Result<Self, RepairError> {
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::Absent),
            Err(e) => return Err(RepairError::io(path, e)),
        };

        if metadata.is_dir() {
            return Ok(Self::Directory {
                permissions: metadata.permissions(),
            });
        }

        let contents = fs::read(path).map_err(|e| RepairError::io(path, e))?;
        Ok(Self::File {
            contents,
            permissions: metadata.permissions(),
        })
    }

    fn restore(&self, path: &Path) -> Result<(), RepairError> {
        match self {
            Self::Absent => match fs::symlink_metadata(path) {
                Ok(metadata) if metadata.is_dir() => {
                    fs::remove_dir_all(path).map_err(|e| RepairError::io(path, e))
                }
                Ok(_) => fs::remove_file(path).map_err(|e| RepairError::io(path, e)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(RepairError::io(path, e)),
            },
            Self::File {
                contents,
                permissions,
            } => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent).map_err(|e| RepairError::io(parent, e))?;
                }
                fs::write(path, contents).map_err(|e| RepairError::io(path, e))?;
                fs::set_permissions(path, permissions.clone())
                    .map_err(|e| RepairError::io(path, e))
            }
            Self::Directory { permissions } => {
                fs::create_dir_all(path).map_err(|e| RepairError::io(path, e))?;
                fs::set_permissions(path, permissions.clone())
                    .map_err(|e| RepairError::io(path, e))
            }
        }
    }
}

/// Context plus filesystem state captured before a repair
#[derive(Debug, Clone)]
pub struct Snapshot {
    context: RepairContext,
    paths: Vec<(PathBuf, PathState)>,
}

impl Snapshot {
    /// Capture `context` and the state of each path
    ///
    /// # Errors
    /// Returns `RepairError::Io` if any existing path cannot be read
    pub fn capture(context: &RepairContext, paths: &[PathBuf]) -> Result<Self, RepairError> {
        let paths = paths
            .iter()
            .map(|p| PathState::capture(p).map(|state| (p.clone(), state)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            context: context.clone(),
            paths,
        })
    }

    /// Context as it was at capture time
    #[inline]
    #[must_use]
    pub fn context(&self) -> &RepairContext {
        &self.context
    }

    /// Captured paths in capture order
    #[inline]
    #[must_use]
    pub fn paths(&self) -> &[(PathBuf, PathState)] {
        &self.paths
    }

    /// Put the captured state back
    ///
    /// Paths are restored in reverse capture order. Every path is attempted;
    /// the first error is returned.
    ///
    /// # Errors
    /// Returns the first `RepairError::Io` hit while restoring
    pub fn restore(self, context: &mut RepairContext) -> Result<(), RepairError> {
        *context = self.context;

        let mut first_error = None;
        for (path, state) in self.paths.iter().rev() {
            if let Err(e) = state.restore(path) {
                tracing::error!("Failed to restore {}: {}", path.display(), e);
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_path_is_removed_on_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.txt");

        let mut context = RepairContext::new();
        let snapshot = Snapshot::capture(&context, &[path.clone()]).unwrap();
        assert_eq!(snapshot.paths()[0].1, PathState::Absent);

        fs::write(&path, "created").unwrap();
        context.insert("touched".into(), json!(true));

        snapshot.restore(&mut context).unwrap();
        assert!(!path.exists());
        assert!(context.is_empty());
    }

    #[test]
    fn file_contents_are_restored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "original").unwrap();

        let mut context = RepairContext::new();
        let snapshot = Snapshot::capture(&context, &[path.clone()]).unwrap();

        fs::write(&path, "mutated").unwrap();
        snapshot.restore(&mut context).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn created_directory_tree_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let outer = dir.path().join("a");
        let inner = outer.join("b");

        let mut context = RepairContext::new();
        let snapshot = Snapshot::capture(&context, &[inner.clone(), outer.clone()]).unwrap();

        fs::create_dir_all(&inner).unwrap();
        fs::write(inner.join("file"), "x").unwrap();
        snapshot.restore(&mut context).unwrap();

        assert!(!outer.exists());
    }
}
