// host.rs — The Workspace trait: everything the engine needs from the host.
//
// The plan engine never touches the filesystem directly. It goes through a
// Workspace, which offers byte-level reads, existence checks, a batch edit
// primitive that reports success or failure, and recoverable deletion.
// `LocalWorkspace` is the on-disk implementation; tests and other hosts can
// provide their own.

use std::fs;
use std::path::{Path, PathBuf};

use maou_plan::validate_relative_path;

use crate::error::WorkspaceError;
use crate::prepare::EditBatch;

/// Host workspace abstraction.
///
/// All `relative_path` arguments are workspace-relative POSIX paths as they
/// appear in a plan. Implementations must refuse paths that escape the root.
pub trait Workspace: Send + Sync {
    /// Root directory of the open workspace.
    ///
    /// Returns [`WorkspaceError::NoWorkspace`] when nothing is open.
    fn root(&self) -> Result<&Path, WorkspaceError>;

    /// Does a file exist at this path?
    fn exists(&self, relative_path: &str) -> Result<bool, WorkspaceError>;

    /// Raw file bytes.
    fn read_bytes(&self, relative_path: &str) -> Result<Vec<u8>, WorkspaceError>;

    /// Every file in the workspace, as sorted relative POSIX paths.
    fn list_files(&self) -> Result<Vec<String>, WorkspaceError>;

    /// Commit a batch of creates/replaces as one best-effort atomic edit.
    ///
    /// `Ok(false)` means the host refused or failed to commit; callers treat
    /// it as a hard failure. No guarantee is made about partial application
    /// beyond what the implementation documents.
    fn apply_batch(&self, batch: &EditBatch) -> Result<bool, WorkspaceError>;

    /// Recoverably remove a single file (move to trash, never erase).
    ///
    /// Returns where the file went.
    fn trash(&self, relative_path: &str) -> Result<PathBuf, WorkspaceError>;

    /// File content decoded as UTF-8 (lossy).
    fn read_text(&self, relative_path: &str) -> Result<String, WorkspaceError> {
        let bytes = self.read_bytes(relative_path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Resolve a plan path to an absolute location under the root.
    fn resolve(&self, relative_path: &str) -> Result<PathBuf, WorkspaceError> {
        resolve_in(self.root()?, relative_path)
    }
}

/// Join a validated relative POSIX path onto `root`.
///
/// Symbolic links below the root are refused wherever they appear in the
/// path, so the result can only name a location inside the root.
pub fn resolve_in(root: &Path, relative_path: &str) -> Result<PathBuf, WorkspaceError> {
    validate_relative_path(relative_path)?;

    let mut full = root.to_path_buf();
    let mut on_disk = true;
    for component in relative_path.split('/') {
        if component.is_empty() || component == "." {
            continue;
        }
        full.push(component);
        if !on_disk {
            continue;
        }
        match fs::symlink_metadata(&full) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(WorkspaceError::InvalidPath {
                    path: relative_path.to_string(),
                    reason: format!("'{}' is a symbolic link", component),
                });
            }
            Ok(_) => {}
            Err(_) => on_disk = false,
        }
    }

    if !full.starts_with(root) {
        return Err(WorkspaceError::InvalidPath {
            path: relative_path.to_string(),
            reason: "path escapes the workspace root".to_string(),
        });
    }
    Ok(full)
}
