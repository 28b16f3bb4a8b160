// local.rs — On-disk Workspace implementation.
//
// Batch commit is staged so a refused or failing batch leaves files intact:
//   1. preconditions: creates need an absent target, replaces need the
//      current bytes to still hash to the base recorded at preparation
//   2. staging: every new content is written to a temp file next to its
//      target
//   3. commit: temp files are renamed over their targets in batch order
//
// A failure in steps 1-2 changes nothing but parent directories. A failure
// during step 3 can leave earlier files of the batch committed; it is
// reported as a refusal like any other.
//
// Deletion is recoverable: files move under `<root>/<trash_dir>/<stamp>/`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use glob::Pattern;
use tempfile::NamedTempFile;

use crate::error::WorkspaceError;
use crate::host::Workspace;
use crate::prepare::{content_hash, EditBatch, FileEdit};

/// Default location of trashed files, relative to the root.
pub const DEFAULT_TRASH_DIR: &str = ".maou/trash";

/// A workspace rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: Option<PathBuf>,
    trash_dir: String,
    exclude: Vec<Pattern>,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            trash_dir: DEFAULT_TRASH_DIR.to_string(),
            exclude: Vec::new(),
        }
    }

    /// A host with no folder open. Every root-dependent call fails with
    /// [`WorkspaceError::NoWorkspace`].
    pub fn detached() -> Self {
        Self {
            root: None,
            trash_dir: DEFAULT_TRASH_DIR.to_string(),
            exclude: Vec::new(),
        }
    }

    pub fn with_trash_dir(mut self, trash_dir: impl Into<String>) -> Self {
        self.trash_dir = trash_dir.into().trim_matches('/').to_string();
        self
    }

    /// Glob patterns (relative POSIX paths) hidden from `list_files`.
    /// Invalid patterns are skipped with a warning.
    pub fn with_excludes<S: AsRef<str>>(mut self, patterns: &[S]) -> Self {
        self.exclude = patterns
            .iter()
            .filter_map(|p| match Pattern::new(p.as_ref()) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!(pattern = p.as_ref(), error = %e, "ignoring invalid exclude pattern");
                    None
                }
            })
            .collect();
        self
    }

    pub fn trash_dir(&self) -> &str {
        &self.trash_dir
    }

    fn is_excluded(&self, rel: &str) -> bool {
        self.exclude.iter().any(|p| p.matches(rel))
    }

    /// A directory is pruned when a file directly inside it would be excluded
    /// by a directory-wide pattern such as `**/node_modules/**`.
    fn is_excluded_dir(&self, rel: &str) -> bool {
        rel == self.trash_dir || self.is_excluded(&format!("{}/_", rel))
    }

    fn walk_dir(
        &self,
        dir: &Path,
        root: &Path,
        files: &mut Vec<String>,
    ) -> Result<(), WorkspaceError> {
        let entries = fs::read_dir(dir).map_err(|source| WorkspaceError::IoError {
            path: dir.to_path_buf(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| WorkspaceError::IoError {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            let Ok(rel) = path.strip_prefix(root) else {
                continue;
            };
            let rel = posix(rel);
            let file_type = entry.file_type().map_err(|source| WorkspaceError::IoError {
                path: path.clone(),
                source,
            })?;

            // Links are never followed: they could point outside the root
            // or back at an ancestor.
            if file_type.is_dir() {
                if !self.is_excluded_dir(&rel) {
                    self.walk_dir(&path, root, files)?;
                }
            } else if file_type.is_file() && !self.is_excluded(&rel) {
                files.push(rel);
            }
        }
        Ok(())
    }

    fn check_precondition(&self, edit: &FileEdit) -> Result<bool, WorkspaceError> {
        // A link may have appeared on the way to the target since preparation.
        if let Err(e) = self.resolve(edit.path()) {
            tracing::warn!(path = %edit.path(), error = %e, "edit target no longer resolves");
            return Ok(false);
        }
        match edit {
            FileEdit::Create { path, target, .. } => {
                if target.exists() {
                    tracing::warn!(path = %path, "create target appeared since preparation");
                    return Ok(false);
                }
                Ok(true)
            }
            FileEdit::Replace {
                path,
                target,
                base_hash,
                ..
            } => {
                let current = match fs::read(target) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(path = %path, error = %e, "replace target unreadable");
                        return Ok(false);
                    }
                };
                if &content_hash(&current) != base_hash {
                    tracing::warn!(path = %path, "file changed since preparation");
                    return Ok(false);
                }
                Ok(true)
            }
        }
    }

    fn stage(edit: &FileEdit) -> std::io::Result<NamedTempFile> {
        let target = edit.target();
        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let mut staged = tempfile::Builder::new()
            .prefix(".maou-stage-")
            .tempfile_in(parent)?;
        staged.write_all(edit.content().as_bytes())?;
        staged.flush()?;

        // Temp files are created owner-only; keep the permissions a plain
        // write would have produced.
        match edit {
            FileEdit::Replace { .. } => {
                let perms = fs::metadata(target)?.permissions();
                staged.as_file().set_permissions(perms)?;
            }
            FileEdit::Create { .. } => set_default_permissions(staged.as_file())?,
        }
        Ok(staged)
    }
}

#[cfg(unix)]
fn set_default_permissions(file: &fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_default_permissions(_file: &fs::File) -> std::io::Result<()> {
    Ok(())
}

fn posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl Workspace for LocalWorkspace {
    fn root(&self) -> Result<&Path, WorkspaceError> {
        self.root.as_deref().ok_or(WorkspaceError::NoWorkspace)
    }

    fn exists(&self, relative_path: &str) -> Result<bool, WorkspaceError> {
        Ok(self.resolve(relative_path)?.is_file())
    }

    fn read_bytes(&self, relative_path: &str) -> Result<Vec<u8>, WorkspaceError> {
        let full = self.resolve(relative_path)?;
        if !full.exists() {
            return Err(WorkspaceError::FileNotFound {
                path: relative_path.to_string(),
            });
        }
        if full.is_dir() {
            return Err(WorkspaceError::NotAFile {
                path: relative_path.to_string(),
            });
        }
        fs::read(&full).map_err(|source| WorkspaceError::IoError { path: full, source })
    }

    fn list_files(&self) -> Result<Vec<String>, WorkspaceError> {
        let root = self.root()?;
        let mut files = Vec::new();
        self.walk_dir(root, root, &mut files)?;
        files.sort();
        Ok(files)
    }

    fn apply_batch(&self, batch: &EditBatch) -> Result<bool, WorkspaceError> {
        self.root()?;

        for edit in batch.iter() {
            if !self.check_precondition(edit)? {
                return Ok(false);
            }
        }

        let mut staged = Vec::with_capacity(batch.len());
        for edit in batch.iter() {
            match Self::stage(edit) {
                Ok(temp) => staged.push((temp, edit)),
                Err(e) => {
                    tracing::warn!(path = %edit.path(), error = %e, "failed to stage edit");
                    return Ok(false);
                }
            }
        }

        for (temp, edit) in staged {
            if let Err(e) = temp.persist(edit.target()) {
                tracing::error!(path = %edit.path(), error = %e.error, "failed to commit staged edit");
                return Ok(false);
            }
            tracing::debug!(path = %edit.path(), "committed");
        }
        Ok(true)
    }

    fn trash(&self, relative_path: &str) -> Result<PathBuf, WorkspaceError> {
        let root = self.root()?;
        let full = self.resolve(relative_path)?;
        let meta = fs::symlink_metadata(&full).map_err(|_| WorkspaceError::FileNotFound {
            path: relative_path.to_string(),
        })?;
        if meta.is_dir() {
            return Err(WorkspaceError::NotAFile {
                path: relative_path.to_string(),
            });
        }

        let bucket = format!(
            "{}-{}",
            chrono::Utc::now().format("%Y%m%dT%H%M%S"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let mut dest = root.join(&self.trash_dir).join(bucket);
        for component in relative_path.split('/').filter(|c| !c.is_empty() && *c != ".") {
            dest.push(component);
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|source| WorkspaceError::IoError {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::rename(&full, &dest).map_err(|source| WorkspaceError::IoError {
            path: full.clone(),
            source,
        })?;
        Ok(dest)
    }
}
