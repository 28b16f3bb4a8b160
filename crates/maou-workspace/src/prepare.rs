// prepare.rs — Turns a validated plan into a previewable, not-yet-applied edit.
//
// For each action, in plan order:
//   - DELETE_FILE → path appended to the delete list, nothing else
//   - CREATE/UPDATE on a missing file → create-with-full-content
//   - CREATE/UPDATE on an existing file → full-content replace, with the
//     current text and its SHA-256 recorded as the base
//
// Proposed content is registered in the PreviewStore under a deterministic
// preview key so a diff view can show it before the real file changes.
// Preparation only reads; it never writes to the workspace.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use maou_plan::{ExecutionPlan, PlanAction};

use crate::error::WorkspaceError;
use crate::host::Workspace;
use crate::preview::{file_uri, preview_key, PreviewStore};

/// One non-delete file operation in the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEdit {
    /// The file does not exist yet: create it with `content`.
    Create {
        path: String,
        target: PathBuf,
        content: String,
        preview_key: String,
    },

    /// The file exists: replace its full range with `content`.
    Replace {
        path: String,
        target: PathBuf,
        old_content: String,
        /// SHA-256 of the bytes read during preparation.
        base_hash: String,
        content: String,
        preview_key: String,
    },
}

impl FileEdit {
    pub fn path(&self) -> &str {
        match self {
            FileEdit::Create { path, .. } | FileEdit::Replace { path, .. } => path,
        }
    }

    pub fn target(&self) -> &Path {
        match self {
            FileEdit::Create { target, .. } | FileEdit::Replace { target, .. } => target,
        }
    }

    /// Proposed new content.
    pub fn content(&self) -> &str {
        match self {
            FileEdit::Create { content, .. } | FileEdit::Replace { content, .. } => content,
        }
    }

    /// Current content; empty for a file that does not exist yet.
    pub fn old_content(&self) -> &str {
        match self {
            FileEdit::Create { .. } => "",
            FileEdit::Replace { old_content, .. } => old_content,
        }
    }

    pub fn preview_key(&self) -> &str {
        match self {
            FileEdit::Create { preview_key, .. } | FileEdit::Replace { preview_key, .. } => {
                preview_key
            }
        }
    }

    /// Address of the "old" side of a diff: an untitled document for new
    /// files, the real file otherwise.
    pub fn old_ref(&self) -> String {
        match self {
            FileEdit::Create { target, .. } => format!("untitled:{}", file_uri(target)),
            FileEdit::Replace { target, .. } => file_uri(target),
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, FileEdit::Create { .. })
    }
}

/// The non-delete operations of a prepared plan, committed together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditBatch {
    pub edits: Vec<FileEdit>,
}

impl EditBatch {
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileEdit> {
        self.edits.iter()
    }
}

/// A plan materialized against the current workspace state.
///
/// Delete paths are kept out of the batch: they are confirmed and applied
/// one at a time after the batch commits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedEdit {
    pub batch: EditBatch,
    pub delete_paths: Vec<String>,
}

impl PreparedEdit {
    /// Nothing to write and nothing to delete.
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty() && self.delete_paths.is_empty()
    }

    /// Paths the batch will create or replace, in plan order.
    pub fn changed_paths(&self) -> Vec<&str> {
        self.batch.iter().map(FileEdit::path).collect()
    }

    /// What each batch edit was prepared against: the base hash of a
    /// replaced file, `None` for a file that did not exist yet.
    pub fn base_hashes(&self) -> BTreeMap<String, Option<String>> {
        self.batch
            .iter()
            .map(|edit| {
                let base = match edit {
                    FileEdit::Create { .. } => None,
                    FileEdit::Replace { base_hash, .. } => Some(base_hash.clone()),
                };
                (edit.path().to_string(), base)
            })
            .collect()
    }
}

/// Resolves plans against a workspace without mutating it.
pub struct PlanPreparer<'a, W: Workspace + ?Sized> {
    workspace: &'a W,
    previews: &'a PreviewStore,
}

impl<'a, W: Workspace + ?Sized> PlanPreparer<'a, W> {
    pub fn new(workspace: &'a W, previews: &'a PreviewStore) -> Self {
        Self {
            workspace,
            previews,
        }
    }

    /// Build the edit batch and delete list for `plan`.
    ///
    /// Fails with [`WorkspaceError::NoWorkspace`] if a create/update needs a
    /// root and none is open.
    pub fn prepare(&self, plan: &ExecutionPlan) -> Result<PreparedEdit, WorkspaceError> {
        let mut prepared = PreparedEdit::default();

        for action in &plan.actions {
            let (path, content) = match action {
                PlanAction::DeleteFile { path } => {
                    prepared.delete_paths.push(path.clone());
                    continue;
                }
                PlanAction::CreateFile { path, content }
                | PlanAction::UpdateFile { path, content } => (path, content),
            };

            let target = self.workspace.resolve(path)?;
            let key = preview_key(self.previews.scheme(), &target);

            let edit = if self.workspace.exists(path)? {
                let bytes = self.workspace.read_bytes(path)?;
                tracing::debug!(path = %path, "prepared full-content replace");
                FileEdit::Replace {
                    path: path.clone(),
                    target,
                    old_content: String::from_utf8_lossy(&bytes).into_owned(),
                    base_hash: content_hash(&bytes),
                    content: content.clone(),
                    preview_key: key.clone(),
                }
            } else {
                tracing::debug!(path = %path, "prepared create");
                FileEdit::Create {
                    path: path.clone(),
                    target,
                    content: content.clone(),
                    preview_key: key.clone(),
                }
            };

            self.previews.set(key, content.clone());
            prepared.batch.edits.push(edit);
        }

        tracing::info!(
            edits = prepared.batch.len(),
            deletes = prepared.delete_paths.len(),
            "plan prepared"
        );
        Ok(prepared)
    }
}

/// SHA-256 of `bytes`, hex encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
