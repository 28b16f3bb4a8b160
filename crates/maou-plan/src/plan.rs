// plan.rs — The execution plan data model.
//
// An ExecutionPlan is what the model proposes: a free-text rationale and an
// ordered list of file operations. Order matters: actions are prepared and
// applied in plan order. Each action targets exactly one file; there are no
// directory-level operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::PlanError;

/// A structured, validated description of file operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Brief reasoning from the model. Shown to the user, never executed.
    pub thought: String,

    /// File operations, applied in this order. May be empty (no-op plan).
    pub actions: Vec<PlanAction>,
}

/// A single file operation.
///
/// Serialized with a `"type"` discriminator matching the wire contract
/// (`CREATE_FILE`, `UPDATE_FILE`, `DELETE_FILE`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum PlanAction {
    /// Create a file with the given full content.
    #[serde(rename = "CREATE_FILE")]
    CreateFile { path: String, content: String },

    /// Replace a file's full content.
    #[serde(rename = "UPDATE_FILE")]
    UpdateFile { path: String, content: String },

    /// Remove a file (recoverably, after confirmation).
    #[serde(rename = "DELETE_FILE")]
    DeleteFile { path: String },
}

/// The discriminator of a [`PlanAction`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

impl ActionKind {
    /// Map a wire `type` string to a kind. Unknown strings yield `None`.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "CREATE_FILE" => Some(ActionKind::Create),
            "UPDATE_FILE" => Some(ActionKind::Update),
            "DELETE_FILE" => Some(ActionKind::Delete),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            ActionKind::Create => "CREATE_FILE",
            ActionKind::Update => "UPDATE_FILE",
            ActionKind::Delete => "DELETE_FILE",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl PlanAction {
    /// Workspace-relative POSIX path this action targets.
    pub fn path(&self) -> &str {
        match self {
            PlanAction::CreateFile { path, .. }
            | PlanAction::UpdateFile { path, .. }
            | PlanAction::DeleteFile { path } => path,
        }
    }

    /// New full file content, for create/update actions.
    pub fn content(&self) -> Option<&str> {
        match self {
            PlanAction::CreateFile { content, .. } | PlanAction::UpdateFile { content, .. } => {
                Some(content)
            }
            PlanAction::DeleteFile { .. } => None,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            PlanAction::CreateFile { .. } => ActionKind::Create,
            PlanAction::UpdateFile { .. } => ActionKind::Update,
            PlanAction::DeleteFile { .. } => ActionKind::Delete,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, PlanAction::DeleteFile { .. })
    }
}

impl ExecutionPlan {
    pub fn new(thought: impl Into<String>, actions: Vec<PlanAction>) -> Self {
        Self {
            thought: thought.into(),
            actions,
        }
    }

    /// A plan with no actions is valid and does nothing.
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }

    /// Number of delete actions in the plan.
    pub fn delete_count(&self) -> usize {
        self.actions.iter().filter(|a| a.is_delete()).count()
    }

    /// SHA-256 over the serialized plan, hex encoded.
    ///
    /// Identical plans always share a fingerprint, so log lines from the
    /// propose and apply steps can be correlated.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// User-selected file content injected verbatim into the prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    /// Workspace-relative path, as shown to the model.
    #[serde(rename = "filePath")]
    pub file_path: String,

    /// Full file text.
    pub content: String,
}

impl Attachment {
    pub fn new(file_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            content: content.into(),
        }
    }
}

/// Check that `path` is a safe workspace-relative POSIX path.
///
/// Rejects empty paths, absolute paths (including drive letters),
/// backslashes, NUL bytes, and any `..` component. `.` components are
/// tolerated but an all-`.` path is not.
pub fn validate_relative_path(path: &str) -> Result<(), PlanError> {
    let unsafe_path = |reason: &str| PlanError::UnsafePath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.trim().is_empty() {
        return Err(unsafe_path("path is empty"));
    }
    if path.contains('\0') {
        return Err(unsafe_path("path contains NUL"));
    }
    if path.contains('\\') {
        return Err(unsafe_path("path must use forward slashes"));
    }
    if path.starts_with('/') {
        return Err(unsafe_path("path must be relative"));
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return Err(unsafe_path("path must be relative"));
    }

    let mut has_normal = false;
    for component in path.split('/') {
        match component {
            ".." => return Err(unsafe_path("path escapes the workspace root")),
            "" | "." => {}
            _ => has_normal = true,
        }
    }
    if !has_normal {
        return Err(unsafe_path("path names no file"));
    }
    Ok(())
}
