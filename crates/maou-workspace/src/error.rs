// error.rs — Error types for the workspace subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while preparing, previewing, or applying a plan.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No workspace root is open, so paths cannot be resolved.
    #[error("no workspace folder open")]
    NoWorkspace,

    /// A plan path would resolve outside the workspace root.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// The requested file does not exist in the workspace.
    #[error("file not found in workspace: '{path}'")]
    FileNotFound { path: String },

    /// The path names a directory; only single files are handled.
    #[error("not a regular file: '{path}'")]
    NotAFile { path: String },

    /// The host refused or failed to commit the edit batch.
    #[error("failed to apply workspace edit ({files} file(s) in batch)")]
    ApplyRejected { files: usize },

    /// The diff presenter could not show a preview.
    #[error("preview error: {0}")]
    Preview(String),
}

impl From<maou_plan::PlanError> for WorkspaceError {
    fn from(err: maou_plan::PlanError) -> Self {
        match err {
            maou_plan::PlanError::UnsafePath { path, reason } => {
                WorkspaceError::InvalidPath { path, reason }
            }
            other => WorkspaceError::InvalidPath {
                path: String::new(),
                reason: other.to_string(),
            },
        }
    }
}
