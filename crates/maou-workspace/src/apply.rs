// apply.rs — Commits a prepared plan and runs confirmed deletions.
//
// Application is two-step: the non-delete batch is committed in one host
// call, then each delete path is confirmed individually and moved to the
// trash. Declining one delete does not affect the others.

use std::path::PathBuf;

use crate::error::WorkspaceError;
use crate::host::Workspace;
use crate::prepare::PreparedEdit;

/// Errors from an interactive confirmation or picker channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("channel closed")]
    Closed,

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Asks the user whether a single file may be deleted.
///
/// Implementations must ask about exactly one path per call and must not
/// offer an "apply to all" shortcut.
pub trait DeleteConfirmer: Send + Sync {
    /// `Ok(true)` only on explicit confirmation. Dismissal is a decline.
    fn confirm_delete(&self, path: &str) -> Result<bool, ChannelError>;
}

/// What happened to one delete path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Confirmed and moved to the trash.
    Trashed(PathBuf),
    /// The user declined (or dismissed) the confirmation.
    Declined,
    /// Confirmed but the removal failed.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub path: String,
    pub outcome: DeleteOutcome,
}

impl DeleteReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, DeleteOutcome::Failed(_))
    }
}

/// Performs the side-effecting half of a plan.
pub struct ApplyExecutor<'a, W: Workspace + ?Sized> {
    workspace: &'a W,
}

impl<'a, W: Workspace + ?Sized> ApplyExecutor<'a, W> {
    pub fn new(workspace: &'a W) -> Self {
        Self { workspace }
    }

    /// Commit the edit batch. An empty batch makes no host call.
    pub fn apply(&self, prepared: &PreparedEdit) -> Result<(), WorkspaceError> {
        if prepared.batch.is_empty() {
            return Ok(());
        }

        let files = prepared.batch.len();
        if self.workspace.apply_batch(&prepared.batch)? {
            tracing::info!(files, "workspace edit applied");
            Ok(())
        } else {
            tracing::warn!(files, "workspace edit rejected by host");
            Err(WorkspaceError::ApplyRejected { files })
        }
    }

    /// Confirm and trash each path, one at a time, in order.
    ///
    /// Never fails as a whole: every path gets a report.
    pub fn confirm_and_delete(
        &self,
        paths: &[String],
        confirmer: &dyn DeleteConfirmer,
    ) -> Vec<DeleteReport> {
        paths
            .iter()
            .map(|path| DeleteReport {
                path: path.clone(),
                outcome: self.delete_one(path, confirmer),
            })
            .collect()
    }

    fn delete_one(&self, path: &str, confirmer: &dyn DeleteConfirmer) -> DeleteOutcome {
        let confirmed = match confirmer.confirm_delete(path) {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "delete confirmation failed; treating as declined");
                false
            }
        };
        if !confirmed {
            tracing::info!(path = %path, "delete declined");
            return DeleteOutcome::Declined;
        }

        match self.workspace.trash(path) {
            Ok(dest) => {
                tracing::info!(path = %path, trash = %dest.display(), "file moved to trash");
                DeleteOutcome::Trashed(dest)
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "delete failed");
                DeleteOutcome::Failed(e.to_string())
            }
        }
    }
}
