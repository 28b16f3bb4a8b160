//! # maou-workspace
//!
//! Everything between a validated plan and the files on disk.
//!
//! - [`Workspace`] — the host abstraction (reads, batch edit, trash)
//! - [`LocalWorkspace`] — on-disk host with staged, precondition-checked commits
//! - [`PlanPreparer`] — plan to [`PreparedEdit`], read-only
//! - [`DiffPreviewer`] — one diff view per proposed edit via a [`DiffPresenter`]
//! - [`ApplyExecutor`] — batch commit plus per-path confirmed deletion
//!
//! Nothing in this crate mutates the workspace except
//! [`ApplyExecutor::apply`] and [`ApplyExecutor::confirm_and_delete`].

pub mod apply;
pub mod error;
pub mod host;
pub mod local;
pub mod prepare;
pub mod preview;

pub use apply::{ApplyExecutor, ChannelError, DeleteConfirmer, DeleteOutcome, DeleteReport};
pub use error::WorkspaceError;
pub use host::{resolve_in, Workspace};
pub use local::{LocalWorkspace, DEFAULT_TRASH_DIR};
pub use prepare::{content_hash, EditBatch, FileEdit, PlanPreparer, PreparedEdit};
pub use preview::{
    file_uri, preview_key, unified_diff, DiffPresenter, DiffPreviewer, DiffView, PreviewStore,
    TextDiffPresenter, DEFAULT_PREVIEW_SCHEME,
};
