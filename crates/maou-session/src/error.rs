// error.rs — Error types for the session subsystem and its collaborators.

use std::path::PathBuf;

use thiserror::Error;

use maou_plan::PlanError;
use maou_workspace::{ChannelError, WorkspaceError};

/// Failures at the language-model / credential boundary.
#[derive(Debug, Error)]
pub enum ModelError {
    /// No valid session; the user has to log in first.
    #[error("authentication required: please log in")]
    AuthRequired,

    /// The model API answered with a non-success status.
    #[error("model API error: {status} {body}")]
    Api { status: u16, body: String },

    /// The request never produced an answer (connect, timeout, decode).
    #[error("model transport error: {0}")]
    Transport(String),

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,
}

/// Errors surfaced by [`crate::PlanSession`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Another plan flow is in flight on this session.
    #[error("session busy: another request is still being handled")]
    Busy,

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The model name is not one of the configured models.
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    /// Invalid phase transition.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Files changed on disk after the plan was previewed.
    #[error("changed since the preview was shown: {}", paths.join(", "))]
    PlanStale { paths: Vec<String> },

    /// An event sink could not deliver an event.
    #[error("event sink error: {0}")]
    Sink(String),

    /// Config file could not be read or written.
    #[error("config error at {path}: {reason}")]
    Config { path: PathBuf, reason: String },
}
