// error.rs — Error types for plan extraction and validation.

use thiserror::Error;

/// Why model output could not be turned into an [`ExecutionPlan`](crate::ExecutionPlan).
///
/// Every variant means the same thing to the caller: the plan is invalid and
/// nothing was produced. The variants exist so the reason can be logged.
#[derive(Debug, Error)]
pub enum PlanError {
    /// No JSON object candidate was found anywhere in the text.
    #[error("no JSON object found in model output")]
    NoJsonFound,

    /// A candidate was found but is not valid JSON.
    #[error("plan JSON could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    /// The JSON decoded but does not have the plan shape.
    #[error("plan has invalid shape: {reason}")]
    Invalid { reason: String },

    /// An action path is empty, absolute, or escapes the workspace root.
    #[error("unsafe action path '{path}': {reason}")]
    UnsafePath { path: String, reason: String },
}

impl PlanError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        PlanError::Invalid {
            reason: reason.into(),
        }
    }
}
