// model.rs — External collaborators: credentials and the language model.
//
// Both are traits so the session never depends on a particular provider or
// transport. Every model call carries a CancelToken; transports that cannot
// abort mid-flight still check it, and the session discards any result that
// arrives after cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ModelError;

/// Shared cancellation flag for one model request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once tripped, for `?` at checkpoints.
    pub fn check(&self) -> Result<(), ModelError> {
        if self.is_cancelled() {
            Err(ModelError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Source of access tokens for the model API.
pub trait CredentialProvider: Send + Sync {
    /// Whether a usable session exists right now.
    fn is_authenticated(&self) -> bool;

    /// Current access token, or [`ModelError::AuthRequired`].
    fn access_token(&self) -> Result<String, ModelError>;

    /// Start (or complete) a login flow.
    fn login(&self) -> Result<(), ModelError>;

    /// Forget stored credentials.
    fn logout(&self) -> Result<(), ModelError>;
}

/// Text-in, text-out language model transport. Single attempt, no retries.
pub trait LanguageModel: Send + Sync {
    fn generate_text(
        &self,
        model: &str,
        access_token: &str,
        prompt: &str,
        cancel: &CancelToken,
    ) -> Result<String, ModelError>;
}
