// credentials.rs — Access-token provider backed by an env var and a token file.
//
// The token comes from MAOU_ACCESS_TOKEN when set, otherwise from
// `<config dir>/maou/token`. Login copies the env token into the file so later
// runs work without it; logout removes the file and ignores the env token for
// the rest of the process.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use maou_session::{CredentialProvider, ModelError};

/// Environment variable holding a bearer token for the model API.
pub const TOKEN_ENV: &str = "MAOU_ACCESS_TOKEN";

pub struct TokenCredentials {
    env_token: Option<String>,
    token_path: Option<PathBuf>,
    signed_out: AtomicBool,
}

impl TokenCredentials {
    pub fn from_env() -> Self {
        Self::new(
            std::env::var(TOKEN_ENV).ok(),
            dirs::config_dir().map(|dir| dir.join("maou").join("token")),
        )
    }

    /// Explicit sources, so tests don't have to touch the process environment.
    pub fn new(env_token: Option<String>, token_path: Option<PathBuf>) -> Self {
        Self {
            env_token: env_token
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            token_path,
            signed_out: AtomicBool::new(false),
        }
    }

    fn stored_token(&self) -> Option<String> {
        let path = self.token_path.as_ref()?;
        let raw = std::fs::read_to_string(path).ok()?;
        let token = raw.trim();
        (!token.is_empty()).then(|| token.to_string())
    }

    fn current_token(&self) -> Option<String> {
        if self.signed_out.load(Ordering::SeqCst) {
            return self.stored_token();
        }
        self.env_token.clone().or_else(|| self.stored_token())
    }

    fn store(&self, token: &str) -> Result<(), ModelError> {
        let Some(path) = &self.token_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| store_error(path, e))?;
        }
        write_private(path, token).map_err(|e| store_error(path, e))?;
        tracing::info!(path = %path.display(), "stored access token");
        Ok(())
    }
}

/// Owner read/write only; an existing file is narrowed too.
#[cfg(unix)]
fn write_private(path: &Path, token: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(token.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, token: &str) -> std::io::Result<()> {
    std::fs::write(path, token)
}

fn store_error(path: &Path, e: std::io::Error) -> ModelError {
    ModelError::Transport(format!("could not store token at {}: {}", path.display(), e))
}

impl CredentialProvider for TokenCredentials {
    fn is_authenticated(&self) -> bool {
        self.current_token().is_some()
    }

    fn access_token(&self) -> Result<String, ModelError> {
        self.current_token().ok_or(ModelError::AuthRequired)
    }

    fn login(&self) -> Result<(), ModelError> {
        self.signed_out.store(false, Ordering::SeqCst);
        match &self.env_token {
            Some(token) => self.store(token),
            None if self.stored_token().is_some() => Ok(()),
            None => {
                tracing::warn!("no access token; set {} and log in again", TOKEN_ENV);
                Err(ModelError::AuthRequired)
            }
        }
    }

    fn logout(&self) -> Result<(), ModelError> {
        self.signed_out.store(true, Ordering::SeqCst);
        if let Some(path) = &self.token_path {
            if path.exists() {
                std::fs::remove_file(path).map_err(|e| {
                    ModelError::Transport(format!("could not remove {}: {}", path.display(), e))
                })?;
            }
        }
        Ok(())
    }
}
