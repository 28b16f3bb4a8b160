// config.rs — Session configuration from .maou/config.toml.
//
// Every field has a serde default, so a missing file or a partial file both
// load cleanly. The auto-apply toggle is written back when it changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// What a new request does while a plan is awaiting approval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingPlanPolicy {
    /// Discard the pending plan with a notice and handle the new request.
    #[default]
    Supersede,
    /// Keep the pending plan and refuse the new request.
    Refuse,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaouConfig {
    /// Apply validated plans without review.
    #[serde(default)]
    pub auto_apply: bool,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_available_models")]
    pub available_models: Vec<String>,

    #[serde(default)]
    pub pending_plan_policy: PendingPlanPolicy,

    /// Glob patterns hidden from the attachment picker.
    #[serde(default = "default_attach_exclude")]
    pub attach_exclude: Vec<String>,

    /// Where trashed files go, relative to the workspace root.
    #[serde(default = "default_trash_dir")]
    pub trash_dir: String,

    #[serde(default = "default_preview_scheme")]
    pub preview_scheme: String,

    /// Base URL of the model API.
    #[serde(default = "default_model_endpoint")]
    pub model_endpoint: String,
}

impl Default for MaouConfig {
    fn default() -> Self {
        Self {
            auto_apply: false,
            default_model: default_model(),
            available_models: default_available_models(),
            pending_plan_policy: PendingPlanPolicy::default(),
            attach_exclude: default_attach_exclude(),
            trash_dir: default_trash_dir(),
            preview_scheme: default_preview_scheme(),
            model_endpoint: default_model_endpoint(),
        }
    }
}

// Serde default functions
fn default_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_available_models() -> Vec<String> {
    vec!["gemini-2.5-pro".to_string(), "gemini-2.5-flash".to_string()]
}

fn default_attach_exclude() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "**/.git/**".to_string(),
        ".maou/**".to_string(),
    ]
}

fn default_trash_dir() -> String {
    maou_workspace::DEFAULT_TRASH_DIR.to_string()
}

fn default_preview_scheme() -> String {
    maou_workspace::DEFAULT_PREVIEW_SCHEME.to_string()
}

fn default_model_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

impl MaouConfig {
    /// Standard config location for a project: `<root>/.maou/config.toml`.
    pub fn path_for_project(project_root: impl AsRef<Path>) -> PathBuf {
        project_root.as_ref().join(".maou").join("config.toml")
    }

    /// Load the project's config, or defaults when none exists.
    pub fn for_project(project_root: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = Self::path_for_project(project_root);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let content = std::fs::read_to_string(path).map_err(|e| config_error(path, e))?;
        toml::from_str(&content).map_err(|e| config_error(path, e))
    }

    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| config_error(parent, e))?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| config_error(path, e))?;
        std::fs::write(path, content).map_err(|e| config_error(path, e))
    }

    pub fn is_known_model(&self, model: &str) -> bool {
        self.available_models.iter().any(|m| m == model)
    }
}

fn config_error(path: &Path, err: impl std::fmt::Display) -> SessionError {
    SessionError::Config {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
