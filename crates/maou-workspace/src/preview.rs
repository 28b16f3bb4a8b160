// preview.rs — Side-by-side previews of a prepared plan.
//
// Proposed content lives in an in-memory PreviewStore, addressed by a
// preview key derived from the target's file URI. A DiffPresenter receives
// one DiffView per edit and decides how to show it: an editor diff tab, a
// terminal unified diff, or nothing at all in tests.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::WorkspaceError;
use crate::prepare::PreparedEdit;

/// Scheme used for preview keys unless configured otherwise.
pub const DEFAULT_PREVIEW_SCHEME: &str = "maou-preview";

/// Lines of unchanged context shown around a change.
const CONTEXT_LINES: usize = 3;

/// In-memory proposed content, keyed by preview key.
///
/// Shared between the session (which fills it during preparation) and the
/// presenter (which reads it back). Entries live only as long as the plan
/// they preview; the owner clears them when that plan is applied or dropped.
#[derive(Debug)]
pub struct PreviewStore {
    scheme: String,
    entries: Mutex<HashMap<String, String>>,
}

impl PreviewStore {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn set(&self, key: impl Into<String>, content: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.into(), content.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key)
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PreviewStore {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_SCHEME)
    }
}

/// `file://` URI for an absolute path, with forward slashes.
pub fn file_uri(path: &Path) -> String {
    let posix = path.to_string_lossy().replace('\\', "/");
    if posix.starts_with('/') {
        format!("file://{}", posix)
    } else {
        format!("file:///{}", posix)
    }
}

/// Deterministic preview key: `<scheme>://<base64url(file uri)>`.
pub fn preview_key(scheme: &str, target: &Path) -> String {
    format!("{}://{}", scheme, URL_SAFE_NO_PAD.encode(file_uri(target)))
}

/// Everything a presenter needs to show one file's proposed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffView {
    pub title: String,
    pub path: String,
    pub old_ref: String,
    pub new_ref: String,
    pub old_content: String,
    pub new_content: String,
    pub is_create: bool,
}

/// Host-side diff display.
pub trait DiffPresenter: Send + Sync {
    fn show_diff(&self, view: &DiffView) -> Result<(), WorkspaceError>;
}

/// Opens one diff per non-delete edit of a prepared plan.
pub struct DiffPreviewer<'a> {
    presenter: &'a dyn DiffPresenter,
    previews: &'a PreviewStore,
}

impl<'a> DiffPreviewer<'a> {
    pub fn new(presenter: &'a dyn DiffPresenter, previews: &'a PreviewStore) -> Self {
        Self {
            presenter,
            previews,
        }
    }

    /// Show every edit in batch order. Deletes get no preview.
    ///
    /// Returns the number of diffs opened.
    pub fn preview_diffs(&self, prepared: &PreparedEdit) -> Result<usize, WorkspaceError> {
        for edit in prepared.batch.iter() {
            let new_content = self
                .previews
                .get(edit.preview_key())
                .unwrap_or_else(|| edit.content().to_string());
            let view = DiffView {
                title: format!("Maou Preview: {}", edit.path()),
                path: edit.path().to_string(),
                old_ref: edit.old_ref(),
                new_ref: edit.preview_key().to_string(),
                old_content: edit.old_content().to_string(),
                new_content,
                is_create: edit.is_create(),
            };
            self.presenter.show_diff(&view)?;
        }
        tracing::debug!(diffs = prepared.batch.len(), "previews shown");
        Ok(prepared.batch.len())
    }
}

/// Writes unified diffs to a terminal (or any writer).
pub struct TextDiffPresenter {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl TextDiffPresenter {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }
}

impl DiffPresenter for TextDiffPresenter {
    fn show_diff(&self, view: &DiffView) -> Result<(), WorkspaceError> {
        let rendered = format!(
            "=== {} ===\n{}",
            view.title,
            unified_diff(&view.path, &view.old_content, &view.new_content, view.is_create)
        );
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| WorkspaceError::Preview("presenter lock poisoned".to_string()))?;
        writer
            .write_all(rendered.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| WorkspaceError::Preview(e.to_string()))
    }
}

/// Single-hunk unified diff covering the changed region.
///
/// Common leading and trailing lines are trimmed, then everything between is
/// shown as removed-then-added with a few lines of context on each side.
pub fn unified_diff(path: &str, old: &str, new: &str, is_create: bool) -> String {
    let old_label = if is_create {
        "/dev/null".to_string()
    } else {
        format!("a/{}", path)
    };
    let mut out = format!("--- {}\n+++ b/{}\n", old_label, path);

    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let prefix = old_lines
        .iter()
        .zip(&new_lines)
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = old_lines.len().min(new_lines.len()) - prefix;
    let suffix = old_lines
        .iter()
        .rev()
        .zip(new_lines.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    if prefix == old_lines.len() && prefix == new_lines.len() {
        out.push_str("(no changes)\n");
        return out;
    }

    let ctx_start = prefix.saturating_sub(CONTEXT_LINES);
    let old_change_end = old_lines.len() - suffix;
    let new_change_end = new_lines.len() - suffix;
    let old_ctx_end = (old_change_end + CONTEXT_LINES).min(old_lines.len());
    let trailing = old_ctx_end - old_change_end;
    let new_ctx_end = new_change_end + trailing;

    let old_len = old_ctx_end - ctx_start;
    let new_len = new_ctx_end - ctx_start;
    out.push_str(&format!(
        "@@ -{},{} +{},{} @@\n",
        hunk_start(ctx_start, old_len),
        old_len,
        hunk_start(ctx_start, new_len),
        new_len
    ));

    for line in &old_lines[ctx_start..prefix] {
        out.push_str(&format!(" {}\n", line));
    }
    for line in &old_lines[prefix..old_change_end] {
        out.push_str(&format!("-{}\n", line));
    }
    for line in &new_lines[prefix..new_change_end] {
        out.push_str(&format!("+{}\n", line));
    }
    for line in &old_lines[old_change_end..old_ctx_end] {
        out.push_str(&format!(" {}\n", line));
    }
    out
}

fn hunk_start(offset: usize, len: usize) -> usize {
    if len == 0 {
        offset
    } else {
        offset + 1
    }
}
