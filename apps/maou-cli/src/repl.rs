// repl.rs — Slash-command parsing and human-readable event rendering.
//
// Plain lines become chat messages; lines starting with `/` map onto the
// other inbound events. `TextSink` is the terminal counterpart of the
// JSON-lines sink.

use std::io::Write;
use std::sync::Mutex;

use maou_plan::PlanAction;
use maou_session::{EventSink, InboundEvent, OutboundEvent, SessionError};

pub const HELP: &str = "\
Commands:
  <text>            ask for a change plan
  /accept           apply the plan awaiting approval
  /reject           discard the plan awaiting approval
  /attach [path]    attach a workspace file (pick from a list without a path)
  /model <name>     switch model
  /auto on|off      toggle auto-apply
  /cancel           abandon the request in flight
  /login, /logout   manage the access token
  /help             show this help
  /quit             exit";

#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand {
    Event(InboundEvent),
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<ReplCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(ReplCommand::Event(InboundEvent::Send {
            text: line.to_string(),
        }));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let event = match (name, arg) {
        ("accept", _) => InboundEvent::AcceptPlan,
        ("reject", _) => InboundEvent::RejectPlan,
        ("attach", "") => InboundEvent::AttachFile { path: None },
        ("attach", path) => InboundEvent::AttachFile {
            path: Some(path.to_string()),
        },
        ("model", model) if !model.is_empty() => InboundEvent::SelectModel {
            model: model.to_string(),
        },
        ("auto", "on") => InboundEvent::ToggleAutoApply { enabled: true },
        ("auto", "off") => InboundEvent::ToggleAutoApply { enabled: false },
        ("cancel", _) => InboundEvent::Cancel,
        ("login", _) => InboundEvent::Login,
        ("logout", _) => InboundEvent::Logout,
        ("quit" | "exit", _) => return Some(ReplCommand::Quit),
        _ => return Some(ReplCommand::Help),
    };
    Some(ReplCommand::Event(event))
}

/// Whether a raw input line asks to cancel. Checked on the reader thread so
/// a cancel gets through while the session is busy.
pub fn is_cancel(line: &str, json: bool) -> bool {
    if json {
        matches!(
            serde_json::from_str::<InboundEvent>(line),
            Ok(InboundEvent::Cancel)
        )
    } else {
        line.trim() == "/cancel"
    }
}

/// Renders outbound events as plain text.
pub struct TextSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl TextSink {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

pub fn render(event: &OutboundEvent) -> Option<String> {
    let text = match event {
        // Already on screen as typed.
        OutboundEvent::ChatUser { .. } => return None,
        OutboundEvent::AuthState { logged_in: true } => "[auth] logged in".to_string(),
        OutboundEvent::AuthState { logged_in: false } => {
            "[auth] logged out (set MAOU_ACCESS_TOKEN, then /login)".to_string()
        }
        OutboundEvent::ChatAssistant { text } => format!("maou> {}", text),
        OutboundEvent::Plan { plan } => {
            let mut out = format!("Plan: {}", plan.thought);
            if plan.actions.is_empty() {
                out.push_str("\n  (no file changes)");
            }
            for action in &plan.actions {
                let marker = match action {
                    PlanAction::CreateFile { .. } => '+',
                    PlanAction::UpdateFile { .. } => '~',
                    PlanAction::DeleteFile { .. } => '-',
                };
                out.push_str(&format!("\n  {} {}", marker, action.path()));
            }
            out
        }
        OutboundEvent::PlanAwaitApproval => {
            "Review the diffs above, then /accept or /reject.".to_string()
        }
        OutboundEvent::Attachment { file_path } => format!("[attached] {}", file_path),
        OutboundEvent::Model { model } => format!("[model] {}", model),
        OutboundEvent::AutoApply { enabled } => {
            format!("[auto-apply] {}", if *enabled { "on" } else { "off" })
        }
    };
    Some(text)
}

impl EventSink for TextSink {
    fn send(&self, event: &OutboundEvent) -> Result<(), SessionError> {
        let Some(text) = render(event) else {
            return Ok(());
        };
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| SessionError::Sink("text sink poisoned".into()))?;
        writeln!(writer, "{}", text).map_err(|e| SessionError::Sink(e.to_string()))?;
        writer.flush().map_err(|e| SessionError::Sink(e.to_string()))
    }
}
