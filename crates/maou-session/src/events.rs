// events.rs — The bidirectional event protocol between session and UI.
//
// Inbound events are what the UI layer sends (button clicks, chat input).
// Outbound events are what the session publishes for rendering. Both are
// closed sum types tagged by a `type` string on the wire, so an unknown event
// fails to decode instead of falling through a string switch.

use std::io::Write;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use maou_plan::ExecutionPlan;

use crate::error::SessionError;

/// Events sent from the UI to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundEvent {
    Ready,
    Login,
    Logout,
    Send {
        text: String,
    },
    /// Attach a file. Without `path` the host picker is asked.
    AttachFile {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    AcceptPlan,
    RejectPlan,
    SelectModel {
        model: String,
    },
    ToggleAutoApply {
        enabled: bool,
    },
    /// Abandon the in-flight model request, if any.
    Cancel,
}

/// Events published by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundEvent {
    #[serde(rename = "auth-state")]
    AuthState {
        #[serde(rename = "loggedIn")]
        logged_in: bool,
    },

    #[serde(rename = "chat:user")]
    ChatUser { text: String },

    #[serde(rename = "chat:assistant")]
    ChatAssistant { text: String },

    #[serde(rename = "plan")]
    Plan { plan: ExecutionPlan },

    #[serde(rename = "plan:await-approval")]
    PlanAwaitApproval,

    #[serde(rename = "attachment")]
    Attachment {
        #[serde(rename = "filePath")]
        file_path: String,
    },

    #[serde(rename = "model")]
    Model { model: String },

    #[serde(rename = "auto-apply")]
    AutoApply { enabled: bool },
}

impl OutboundEvent {
    pub fn assistant(text: impl Into<String>) -> Self {
        OutboundEvent::ChatAssistant { text: text.into() }
    }

    /// Wire name of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            OutboundEvent::AuthState { .. } => "auth-state",
            OutboundEvent::ChatUser { .. } => "chat:user",
            OutboundEvent::ChatAssistant { .. } => "chat:assistant",
            OutboundEvent::Plan { .. } => "plan",
            OutboundEvent::PlanAwaitApproval => "plan:await-approval",
            OutboundEvent::Attachment { .. } => "attachment",
            OutboundEvent::Model { .. } => "model",
            OutboundEvent::AutoApply { .. } => "auto-apply",
        }
    }
}

/// Receives outbound events.
///
/// Errors are logged by the session but never abort a flow.
pub trait EventSink: Send + Sync {
    fn send(&self, event: &OutboundEvent) -> Result<(), SessionError>;
}

/// Writes each event as one JSON line.
pub struct JsonLinesSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesSink {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl EventSink for JsonLinesSink {
    fn send(&self, event: &OutboundEvent) -> Result<(), SessionError> {
        let json = serde_json::to_string(event).map_err(|e| SessionError::Sink(e.to_string()))?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| SessionError::Sink("writer lock poisoned".to_string()))?;
        writeln!(writer, "{}", json)
            .and_then(|_| writer.flush())
            .map_err(|e| SessionError::Sink(e.to_string()))
    }
}

/// Fans events out to several sinks.
///
/// A failing sink is logged and skipped; the others still receive the event.
#[derive(Default)]
pub struct EventDispatcher {
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

impl EventSink for EventDispatcher {
    fn send(&self, event: &OutboundEvent) -> Result<(), SessionError> {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!(event = event.event_type(), error = %e, "event sink error");
            }
        }
        Ok(())
    }
}
