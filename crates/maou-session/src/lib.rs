//! # maou-session
//!
//! The plan session: a state machine that turns chat messages into model
//! requests, validated plans, previews, and applied workspace edits.
//!
//! - [`PlanSession`] — owns the pending plan, attachments, model and auto-apply flag
//! - [`InboundEvent`] / [`OutboundEvent`] — the UI protocol
//! - [`CredentialProvider`] / [`LanguageModel`] — external collaborators
//! - [`MaouConfig`] — `.maou/config.toml`
//! - [`TerminalChannel`] — line-based delete confirmation and file picking

pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod session;
pub mod state;
pub mod terminal;

pub use config::{MaouConfig, PendingPlanPolicy};
pub use error::{ModelError, SessionError};
pub use events::{EventDispatcher, EventSink, InboundEvent, JsonLinesSink, OutboundEvent};
pub use model::{CancelToken, CredentialProvider, LanguageModel};
pub use session::{FilePicker, HostPorts, PendingPlan, PlanSession};
pub use state::SessionPhase;
pub use terminal::TerminalChannel;
