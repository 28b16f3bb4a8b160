//! # maou-plan
//!
//! The structured change plan at the heart of Maou.
//!
//! A language model is asked (via [`PromptBuilder`]) to answer with a JSON
//! [`ExecutionPlan`]: a short `thought` plus an ordered list of file
//! operations. Model output is free-form text, so [`parse_plan_from_model_text`]
//! digs the JSON payload out of prose or code fences and validates its shape
//! before anything downstream is allowed to touch the workspace.
//!
//! The wire format:
//!
//! ```json
//! { "thought": "...",
//!   "actions": [
//!     { "type": "CREATE_FILE", "path": "src/a.rs", "content": "..." },
//!     { "type": "UPDATE_FILE", "path": "src/b.rs", "content": "..." },
//!     { "type": "DELETE_FILE", "path": "old.txt" } ] }
//! ```

pub mod error;
pub mod parser;
pub mod plan;
pub mod prompt;

pub use error::PlanError;
pub use parser::{extract_plan_json, parse_plan_from_model_text};
pub use plan::{validate_relative_path, ActionKind, Attachment, ExecutionPlan, PlanAction};
pub use prompt::{build_plan_prompt, PromptBuilder, PLAN_SCHEMA};
