// prompt.rs — Builds the model prompt that asks for a JSON change plan.
//
// The prompt is a pure function of the user request and the attachments:
// role instructions, one labeled block per attached file, the request, and
// the fixed schema. No I/O happens here.

use crate::plan::Attachment;

/// The schema text embedded in every prompt.
pub const PLAN_SCHEMA: &str = r#"{
  "thought": string, // brief reasoning
  "actions": [
    { "type": "CREATE_FILE", "path": string, "content": string },
    { "type": "UPDATE_FILE", "path": string, "content": string },
    { "type": "DELETE_FILE", "path": string }
  ]
}"#;

/// Builds plan prompts for a named assistant persona.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    assistant_name: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new("Maou")
    }
}

impl PromptBuilder {
    pub fn new(assistant_name: impl Into<String>) -> Self {
        Self {
            assistant_name: assistant_name.into(),
        }
    }

    /// Turn a user request plus attached files into a model prompt.
    pub fn build_plan_prompt(&self, user_request: &str, attachments: &[Attachment]) -> String {
        let instructions = format!(
            "You are {}, an expert software agent working inside the user's workspace. \
             Convert the user's request into a deterministic plan.\n\
             Rules:\n\
             - ONLY return a JSON object following the exact schema, no prose.\n\
             - Paths must be workspace-relative and use forward slashes.\n\
             - For UPDATE_FILE, provide the full new file content.\n\
             - Do not include comments in JSON.\n\
             - If no file changes are needed, return an empty actions array.\n",
            self.assistant_name
        );

        let files_section = attachments
            .iter()
            .map(render_attachment)
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut sections = vec![instructions];
        if !files_section.is_empty() {
            sections.push(format!("Context files:\n{}", files_section));
        }
        sections.push(format!("User request:\n{}", user_request));
        sections.push(format!("JSON schema:\n{}", PLAN_SCHEMA));
        sections.push("Return ONLY the JSON.".to_string());

        sections.join("\n\n")
    }
}

/// Shorthand for `PromptBuilder::default().build_plan_prompt(..)`.
pub fn build_plan_prompt(user_request: &str, attachments: &[Attachment]) -> String {
    PromptBuilder::default().build_plan_prompt(user_request, attachments)
}

fn render_attachment(attachment: &Attachment) -> String {
    format!(
        "FILE: {}\n-----\n{}\n-----",
        attachment.file_path, attachment.content
    )
}
