// gemini.rs — HTTP language-model transport for the generateContent API.
//
// One blocking POST per request, bearer-token auth, no retries. The cancel
// token is checked before sending and again once the response arrives; the
// request itself is bounded by the client timeout.

use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::Client;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use maou_session::{CancelToken, LanguageModel, ModelError};

const REQUEST_TIMEOUT_SECS: u64 = 120;

pub struct HttpModel {
    client: Client,
    endpoint: String,
}

impl HttpModel {
    pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// `<endpoint>/models/<model>:generateContent`, with the model name
    /// percent-encoded as a single path segment.
    fn url_for(&self, model: &str) -> Result<Url, ModelError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| ModelError::Transport(format!("invalid endpoint '{}': {}", self.endpoint, e)))?;
        url.path_segments_mut()
            .map_err(|_| ModelError::Transport(format!("endpoint '{}' cannot take a path", self.endpoint)))?
            .pop_if_empty()
            .push("models")
            .push(&format!("{}:generateContent", model));
        Ok(url)
    }
}

impl LanguageModel for HttpModel {
    fn generate_text(
        &self,
        model: &str,
        access_token: &str,
        prompt: &str,
        cancel: &CancelToken,
    ) -> Result<String, ModelError> {
        cancel.check()?;
        let url = self.url_for(model)?;
        tracing::debug!(url = %url, "POST generateContent");

        let response = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(&GenerateRequest::for_prompt(prompt))
            .send()
            .map_err(|e| ModelError::Transport(e.to_string()))?;
        cancel.check()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| ModelError::Transport(format!("invalid response body: {}", e)))?;
        Ok(parsed.text())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

impl GenerateRequest {
    fn for_prompt(prompt: &str) -> Self {
        Self {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                top_k: 40,
                top_p: 0.95,
                max_output_tokens: 8192,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateResponse {
    /// Text parts of the first candidate, joined by newlines.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|p| p.text.as_deref().unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }
}
