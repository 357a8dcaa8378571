//! Extraction backends.
//!
//! The pipeline talks to the language model through [`ExtractionBackend`],
//! so tests can substitute a deterministic mock. [`GatewayBackend`] is the
//! production implementation: an OpenAI-compatible chat completions endpoint
//! that returns the extraction record as JSON, optionally wrapped in a fenced
//! code block.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{DistillError, Result};
use crate::record::ExtractionRecord;

/// JSON schema sent to the model so it knows the shape of the record.
pub const RECORD_SCHEMA: &str = r#"{
  "type": "object",
  "properties": {
    "decisions": {"type": "array", "items": {"type": "object", "properties": {
      "summary": {"type": "string"}, "owner": {"type": "string"},
      "rationale": {"type": "string"}, "date": {"type": "string"}},
      "required": ["summary"]}},
    "ideas": {"type": "array", "items": {"type": "object", "properties": {
      "title": {"type": "string"}, "description": {"type": "string"},
      "category": {"type": "string"}}, "required": ["title"]}},
    "questions": {"type": "array", "items": {"type": "object", "properties": {
      "text": {"type": "string"}, "context": {"type": "string"},
      "owner": {"type": "string"}}, "required": ["text"]}},
    "action_items": {"type": "array", "items": {"type": "object", "properties": {
      "description": {"type": "string"}, "owner": {"type": "string"},
      "deadline": {"type": "string"}}, "required": ["description"]}},
    "concepts": {"type": "array", "items": {"type": "object", "properties": {
      "name": {"type": "string"}, "definition": {"type": "string"}},
      "required": ["name"]}},
    "terms": {"type": "array", "items": {"type": "object", "properties": {
      "term": {"type": "string"}, "definition": {"type": "string"},
      "context": {"type": "string"}}, "required": ["term"]}},
    "tldr": {"type": "string"}
  }
}"#;

/// One extraction call: system prompt plus a transcript chunk in, a typed
/// record out.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    async fn extract(&self, system_prompt: &str, user_prompt: &str) -> Result<ExtractionRecord>;
}

/// Chat-completions backend against an OpenAI-compatible gateway.
#[derive(Clone, Debug)]
pub struct GatewayBackend {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: Option<String>,
}

impl GatewayBackend {
    pub fn new(model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            model: model.into(),
            base_url: base_url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response: ChatResponse = builder.send().await?.error_for_status()?.json().await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| DistillError::backend("gateway returned no choices"))
    }
}

#[async_trait]
impl ExtractionBackend for GatewayBackend {
    #[instrument(skip_all, fields(model = %self.model, chunk_bytes = user_prompt.len()))]
    async fn extract(&self, system_prompt: &str, user_prompt: &str) -> Result<ExtractionRecord> {
        let response = self.generate(system_prompt, user_prompt).await?;
        let json = extract_json_block(&response)?;
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Pull the JSON payload out of a model response.
///
/// Accepts a ```json fenced block, a bare ``` fenced block, or raw JSON; the
/// candidate must parse as JSON before it is accepted.
pub fn extract_json_block(text: &str) -> Result<&str> {
    let text = text.trim();

    for fence in ["```json", "```"] {
        if let Some(start) = text.find(fence) {
            let body = &text[start + fence.len()..];
            if let Some(end) = body.find("```") {
                let candidate = body[..end].trim();
                serde_json::from_str::<serde::de::IgnoredAny>(candidate)?;
                return Ok(candidate);
            }
        }
    }

    serde_json::from_str::<serde::de::IgnoredAny>(text)?;
    Ok(text)
}

/// Render the extraction prompt by substituting the record schema and the
/// chunk text into the template.
pub fn render_prompt(template: &str, transcript: &str) -> String {
    template
        .replace("{schema}", RECORD_SCHEMA)
        .replace("{transcript}", transcript)
}
