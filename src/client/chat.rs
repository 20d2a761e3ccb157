//! Direct client for OpenAI-style chat completion endpoints
//!
//! Panel AI queries go straight from the browser to the configured agent,
//! remote or local, without passing through the analysis backend.

use serde::{Deserialize, Serialize};

use crate::client::{fetch_value, json_request, ClientError};
use crate::models::ChatProfile;

pub const CHAT_TEMPERATURE: f64 = 0.7;
pub const CHAT_MAX_TOKENS: u32 = 2000;

#[derive(Serialize, Debug)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize, Debug)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: String,
}

fn extract_content(value: serde_json::Value) -> Result<String, ClientError> {
    let parsed: CompletionResponse =
        serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| ClientError::Decode("completion had no choices".to_string()))
}

/// Single-turn completions against one agent profile.
#[derive(Clone, Debug)]
pub struct CompletionsClient {
    profile: ChatProfile,
}

impl CompletionsClient {
    /// Fails when the profile has no endpoint or model configured.
    pub fn new(profile: ChatProfile) -> Result<Self, ClientError> {
        if profile.base_url.trim().is_empty() || profile.model.trim().is_empty() {
            return Err(ClientError::NotConfigured);
        }
        Ok(Self { profile })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.profile.base_url.trim_end_matches('/')
        )
    }

    /// Send one user message and return the first choice's content.
    pub async fn complete(&self, prompt: &str) -> Result<String, ClientError> {
        let body = serde_json::to_value(CompletionRequest {
            model: &self.profile.model,
            messages: vec![WireMessage {
                role: "user",
                content: prompt,
            }],
            temperature: CHAT_TEMPERATURE,
            max_tokens: CHAT_MAX_TOKENS,
        })
        .map_err(|e| ClientError::Decode(e.to_string()))?;

        let request = json_request("POST", &self.endpoint(), Some(&body))?;
        request
            .headers()
            .set(
                "Authorization",
                &format!("Bearer {}", self.profile.api_key),
            )
            .map_err(|_| ClientError::Network("could not set auth header".to_string()))?;

        extract_content(fetch_value(request).await?)
    }
}
