//! Async client for OpenAI-compatible chat completion APIs (Groq, OpenAI, local proxies)

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::agents::{ChatMessage, LlmClient, LlmError, MessageRole};
use crate::config::LlmConfig;

// -- Shared request/response types --

#[derive(Debug, Serialize)]
pub struct OpenAIChatRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    pub stream: bool,
    pub temperature: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIChatResponse {
    pub choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    pub message: OpenAIChoiceMessage,
}

/// Content may be null on some providers when the model refuses
#[derive(Debug, Deserialize)]
pub struct OpenAIChoiceMessage {
    pub content: Option<String>,
}

// -- Conversion helpers --

/// Converts internal `ChatMessage` list to OpenAI-compatible messages
pub fn convert_messages(messages: &[ChatMessage]) -> Vec<OpenAIMessage> {
    messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
            };

            OpenAIMessage {
                role: role.to_string(),
                content: msg.content.clone(),
            }
        })
        .collect()
}

/// Extracts the assistant reply from an OpenAI-style response
pub fn extract_reply(response: OpenAIChatResponse, provider: &str) -> Result<String, LlmError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| LlmError::Other(format!("{} response missing content", provider)))
}

/// Maps a non-success HTTP status to the matching failure kind
pub fn map_status(status: StatusCode, details: &str) -> LlmError {
    let message = format!("{} {}", status, details.trim());
    match status {
        StatusCode::PAYLOAD_TOO_LARGE => LlmError::PayloadTooLarge(message),
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited(message),
        _ => LlmError::Other(message),
    }
}

/// Completion client bound to one model on one OpenAI-compatible endpoint
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAiCompatClient {
    pub fn new(config: &LlmConfig) -> color_eyre::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn map_transport_error(&self, error: &reqwest::Error) -> LlmError {
        if error.is_timeout() {
            LlmError::Timeout(self.timeout_secs)
        } else if error.is_connect() || error.is_request() {
            LlmError::ConnectionFailed(error.to_string())
        } else {
            LlmError::Other(error.to_string())
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String, LlmError> {
        let request = OpenAIChatRequest {
            model: self.model.clone(),
            messages: convert_messages(messages),
            stream: false,
            temperature,
        };

        debug!(model = %self.model, messages = messages.len(), "sending completion request");
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|error| self.map_transport_error(&error))?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            warn!(%status, "completion request rejected");
            return Err(map_status(status, &details));
        }

        let payload: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|error| LlmError::Other(format!("invalid completion body: {}", error)))?;
        extract_reply(payload, &self.model)
    }
}
