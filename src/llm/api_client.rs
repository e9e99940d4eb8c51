use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::AiConfig;
use crate::error::AssistantError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One chat-completion call. Optional knobs are omitted from the wire body
/// when unset; the timeout applies to the whole request and is only used by
/// the connectivity test.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<Duration>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        ChatRequest {
            messages,
            temperature: None,
            max_tokens: None,
            timeout: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// Abstraction over the chat-completion endpoint. Enables testing the
/// batching and parsing layers with scripted backends.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sends one completion and returns the first choice's content.
    async fn complete(
        &self,
        config: &AiConfig,
        request: ChatRequest,
    ) -> Result<String, AssistantError>;
}

/// Backend that speaks the OpenAI chat-completions protocol over HTTP.
#[derive(Clone, Default)]
pub struct ApiClient {
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new() -> Self {
        ApiClient {
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn complete(
        &self,
        config: &AiConfig,
        request: ChatRequest,
    ) -> Result<String, AssistantError> {
        let url = config.chat_completions_url();
        let body = ChatCompletionBody {
            model: &config.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!("POST {url} ({} messages)", request.messages.len());

        let mut builder = self.http.post(&url).json(&body);
        if !config.api_key.is_empty() {
            builder = builder.bearer_auth(&config.api_key);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                AssistantError::Network("request timed out".to_string())
            } else {
                AssistantError::Network(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .and_then(|detail| detail.message)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(AssistantError::Api(message));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| AssistantError::Api(format!("invalid completion response: {err}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AssistantError::Api("no choices in completion response".to_string()))
    }
}
