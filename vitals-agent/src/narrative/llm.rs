//! OpenAI-compatible chat-completions narrator
//!
//! Works against any server speaking the `/v1/chat/completions` protocol
//! (Ollama, vLLM, OpenAI). JSON response mode is requested so the output
//! can be parsed strictly.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use vitals_common::config::NarrativeConfig;

use super::prompt::{message_prompt, trend_prompt, Prompt};
use super::{
    parse_message, parse_trend_analysis, MessageRequest, NarrativeError, NarrativeGenerator,
    TrendAnalysis, TrendRequest,
};

const USER_AGENT: &str = concat!("vitals-agent/", env!("CARGO_PKG_VERSION"));

pub struct LlmNarrator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl LlmNarrator {
    /// `api_key` is resolved by the caller (environment first, then TOML)
    pub fn new(config: &NarrativeConfig, api_key: Option<String>) -> Result<Self, NarrativeError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            // Outer workflow timeout is authoritative; this only bounds the socket
            .timeout(Duration::from_secs(config.timeout_seconds.max(1).saturating_mul(2)))
            .build()
            .map_err(|e| NarrativeError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, NarrativeError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: 0.3,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
            stream: false,
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(endpoint = %self.endpoint, model = %self.model, "Requesting chat completion");

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                NarrativeError::Unavailable(e.to_string())
            } else {
                NarrativeError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(NarrativeError::RequestFailed(format!("HTTP {}: {}", status, text)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| NarrativeError::Malformed(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| NarrativeError::Malformed("completion had no content".to_string()))
    }
}

#[async_trait]
impl NarrativeGenerator for LlmNarrator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn compose_message(&self, request: &MessageRequest) -> Result<String, NarrativeError> {
        let raw = self.complete(&message_prompt(request)?).await?;
        parse_message(&raw)
    }

    async fn analyze_trends(&self, request: &TrendRequest) -> Result<TrendAnalysis, NarrativeError> {
        let raw = self.complete(&trend_prompt(request)?).await?;
        parse_trend_analysis(&raw)
    }
}
