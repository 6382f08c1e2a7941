use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::app::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::models::provider::{
    ChatRequest, ChatResponse, Message, MessageRole, ModelProvider, TokenUsage,
};

/// Chat-completions client for any OpenAI-compatible endpoint. The base URL
/// and model come from [`ProviderConfig`], so the deployment can point at
/// OpenAI, DeepSeek, or a self-hosted gateway without code changes.
pub struct OpenAiProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn create_headers(&self) -> Result<HeaderMap> {
        // A missing credential is a standing misconfiguration: fail closed
        // before any network I/O so the caller can fall back immediately.
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::provider_auth("API_KEY is not configured"))?;

        let mut headers = HeaderMap::new();
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| Error::provider_auth(format!("Invalid API key format: {}", e)))?;
        headers.insert(AUTHORIZATION, auth_value);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(headers)
    }

    fn convert_messages(&self, messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|msg| WireMessage {
                role: match msg.role {
                    MessageRole::User => "user".to_string(),
                    MessageRole::Assistant => "assistant".to_string(),
                    MessageRole::System => "system".to_string(),
                },
                content: msg.content.clone(),
            })
            .collect()
    }

    fn classify_status(status: StatusCode, body: &str) -> Error {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Error::provider_auth(format!("API error {}: {}", status, body))
            }
            _ => Error::unavailable_with_status(
                format!("API error {}: {}", status, body),
                status.as_u16(),
            ),
        }
    }

    async fn make_request(&self, request: &ChatRequest) -> Result<CompletionsResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let headers = self.create_headers()?;

        let wire_request = CompletionsRequest {
            model: request.model.clone(),
            messages: self.convert_messages(&request.messages),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(
            "Sending completion request: model={}, messages={}",
            request.model,
            request.messages.len()
        );

        let start_time = Instant::now();

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("HTTP request failed: {}", e)))?;

        debug!("Completion request finished in {:?}", start_time.elapsed());

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                error!("Provider rejected credentials: {} - {}", status, error_text);
            } else {
                warn!("Provider API error: {} - {}", status, error_text);
            }
            return Err(Self::classify_status(status, &error_text));
        }

        let completions: CompletionsResponse = response
            .json()
            .await
            .map_err(|e| Error::malformed(format!("Failed to parse response body: {}", e)))?;

        debug!("Received completion: id={}", completions.id);
        Ok(completions)
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse> {
        let response = self.make_request(&request).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::malformed("No choices in completion response"))?;

        let usage = response
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens));

        Ok(ChatResponse {
            id: response.id,
            request_id: request.id,
            model: response.model,
            content: choice.message.content,
            created_at: Utc::now(),
            usage,
            finish_reason: choice.finish_reason,
        })
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

// Wire structures for the chat-completions endpoint.
#[derive(Debug, Serialize)]
struct CompletionsRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionsResponse {
    id: String,
    model: String,
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
