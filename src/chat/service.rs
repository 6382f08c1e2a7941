use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::app::config::ProviderConfig;
use crate::chat::parse::parse_reply;
use crate::chat::prompt::build_system_prompt;
use crate::chat::types::{AiResponse, FailureKind, ResponseReport, ResponseSchema};
use crate::error::{Error, Result};
use crate::models::{
    ChatRequest, Message, ModelProvider, OpenAiProvider, RetryConfig, RetryPolicy,
};

/// Fixed reply used whenever the provider cannot produce one. Returned
/// byte-identical on every activation so outages stay indistinguishable to
/// the end user.
const FALLBACK_MESSAGE: &str = "I'm having trouble reaching the support service \
right now. Please try again in a few moments. I'm here to listen whenever \
you're ready.";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Messages longer than this are rejected as invalid input rather than
    /// truncated, to bound provider cost and latency.
    pub max_message_chars: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub retry: RetryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 4000,
            temperature: 0.7,
            max_tokens: 512,
            retry: RetryConfig::default(),
        }
    }
}

/// Turns a raw user message into a structured counseling reply. Stateless
/// across calls: everything it holds is immutable after construction, so
/// concurrent requests share nothing and never contend.
pub struct ResponseOrchestrator {
    provider: Arc<dyn ModelProvider>,
    model: String,
    schema: ResponseSchema,
    system_prompt: String,
    config: OrchestratorConfig,
    retry: RetryPolicy,
}

impl ResponseOrchestrator {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        model: impl Into<String>,
        schema: ResponseSchema,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        schema.validate()?;
        let system_prompt = build_system_prompt(&schema);
        let retry = RetryPolicy::new(config.retry.clone());

        Ok(Self {
            provider,
            model: model.into(),
            schema,
            system_prompt,
            config,
            retry,
        })
    }

    /// Builds an orchestrator backed by the OpenAI-compatible provider
    /// described by `provider_config`. Constructible without a credential;
    /// calls then fail closed onto the fallback reply.
    pub fn from_provider_config(
        provider_config: &ProviderConfig,
        schema: ResponseSchema,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        provider_config.validate()?;
        let provider = Arc::new(OpenAiProvider::new(provider_config)?);
        Self::new(provider, provider_config.model.clone(), schema, config)
    }

    /// The user-facing contract: always a coherent reply for valid input.
    /// Only [`Error::InvalidInput`] propagates; every provider-side failure
    /// is absorbed into the fallback reply and logged.
    pub async fn generate_response(&self, message: &str) -> Result<AiResponse> {
        self.generate_with_report(message)
            .await
            .map(|report| report.response)
    }

    /// Like [`Self::generate_response`] but keeps the per-attempt audit
    /// trail and the absorbed failure kind for operators.
    pub async fn generate_with_report(&self, message: &str) -> Result<ResponseReport> {
        let message = self.validate_message(message)?;

        let request = ChatRequest::new(
            vec![
                Message::system(self.system_prompt.clone()),
                Message::user(message),
            ],
            self.model.clone(),
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        debug!("Dispatching counseling request {}", request.id);

        let (result, attempts) = self.retry.run(self.provider.as_ref(), &request).await;

        let report = match result {
            Ok(response) => match parse_reply(&response.content, &self.schema) {
                Ok(parsed) => {
                    if parsed.degraded {
                        warn!(
                            "Reply for request {} degraded to raw text ({})",
                            request.id,
                            FailureKind::Malformed
                        );
                    }
                    ResponseReport {
                        failure: parsed.degraded.then_some(FailureKind::Malformed),
                        degraded: parsed.degraded,
                        response: parsed.response,
                        attempts,
                    }
                }
                Err(e) => {
                    warn!(
                        "Reply for request {} was unusable, serving fallback: {}",
                        request.id, e
                    );
                    ResponseReport {
                        response: self.fallback_response(),
                        attempts,
                        failure: Some(FailureKind::Malformed),
                        degraded: true,
                    }
                }
            },
            Err(e) => {
                let failure = match e {
                    Error::ProviderAuth(_) => FailureKind::Auth,
                    _ => FailureKind::Unavailable,
                };
                warn!(
                    "Provider failed for request {} after {} attempt(s), serving fallback ({}): {}",
                    request.id,
                    attempts.len(),
                    failure,
                    e
                );
                ResponseReport {
                    response: self.fallback_response(),
                    attempts,
                    failure: Some(failure),
                    degraded: false,
                }
            }
        };

        info!(
            "Request {} answered (emotion={}, technique={:?}, fallback={})",
            request.id,
            report.response.emotion,
            report.response.cbt_technique,
            report.failure.is_some()
        );
        Ok(report)
    }

    /// Trims, bounds, and strips control characters. Rejection here is a
    /// usage error surfaced to the caller, not a service failure.
    fn validate_message(&self, message: &str) -> Result<String> {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_input("Message must not be empty"));
        }

        let char_count = trimmed.chars().count();
        if char_count > self.config.max_message_chars {
            return Err(Error::invalid_input(format!(
                "Message exceeds {} characters (got {})",
                self.config.max_message_chars, char_count
            )));
        }

        Ok(trimmed
            .chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect())
    }

    fn fallback_response(&self) -> AiResponse {
        AiResponse {
            content: FALLBACK_MESSAGE.to_string(),
            emotion: self.schema.default_emotion.clone(),
            cbt_technique: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatResponse, ProviderAttempt};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    enum Behavior {
        Reply(String),
        Fail(fn() -> Error),
        Hang,
    }

    struct StubProvider {
        behavior: Behavior,
        calls: AtomicUsize,
        last_request: Mutex<Option<ChatRequest>>,
    }

    impl StubProvider {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelProvider for StubProvider {
        async fn send_message(&self, request: ChatRequest) -> crate::error::Result<ChatResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            match &self.behavior {
                Behavior::Reply(content) => Ok(ChatResponse {
                    id: "resp-1".to_string(),
                    request_id: request.id,
                    model: request.model,
                    content: content.clone(),
                    created_at: Utc::now(),
                    usage: None,
                    finish_reason: Some("stop".to_string()),
                }),
                Behavior::Fail(make_error) => Err(make_error()),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    unreachable!("test timeout should fire first")
                }
            }
        }

        fn provider_name(&self) -> &str {
            "stub"
        }
    }

    fn orchestrator(provider: Arc<StubProvider>) -> ResponseOrchestrator {
        let config = OrchestratorConfig {
            retry: RetryConfig {
                max_retries: 1,
                retry_delay: Duration::from_millis(0),
                request_timeout: Duration::from_millis(100),
            },
            ..OrchestratorConfig::default()
        };
        ResponseOrchestrator::new(provider, "test-model", ResponseSchema::default(), config)
            .unwrap()
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_network_call() {
        let provider = StubProvider::new(Behavior::Reply("unused".to_string()));
        let orchestrator = orchestrator(provider.clone());

        for input in ["", "   ", "\n\t "] {
            let err = orchestrator.generate_response(input).await.unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)));
        }
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn oversized_message_is_rejected_without_network_call() {
        let provider = StubProvider::new(Behavior::Reply("unused".to_string()));
        let orchestrator = orchestrator(provider.clone());

        let oversized = "a".repeat(4001);
        let err = orchestrator.generate_response(&oversized).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn structured_reply_passes_through_unmodified() {
        let provider = StubProvider::new(Behavior::Reply(
            r#"{"message": "It sounds like you're carrying a lot, and what you do does matter.", "emotion": "sad", "cbtTechnique": "cognitive-restructuring"}"#
                .to_string(),
        ));
        let orchestrator = orchestrator(provider.clone());

        let report = orchestrator
            .generate_with_report("I feel like nothing I do matters")
            .await
            .unwrap();

        assert_eq!(
            report.response,
            AiResponse {
                content: "It sounds like you're carrying a lot, and what you do does matter."
                    .to_string(),
                emotion: "sad".to_string(),
                cbt_technique: Some("cognitive-restructuring".to_string()),
            }
        );
        assert!(report.failure.is_none());
        assert!(!report.degraded);
        assert_eq!(report.attempts.len(), 1);
        assert!(report.attempts[0].success);
    }

    #[tokio::test]
    async fn request_carries_system_prompt_and_sanitized_message() {
        let provider = StubProvider::new(Behavior::Reply(
            r#"{"message": "ok", "emotion": "neutral", "cbtTechnique": null}"#.to_string(),
        ));
        let orchestrator = orchestrator(provider.clone());

        orchestrator
            .generate_response("hello\u{0000} there\u{0007}")
            .await
            .unwrap();

        let request = provider.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, crate::models::MessageRole::System);
        assert!(request.messages[0].content.contains("cbtTechnique"));
        assert_eq!(request.messages[1].content, "hello there");
        assert_eq!(request.model, "test-model");
    }

    #[tokio::test]
    async fn unparseable_output_degrades_to_raw_text() {
        let provider = StubProvider::new(Behavior::Reply(
            "I hear you, that sounds exhausting.".to_string(),
        ));
        let orchestrator = orchestrator(provider);

        let report = orchestrator.generate_with_report("long day").await.unwrap();

        assert_eq!(report.response.content, "I hear you, that sounds exhausting.");
        assert_eq!(report.response.emotion, "neutral");
        assert_eq!(report.response.cbt_technique, None);
        assert!(report.degraded);
        assert_eq!(report.failure, Some(FailureKind::Malformed));
    }

    #[tokio::test]
    async fn timeout_produces_identical_fallback_every_time() {
        let provider = StubProvider::new(Behavior::Hang);
        let orchestrator = orchestrator(provider);

        let first = orchestrator.generate_with_report("are you there?").await.unwrap();
        let second = orchestrator.generate_with_report("hello?").await.unwrap();

        assert_eq!(first.response, second.response);
        assert_eq!(first.response.content, FALLBACK_MESSAGE);
        assert_eq!(first.response.emotion, "neutral");
        assert_eq!(first.response.cbt_technique, None);
        assert_eq!(first.failure, Some(FailureKind::Unavailable));
    }

    #[tokio::test]
    async fn transient_failure_is_retried_then_absorbed() {
        let provider = StubProvider::new(Behavior::Fail(|| Error::unavailable("connection reset")));
        let orchestrator = orchestrator(provider.clone());

        let report = orchestrator.generate_with_report("hi").await.unwrap();

        // max_retries = 1, so exactly two attempts before the fallback.
        assert_eq!(provider.call_count(), 2);
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.failure, Some(FailureKind::Unavailable));
        assert_eq!(report.response.content, FALLBACK_MESSAGE);
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried_and_reported() {
        let provider = StubProvider::new(Behavior::Fail(|| Error::provider_auth("401")));
        let orchestrator = orchestrator(provider.clone());

        let report = orchestrator.generate_with_report("hi").await.unwrap();

        assert_eq!(provider.call_count(), 1);
        assert_eq!(report.failure, Some(FailureKind::Auth));
        assert_eq!(report.response.content, FALLBACK_MESSAGE);
    }

    #[tokio::test]
    async fn missing_credential_fails_closed_onto_fallback() {
        let provider_config = ProviderConfig {
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        };
        let orchestrator = ResponseOrchestrator::from_provider_config(
            &provider_config,
            ResponseSchema::default(),
            OrchestratorConfig::default(),
        )
        .unwrap();

        let report = orchestrator.generate_with_report("hello").await.unwrap();

        assert_eq!(report.failure, Some(FailureKind::Auth));
        assert_eq!(report.response.content, FALLBACK_MESSAGE);
        // The credential check happens before any socket is opened, so the
        // single failed attempt involved no network traffic.
        assert_eq!(report.attempts.len(), 1);
        assert!(!report.attempts[0].success);
    }

    #[test]
    fn attempt_records_expose_error_text() {
        let attempt = ProviderAttempt {
            attempt_number: 1,
            error: Some("Provider unavailable: down".to_string()),
            response_time_ms: 12,
            success: false,
        };
        assert!(attempt.error.unwrap().contains("down"));
    }
}
