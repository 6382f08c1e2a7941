pub mod fallback;
pub mod openai;
pub mod provider;

pub use fallback::{ProviderAttempt, RetryConfig, RetryPolicy};
pub use openai::OpenAiProvider;
pub use provider::{ChatRequest, ChatResponse, Message, MessageRole, ModelProvider, TokenUsage};
