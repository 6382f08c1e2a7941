pub mod parse;
pub mod prompt;
pub mod service;
pub mod types;

pub use service::{OrchestratorConfig, ResponseOrchestrator};
pub use types::{AiResponse, FailureKind, ResponseReport, ResponseSchema};
