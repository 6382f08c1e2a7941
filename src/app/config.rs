use std::env;
use tracing::{info, warn};
use url::Url;

use crate::chat::{OrchestratorConfig, ResponseSchema};
use crate::error::{Error, Result};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Provider credentials and routing, loaded once at startup and read-only
/// afterwards. The credential is deliberately optional: the service must
/// come up without it and fail closed per call, never invent a default key.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl ProviderConfig {
    /// Reads `API_KEY`, `MODEL`, and `BASE_URL`. Model and base URL fall
    /// back to the stock OpenAI deployment when unset.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("API_KEY").ok().filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!("API_KEY is not set; every request will use the fallback reply");
        }

        let config = Self {
            api_key,
            model: env::var("MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: env::var("BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::config("MODEL must not be empty"));
        }

        let url = Url::parse(&self.base_url)
            .map_err(|e| Error::config(format!("BASE_URL is not a valid URL: {}", e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::config(format!(
                "BASE_URL must be http(s), got '{}'",
                url.scheme()
            )));
        }
        Ok(())
    }
}

/// Everything the binary needs to build an orchestrator: provider routing,
/// orchestration knobs, and the active response schema.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub orchestrator: OrchestratorConfig,
    pub schema: ResponseSchema,
}

impl AppConfig {
    /// Loads the full configuration from the environment. A schema file
    /// named by `RESPONSE_SCHEMA` overrides the built-in label sets.
    pub fn from_env() -> Result<Self> {
        let provider = ProviderConfig::from_env()?;

        let schema = match env::var("RESPONSE_SCHEMA") {
            Ok(path) => {
                info!("Loading response schema from {}", path);
                ResponseSchema::load(&path)?
            }
            Err(_) => ResponseSchema::default(),
        };

        info!(
            "Configuration loaded (model={}, base_url={}, schema v{})",
            provider.model, provider.base_url, schema.version
        );

        Ok(Self {
            provider,
            orchestrator: OrchestratorConfig::default(),
            schema,
        })
    }
}
