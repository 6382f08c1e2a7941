use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Provider unavailable: {message}")]
    ProviderUnavailable {
        message: String,
        /// HTTP status when the failure came from a provider response,
        /// None for network-level failures and timeouts.
        status: Option<u16>,
    },

    #[error("Provider authentication failed: {0}")]
    ProviderAuth(String),

    #[error("Provider response malformed: {0}")]
    MalformedResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Error::ProviderUnavailable {
            message: msg.into(),
            status: None,
        }
    }

    pub fn unavailable_with_status(msg: impl Into<String>, status: u16) -> Self {
        Error::ProviderUnavailable {
            message: msg.into(),
            status: Some(status),
        }
    }

    pub fn provider_auth(msg: impl Into<String>) -> Self {
        Error::ProviderAuth(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedResponse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Whether a failed provider call is worth retrying. Network-level
    /// failures, timeouts, and 5xx responses are transient; auth failures
    /// and other 4xx responses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::ProviderUnavailable { status: None, .. } => true,
            Error::ProviderUnavailable {
                status: Some(code), ..
            } => *code >= 500,
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}
