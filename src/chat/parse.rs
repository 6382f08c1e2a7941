use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::debug;

use crate::chat::types::{AiResponse, ResponseSchema};
use crate::error::{Error, Result};

/// Envelope the provider is instructed to emit. Field names match the
/// product wire shape; aliases cover the snake_case drift some models
/// produce despite the prompt.
#[derive(Debug, Deserialize)]
struct ReplyEnvelope {
    #[serde(alias = "content")]
    message: Option<String>,
    emotion: Option<String>,
    #[serde(alias = "cbt_technique")]
    #[serde(rename = "cbtTechnique")]
    cbt_technique: Option<String>,
}

#[derive(Debug)]
pub struct ParsedReply {
    pub response: AiResponse,
    /// True when the structured envelope could not be recovered and the
    /// reply degraded to raw text with default labels.
    pub degraded: bool,
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap())
}

/// Parses raw provider output into an [`AiResponse`], repairing common
/// formatting drift. Never fails on unparseable text: the policy is
/// partial success, so garbage degrades to the raw text with the schema's
/// default emotion and no technique. The only error is empty output,
/// which cannot satisfy the non-empty content contract.
pub fn parse_reply(raw: &str, schema: &ResponseSchema) -> Result<ParsedReply> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::malformed("Provider returned empty content"));
    }

    if let Some(reply) = try_envelope(trimmed, schema) {
        return Ok(reply);
    }

    // Models wrap JSON in markdown fences no matter how firmly told not to.
    if let Some(captures) = fence_regex().captures(trimmed) {
        if let Some(reply) = try_envelope(&captures[1], schema) {
            debug!("Recovered reply envelope from fenced code block");
            return Ok(reply);
        }
    }

    // Last repair: the outermost brace-delimited span, for output that
    // surrounds the envelope with commentary.
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Some(reply) = try_envelope(&trimmed[start..=end], schema) {
                debug!("Recovered reply envelope from embedded object");
                return Ok(reply);
            }
        }
    }

    debug!("Provider output did not parse; degrading to raw text");
    Ok(ParsedReply {
        response: AiResponse {
            content: trimmed.to_string(),
            emotion: schema.default_emotion.clone(),
            cbt_technique: None,
        },
        degraded: true,
    })
}

fn try_envelope(candidate: &str, schema: &ResponseSchema) -> Option<ParsedReply> {
    let envelope: ReplyEnvelope = serde_json::from_str(candidate).ok()?;
    let content = envelope.message?.trim().to_string();
    if content.is_empty() {
        return None;
    }

    Some(ParsedReply {
        response: AiResponse {
            content,
            emotion: schema.normalize_emotion(envelope.emotion.as_deref()),
            cbt_technique: schema.normalize_technique(envelope.cbt_technique.as_deref()),
        },
        degraded: false,
    })
}
