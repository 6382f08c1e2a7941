use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::ProviderAttempt;

/// The structured reply handed back to the calling layer. Serialized
/// camelCase to match the product wire shape; the `timestamp` field is
/// owned by the caller and stamped at serialization time, so it does not
/// appear here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiResponse {
    pub content: String,
    pub emotion: String,
    pub cbt_technique: Option<String>,
}

/// Kind of provider-side failure absorbed into a reply, surfaced through
/// logs and [`ResponseReport`] rather than as an error to the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network failure, timeout, or 5xx after retries were exhausted.
    Unavailable,
    /// Missing or rejected credential; detected without retrying.
    Auth,
    /// Provider answered, but the output did not parse into the
    /// structured shape and was repaired best-effort.
    Malformed,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Unavailable => write!(f, "provider_unavailable"),
            FailureKind::Auth => write!(f, "provider_auth_error"),
            FailureKind::Malformed => write!(f, "provider_response_malformed"),
        }
    }
}

/// Full outcome of one orchestration run: the reply plus the per-attempt
/// audit trail and the absorbed failure, if any.
#[derive(Debug, Clone)]
pub struct ResponseReport {
    pub response: AiResponse,
    pub attempts: Vec<ProviderAttempt>,
    pub failure: Option<FailureKind>,
    /// True when the provider answered but the reply was repaired from
    /// unparseable output.
    pub degraded: bool,
}

/// The closed label sets the provider must pick from. Versioned
/// configuration, not hard-coded logic: deployments tune the sets through
/// a TOML file and the prompt/parse contract follows automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub version: u32,
    pub emotions: Vec<String>,
    pub default_emotion: String,
    pub techniques: Vec<String>,
}

impl Default for ResponseSchema {
    fn default() -> Self {
        Self {
            version: 1,
            emotions: vec![
                "neutral".to_string(),
                "anxious".to_string(),
                "sad".to_string(),
                "angry".to_string(),
                "hopeful".to_string(),
            ],
            default_emotion: "neutral".to_string(),
            techniques: vec![
                "cognitive-restructuring".to_string(),
                "behavioral-activation".to_string(),
                "thought-challenging".to_string(),
                "grounding".to_string(),
                "mindful-breathing".to_string(),
                "self-compassion".to_string(),
            ],
        }
    }
}

impl ResponseSchema {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let schema: ResponseSchema = toml::from_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse response schema: {}", e)))?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn validate(&self) -> Result<()> {
        if self.emotions.is_empty() {
            return Err(Error::config("Response schema has no emotion labels"));
        }
        if self.techniques.is_empty() {
            return Err(Error::config("Response schema has no technique labels"));
        }
        if !self.emotions.contains(&self.default_emotion) {
            return Err(Error::config(format!(
                "Default emotion '{}' is not in the emotion set",
                self.default_emotion
            )));
        }
        Ok(())
    }

    /// Maps a provider-supplied emotion label onto the closed set,
    /// falling back to the default for anything unknown.
    pub fn normalize_emotion(&self, label: Option<&str>) -> String {
        match label.map(str::trim) {
            Some(label) if !label.is_empty() => {
                let lowered = label.to_lowercase();
                self.emotions
                    .iter()
                    .find(|known| known.as_str() == lowered)
                    .cloned()
                    .unwrap_or_else(|| self.default_emotion.clone())
            }
            _ => self.default_emotion.clone(),
        }
    }

    /// Maps a provider-supplied technique label onto the closed set;
    /// unknown or absent labels yield None, as no technique may apply.
    pub fn normalize_technique(&self, label: Option<&str>) -> Option<String> {
        let label = label.map(str::trim).filter(|l| !l.is_empty())?;
        let lowered = label.to_lowercase();
        self.techniques
            .iter()
            .find(|known| known.as_str() == lowered)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_schema_is_valid() {
        let schema = ResponseSchema::default();
        assert!(schema.validate().is_ok());
        assert_eq!(schema.default_emotion, "neutral");
        assert!(schema.emotions.contains(&"sad".to_string()));
    }

    #[test]
    fn unknown_emotion_normalizes_to_default() {
        let schema = ResponseSchema::default();
        assert_eq!(schema.normalize_emotion(Some("sad")), "sad");
        assert_eq!(schema.normalize_emotion(Some("SAD")), "sad");
        assert_eq!(schema.normalize_emotion(Some("euphoric")), "neutral");
        assert_eq!(schema.normalize_emotion(Some("  ")), "neutral");
        assert_eq!(schema.normalize_emotion(None), "neutral");
    }

    #[test]
    fn unknown_technique_normalizes_to_none() {
        let schema = ResponseSchema::default();
        assert_eq!(
            schema.normalize_technique(Some("grounding")),
            Some("grounding".to_string())
        );
        assert_eq!(schema.normalize_technique(Some("hypnosis")), None);
        assert_eq!(schema.normalize_technique(None), None);
    }

    #[test]
    fn validation_rejects_inconsistent_schema() {
        let mut schema = ResponseSchema::default();
        schema.default_emotion = "euphoric".to_string();
        assert!(schema.validate().is_err());

        let mut schema = ResponseSchema::default();
        schema.emotions.clear();
        assert!(schema.validate().is_err());
    }

    #[test]
    fn schema_loads_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
version = 2
emotions = ["calm", "distressed"]
default_emotion = "calm"
techniques = ["grounding"]
"#
        )
        .unwrap();

        let schema = ResponseSchema::load(file.path()).unwrap();
        assert_eq!(schema.version, 2);
        assert_eq!(schema.normalize_emotion(Some("angry")), "calm");
    }

    #[test]
    fn schema_load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
version = 2
emotions = ["calm"]
default_emotion = "missing"
techniques = ["grounding"]
"#
        )
        .unwrap();

        assert!(ResponseSchema::load(file.path()).is_err());
    }

    #[test]
    fn response_serializes_camel_case() {
        let response = AiResponse {
            content: "You are not alone in this.".to_string(),
            emotion: "sad".to_string(),
            cbt_technique: Some("cognitive-restructuring".to_string()),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["cbtTechnique"], "cognitive-restructuring");
        assert_eq!(json["emotion"], "sad");
    }
}
