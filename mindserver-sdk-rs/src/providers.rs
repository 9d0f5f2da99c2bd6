use crate::llm::CompletionRequest;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub mod anthropic;
pub use anthropic::AnthropicProvider;

pub mod gemini;
pub use gemini::GeminiProvider;

pub mod openai;
pub use openai::OpenAiProvider;

/// The upstream services the gateway can route to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Claude,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "claude" | "anthropic" => Ok(ProviderKind::Claude),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("missing API key ({0} is not set)")]
    MissingApiKey(&'static str),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("{operation} is not supported")]
    Unsupported { operation: &'static str },
}

/// Connection settings for one upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl ProviderSettings {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub(crate) fn require_key(&self, var: &'static str) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ProviderError::MissingApiKey(var))
    }
}

/// Translates provider-agnostic requests into one upstream's wire format.
///
/// Adapters never cache; the gateway owns all caching.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn default_model(&self) -> &str;

    /// `None` means the provider cannot produce embeddings.
    fn default_embedding_model(&self) -> Option<&str> {
        None
    }

    /// The spelling of `model` the adapter actually sends upstream. Cache keys
    /// are built from this so aliases of one model share entries.
    fn canonical_model<'a>(&self, model: &'a str) -> &'a str {
        model
    }

    async fn create_completion(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<String, ProviderError>;

    /// One vector per input, in input order.
    async fn create_embedding(
        &self,
        _model: &str,
        _inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::Unsupported {
            operation: "embedding",
        })
    }
}

/// Sends `body` and decodes a successful response as `T`.
pub(crate) async fn send_json<T: DeserializeOwned>(
    builder: reqwest::RequestBuilder,
    body: &Value,
) -> Result<T, ProviderError> {
    let res = builder.json(body).send().await?;

    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let text = res.text().await?;
    serde_json::from_str(&text).map_err(|e| ProviderError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("openai".parse::<ProviderKind>(), Ok(ProviderKind::OpenAi));
        assert_eq!("Anthropic".parse::<ProviderKind>(), Ok(ProviderKind::Claude));
        assert_eq!(" gemini ".parse::<ProviderKind>(), Ok(ProviderKind::Gemini));
        assert_eq!(
            "mistral".parse::<ProviderKind>(),
            Err(UnknownProvider("mistral".to_string()))
        );
    }

    #[test]
    fn test_provider_kind_display_roundtrips() {
        for kind in [ProviderKind::OpenAi, ProviderKind::Claude, ProviderKind::Gemini] {
            assert_eq!(kind.to_string().parse::<ProviderKind>(), Ok(kind));
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                serde_json::json!(kind.as_str())
            );
        }
    }

    #[test]
    fn test_settings_url_and_key() {
        let settings = ProviderSettings::new(Some(String::new()), "http://localhost:9000/");
        assert_eq!(settings.url("/v1/x"), "http://localhost:9000/v1/x");
        assert!(matches!(
            settings.require_key("OPENAI_API_KEY"),
            Err(ProviderError::MissingApiKey("OPENAI_API_KEY"))
        ));
    }
}
