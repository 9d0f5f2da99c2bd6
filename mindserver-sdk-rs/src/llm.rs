use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Stop sequences as callers send them: a single string or a list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum StopSequences {
    One(String),
    Many(Vec<String>),
}

impl StopSequences {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            StopSequences::One(s) => vec![s.clone()],
            StopSequences::Many(v) => v.clone(),
        }
    }
}

/// Provider-agnostic completion envelope.
///
/// Field aliases accept the camelCase spelling older clients send.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default, alias = "systemMessage")]
    pub system_message: Option<String>,
    #[serde(default)]
    pub stop: Option<StopSequences>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default, alias = "maxTokens")]
    pub max_tokens: Option<u32>,
    #[serde(default, alias = "topP")]
    pub top_p: Option<f64>,
    #[serde(default, alias = "topK")]
    pub top_k: Option<u32>,
    /// Passed through to providers that understand it; never part of the cache key.
    #[serde(default, alias = "safetySettings")]
    pub safety_settings: Option<Value>,
    #[serde(default)]
    pub provider: Option<String>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn stop_sequences(&self) -> Vec<String> {
        self.stop.as_ref().map(StopSequences::to_vec).unwrap_or_default()
    }

    /// System text from the explicit `system_message` followed by any `system` turns.
    pub fn system_text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .system_message
            .iter()
            .map(String::as_str)
            .chain(
                self.messages
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .map(|m| m.content.as_str()),
            )
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    /// The fields that affect provider output, used as cache key material.
    ///
    /// Provider selection, model and passthrough settings are excluded; absent
    /// options are omitted so `null` and missing hash identically.
    pub fn cache_fields(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("messages".to_string(), json!(self.messages));
        if let Some(system) = &self.system_message {
            fields.insert("system_message".to_string(), json!(system));
        }
        if self.stop.is_some() {
            fields.insert("stop".to_string(), json!(self.stop_sequences()));
        }
        if let Some(t) = self.temperature {
            fields.insert("temperature".to_string(), json!(t));
        }
        if let Some(n) = self.max_tokens {
            fields.insert("max_tokens".to_string(), json!(n));
        }
        if let Some(p) = self.top_p {
            fields.insert("top_p".to_string(), json!(p));
        }
        if let Some(k) = self.top_k {
            fields.insert("top_k".to_string(), json!(k));
        }
        Value::Object(fields)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

impl EmbeddingInput {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            EmbeddingInput::Single(s) => vec![s.clone()],
            EmbeddingInput::Batch(v) => v.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EmbeddingRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub input: EmbeddingInput,
    #[serde(default)]
    pub provider: Option<String>,
}

impl EmbeddingRequest {
    pub fn cache_fields(&self) -> Value {
        json!({ "input": self.input.to_vec() })
    }
}
