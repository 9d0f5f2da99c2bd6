use crate::llm::CompletionRequest;
use crate::providers::{Provider, ProviderError, ProviderKind, ProviderSettings, send_json};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Adapter for the OpenAI chat completions and embeddings APIs.
pub struct OpenAiProvider {
    client: reqwest::Client,
    settings: ProviderSettings,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiProvider {
    pub fn new(client: reqwest::Client, settings: ProviderSettings) -> Self {
        Self { client, settings }
    }
}

/// Chat completion body. The system message travels as its own `system` turn.
pub(crate) fn chat_body(model: &str, request: &CompletionRequest) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system_message {
        messages.push(json!({"role": "system", "content": system}));
    }
    for m in &request.messages {
        messages.push(json!({"role": m.role, "content": m.content}));
    }

    let mut body = json!({
        "model": model,
        "messages": messages,
        "temperature": request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
    });
    if let Some(n) = request.max_tokens {
        body["max_tokens"] = json!(n);
    }
    if let Some(p) = request.top_p {
        body["top_p"] = json!(p);
    }
    let stop = request.stop_sequences();
    if !stop.is_empty() {
        body["stop"] = json!(stop);
    }
    body
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    fn default_embedding_model(&self) -> Option<&str> {
        Some(DEFAULT_EMBEDDING_MODEL)
    }

    async fn create_completion(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<String, ProviderError> {
        let key = self.settings.require_key("OPENAI_API_KEY")?;
        let body = chat_body(model, request);

        let response: ChatResponse = send_json(
            self.client
                .post(self.settings.url("/v1/chat/completions"))
                .bearer_auth(key),
            &body,
        )
        .await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("response has no choices".to_string()))?;
        Ok(choice.message.content.unwrap_or_default())
    }

    async fn create_embedding(
        &self,
        model: &str,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let key = self.settings.require_key("OPENAI_API_KEY")?;
        let body = json!({
            "model": model,
            "input": inputs,
            "encoding_format": "float",
        });

        let mut response: EmbeddingResponse = send_json(
            self.client
                .post(self.settings.url("/v1/embeddings"))
                .bearer_auth(key),
            &body,
        )
        .await?;

        if response.data.len() != inputs.len() {
            return Err(ProviderError::Malformed(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                response.data.len()
            )));
        }
        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}
