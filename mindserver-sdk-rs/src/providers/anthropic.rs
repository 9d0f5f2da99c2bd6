use crate::llm::{CompletionRequest, Role};
use crate::providers::{Provider, ProviderError, ProviderKind, ProviderSettings, send_json};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

pub const DEFAULT_MODEL: &str = "claude-3-sonnet-20240229";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const API_VERSION: &str = "2023-06-01";

/// Adapter for the Anthropic messages API. Embeddings are not offered.
pub struct AnthropicProvider {
    client: reqwest::Client,
    settings: ProviderSettings,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicProvider {
    pub fn new(client: reqwest::Client, settings: ProviderSettings) -> Self {
        Self { client, settings }
    }
}

/// Flattens the conversation into a single prompt: system text first, then a
/// `Human:` / `Assistant:` transcript of the remaining turns.
pub(crate) fn flatten_prompt(request: &CompletionRequest) -> String {
    let transcript = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let speaker = if m.role == Role::User {
                "Human"
            } else {
                "Assistant"
            };
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    [request.system_text().unwrap_or_default(), transcript]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub(crate) fn messages_body(model: &str, request: &CompletionRequest) -> Value {
    let mut body = json!({
        "model": model,
        "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "messages": [{"role": "user", "content": flatten_prompt(request)}],
    });
    let stop = request.stop_sequences();
    if !stop.is_empty() {
        body["stop_sequences"] = json!(stop);
    }
    if let Some(t) = request.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(p) = request.top_p {
        body["top_p"] = json!(p);
    }
    if let Some(k) = request.top_k {
        body["top_k"] = json!(k);
    }
    body
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    async fn create_completion(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<String, ProviderError> {
        let key = self.settings.require_key("ANTHROPIC_API_KEY")?;
        let body = messages_body(model, request);

        let response: MessagesResponse = send_json(
            self.client
                .post(self.settings.url("/v1/messages"))
                .header("x-api-key", key)
                .header("anthropic-version", API_VERSION),
            &body,
        )
        .await?;

        Ok(response
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}
