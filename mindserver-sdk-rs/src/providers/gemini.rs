use crate::llm::{CompletionRequest, Role};
use crate::providers::{Provider, ProviderError, ProviderKind, ProviderSettings, send_json};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";
pub const DEFAULT_EMBEDDING_MODEL: &str = "embedding-001";
const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Adapter for the Google Generative Language API.
pub struct GeminiProvider {
    client: reqwest::Client,
    settings: ProviderSettings,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

impl GeminiProvider {
    pub fn new(client: reqwest::Client, settings: ProviderSettings) -> Self {
        Self { client, settings }
    }
}

fn model_path(model: &str) -> &str {
    model.trim_start_matches("models/")
}

/// Gemini has no system role: system text is merged into the first user turn
/// (or becomes one) and `assistant` turns are sent as `model`.
pub(crate) fn contents(request: &CompletionRequest) -> Vec<Value> {
    let mut system = request.system_text();
    let mut contents = Vec::with_capacity(request.messages.len() + 1);

    for m in request.messages.iter().filter(|m| m.role != Role::System) {
        let (role, text) = match m.role {
            Role::Assistant => ("model", m.content.clone()),
            _ => match system.take() {
                Some(s) => ("user", format!("{}\n\n{}", s, m.content)),
                None => ("user", m.content.clone()),
            },
        };
        contents.push(json!({"role": role, "parts": [{"text": text}]}));
    }

    if let Some(s) = system {
        contents.insert(0, json!({"role": "user", "parts": [{"text": s}]}));
    }
    contents
}

pub(crate) fn generate_body(request: &CompletionRequest) -> Value {
    let mut config = Map::new();
    config.insert(
        "temperature".to_string(),
        json!(request.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
    );
    if let Some(n) = request.max_tokens {
        config.insert("maxOutputTokens".to_string(), json!(n));
    }
    if let Some(p) = request.top_p {
        config.insert("topP".to_string(), json!(p));
    }
    if let Some(k) = request.top_k {
        config.insert("topK".to_string(), json!(k));
    }
    let stop = request.stop_sequences();
    if !stop.is_empty() {
        config.insert("stopSequences".to_string(), json!(stop));
    }

    let mut body = json!({
        "contents": contents(request),
        "generationConfig": config,
    });
    if let Some(safety) = &request.safety_settings {
        body["safetySettings"] = safety.clone();
    }
    body
}

#[async_trait]
impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    fn default_embedding_model(&self) -> Option<&str> {
        Some(DEFAULT_EMBEDDING_MODEL)
    }

    fn canonical_model<'a>(&self, model: &'a str) -> &'a str {
        model_path(model)
    }

    async fn create_completion(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<String, ProviderError> {
        let key = self.settings.require_key("GEMINI_API_KEY")?;
        let url = self.settings.url(&format!(
            "/v1beta/models/{}:generateContent",
            model_path(model)
        ));

        let response: GenerateResponse = send_json(
            self.client.post(url).header("x-goog-api-key", key),
            &generate_body(request),
        )
        .await?;

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("response has no candidates".to_string()))?;
        Ok(candidate
            .content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join(""))
    }

    async fn create_embedding(
        &self,
        model: &str,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let key = self.settings.require_key("GEMINI_API_KEY")?;
        let model = model_path(model);
        let url = self
            .settings
            .url(&format!("/v1beta/models/{}:batchEmbedContents", model));
        let requests: Vec<Value> = inputs
            .iter()
            .map(|text| {
                json!({
                    "model": format!("models/{}", model),
                    "content": {"parts": [{"text": text}]},
                })
            })
            .collect();

        let response: BatchEmbedResponse = send_json(
            self.client.post(url).header("x-goog-api-key", key),
            &json!({ "requests": requests }),
        )
        .await?;

        if response.embeddings.len() != inputs.len() {
            return Err(ProviderError::Malformed(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;

    #[test]
    fn test_system_merged_into_first_user_turn() {
        let mut req = CompletionRequest::new(vec![
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("again"),
        ]);
        req.system_message = Some("You are a bot.".to_string());

        let contents = contents(&req);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "You are a bot.\n\nhi");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "again");
    }

    #[test]
    fn test_system_role_message_merges_past_leading_assistant() {
        let req = CompletionRequest::new(vec![
            Message::system("rules"),
            Message::assistant("I am ready"),
            Message::user("go"),
        ]);

        let contents = contents(&req);
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["text"], "rules\n\ngo");
    }

    #[test]
    fn test_system_only_becomes_user_turn() {
        let req = CompletionRequest::new(vec![Message::system("only rules")]);
        let contents = contents(&req);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["role"], "user");
    }

    #[test]
    fn test_generation_config() {
        let mut req = CompletionRequest::new(vec![Message::user("hi")]);
        req.top_k = Some(40);
        req.max_tokens = Some(100);
        req.safety_settings = Some(json!([{"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_NONE"}]));

        let body = generate_body(&req);
        let config = &body["generationConfig"];
        assert_eq!(config["temperature"], json!(0.7));
        assert_eq!(config["topK"], json!(40));
        assert_eq!(config["maxOutputTokens"], json!(100));
        assert!(config.get("stopSequences").is_none());
        assert_eq!(body["safetySettings"][0]["threshold"], "BLOCK_NONE");
    }

    #[test]
    fn test_model_path_strips_prefix() {
        assert_eq!(model_path("models/embedding-001"), "embedding-001");
        assert_eq!(model_path("gemini-1.5-pro"), "gemini-1.5-pro");
    }
}
