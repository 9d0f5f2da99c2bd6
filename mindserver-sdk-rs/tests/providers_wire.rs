use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use mindserver_sdk_rs::cache::MemoryCache;
use mindserver_sdk_rs::gateway::{Gateway, GatewayError};
use mindserver_sdk_rs::llm::{CompletionRequest, EmbeddingInput, EmbeddingRequest, Message};
use mindserver_sdk_rs::providers::{
    AnthropicProvider, GeminiProvider, OpenAiProvider, ProviderError, ProviderKind,
    ProviderSettings,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Recorded {
    calls: Arc<Mutex<Vec<(String, HeaderMap, Value)>>>,
}

impl Recorded {
    fn push(&self, path: &str, headers: HeaderMap, body: &Value) {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_string(), headers, body.clone()));
    }

    fn take(&self) -> Vec<(String, HeaderMap, Value)> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

async fn openai_chat(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    rec.push("/v1/chat/completions", headers, &body);
    if body["model"] == "fail" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"message": "boom"}})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"choices": [{"index": 0, "message": {"role": "assistant", "content": "openai says hi"}}]})),
    )
}

async fn openai_embeddings(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    rec.push("/v1/embeddings", headers, &body);
    let n = body["input"].as_array().map(Vec::len).unwrap_or(0);
    // Reversed on purpose; the adapter orders by index.
    let data: Vec<Value> = (0..n)
        .rev()
        .map(|i| json!({"index": i, "embedding": [i as f32, 1.0]}))
        .collect();
    Json(json!({ "data": data }))
}

async fn anthropic_messages(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    rec.push("/v1/messages", headers, &body);
    Json(json!({
        "content": [
            {"type": "text", "text": "claude "},
            {"type": "text", "text": "says hi"}
        ]
    }))
}

async fn gemini_action(
    State(rec): State<Recorded>,
    Path(action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    rec.push(&format!("/v1beta/models/{}", action), headers, &body);
    if action.ends_with(":batchEmbedContents") {
        let n = body["requests"].as_array().map(Vec::len).unwrap_or(0);
        let embeddings: Vec<Value> = (0..n).map(|i| json!({"values": [i as f32]})).collect();
        return Json(json!({ "embeddings": embeddings }));
    }
    Json(json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": "gemini says hi"}]}}]
    }))
}

async fn start_upstream() -> (String, Recorded) {
    let rec = Recorded::default();
    let app = Router::new()
        .route("/v1/chat/completions", post(openai_chat))
        .route("/v1/embeddings", post(openai_embeddings))
        .route("/v1/messages", post(anthropic_messages))
        .route("/v1beta/models/{action}", post(gemini_action))
        .with_state(rec.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (base, rec)
}

fn gateway(base: &str, default: ProviderKind) -> Gateway {
    let client = reqwest::Client::new();
    let settings = |key: &str| ProviderSettings::new(Some(key.to_string()), base);
    Gateway::new(Arc::new(MemoryCache::new()), default)
        .with_provider(Arc::new(OpenAiProvider::new(
            client.clone(),
            settings("sk-openai"),
        )))
        .with_provider(Arc::new(AnthropicProvider::new(
            client.clone(),
            settings("sk-claude"),
        )))
        .with_provider(Arc::new(GeminiProvider::new(client, settings("g-key"))))
}

fn conversation() -> CompletionRequest {
    let mut req = CompletionRequest::new(vec![
        Message::user("hi"),
        Message::assistant("hello"),
        Message::user("what now?"),
    ]);
    req.system_message = Some("You are a miner.".to_string());
    req
}

#[tokio::test]
async fn openai_completion_wire_and_cache() {
    let (base, rec) = start_upstream().await;
    let gateway = gateway(&base, ProviderKind::OpenAi);
    let req = conversation();

    let first = gateway.create_completion(&req).await.unwrap();
    assert_eq!(first.content, "openai says hi");
    assert!(!first.cached);

    let calls = rec.take();
    assert_eq!(calls.len(), 1);
    let (path, headers, body) = &calls[0];
    assert_eq!(path, "/v1/chat/completions");
    assert_eq!(headers["authorization"], "Bearer sk-openai");
    assert_eq!(body["model"], "gpt-4-turbo-preview");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"].as_array().unwrap().len(), 4);

    let second = gateway.create_completion(&req).await.unwrap();
    assert!(second.cached);
    assert!(rec.take().is_empty());
}

#[tokio::test]
async fn openai_upstream_error_carries_status() {
    let (base, _rec) = start_upstream().await;
    let gateway = gateway(&base, ProviderKind::OpenAi);
    let mut req = conversation();
    req.model = Some("fail".to_string());

    let err = gateway.create_completion(&req).await.unwrap_err();
    match err {
        GatewayError::Upstream {
            provider: ProviderKind::OpenAi,
            source: ProviderError::Status { status, body },
        } => {
            assert_eq!(status, 500);
            assert!(body.contains("boom"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn claude_completion_is_flattened() {
    let (base, rec) = start_upstream().await;
    let gateway = gateway(&base, ProviderKind::OpenAi);
    let mut req = conversation();
    req.provider = Some("claude".to_string());

    let result = gateway.create_completion(&req).await.unwrap();
    assert_eq!(result.content, "claude says hi");

    let calls = rec.take();
    let (path, headers, body) = &calls[0];
    assert_eq!(path, "/v1/messages");
    assert_eq!(headers["x-api-key"], "sk-claude");
    assert_eq!(headers["anthropic-version"], "2023-06-01");
    assert_eq!(body["model"], "claude-3-sonnet-20240229");
    assert_eq!(
        body["messages"],
        json!([{
            "role": "user",
            "content": "You are a miner.\n\nHuman: hi\n\nAssistant: hello\n\nHuman: what now?"
        }])
    );
}

#[tokio::test]
async fn gemini_completion_and_batch_embedding() {
    let (base, rec) = start_upstream().await;
    let gateway = gateway(&base, ProviderKind::Gemini);

    let result = gateway.create_completion(&conversation()).await.unwrap();
    assert_eq!(result.content, "gemini says hi");

    let calls = rec.take();
    let (path, headers, body) = &calls[0];
    assert_eq!(path, "/v1beta/models/gemini-1.5-pro:generateContent");
    assert_eq!(headers["x-goog-api-key"], "g-key");
    assert_eq!(body["contents"][0]["parts"][0]["text"], "You are a miner.\n\nhi");
    assert_eq!(body["contents"][1]["role"], "model");

    let req = EmbeddingRequest {
        model: None,
        input: EmbeddingInput::Batch(vec!["a".into(), "b".into(), "c".into()]),
        provider: None,
    };
    let embedded = gateway.create_embedding(&req).await.unwrap();
    assert_eq!(embedded.embeddings, vec![vec![0.0], vec![1.0], vec![2.0]]);

    let calls = rec.take();
    let (path, _, body) = &calls[0];
    assert_eq!(path, "/v1beta/models/embedding-001:batchEmbedContents");
    assert_eq!(body["requests"][2]["model"], "models/embedding-001");
    assert_eq!(body["requests"][2]["content"]["parts"][0]["text"], "c");

    assert!(gateway.create_embedding(&req).await.unwrap().cached);
    assert!(rec.take().is_empty());
}

#[tokio::test]
async fn openai_embeddings_keep_input_order() {
    let (base, rec) = start_upstream().await;
    let gateway = gateway(&base, ProviderKind::OpenAi);
    let req = EmbeddingRequest {
        model: None,
        input: EmbeddingInput::Batch(vec!["x".into(), "y".into()]),
        provider: Some("openai".into()),
    };

    let result = gateway.create_embedding(&req).await.unwrap();
    assert_eq!(result.embeddings, vec![vec![0.0, 1.0], vec![1.0, 1.0]]);

    let calls = rec.take();
    assert_eq!(calls[0].2["model"], "text-embedding-3-small");
    assert_eq!(calls[0].2["encoding_format"], "float");
}

#[tokio::test]
async fn claude_embedding_is_rejected_without_network() {
    let (base, rec) = start_upstream().await;
    let gateway = gateway(&base, ProviderKind::Claude);
    let req = EmbeddingRequest {
        model: None,
        input: EmbeddingInput::Single("x".into()),
        provider: None,
    };

    let err = gateway.create_embedding(&req).await.unwrap_err();
    assert!(matches!(err, GatewayError::Unsupported { .. }));
    assert!(rec.take().is_empty());
}
