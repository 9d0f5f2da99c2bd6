use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub content: String,
}

/// One vector per embedding input.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EmbeddingItem {
    pub embedding: Vec<f32>,
}
