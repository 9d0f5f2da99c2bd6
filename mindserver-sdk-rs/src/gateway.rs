use crate::cache::{CacheKey, CacheKind, CacheStore, FileCache, MemoryCache};
use crate::config::GatewayConfig;
use crate::llm::{CompletionRequest, EmbeddingRequest};
use crate::providers::{
    AnthropicProvider, GeminiProvider, OpenAiProvider, Provider, ProviderError, ProviderKind,
    UnknownProvider,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    UnknownProvider(#[from] UnknownProvider),

    #[error("Provider {0} is not configured")]
    ProviderNotConfigured(ProviderKind),

    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: ProviderKind,
        operation: &'static str,
    },

    #[error("{provider} request failed: {source}")]
    Upstream {
        provider: ProviderKind,
        #[source]
        source: ProviderError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    pub content: String,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    pub embeddings: Vec<Vec<f32>>,
    pub cached: bool,
}

/// Routes requests to one provider per call, fronted by a content-addressed
/// cache. A hit never reaches the provider.
pub struct Gateway {
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
    cache: Arc<dyn CacheStore>,
    default_provider: ProviderKind,
}

impl Gateway {
    pub fn new(cache: Arc<dyn CacheStore>, default_provider: ProviderKind) -> Self {
        Self {
            providers: HashMap::new(),
            cache,
            default_provider,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    /// Builds the three HTTP adapters and the cache backend `config` selects.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, crate::cache::CacheError> {
        let cache: Arc<dyn CacheStore> = match &config.cache_dir {
            Some(dir) => {
                info!("Using file cache at {}", dir.display());
                Arc::new(FileCache::new(dir.clone())?)
            }
            None => {
                info!("Using in-memory cache");
                Arc::new(MemoryCache::new())
            }
        };

        let client = reqwest::Client::new();
        Ok(Self::new(cache, config.default_provider)
            .with_provider(Arc::new(OpenAiProvider::new(
                client.clone(),
                config.openai.clone(),
            )))
            .with_provider(Arc::new(AnthropicProvider::new(
                client.clone(),
                config.claude.clone(),
            )))
            .with_provider(Arc::new(GeminiProvider::new(
                client,
                config.gemini.clone(),
            ))))
    }

    pub fn default_provider(&self) -> ProviderKind {
        self.default_provider
    }

    fn resolve(&self, requested: Option<&str>) -> Result<&Arc<dyn Provider>, GatewayError> {
        let kind = match requested {
            Some(id) => id.parse::<ProviderKind>()?,
            None => self.default_provider,
        };
        self.providers
            .get(&kind)
            .ok_or(GatewayError::ProviderNotConfigured(kind))
    }

    pub async fn create_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResult, GatewayError> {
        let provider = self.resolve(request.provider.as_deref())?;
        let kind = provider.kind();
        let model = provider
            .canonical_model(request.model.as_deref().unwrap_or(provider.default_model()))
            .to_string();
        let key = CacheKey::new(
            CacheKind::Completion,
            kind,
            &model,
            &request.cache_fields(),
        );

        if let Some(Value::String(content)) = self.lookup(&key).await {
            debug!("Cache hit {}", key);
            return Ok(CompletionResult {
                content,
                cached: true,
            });
        }

        debug!("Cache miss {}, calling {}", key, kind);
        let content = provider
            .create_completion(&model, request)
            .await
            .map_err(|source| GatewayError::Upstream {
                provider: kind,
                source,
            })?;

        if !content.is_empty() {
            self.store(&key, json!(content)).await;
        }
        Ok(CompletionResult {
            content,
            cached: false,
        })
    }

    pub async fn create_embedding(
        &self,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingResult, GatewayError> {
        let provider = self.resolve(request.provider.as_deref())?;
        let kind = provider.kind();
        let default_model = match provider.default_embedding_model() {
            Some(model) => model,
            None => {
                return Err(GatewayError::Unsupported {
                    provider: kind,
                    operation: "embedding",
                });
            }
        };
        let model = provider
            .canonical_model(request.model.as_deref().unwrap_or(default_model))
            .to_string();
        let key = CacheKey::new(CacheKind::Embedding, kind, &model, &request.cache_fields());

        if let Some(cached) = self.lookup(&key).await {
            match serde_json::from_value::<Vec<Vec<f32>>>(cached) {
                Ok(embeddings) => {
                    debug!("Cache hit {}", key);
                    return Ok(EmbeddingResult {
                        embeddings,
                        cached: true,
                    });
                }
                Err(e) => warn!("Ignoring unreadable cache entry {}: {}", key, e),
            }
        }

        debug!("Cache miss {}, calling {}", key, kind);
        let inputs = request.input.to_vec();
        let embeddings = provider
            .create_embedding(&model, &inputs)
            .await
            .map_err(|source| match source {
                ProviderError::Unsupported { operation } => GatewayError::Unsupported {
                    provider: kind,
                    operation,
                },
                source => GatewayError::Upstream {
                    provider: kind,
                    source,
                },
            })?;

        if !embeddings.is_empty() {
            self.store(&key, json!(embeddings)).await;
        }
        Ok(EmbeddingResult {
            embeddings,
            cached: false,
        })
    }

    async fn lookup(&self, key: &CacheKey) -> Option<Value> {
        match self.cache.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn store(&self, key: &CacheKey, value: Value) {
        if let Err(e) = self.cache.set(key, value).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }
}
