//! Embedding providers and the per-model provider cache.
//!
//! Providers return unit-normalized vectors so similarity against stored
//! embeddings is a plain dot product. [`EmbeddingClient`] hands out one
//! provider per model id, so multiple models can be in play at once (search
//! and indexing may run with different models against the same store).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{DistillError, Result};
use crate::store::KnowledgeStore;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one unit-normalized vector per input.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let batch = [text.to_string()];
        let mut vectors = self.embed(&batch).await?;
        vectors
            .pop()
            .ok_or_else(|| DistillError::backend("embedding provider returned no vectors"))
    }

    fn model_name(&self) -> &str;

    fn dimensions(&self) -> usize;
}

/// OpenAI-compatible `/embeddings` endpoint provider.
#[derive(Clone, Debug)]
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
    api_key: Option<String>,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            dimensions,
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    #[instrument(skip_all, fields(model = %self.model, batch = texts.len()))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response: EmbeddingResponse =
            builder.send().await?.error_for_status()?.json().await?;
        if response.data.len() != texts.len() {
            return Err(DistillError::backend(format!(
                "embedding count mismatch: sent {}, got {}",
                texts.len(),
                response.data.len()
            )));
        }
        // Endpoints are not guaranteed to normalize, so we do it client-side.
        Ok(response
            .data
            .into_iter()
            .map(|d| l2_normalize(d.embedding))
            .collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Cache of embedding providers keyed by model id.
#[derive(Clone, Default)]
pub struct EmbeddingClient {
    providers: Arc<Mutex<FxHashMap<String, Arc<dyn EmbeddingProvider>>>>,
}

impl EmbeddingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: Arc<dyn EmbeddingProvider>) {
        let mut providers = self.providers.lock().expect("provider cache poisoned");
        providers.insert(provider.model_name().to_string(), provider);
    }

    pub fn get(&self, model: &str) -> Option<Arc<dyn EmbeddingProvider>> {
        let providers = self.providers.lock().expect("provider cache poisoned");
        providers.get(model).cloned()
    }

    /// Fetch the provider for `model`, constructing it on first use.
    pub fn get_or_register<F>(&self, model: &str, make: F) -> Arc<dyn EmbeddingProvider>
    where
        F: FnOnce() -> Arc<dyn EmbeddingProvider>,
    {
        let mut providers = self.providers.lock().expect("provider cache poisoned");
        providers.entry(model.to_string()).or_insert_with(make).clone()
    }
}

/// Embed every item that has no vector for the provider's model yet.
///
/// Returns the number of items embedded. The text embedded per item is
/// `content` with `detail` appended when present.
#[instrument(skip_all, fields(model = %provider.model_name()))]
pub async fn backfill(store: &KnowledgeStore, provider: &dyn EmbeddingProvider) -> Result<usize> {
    let pending = store.get_unembedded_items(provider.model_name()).await?;
    if pending.is_empty() {
        return Ok(0);
    }
    let texts: Vec<String> = pending
        .iter()
        .map(|item| match &item.detail {
            Some(detail) if !detail.is_empty() => format!("{} {}", item.content, detail),
            _ => item.content.clone(),
        })
        .collect();
    let vectors = provider.embed(&texts).await?;
    let ids: Vec<i64> = pending.iter().map(|item| item.id).collect();
    store
        .store_embeddings(&ids, &vectors, provider.model_name())
        .await?;
    info!(items = ids.len(), "embedded pending items");
    Ok(ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn normalization_yields_unit_length() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_survives_normalization() {
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn http_provider_normalizes_response_vectors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200).json_body(serde_json::json!({
                    "data": [{"embedding": [3.0, 4.0]}]
                }));
            })
            .await;

        let provider = HttpEmbeddingProvider::new(server.url("/v1"), "test-model", 2);
        let vector = provider.embed_one("hello").await.unwrap();
        assert!((vector[0] - 0.6).abs() < 1e-6);
        assert!((vector[1] - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn http_provider_rejects_count_mismatch() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200).json_body(serde_json::json!({"data": []}));
            })
            .await;

        let provider = HttpEmbeddingProvider::new(server.url("/v1"), "test-model", 2);
        assert!(provider.embed(&["a".into()]).await.is_err());
    }

    #[test]
    fn client_caches_one_provider_per_model() {
        let client = EmbeddingClient::new();
        let first = client.get_or_register("m1", || {
            Arc::new(HttpEmbeddingProvider::new("http://localhost", "m1", 4))
        });
        let second = client.get_or_register("m1", || {
            Arc::new(HttpEmbeddingProvider::new("http://elsewhere", "m1", 8))
        });
        assert!(Arc::ptr_eq(&first, &second));
        assert!(client.get("m2").is_none());
    }
}
