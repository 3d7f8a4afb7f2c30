//! Embedding provider interface and the OpenAI-compatible implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tickerlens_core::{HttpClient, HttpRequest, UpstreamError};
use tracing::debug;

/// Character budget applied before sending text upstream. Keeps requests
/// under the embedding model's token ceiling.
pub const MAX_EMBED_CHARS: usize = 30_000;

/// Produces dense vectors for query and document text.
///
/// Implementations must be safe to share behind one `Arc`.
pub trait EmbeddingProvider: Send + Sync {
    fn embed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, UpstreamError>> + Send + 'a>>;

    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, UpstreamError>> + Send + 'a>>;
}

/// Truncate to the char budget without splitting a UTF-8 scalar.
pub(crate) fn clip_for_embedding(text: &str) -> &str {
    match text.char_indices().nth(MAX_EMBED_CHARS) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Endpoint settings for an OpenAI-compatible embeddings API.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://api.openai.com/v1"),
            api_key: None,
            model: String::from("text-embedding-3-small"),
            timeout_ms: 20_000,
        }
    }
}

impl EmbeddingConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            if !url.trim().is_empty() {
                config.base_url = url.trim_end_matches('/').to_owned();
            }
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            if !model.trim().is_empty() {
                config.model = model;
            }
        }
        config.api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        config
    }
}

/// Embedding client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    config: EmbeddingConfig,
    http: Arc<dyn HttpClient>,
}

impl OpenAiEmbedder {
    pub fn new(config: EmbeddingConfig, http: Arc<dyn HttpClient>) -> Self {
        Self { config, http }
    }

    async fn request_embeddings(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, UpstreamError> {
        let payload = EmbeddingsRequest {
            model: &self.config.model,
            input: &inputs,
        };
        let body = serde_json::to_string(&payload)
            .map_err(|e| UpstreamError::invalid_request(format!("unserializable input: {e}")))?;

        let mut request = HttpRequest::post(format!("{}/embeddings", self.config.base_url))
            .with_json_body(body)
            .with_timeout_ms(self.config.timeout_ms);
        if let Some(key) = &self.config.api_key {
            request = request.with_bearer(key);
        }

        let response = self.http.execute(request).await.map_err(|e| {
            if e.timed_out() {
                UpstreamError::timeout(format!("embedding timeout: {e}"))
            } else {
                UpstreamError::transport(format!("embedding transport error: {e}"))
            }
        })?;

        if !response.is_success() {
            return Err(UpstreamError::status(response.status, "embeddings"));
        }

        let decoded: EmbeddingsResponse = serde_json::from_str(&response.body).map_err(|e| {
            UpstreamError::decode(format!("failed to parse embeddings response: {e}"))
        })?;

        debug!(
            count = decoded.data.len(),
            model = %self.config.model,
            "embeddings generated"
        );
        Ok(decoded.data.into_iter().map(|item| item.embedding).collect())
    }
}

impl EmbeddingProvider for OpenAiEmbedder {
    fn embed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, UpstreamError>> + Send + 'a>> {
        Box::pin(async move {
            if text.trim().is_empty() {
                return Err(UpstreamError::invalid_request(
                    "embedding input must not be empty",
                ));
            }
            let inputs = vec![clip_for_embedding(text).to_owned()];
            let mut vectors = self.request_embeddings(inputs).await?;
            if vectors.is_empty() {
                return Err(UpstreamError::decode("embeddings response had no vectors"));
            }
            Ok(vectors.swap_remove(0))
        })
    }

    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>, UpstreamError>> + Send + 'a>> {
        Box::pin(async move {
            let inputs: Vec<String> = texts
                .iter()
                .filter(|t| !t.trim().is_empty())
                .map(|t| clip_for_embedding(t).to_owned())
                .collect();
            if inputs.is_empty() {
                return Err(UpstreamError::invalid_request(
                    "embedding batch had no non-empty inputs",
                ));
            }
            self.request_embeddings(inputs).await
        })
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{block_on, ScriptedHttpClient};
    use tickerlens_core::{HttpResponse, UpstreamErrorKind};

    fn embedder_with(body: &str) -> (OpenAiEmbedder, Arc<ScriptedHttpClient>) {
        let http = Arc::new(ScriptedHttpClient::new(vec![Ok(HttpResponse::ok_json(body))]));
        let config = EmbeddingConfig {
            api_key: Some(String::from("sk-test")),
            ..EmbeddingConfig::default()
        };
        (OpenAiEmbedder::new(config, http.clone()), http)
    }

    #[test]
    fn embed_decodes_single_vector() {
        let (embedder, http) =
            embedder_with(r#"{"data":[{"embedding":[0.1,0.2,0.3]}]}"#);

        let vector = block_on(embedder.embed("why did the stock fall")).expect("embed ok");
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);

        let requests = http.recorded_requests();
        assert!(requests[0].url.ends_with("/embeddings"));
        assert_eq!(
            requests[0].headers.get("authorization").map(String::as_str),
            Some("Bearer sk-test")
        );
        let body: serde_json::Value =
            serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["model"], "text-embedding-3-small");
    }

    #[test]
    fn blank_input_is_rejected_locally() {
        let (embedder, http) = embedder_with("{}");

        let error = block_on(embedder.embed("   ")).expect_err("must fail");
        assert_eq!(error.kind(), UpstreamErrorKind::InvalidRequest);
        assert!(http.recorded_requests().is_empty());
    }

    #[test]
    fn batch_filters_empty_entries() {
        let (embedder, http) =
            embedder_with(r#"{"data":[{"embedding":[1.0]},{"embedding":[2.0]}]}"#);
        let texts = vec![
            String::from("earnings beat"),
            String::new(),
            String::from("margin pressure"),
        ];

        let vectors = block_on(embedder.embed_batch(&texts)).expect("batch ok");
        assert_eq!(vectors.len(), 2);

        let body: serde_json::Value =
            serde_json::from_str(http.recorded_requests()[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["input"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn clip_respects_char_boundaries() {
        let long = "é".repeat(MAX_EMBED_CHARS + 5);
        let clipped = clip_for_embedding(&long);
        assert_eq!(clipped.chars().count(), MAX_EMBED_CHARS);
    }
}
