//! Vector store interface and the PostgREST-backed implementation.
//!
//! Search is the hot path used by the retriever. Insert/exists/delete/stats
//! exist for the ingestion side and admin tooling; they share the same
//! transport and error taxonomy.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tickerlens_core::{HttpClient, HttpRequest, UpstreamError};
use tracing::{debug, info};

/// Stored length cap for document previews.
const PREVIEW_CHARS: usize = 500;

/// Document row returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    #[serde(rename = "news_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content_preview: String,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub sentiment: Option<String>,
    #[serde(default)]
    pub sentiment_score: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub similarity: f64,
}

/// Similarity search request.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearch {
    pub symbol: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub top_k: usize,
    pub min_similarity: f64,
}

/// Metadata stored alongside a document vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub symbol: Option<String>,
    pub title: Option<String>,
    pub published_at: Option<String>,
    pub sentiment: Option<String>,
    pub sentiment_score: Option<f64>,
    pub source: Option<String>,
    pub url: Option<String>,
    pub content_preview: Option<String>,
}

/// Corpus-level statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreStats {
    pub total_embeddings: usize,
    pub unique_symbols: usize,
    pub vector_dimension: usize,
}

type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UpstreamError>> + Send + 'a>>;

/// Similarity search plus the administrative passthroughs the ingestion
/// side uses. Object-safe so fakes can stand in during tests.
pub trait VectorStore: Send + Sync {
    fn search<'a>(
        &'a self,
        query_vector: &'a [f32],
        request: VectorSearch,
    ) -> StoreFuture<'a, Vec<StoredDocument>>;

    fn exists<'a>(&'a self, id: &'a str) -> StoreFuture<'a, bool>;

    fn insert<'a>(
        &'a self,
        id: &'a str,
        vector: Vec<f32>,
        metadata: DocumentMetadata,
    ) -> StoreFuture<'a, ()>;

    fn delete<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()>;

    fn stats<'a>(&'a self) -> StoreFuture<'a, VectorStoreStats>;
}

/// Endpoint settings for the REST vector store.
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub base_url: String,
    pub service_key: Option<String>,
    /// Expected embedding dimension; mismatched query vectors are rejected
    /// before any network call.
    pub dimension: usize,
    pub timeout_ms: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("http://localhost:54321/rest/v1"),
            service_key: None,
            dimension: 1536,
            timeout_ms: 20_000,
        }
    }
}

impl VectorStoreConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("VECTOR_STORE_URL") {
            if !url.trim().is_empty() {
                config.base_url = url.trim_end_matches('/').to_owned();
            }
        }
        config.service_key = std::env::var("VECTOR_STORE_SERVICE_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        if let Some(dimension) = std::env::var("VECTOR_DIMENSION")
            .ok()
            .and_then(|raw| raw.parse::<usize>().ok())
        {
            config.dimension = dimension;
        }
        config
    }
}

/// Vector store client speaking the `match_news_embeddings` RPC plus plain
/// table endpoints for the admin operations.
#[derive(Clone)]
pub struct RestVectorStore {
    config: VectorStoreConfig,
    http: Arc<dyn HttpClient>,
}

impl RestVectorStore {
    pub fn new(config: VectorStoreConfig, http: Arc<dyn HttpClient>) -> Self {
        Self { config, http }
    }

    fn authed(&self, request: HttpRequest) -> HttpRequest {
        let request = request.with_timeout_ms(self.config.timeout_ms);
        match &self.config.service_key {
            Some(key) => request.with_bearer(key).with_header("apikey", key.clone()),
            None => request,
        }
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), UpstreamError> {
        if vector.len() != self.config.dimension {
            return Err(UpstreamError::invalid_request(format!(
                "expected {} dimensions, got {}",
                self.config.dimension,
                vector.len()
            )));
        }
        Ok(())
    }

    async fn execute_json<T: serde::de::DeserializeOwned>(
        &self,
        request: HttpRequest,
        what: &str,
    ) -> Result<T, UpstreamError> {
        let response = self.http.execute(request).await.map_err(|e| {
            if e.timed_out() {
                UpstreamError::timeout(format!("{what} timeout: {e}"))
            } else {
                UpstreamError::transport(format!("{what} transport error: {e}"))
            }
        })?;

        if !response.is_success() {
            return Err(UpstreamError::status(response.status, what));
        }

        serde_json::from_str(&response.body)
            .map_err(|e| UpstreamError::decode(format!("failed to parse {what} response: {e}")))
    }
}

impl VectorStore for RestVectorStore {
    fn search<'a>(
        &'a self,
        query_vector: &'a [f32],
        request: VectorSearch,
    ) -> StoreFuture<'a, Vec<StoredDocument>> {
        Box::pin(async move {
            self.check_dimension(query_vector)?;

            let mut params = serde_json::Map::new();
            params.insert("query_embedding".into(), serde_json::json!(query_vector));
            params.insert(
                "match_threshold".into(),
                serde_json::json!(request.min_similarity),
            );
            params.insert("match_count".into(), serde_json::json!(request.top_k));
            if let Some(symbol) = &request.symbol {
                params.insert("filter_symbol".into(), serde_json::json!(symbol));
            }
            if let Some(start) = &request.start_date {
                params.insert("filter_start_date".into(), serde_json::json!(start));
            }
            if let Some(end) = &request.end_date {
                params.insert("filter_end_date".into(), serde_json::json!(end));
            }
            let body = serde_json::Value::Object(params).to_string();

            let http_request = self.authed(
                HttpRequest::post(format!("{}/rpc/match_news_embeddings", self.config.base_url))
                    .with_json_body(body),
            );

            let mut rows: Vec<StoredDocument> =
                self.execute_json(http_request, "vector search").await?;
            for row in &mut rows {
                row.similarity = (row.similarity * 1000.0).round() / 1000.0;
            }

            debug!(
                results = rows.len(),
                symbol = request.symbol.as_deref().unwrap_or("<any>"),
                threshold = request.min_similarity,
                "similarity search completed"
            );
            Ok(rows)
        })
    }

    fn exists<'a>(&'a self, id: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let url = format!(
                "{}/news_embeddings?select=news_id&news_id=eq.{}",
                self.config.base_url,
                urlencoding::encode(id),
            );
            let rows: Vec<serde_json::Value> =
                self.execute_json(self.authed(HttpRequest::get(url)), "existence check").await?;
            Ok(!rows.is_empty())
        })
    }

    fn insert<'a>(
        &'a self,
        id: &'a str,
        vector: Vec<f32>,
        metadata: DocumentMetadata,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check_dimension(&vector)?;

            let preview = metadata
                .content_preview
                .as_deref()
                .map(|text| text.chars().take(PREVIEW_CHARS).collect::<String>());
            let record = serde_json::json!({
                "news_id": id,
                "embedding": vector,
                "symbol": metadata.symbol,
                "title": metadata.title,
                "published_at": metadata.published_at,
                "sentiment": metadata.sentiment,
                "sentiment_score": metadata.sentiment_score,
                "source": metadata.source,
                "url": metadata.url,
                "content_preview": preview,
            });

            let request = self.authed(
                HttpRequest::post(format!("{}/news_embeddings", self.config.base_url))
                    .with_json_body(record.to_string())
                    .with_header("prefer", "return=minimal"),
            );

            let response = self.http.execute(request).await.map_err(|e| {
                UpstreamError::transport(format!("embedding insert transport error: {e}"))
            })?;
            if !response.is_success() {
                return Err(UpstreamError::status(response.status, "embedding insert"));
            }
            debug!(id, "embedding inserted");
            Ok(())
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let url = format!(
                "{}/news_embeddings?news_id=eq.{}",
                self.config.base_url,
                urlencoding::encode(id),
            );
            let response = self
                .http
                .execute(self.authed(HttpRequest::delete(url)))
                .await
                .map_err(|e| {
                    UpstreamError::transport(format!("embedding delete transport error: {e}"))
                })?;
            if !response.is_success() {
                return Err(UpstreamError::status(response.status, "embedding delete"));
            }
            Ok(())
        })
    }

    fn stats<'a>(&'a self) -> StoreFuture<'a, VectorStoreStats> {
        Box::pin(async move {
            let url = format!("{}/news_embeddings?select=symbol", self.config.base_url);
            let rows: Vec<SymbolRow> =
                self.execute_json(self.authed(HttpRequest::get(url)), "store stats").await?;

            let total = rows.len();
            let mut symbols: Vec<&str> = rows
                .iter()
                .filter_map(|row| row.symbol.as_deref())
                .collect();
            symbols.sort_unstable();
            symbols.dedup();

            info!(total, unique_symbols = symbols.len(), "vector store stats");
            Ok(VectorStoreStats {
                total_embeddings: total,
                unique_symbols: symbols.len(),
                vector_dimension: self.config.dimension,
            })
        })
    }
}

#[derive(Debug, Deserialize)]
struct SymbolRow {
    #[serde(default)]
    symbol: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{block_on, ScriptedHttpClient};
    use tickerlens_core::{HttpResponse, UpstreamErrorKind};

    fn store_with(bodies: Vec<&str>) -> (RestVectorStore, Arc<ScriptedHttpClient>) {
        let http = Arc::new(ScriptedHttpClient::new(
            bodies
                .into_iter()
                .map(|body| Ok(HttpResponse::ok_json(body)))
                .collect(),
        ));
        let config = VectorStoreConfig {
            service_key: Some(String::from("service-key")),
            dimension: 3,
            ..VectorStoreConfig::default()
        };
        (RestVectorStore::new(config, http.clone()), http)
    }

    #[test]
    fn search_posts_rpc_with_filters() {
        let body = r#"[
            {"news_id":"n1","title":"Results day","content_preview":"p","symbol":"HDFCBANK.NS","similarity":0.8123}
        ]"#;
        let (store, http) = store_with(vec![body]);

        let rows = block_on(store.search(
            &[0.1, 0.2, 0.3],
            VectorSearch {
                symbol: Some(String::from("HDFCBANK.NS")),
                start_date: Some(String::from("2024-03-01")),
                end_date: Some(String::from("2024-03-31")),
                top_k: 6,
                min_similarity: 0.7,
            },
        ))
        .expect("search ok");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "n1");
        assert_eq!(rows[0].similarity, 0.812);

        let request = &http.recorded_requests()[0];
        assert!(request.url.ends_with("/rpc/match_news_embeddings"));
        let payload: serde_json::Value =
            serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(payload["match_threshold"], 0.7);
        assert_eq!(payload["match_count"], 6);
        assert_eq!(payload["filter_symbol"], "HDFCBANK.NS");
        assert_eq!(payload["filter_start_date"], "2024-03-01");
    }

    #[test]
    fn search_rejects_wrong_dimension_before_sending() {
        let (store, http) = store_with(vec!["[]"]);

        let error = block_on(store.search(
            &[0.1, 0.2],
            VectorSearch {
                symbol: None,
                start_date: None,
                end_date: None,
                top_k: 6,
                min_similarity: 0.5,
            },
        ))
        .expect_err("must fail");

        assert_eq!(error.kind(), UpstreamErrorKind::InvalidRequest);
        assert!(http.recorded_requests().is_empty());
    }

    #[test]
    fn exists_checks_row_presence() {
        let (store, _) = store_with(vec![r#"[{"news_id":"n1"}]"#]);
        assert!(block_on(store.exists("n1")).expect("exists ok"));

        let (store, _) = store_with(vec!["[]"]);
        assert!(!block_on(store.exists("n2")).expect("exists ok"));
    }

    #[test]
    fn stats_counts_unique_symbols() {
        let body = r#"[
            {"symbol":"HDFCBANK.NS"},
            {"symbol":"TCS.NS"},
            {"symbol":"HDFCBANK.NS"},
            {"symbol":null}
        ]"#;
        let (store, _) = store_with(vec![body]);

        let stats = block_on(store.stats()).expect("stats ok");
        assert_eq!(stats.total_embeddings, 4);
        assert_eq!(stats.unique_symbols, 2);
        assert_eq!(stats.vector_dimension, 3);
    }

    #[test]
    fn insert_clips_preview_and_sends_service_headers() {
        let (store, http) = store_with(vec!["[]"]);

        let metadata = DocumentMetadata {
            symbol: Some(String::from("TCS.NS")),
            content_preview: Some("x".repeat(700)),
            ..DocumentMetadata::default()
        };
        block_on(store.insert("n9", vec![0.0, 0.0, 0.0], metadata)).expect("insert ok");

        let request = &http.recorded_requests()[0];
        assert_eq!(
            request.headers.get("apikey").map(String::as_str),
            Some("service-key")
        );
        let payload: serde_json::Value =
            serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(payload["content_preview"].as_str().unwrap().len(), 500);
    }
}
