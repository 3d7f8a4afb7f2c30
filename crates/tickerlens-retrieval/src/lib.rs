//! Adaptive semantic evidence retrieval for tickerlens.
//!
//! This crate contains:
//! - The embedding provider interface and its OpenAI-compatible client
//! - The vector store interface and its REST implementation
//! - The adaptive retriever: threshold ladder, reranking, fallback

pub mod embedding;
pub mod retriever;
pub mod vector_store;

#[cfg(test)]
pub(crate) mod testing;

pub use embedding::{EmbeddingConfig, EmbeddingProvider, OpenAiEmbedder, MAX_EMBED_CHARS};
pub use retriever::{AdaptiveRetriever, RetrieverConfig};
pub use vector_store::{
    DocumentMetadata, RestVectorStore, StoredDocument, VectorSearch, VectorStore,
    VectorStoreConfig, VectorStoreStats,
};
