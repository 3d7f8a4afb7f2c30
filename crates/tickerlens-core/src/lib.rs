//! Core contracts for tickerlens.
//!
//! This crate contains:
//! - Canonical domain models and validation
//! - Structured upstream/validation errors
//! - The shared HTTP transport trait and its production client
//! - Resilience primitives (retry, circuit breaker)
//! - The backend price/news API adapter

pub mod backend;
pub mod circuit_breaker;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod retry;

pub use backend::{BackendClient, BackendConfig};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use domain::{
    EvidenceDocument, MatchQuality, NewsArticle, PricePoint, SentimentAggregate, StockSummary,
    Symbol, EXCHANGE_SUFFIX, MAX_SYMBOL_LEN,
};
pub use error::{UpstreamError, UpstreamErrorKind, ValidationError};
pub use http_client::{
    HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, NoopHttpClient,
    ReqwestHttpClient,
};
pub use retry::{Backoff, RetryConfig};
