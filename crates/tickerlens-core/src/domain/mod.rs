//! Canonical domain models and validation.

pub mod models;
pub mod symbol;

pub use models::{
    EvidenceDocument, MatchQuality, NewsArticle, PricePoint, SentimentAggregate, StockSummary,
};
pub use symbol::{Symbol, EXCHANGE_SUFFIX, MAX_SYMBOL_LEN};
