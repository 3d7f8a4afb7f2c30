//! Analytics and orchestration for tickerlens.
//!
//! This crate contains:
//! - Pearson correlation with strength/significance banding and
//!   sentiment/price divergence detection
//! - The failure-tolerant explanation orchestrator
//! - The typed tool invocation boundary

pub mod correlation;
pub mod orchestrator;
pub mod tools;

pub use correlation::{
    correlate, correlate_sentiment_price, CorrelationConfig, CorrelationResult,
    CorrelationStrength, Direction, Divergence, DivergenceKind, SentimentPriceCorrelation,
    Significance,
};
pub use orchestrator::{
    ExplanationBundle, Orchestrator, OrchestratorConfig, Period, ToolStatus,
};
pub use tools::{ToolName, ToolRegistry, ToolResponse};
