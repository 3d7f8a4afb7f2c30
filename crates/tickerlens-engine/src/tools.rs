//! Tool invocation boundary.
//!
//! Callers address tools by wire name with loosely typed JSON arguments.
//! Dispatch goes through a typed registry: names parse into [`ToolName`],
//! arguments deserialize into per-tool structs, and every failure mode
//! becomes a structured response instead of a panic.

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tickerlens_core::{Symbol, ValidationError};
use tickerlens_retrieval::AdaptiveRetriever;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::correlation::{correlate, correlate_sentiment_price, CorrelationConfig};
use crate::orchestrator::Orchestrator;

/// Wire-addressable tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    RagEvidence,
    RagStats,
    Correlation,
    SentimentPriceCorrelation,
    ExplainPriceChange,
}

impl ToolName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RagEvidence => "get_rag_evidence",
            Self::RagStats => "get_rag_stats",
            Self::Correlation => "calculate_correlation",
            Self::SentimentPriceCorrelation => "calculate_sentiment_price_correlation",
            Self::ExplainPriceChange => "explain_price_change",
        }
    }
}

impl FromStr for ToolName {
    type Err = ValidationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "get_rag_evidence" => Ok(Self::RagEvidence),
            "get_rag_stats" => Ok(Self::RagStats),
            "calculate_correlation" => Ok(Self::Correlation),
            "calculate_sentiment_price_correlation" => Ok(Self::SentimentPriceCorrelation),
            "explain_price_change" => Ok(Self::ExplainPriceChange),
            other => Err(ValidationError::UnknownTool {
                name: other.to_owned(),
            }),
        }
    }
}

fn default_top_k() -> usize {
    6
}

fn default_series_a_name() -> String {
    String::from("Series A")
}

fn default_series_b_name() -> String {
    String::from("Series B")
}

fn default_symbol_label() -> String {
    String::from("Stock")
}

#[derive(Debug, Deserialize)]
struct RagEvidenceArgs {
    symbol: String,
    start_date: String,
    end_date: String,
    query_text: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct CorrelationArgs {
    series_a: Vec<f64>,
    series_b: Vec<f64>,
    #[serde(default = "default_series_a_name")]
    series_a_name: String,
    #[serde(default = "default_series_b_name")]
    series_b_name: String,
}

#[derive(Debug, Deserialize)]
struct SentimentPriceCorrelationArgs {
    price_changes: Vec<f64>,
    sentiment_scores: Vec<f64>,
    #[serde(default = "default_symbol_label")]
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct ExplainArgs {
    symbol: String,
    start_date: String,
    end_date: String,
}

/// Uniform tool invocation envelope.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ToolResponse {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ToolResponse {
    fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            timestamp: now_rfc3339(),
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(message.into()),
            timestamp: now_rfc3339(),
        }
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Typed dispatcher over the engine's tool surface.
#[derive(Clone)]
pub struct ToolRegistry {
    orchestrator: Arc<Orchestrator>,
    retriever: Arc<AdaptiveRetriever>,
    correlation: CorrelationConfig,
}

impl ToolRegistry {
    pub fn new(orchestrator: Arc<Orchestrator>, retriever: Arc<AdaptiveRetriever>) -> Self {
        Self {
            orchestrator,
            retriever,
            correlation: CorrelationConfig::default(),
        }
    }

    pub fn with_correlation_config(mut self, config: CorrelationConfig) -> Self {
        self.correlation = config;
        self
    }

    /// Dispatch a named tool call. Never panics; every failure is a
    /// `success: false` response.
    pub async fn call(&self, name: &str, arguments: Value) -> ToolResponse {
        let tool = match ToolName::from_str(name) {
            Ok(tool) => tool,
            Err(_) => {
                warn!(name, "tool not found");
                return ToolResponse::err(format!("Tool '{name}' not found"));
            }
        };

        info!(tool = tool.as_str(), "tool call");
        match tool {
            ToolName::RagEvidence => self.call_rag_evidence(arguments).await,
            ToolName::RagStats => self.call_rag_stats().await,
            ToolName::Correlation => self.call_correlation(arguments),
            ToolName::SentimentPriceCorrelation => {
                self.call_sentiment_price_correlation(arguments)
            }
            ToolName::ExplainPriceChange => self.call_explain(arguments).await,
        }
    }

    async fn call_rag_evidence(&self, arguments: Value) -> ToolResponse {
        let args: RagEvidenceArgs = match parse_args(ToolName::RagEvidence, arguments) {
            Ok(args) => args,
            Err(response) => return response,
        };
        let symbol = match Symbol::parse(&args.symbol) {
            Ok(symbol) => symbol,
            Err(error) => return ToolResponse::err(error.to_string()),
        };

        match self
            .retriever
            .retrieve(
                &symbol,
                &args.start_date,
                &args.end_date,
                &args.query_text,
                args.top_k,
            )
            .await
        {
            Ok(evidence) => json_response(&evidence),
            Err(error) => ToolResponse::err(error.to_string()),
        }
    }

    async fn call_rag_stats(&self) -> ToolResponse {
        match self.retriever.stats().await {
            Ok(stats) => json_response(&stats),
            Err(error) => ToolResponse::err(error.to_string()),
        }
    }

    fn call_correlation(&self, arguments: Value) -> ToolResponse {
        let args: CorrelationArgs = match parse_args(ToolName::Correlation, arguments) {
            Ok(args) => args,
            Err(response) => return response,
        };
        match correlate(
            &args.series_a,
            &args.series_b,
            &args.series_a_name,
            &args.series_b_name,
        ) {
            Ok(result) => json_response(&result),
            Err(error) => ToolResponse::err(error.to_string()),
        }
    }

    fn call_sentiment_price_correlation(&self, arguments: Value) -> ToolResponse {
        let args: SentimentPriceCorrelationArgs =
            match parse_args(ToolName::SentimentPriceCorrelation, arguments) {
                Ok(args) => args,
                Err(response) => return response,
            };
        match correlate_sentiment_price(
            &args.price_changes,
            &args.sentiment_scores,
            &args.symbol,
            &self.correlation,
        ) {
            Ok(result) => json_response(&result),
            Err(error) => ToolResponse::err(error.to_string()),
        }
    }

    async fn call_explain(&self, arguments: Value) -> ToolResponse {
        let args: ExplainArgs = match parse_args(ToolName::ExplainPriceChange, arguments) {
            Ok(args) => args,
            Err(response) => return response,
        };
        let symbol = match Symbol::parse(&args.symbol) {
            Ok(symbol) => symbol,
            Err(error) => return ToolResponse::err(error.to_string()),
        };

        match self
            .orchestrator
            .explain(&symbol, &args.start_date, &args.end_date)
            .await
        {
            Ok(bundle) => json_response(&bundle),
            Err(error) => ToolResponse::err(error.to_string()),
        }
    }

}

fn parse_args<T: serde::de::DeserializeOwned>(
    tool: ToolName,
    arguments: Value,
) -> Result<T, ToolResponse> {
    serde_json::from_value(arguments).map_err(|e| {
        let error = ValidationError::BadArguments {
            tool: tool.as_str(),
            message: e.to_string(),
        };
        warn!(tool = tool.as_str(), %error, "bad tool arguments");
        ToolResponse::err(error.to_string())
    })
}

fn json_response<T: serde::Serialize>(value: &T) -> ToolResponse {
    match serde_json::to_value(value) {
        Ok(json) => ToolResponse::ok(json),
        Err(e) => ToolResponse::err(format!("failed to serialize tool result: {e}")),
    }
}
