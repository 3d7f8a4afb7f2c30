//! Failure-tolerant orchestration of the "why did this stock move?" flow.
//!
//! Four data stages fan out concurrently; each failure downgrades to an
//! error entry in `tool_status` and never aborts the bundle. The fifth
//! stage (sentiment/price correlation) is computed locally from stage
//! outputs and is skipped outright when its inputs are missing.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tickerlens_core::{
    BackendClient, EvidenceDocument, NewsArticle, PricePoint, SentimentAggregate, StockSummary,
    Symbol, ValidationError,
};
use tickerlens_retrieval::AdaptiveRetriever;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::{info, warn};

use crate::correlation::{correlate_sentiment_price, CorrelationConfig, SentimentPriceCorrelation};

const DATE_FORMAT: &[time::format_description::FormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

/// Orchestration tunables.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Articles fetched for the sentiment stage.
    pub news_top_n: usize,
    /// Evidence documents requested from retrieval.
    pub evidence_top_k: usize,
    /// Price points kept in the bundle, most recent first trimmed from the
    /// end of the ascending series.
    pub history_display_points: usize,
    /// Minimum aligned (price, sentiment) days before correlating.
    pub min_aligned_points: usize,
    pub correlation: CorrelationConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            news_top_n: 10,
            evidence_top_k: 6,
            history_display_points: 14,
            min_aligned_points: 3,
            correlation: CorrelationConfig::default(),
        }
    }
}

/// Per-stage outcome recorded in the bundle.
///
/// A skipped stage has no entry at all; absence is not failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Ok,
    Error,
}

/// Analysis window echoed back in the bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub start_date: String,
    pub end_date: String,
    pub days: i64,
}

/// Everything gathered to explain a price move over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationBundle {
    pub symbol: String,
    pub period: Period,
    pub stock_summary: Option<StockSummary>,
    pub historical_prices: Vec<PricePoint>,
    pub news_sentiment: Vec<NewsArticle>,
    pub sentiment_aggregate: Option<SentimentAggregate>,
    pub rag_evidence: Vec<EvidenceDocument>,
    pub correlation: Option<SentimentPriceCorrelation>,
    pub timestamp: String,
    pub tool_status: BTreeMap<String, ToolStatus>,
}

/// Fans out to the backend and retriever, then assembles the bundle.
#[derive(Clone)]
pub struct Orchestrator {
    backend: Arc<BackendClient>,
    retriever: Arc<AdaptiveRetriever>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<BackendClient>,
        retriever: Arc<AdaptiveRetriever>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            backend,
            retriever,
            config,
        }
    }

    /// Gather summary, prices, news, evidence, and correlation for the
    /// window. Only an invalid window is an error; upstream failures are
    /// reported per stage inside the bundle.
    pub async fn explain(
        &self,
        symbol: &Symbol,
        start_date: &str,
        end_date: &str,
    ) -> Result<ExplanationBundle, ValidationError> {
        let period_days = period_days(start_date, end_date)?;
        info!(
            symbol = %symbol,
            start_date,
            end_date,
            period_days,
            "explaining price change"
        );

        let query_text = format!(
            "reasons for {} price change drop decline fall movement",
            symbol.display_form()
        );

        let summary_stage = self.backend.stock_summary(symbol, period_days.max(0) as u32);
        let prices_stage = self.backend.price_history(symbol, start_date, end_date);
        let news_stage = async {
            let news = self
                .backend
                .news(symbol, start_date, end_date, self.config.news_top_n, None)
                .await;
            let aggregate = self
                .backend
                .sentiment_aggregate(symbol, start_date, end_date)
                .await;
            (news, aggregate)
        };
        let evidence_stage = self.retriever.retrieve(
            symbol,
            start_date,
            end_date,
            &query_text,
            self.config.evidence_top_k,
        );

        let (summary_result, prices_result, (news_result, aggregate_result), evidence_result) =
            tokio::join!(summary_stage, prices_stage, news_stage, evidence_stage);

        let mut tool_status = BTreeMap::new();

        let stock_summary = match summary_result {
            Ok(Some(summary)) => {
                tool_status.insert(String::from("stock_summary"), ToolStatus::Ok);
                Some(summary)
            }
            Ok(None) => {
                warn!(symbol = %symbol, "no price data for summary");
                tool_status.insert(String::from("stock_summary"), ToolStatus::Error);
                None
            }
            Err(error) => {
                warn!(symbol = %symbol, error = %error, "stock summary failed");
                tool_status.insert(String::from("stock_summary"), ToolStatus::Error);
                None
            }
        };

        let historical_prices = match prices_result {
            Ok(prices) => {
                tool_status.insert(String::from("historical_prices"), ToolStatus::Ok);
                prices
            }
            Err(error) => {
                warn!(symbol = %symbol, error = %error, "price history failed");
                tool_status.insert(String::from("historical_prices"), ToolStatus::Error);
                Vec::new()
            }
        };

        let news_sentiment = match news_result {
            Ok(articles) => {
                tool_status.insert(String::from("news_sentiment"), ToolStatus::Ok);
                articles
            }
            Err(error) => {
                warn!(symbol = %symbol, error = %error, "news fetch failed");
                tool_status.insert(String::from("news_sentiment"), ToolStatus::Error);
                Vec::new()
            }
        };

        let sentiment_aggregate = match aggregate_result {
            Ok(aggregate) => Some(aggregate),
            Err(error) => {
                warn!(symbol = %symbol, error = %error, "sentiment aggregate failed");
                None
            }
        };

        let rag_evidence = match evidence_result {
            Ok(evidence) => {
                tool_status.insert(String::from("rag_evidence"), ToolStatus::Ok);
                evidence
            }
            Err(error) => {
                warn!(symbol = %symbol, error = %error, "evidence retrieval failed");
                tool_status.insert(String::from("rag_evidence"), ToolStatus::Error);
                Vec::new()
            }
        };

        let correlation = match self.correlation_stage(
            symbol,
            &historical_prices,
            &news_sentiment,
            &tool_status,
        ) {
            CorrelationStage::Skipped => None,
            CorrelationStage::Computed(result) => {
                tool_status.insert(String::from("correlation"), ToolStatus::Ok);
                Some(result)
            }
            CorrelationStage::Failed => {
                tool_status.insert(String::from("correlation"), ToolStatus::Error);
                None
            }
        };

        let mut historical_prices = historical_prices;
        if historical_prices.len() > self.config.history_display_points {
            let skip = historical_prices.len() - self.config.history_display_points;
            historical_prices.drain(..skip);
        }

        info!(symbol = %symbol, ?tool_status, "orchestration complete");

        Ok(ExplanationBundle {
            symbol: symbol.display_form().to_owned(),
            period: Period {
                start_date: start_date.to_owned(),
                end_date: end_date.to_owned(),
                days: period_days,
            },
            stock_summary,
            historical_prices,
            news_sentiment,
            sentiment_aggregate,
            rag_evidence,
            correlation,
            timestamp: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
            tool_status,
        })
    }

    fn correlation_stage(
        &self,
        symbol: &Symbol,
        prices: &[PricePoint],
        news: &[NewsArticle],
        tool_status: &BTreeMap<String, ToolStatus>,
    ) -> CorrelationStage {
        let prices_ok = tool_status.get("historical_prices") == Some(&ToolStatus::Ok);
        let news_ok = tool_status.get("news_sentiment") == Some(&ToolStatus::Ok);
        if !prices_ok || !news_ok {
            info!(symbol = %symbol, "correlation skipped, upstream stage unavailable");
            return CorrelationStage::Skipped;
        }

        let daily_sentiment = mean_sentiment_by_date(news);
        let (price_changes, sentiment_series) = align_on_price_dates(prices, &daily_sentiment);

        if price_changes.len() < self.config.min_aligned_points {
            info!(
                symbol = %symbol,
                aligned = price_changes.len(),
                "correlation skipped, too few aligned days"
            );
            return CorrelationStage::Skipped;
        }

        match correlate_sentiment_price(
            &price_changes,
            &sentiment_series,
            symbol.display_form(),
            &self.config.correlation,
        ) {
            Ok(result) => CorrelationStage::Computed(result),
            Err(error) => {
                warn!(symbol = %symbol, error = %error, "correlation failed");
                CorrelationStage::Failed
            }
        }
    }
}

enum CorrelationStage {
    Skipped,
    Computed(SentimentPriceCorrelation),
    Failed,
}

fn period_days(start_date: &str, end_date: &str) -> Result<i64, ValidationError> {
    let start = parse_date(start_date)?;
    let end = parse_date(end_date)?;
    Ok((end - start).whole_days())
}

fn parse_date(value: &str) -> Result<Date, ValidationError> {
    Date::parse(value, DATE_FORMAT).map_err(|_| ValidationError::InvalidDate {
        value: value.to_owned(),
    })
}

/// Mean sentiment score per publish date.
pub(crate) fn mean_sentiment_by_date(news: &[NewsArticle]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for article in news {
        let date = article.published_date();
        if date.is_empty() {
            continue;
        }
        let entry = sums.entry(date.to_owned()).or_insert((0.0, 0));
        entry.0 += article.sentiment_score;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(date, (sum, count))| (date, sum / count as f64))
        .collect()
}

/// Pair each price date that has sentiment data with that day's mean
/// sentiment. Days without sentiment are dropped, not zero-filled.
pub(crate) fn align_on_price_dates(
    prices: &[PricePoint],
    daily_sentiment: &BTreeMap<String, f64>,
) -> (Vec<f64>, Vec<f64>) {
    let mut price_changes = Vec::new();
    let mut sentiment_series = Vec::new();
    for point in prices {
        if let Some(&sentiment) = daily_sentiment.get(&point.date) {
            price_changes.push(point.change_percent);
            sentiment_series.push(sentiment);
        }
    }
    (price_changes, sentiment_series)
}
