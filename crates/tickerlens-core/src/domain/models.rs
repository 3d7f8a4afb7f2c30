use serde::{Deserialize, Serialize};

use crate::{Symbol, ValidationError};

/// Daily OHLCV record with derived intra-day change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Trading date, `YYYY-MM-DD`.
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub change: f64,
    pub change_percent: f64,
}

impl PricePoint {
    pub fn new(
        date: impl Into<String>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("open", open)?;
        validate_non_negative("high", high)?;
        validate_non_negative("low", low)?;
        validate_non_negative("close", close)?;

        let date = date.into();
        if !is_iso_date(&date) {
            return Err(ValidationError::InvalidDate { value: date });
        }

        let change = close - open;
        let change_percent = if open > 0.0 {
            change / open * 100.0
        } else {
            0.0
        };

        Ok(Self {
            date,
            open,
            high,
            low,
            close,
            volume,
            change: round2(change),
            change_percent: round2(change_percent),
        })
    }
}

/// Current-period price metrics computed from a daily series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSummary {
    pub symbol: String,
    pub period_days: u32,
    pub current_price: f64,
    pub open_price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub high: f64,
    pub low: f64,
    pub avg_volume: u64,
    /// Standard deviation of daily returns, in percent.
    pub volatility: f64,
    pub last_updated: String,
    pub data_points: usize,
}

impl StockSummary {
    /// Derive summary metrics from an ascending daily series.
    ///
    /// Returns `None` for an empty series; callers treat that as a missing
    /// upstream result, not a computation error.
    pub fn from_series(symbol: &Symbol, period_days: u32, series: &[PricePoint]) -> Option<Self> {
        let first = series.first()?;
        let last = series.last()?;

        let high = series.iter().map(|p| p.high).fold(f64::MIN, f64::max);
        // Zero lows mean missing data upstream; exclude them from the min.
        let low = series
            .iter()
            .map(|p| p.low)
            .filter(|low| *low > 0.0)
            .fold(f64::INFINITY, f64::min);
        let low = if low.is_finite() { low } else { 0.0 };

        let avg_volume = series.iter().map(|p| p.volume).sum::<u64>() / series.len() as u64;

        let change = last.close - first.open;
        let change_percent = if first.open > 0.0 {
            change / first.open * 100.0
        } else {
            0.0
        };

        Some(Self {
            symbol: symbol.display_form().to_owned(),
            period_days,
            current_price: last.close,
            open_price: first.open,
            change: round2(change),
            change_percent: round2(change_percent),
            high: round2(high),
            low: round2(low),
            avg_volume,
            volatility: volatility_percent(series),
            last_updated: last.date.clone(),
            data_points: series.len(),
        })
    }
}

/// Standard deviation of close-to-close daily returns, as a percentage.
fn volatility_percent(series: &[PricePoint]) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }

    let returns: Vec<f64> = series
        .windows(2)
        .filter(|pair| pair[0].close > 0.0)
        .map(|pair| (pair[1].close - pair[0].close) / pair[0].close)
        .collect();

    if returns.is_empty() {
        return 0.0;
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;

    round2(variance.sqrt() * 100.0)
}

/// News article with sentiment annotations from the NLP pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub url: Option<String>,
    pub source: Option<String>,
    pub published_at: String,
    pub sentiment: Option<String>,
    pub sentiment_score: f64,
    pub stock_symbol: Option<String>,
}

impl NewsArticle {
    /// Publish date prefix (`YYYY-MM-DD`) used for window filtering and
    /// per-date sentiment aggregation.
    pub fn published_date(&self) -> &str {
        let end = self.published_at.len().min(10);
        &self.published_at[..end]
    }
}

/// Aggregated sentiment statistics for a symbol over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentAggregate {
    pub symbol: String,
    pub period: String,
    pub total_articles: usize,
    pub avg_sentiment: f64,
    pub positive_count: usize,
    pub negative_count: usize,
    pub neutral_count: usize,
    pub positive_pct: f64,
    pub negative_pct: f64,
    pub neutral_pct: f64,
}

/// Human-readable relevance band derived from a document score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchQuality {
    Excellent,
    High,
    Good,
    Moderate,
    Low,
}

impl MatchQuality {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Self::Excellent
        } else if score >= 0.8 {
            Self::High
        } else if score >= 0.7 {
            Self::Good
        } else if score >= 0.6 {
            Self::Moderate
        } else {
            Self::Low
        }
    }
}

/// Ranked, deduplicated evidence document returned by retrieval.
///
/// `final_score` is derived per request (recency and symbol boosts applied
/// to the raw similarity); it is never stored upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceDocument {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub url: Option<String>,
    pub source: Option<String>,
    pub published_at: Option<String>,
    pub sentiment_label: Option<String>,
    pub sentiment_score: Option<f64>,
    pub similarity_score: f64,
    pub final_score: f64,
    pub match_quality: MatchQuality,
}

pub(crate) fn validate_non_negative(
    field: &'static str,
    value: f64,
) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

fn is_iso_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| matches!(i, 4 | 7) || b.is_ascii_digit())
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
