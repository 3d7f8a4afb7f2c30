//! Pearson correlation with strength banding, significance heuristics,
//! and sentiment/price divergence detection.

use serde::{Deserialize, Serialize};
use tickerlens_core::ValidationError;
use tracing::info;

/// Minimum series length for a meaningful coefficient.
const MIN_DATA_POINTS: usize = 3;

/// Banded correlation strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrelationStrength {
    VeryStrong,
    Strong,
    Moderate,
    Weak,
    VeryWeak,
    /// One or both series were constant; no coefficient exists.
    NoVariance,
}

impl CorrelationStrength {
    fn from_abs(abs_corr: f64) -> Self {
        if abs_corr >= 0.9 {
            Self::VeryStrong
        } else if abs_corr >= 0.7 {
            Self::Strong
        } else if abs_corr >= 0.5 {
            Self::Moderate
        } else if abs_corr >= 0.3 {
            Self::Weak
        } else {
            Self::VeryWeak
        }
    }
}

/// Sign of the relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
    None,
}

impl Direction {
    fn word(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::None => "none",
        }
    }
}

/// Rule-of-thumb significance given the sample size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Significance {
    LikelySignificant,
    NotSignificant,
    NotApplicable,
}

fn assess_significance(coefficient: f64, n: usize) -> Significance {
    // Small samples need a stronger coefficient to mean anything.
    let threshold = if n < 10 {
        0.6
    } else if n < 30 {
        0.4
    } else {
        0.3
    };
    if coefficient.abs() >= threshold {
        Significance::LikelySignificant
    } else {
        Significance::NotSignificant
    }
}

/// Outcome of correlating two equally long series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub series_a_name: String,
    pub series_b_name: String,
    /// `None` when either series has zero variance.
    pub correlation_coefficient: Option<f64>,
    pub r_squared: Option<f64>,
    pub direction: Direction,
    pub strength: CorrelationStrength,
    pub data_points: usize,
    pub interpretation: String,
    pub statistical_significance: Significance,
}

/// Correlate two series by name.
///
/// Rejects mismatched lengths and fewer than three points. A constant
/// series yields the no-variance sentinel rather than an error.
pub fn correlate(
    series_a: &[f64],
    series_b: &[f64],
    series_a_name: &str,
    series_b_name: &str,
) -> Result<CorrelationResult, ValidationError> {
    if series_a.len() != series_b.len() {
        return Err(ValidationError::SeriesLengthMismatch {
            len_a: series_a.len(),
            len_b: series_b.len(),
        });
    }
    if series_a.len() < MIN_DATA_POINTS {
        return Err(ValidationError::TooFewDataPoints {
            min: MIN_DATA_POINTS,
            got: series_a.len(),
        });
    }

    if std_dev(series_a) == 0.0 || std_dev(series_b) == 0.0 {
        return Ok(CorrelationResult {
            series_a_name: series_a_name.to_owned(),
            series_b_name: series_b_name.to_owned(),
            correlation_coefficient: None,
            r_squared: None,
            direction: Direction::None,
            strength: CorrelationStrength::NoVariance,
            data_points: series_a.len(),
            interpretation: format!(
                "Insufficient variance in one or both series to compute correlation \
                 between {series_a_name} and {series_b_name}."
            ),
            statistical_significance: Significance::NotApplicable,
        });
    }

    let coefficient = pearson(series_a, series_b);
    let strength = CorrelationStrength::from_abs(coefficient.abs());
    let direction = if coefficient > 0.0 {
        Direction::Positive
    } else if coefficient < 0.0 {
        Direction::Negative
    } else {
        Direction::None
    };

    info!(
        a = series_a_name,
        b = series_b_name,
        coefficient = round3(coefficient),
        ?strength,
        "correlation computed"
    );

    Ok(CorrelationResult {
        series_a_name: series_a_name.to_owned(),
        series_b_name: series_b_name.to_owned(),
        correlation_coefficient: Some(round3(coefficient)),
        r_squared: Some(round3(coefficient * coefficient)),
        direction,
        strength,
        data_points: series_a.len(),
        interpretation: interpretation(coefficient, series_a_name, series_b_name),
        statistical_significance: assess_significance(coefficient, series_a.len()),
    })
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let covariance: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum();
    let var_a: f64 = a.iter().map(|x| (x - mean_a).powi(2)).sum();
    let var_b: f64 = b.iter().map(|y| (y - mean_b).powi(2)).sum();

    covariance / (var_a.sqrt() * var_b.sqrt())
}

fn std_dev(series: &[f64]) -> f64 {
    let n = series.len() as f64;
    let mean = series.iter().sum::<f64>() / n;
    (series.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn interpretation(coefficient: f64, name_a: &str, name_b: &str) -> String {
    let strength = CorrelationStrength::from_abs(coefficient.abs());
    let direction = if coefficient > 0.0 {
        "positive"
    } else {
        "negative"
    };

    match strength {
        CorrelationStrength::VeryStrong | CorrelationStrength::Strong => {
            let strength_words = if strength == CorrelationStrength::VeryStrong {
                "very strong"
            } else {
                "strong"
            };
            let tendency = if coefficient > 0.0 {
                "increase"
            } else {
                "decrease"
            };
            format!(
                "There is a {strength_words} {direction} relationship between {name_a} and \
                 {name_b}. When one increases, the other tends to {tendency} as well."
            )
        }
        CorrelationStrength::Moderate => {
            let movement = if coefficient > 0.0 {
                "together"
            } else {
                "in opposite directions"
            };
            format!(
                "There is a moderate {direction} relationship. {name_a} and {name_b} show \
                 some tendency to move {movement}."
            )
        }
        _ => format!(
            "There is little to no clear relationship between {name_a} and {name_b}. \
             They appear to move independently."
        ),
    }
}

/// A day where price and sentiment pointed sharply in opposite directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Divergence {
    pub index: usize,
    #[serde(rename = "type")]
    pub kind: DivergenceKind,
    pub price_change: f64,
    pub sentiment: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    BullishPriceBearishSentiment,
    BearishPriceBullishSentiment,
}

/// Tunables for the sentiment/price analysis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationConfig {
    /// |value| beyond which a day counts as a sharp move for divergence
    /// detection.
    pub divergence_threshold: f64,
    /// |r| above which sentiment is called a reliable indicator.
    pub strong_insight_threshold: f64,
    /// |r| above which sentiment is called moderately predictive.
    pub moderate_insight_threshold: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            divergence_threshold: 1.5,
            strong_insight_threshold: 0.7,
            moderate_insight_threshold: 0.4,
        }
    }
}

/// Sentiment/price correlation with actionable framing and divergences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentPriceCorrelation {
    #[serde(flatten)]
    pub correlation: CorrelationResult,
    pub actionable_insight: String,
    pub recommendation: String,
    pub divergence_periods: Vec<Divergence>,
    pub divergence_count: usize,
}

/// Correlate aligned daily price changes against sentiment scores.
pub fn correlate_sentiment_price(
    price_changes: &[f64],
    sentiment_scores: &[f64],
    symbol: &str,
    config: &CorrelationConfig,
) -> Result<SentimentPriceCorrelation, ValidationError> {
    let correlation = correlate(
        price_changes,
        sentiment_scores,
        &format!("{symbol} Price Change %"),
        &format!("{symbol} Sentiment Score"),
    )?;

    let (actionable_insight, recommendation) = match correlation.correlation_coefficient {
        Some(r) if r.abs() > config.strong_insight_threshold => (
            format!(
                "Strong {} correlation suggests sentiment is a reliable indicator for {symbol}",
                correlation.direction.word()
            ),
            String::from("Monitor sentiment closely for trading signals"),
        ),
        Some(r) if r.abs() > config.moderate_insight_threshold => (
            format!(
                "Moderate {} correlation - sentiment has some predictive value",
                correlation.direction.word()
            ),
            String::from("Use sentiment as one of multiple indicators"),
        ),
        _ => (
            String::from("Weak correlation - sentiment alone may not predict price movements"),
            String::from("Consider other fundamental and technical factors"),
        ),
    };

    let divergence_periods =
        detect_divergences(price_changes, sentiment_scores, config.divergence_threshold);
    let divergence_count = divergence_periods.len();

    Ok(SentimentPriceCorrelation {
        correlation,
        actionable_insight,
        recommendation,
        divergence_periods,
        divergence_count,
    })
}

fn detect_divergences(
    price_changes: &[f64],
    sentiment_scores: &[f64],
    threshold: f64,
) -> Vec<Divergence> {
    price_changes
        .iter()
        .zip(sentiment_scores)
        .enumerate()
        .filter_map(|(index, (&price, &sentiment))| {
            let kind = if price > threshold && sentiment < -threshold {
                DivergenceKind::BullishPriceBearishSentiment
            } else if price < -threshold && sentiment > threshold {
                DivergenceKind::BearishPriceBullishSentiment
            } else {
                return None;
            };
            Some(Divergence {
                index,
                kind,
                price_change: round2(price),
                sentiment: round2(sentiment),
            })
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
