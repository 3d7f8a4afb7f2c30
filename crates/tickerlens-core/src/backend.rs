//! Backend Data API adapter.
//!
//! Read-only client for the price/news HTTP backend. Price metrics are
//! computed locally from the daily series; the backend only serves raw
//! rows. All calls carry an explicit timeout, go through the circuit
//! breaker, and retry transient failures per [`RetryConfig`].

use std::sync::Arc;

use serde::Deserialize;
use time::macros::format_description;
use time::Date;
use tracing::{debug, info, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::domain::{NewsArticle, PricePoint, SentimentAggregate, StockSummary, Symbol};
use crate::error::{UpstreamError, ValidationError};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::retry::RetryConfig;

const DATE_FORMAT: &[time::format_description::FormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

/// Backend endpoint and transport settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub retry: RetryConfig,
    pub breaker: CircuitBreakerConfig,
    /// Window fraction below which a long-range price fetch is considered
    /// sparse and refetched with extra headroom.
    pub sparse_fill_ratio: f64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("http://localhost:8000/api"),
            api_key: None,
            timeout_ms: 30_000,
            retry: RetryConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            sparse_fill_ratio: 0.5,
        }
    }
}

impl BackendConfig {
    /// Read endpoint and key material from the environment.
    /// Keys are never logged.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("BACKEND_API_URL") {
            if !url.trim().is_empty() {
                config.base_url = url.trim_end_matches('/').to_owned();
            }
        }
        config.api_key = std::env::var("BACKEND_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        config
    }
}

/// Client for the backend price/news API.
///
/// Cheap to clone; the transport handle is shared and connection-pooled.
#[derive(Clone)]
pub struct BackendClient {
    config: BackendConfig,
    http: Arc<dyn HttpClient>,
    breaker: Arc<CircuitBreaker>,
}

impl BackendClient {
    pub fn new(config: BackendConfig, http: Arc<dyn HttpClient>) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(config.breaker));
        Self {
            config,
            http,
            breaker,
        }
    }

    /// Daily price series for the requested window, ascending by date.
    ///
    /// The backend serves the last N days for a symbol; the client filters
    /// to the exact window and derives per-day change columns. A clean
    /// window with no trading days is an empty vec, not an error.
    pub async fn price_history(
        &self,
        symbol: &Symbol,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<PricePoint>, UpstreamError> {
        let history_days = days_between(start_date, end_date)
            .map_err(|e| UpstreamError::invalid_request(e.to_string()))?
            .max(1);

        let mut rows = self.fetch_price_rows(symbol, history_days).await?;

        // Long windows sometimes come back half-empty when the backend is
        // mid-backfill; one refetch with headroom usually fills the gaps.
        if history_days > 20
            && (rows.len() as f64) < history_days as f64 * self.config.sparse_fill_ratio
        {
            let extra_days = history_days + 10;
            info!(
                symbol = %symbol,
                returned = rows.len(),
                requested_days = history_days,
                "sparse price window, refetching with {extra_days} days"
            );
            match self.fetch_price_rows(symbol, extra_days).await {
                Ok(extra_rows) => {
                    for row in extra_rows {
                        if !rows.iter().any(|r| r.date == row.date) {
                            rows.push(row);
                        }
                    }
                }
                Err(error) => {
                    warn!(symbol = %symbol, error = %error, "extended price fetch failed");
                }
            }
        }

        rows.sort_by(|a, b| a.date.cmp(&b.date));
        rows.retain(|row| row.date.as_str() >= start_date && row.date.as_str() <= end_date);

        let points = rows
            .into_iter()
            .filter_map(|row| row.into_price_point().ok())
            .collect::<Vec<_>>();

        debug!(symbol = %symbol, points = points.len(), "price history fetched");
        Ok(points)
    }

    /// Current-period price metrics, computed locally from the daily series.
    ///
    /// `Ok(None)` means the backend had no rows for the symbol.
    pub async fn stock_summary(
        &self,
        symbol: &Symbol,
        period_days: u32,
    ) -> Result<Option<StockSummary>, UpstreamError> {
        let mut rows = self.fetch_price_rows(symbol, period_days.max(1) as i64).await?;
        rows.sort_by(|a, b| a.date.cmp(&b.date));

        let series = rows
            .into_iter()
            .filter_map(|row| row.into_price_point().ok())
            .collect::<Vec<_>>();

        let summary = StockSummary::from_series(symbol, period_days, &series);
        if let Some(summary) = &summary {
            info!(
                symbol = %symbol,
                change_percent = summary.change_percent,
                "stock summary computed"
            );
        }
        Ok(summary)
    }

    /// Recent articles with sentiment annotations, newest first, filtered to
    /// the window and truncated to `top_n`.
    pub async fn news(
        &self,
        symbol: &Symbol,
        start_date: &str,
        end_date: &str,
        top_n: usize,
        sentiment_filter: Option<&str>,
    ) -> Result<Vec<NewsArticle>, UpstreamError> {
        // Fetch beyond top_n; the date filter below thins the page out.
        let mut url = format!(
            "{}/news?stock_symbol={}&limit={}&page=1",
            self.config.base_url,
            urlencoding::encode(symbol.display_form()),
            top_n.saturating_mul(2).max(1),
        );
        if let Some(sentiment) = sentiment_filter {
            url.push_str("&sentiment=");
            url.push_str(&urlencoding::encode(sentiment));
        }

        let response = self.execute_with_retry(self.request(&url)).await?;
        let envelope: NewsEnvelope = serde_json::from_str(&response.body)
            .map_err(|e| UpstreamError::decode(format!("failed to parse news response: {e}")))?;

        let mut articles: Vec<NewsArticle> = envelope
            .data
            .into_iter()
            .map(NewsRow::into_article)
            .filter(|article| {
                let date = article.published_date();
                date >= start_date && date <= end_date
            })
            .collect();

        articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        articles.truncate(top_n);

        debug!(symbol = %symbol, articles = articles.len(), "news fetched");
        Ok(articles)
    }

    /// Aggregated sentiment statistics over the window.
    pub async fn sentiment_aggregate(
        &self,
        symbol: &Symbol,
        start_date: &str,
        end_date: &str,
    ) -> Result<SentimentAggregate, UpstreamError> {
        let articles = self.news(symbol, start_date, end_date, 100, None).await?;

        let period = format!("{start_date} to {end_date}");
        let total = articles.len();
        if total == 0 {
            return Ok(SentimentAggregate {
                symbol: symbol.display_form().to_owned(),
                period,
                total_articles: 0,
                avg_sentiment: 0.0,
                positive_count: 0,
                negative_count: 0,
                neutral_count: 0,
                positive_pct: 0.0,
                negative_pct: 0.0,
                neutral_pct: 0.0,
            });
        }

        let avg_sentiment =
            articles.iter().map(|a| a.sentiment_score).sum::<f64>() / total as f64;
        let positive = articles
            .iter()
            .filter(|a| a.sentiment.as_deref() == Some("positive"))
            .count();
        let negative = articles
            .iter()
            .filter(|a| a.sentiment.as_deref() == Some("negative"))
            .count();
        let neutral = articles
            .iter()
            .filter(|a| a.sentiment.as_deref() == Some("neutral"))
            .count();

        info!(symbol = %symbol, total, avg_sentiment, "sentiment aggregate computed");

        Ok(SentimentAggregate {
            symbol: symbol.display_form().to_owned(),
            period,
            total_articles: total,
            avg_sentiment: round3(avg_sentiment),
            positive_count: positive,
            negative_count: negative,
            // TODO: the upstream aggregate has always reported zero here even
            // when neutral articles exist; confirm with the backend owners
            // before switching this to the counted value.
            neutral_count: 0,
            positive_pct: round1(positive as f64 / total as f64 * 100.0),
            negative_pct: round1(negative as f64 / total as f64 * 100.0),
            neutral_pct: round1(neutral as f64 / total as f64 * 100.0),
        })
    }

    async fn fetch_price_rows(
        &self,
        symbol: &Symbol,
        days: i64,
    ) -> Result<Vec<PriceRow>, UpstreamError> {
        let url = format!(
            "{}/stocks/prices/{}?days={}",
            self.config.base_url,
            urlencoding::encode(symbol.display_form()),
            days.max(1),
        );

        let response = self.execute_with_retry(self.request(&url)).await?;
        serde_json::from_str(&response.body)
            .map_err(|e| UpstreamError::decode(format!("failed to parse price response: {e}")))
    }

    fn request(&self, url: &str) -> HttpRequest {
        let mut request = HttpRequest::get(url).with_timeout_ms(self.config.timeout_ms);
        if let Some(key) = &self.config.api_key {
            request = request.with_bearer(key);
        }
        request
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
    ) -> Result<HttpResponse, UpstreamError> {
        if !self.breaker.allow_request() {
            return Err(UpstreamError::transport(
                "backend circuit breaker is open; skipping upstream call",
            ));
        }

        let retry = &self.config.retry;
        let mut attempt: u32 = 0;

        loop {
            let result = self.http.execute(request.clone()).await;

            match result {
                Ok(response) if response.is_success() => {
                    self.breaker.record_success();
                    return Ok(response);
                }
                Ok(response) => {
                    self.breaker.record_failure();
                    let should_retry = retry.enabled
                        && attempt < retry.max_retries
                        && retry.should_retry_status(response.status);
                    if !should_retry {
                        return Err(UpstreamError::status(response.status, request.url.clone()));
                    }
                }
                Err(error) => {
                    self.breaker.record_failure();
                    let transient = error.timed_out() && retry.retry_on_timeout
                        || !error.timed_out() && error.retryable();
                    let should_retry = retry.enabled && attempt < retry.max_retries && transient;
                    if !should_retry {
                        return Err(if error.timed_out() {
                            UpstreamError::timeout(format!(
                                "backend timeout: {}",
                                error.message()
                            ))
                        } else {
                            UpstreamError::transport(format!(
                                "backend transport error: {}",
                                error.message()
                            ))
                        });
                    }
                }
            }

            let delay = retry.delay_for_attempt(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying backend call");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn days_between(start_date: &str, end_date: &str) -> Result<i64, ValidationError> {
    let start = parse_date(start_date)?;
    let end = parse_date(end_date)?;
    Ok((end - start).whole_days())
}

fn parse_date(value: &str) -> Result<Date, ValidationError> {
    Date::parse(value, DATE_FORMAT).map_err(|_| ValidationError::InvalidDate {
        value: value.to_owned(),
    })
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

// Backend wire shapes.

#[derive(Debug, Clone, Deserialize)]
struct PriceRow {
    date: String,
    #[serde(default)]
    open: f64,
    #[serde(default)]
    high: f64,
    #[serde(default)]
    low: f64,
    #[serde(default)]
    close: f64,
    #[serde(default)]
    volume: f64,
}

impl PriceRow {
    fn into_price_point(self) -> Result<PricePoint, ValidationError> {
        PricePoint::new(
            self.date,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume.max(0.0) as u64,
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
struct NewsEnvelope {
    #[serde(default)]
    #[allow(dead_code)]
    meta: Option<NewsMeta>,
    #[serde(default)]
    data: Vec<NewsRow>,
}

#[derive(Debug, Clone, Deserialize)]
struct NewsMeta {
    #[serde(default)]
    #[allow(dead_code)]
    found: u64,
    #[serde(default)]
    #[allow(dead_code)]
    returned: u64,
    #[serde(default)]
    #[allow(dead_code)]
    limit: u64,
    #[serde(default)]
    #[allow(dead_code)]
    page: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct NewsRow {
    id: serde_json::Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    stock_symbol: Option<String>,
    #[serde(default)]
    published_at: String,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    impact_score: f64,
}

impl NewsRow {
    fn into_article(self) -> NewsArticle {
        let id = match self.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        NewsArticle {
            id,
            title: self.title,
            summary: truncate_chars(&self.content, 300),
            url: self.url,
            source: self.source,
            published_at: self.published_at,
            sentiment: self.sentiment,
            sentiment_score: self.impact_score,
            stock_symbol: self.stock_symbol,
        }
    }
}

fn truncate_chars(input: &str, max_chars: usize) -> String {
    input.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{HttpError, NoopHttpClient};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    #[derive(Debug)]
    struct ScriptedHttpClient {
        responses: Mutex<Vec<Result<HttpResponse, HttpError>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedHttpClient {
        fn new(responses: Vec<Result<HttpResponse, HttpError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn recorded_requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .clone()
        }
    }

    impl HttpClient for ScriptedHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let mut responses = self
                .responses
                .lock()
                .expect("response store should not be poisoned");
            let response = if responses.is_empty() {
                Ok(HttpResponse::ok_json("[]"))
            } else {
                responses.remove(0)
            };
            Box::pin(async move { response })
        }

        fn is_mock(&self) -> bool {
            true
        }
    }

    fn client_with(responses: Vec<Result<HttpResponse, HttpError>>) -> (BackendClient, Arc<ScriptedHttpClient>) {
        let http = Arc::new(ScriptedHttpClient::new(responses));
        let config = BackendConfig {
            api_key: Some(String::from("test-key")),
            retry: RetryConfig::no_retry(),
            ..BackendConfig::default()
        };
        (BackendClient::new(config, http.clone()), http)
    }

    const PRICE_BODY: &str = r#"[
        {"date":"2024-03-01","open":100.0,"high":104.0,"low":99.0,"close":102.0,"volume":5000},
        {"date":"2024-03-02","open":102.0,"high":106.0,"low":101.0,"close":105.0,"volume":6000},
        {"date":"2024-03-03","open":105.0,"high":105.5,"low":103.0,"close":104.0,"volume":4000}
    ]"#;

    #[test]
    fn price_history_filters_to_window_and_sorts_ascending() {
        let (client, http) = client_with(vec![Ok(HttpResponse::ok_json(PRICE_BODY))]);
        let symbol = Symbol::parse("HDFCBANK").expect("valid");

        let points = block_on(client.price_history(&symbol, "2024-03-02", "2024-03-03"))
            .expect("history should fetch");

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, "2024-03-02");
        assert_eq!(points[1].date, "2024-03-03");

        let requests = http.recorded_requests();
        assert!(requests[0].url.contains("/stocks/prices/HDFCBANK"));
        assert_eq!(
            requests[0].headers.get("authorization").map(String::as_str),
            Some("Bearer test-key")
        );
    }

    #[test]
    fn stock_summary_computes_metrics_from_rows() {
        let (client, _) = client_with(vec![Ok(HttpResponse::ok_json(PRICE_BODY))]);
        let symbol = Symbol::parse("HDFCBANK").expect("valid");

        let summary = block_on(client.stock_summary(&symbol, 7))
            .expect("summary should fetch")
            .expect("rows exist");

        assert_eq!(summary.open_price, 100.0);
        assert_eq!(summary.current_price, 104.0);
        assert_eq!(summary.change_percent, 4.0);
        assert_eq!(summary.high, 106.0);
        assert_eq!(summary.low, 99.0);
        assert_eq!(summary.avg_volume, 5_000);
    }

    #[test]
    fn empty_price_series_yields_no_summary() {
        let (client, _) = client_with(vec![Ok(HttpResponse::ok_json("[]"))]);
        let symbol = Symbol::parse("TCS").expect("valid");

        let summary = block_on(client.stock_summary(&symbol, 7)).expect("fetch ok");
        assert!(summary.is_none());
    }

    #[test]
    fn news_filters_window_sorts_newest_first_and_truncates() {
        let body = r#"{
            "meta": {"found": 3, "returned": 3, "limit": 20, "page": 1},
            "data": [
                {"id":"a","title":"older","content":"x","published_at":"2024-03-01T08:00:00Z","sentiment":"positive","impact_score":1.5},
                {"id":"b","title":"newest","content":"y","published_at":"2024-03-03T08:00:00Z","sentiment":"negative","impact_score":-2.0},
                {"id":"c","title":"outside","content":"z","published_at":"2024-02-01T08:00:00Z","sentiment":"neutral","impact_score":0.0}
            ]
        }"#;
        let (client, _) = client_with(vec![Ok(HttpResponse::ok_json(body))]);
        let symbol = Symbol::parse("HDFCBANK").expect("valid");

        let articles = block_on(client.news(&symbol, "2024-03-01", "2024-03-31", 10, None))
            .expect("news should fetch");

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].id, "b");
        assert_eq!(articles[1].id, "a");
    }

    #[test]
    fn aggregate_preserves_zero_neutral_count() {
        let body = r#"{
            "meta": {"found": 3, "returned": 3, "limit": 200, "page": 1},
            "data": [
                {"id":"a","title":"up","content":"x","published_at":"2024-03-01T08:00:00Z","sentiment":"positive","impact_score":2.0},
                {"id":"b","title":"down","content":"y","published_at":"2024-03-02T08:00:00Z","sentiment":"negative","impact_score":-1.0},
                {"id":"c","title":"flat","content":"z","published_at":"2024-03-03T08:00:00Z","sentiment":"neutral","impact_score":0.5}
            ]
        }"#;
        let (client, _) = client_with(vec![Ok(HttpResponse::ok_json(body))]);
        let symbol = Symbol::parse("HDFCBANK").expect("valid");

        let aggregate = block_on(client.sentiment_aggregate(&symbol, "2024-03-01", "2024-03-31"))
            .expect("aggregate should fetch");

        assert_eq!(aggregate.total_articles, 3);
        assert_eq!(aggregate.positive_count, 1);
        assert_eq!(aggregate.negative_count, 1);
        assert_eq!(aggregate.neutral_count, 0);
        assert_eq!(aggregate.avg_sentiment, 0.5);
        assert_eq!(aggregate.neutral_pct, 33.3);
    }

    #[test]
    fn transport_failure_surfaces_as_upstream_error() {
        let (client, _) = client_with(vec![Err(HttpError::new("connection refused"))]);
        let symbol = Symbol::parse("HDFCBANK").expect("valid");

        let error = block_on(client.price_history(&symbol, "2024-03-01", "2024-03-05"))
            .expect_err("must fail");
        assert_eq!(error.kind(), crate::error::UpstreamErrorKind::Transport);
    }

    #[test]
    fn timeout_failure_is_distinguishable() {
        let (client, _) = client_with(vec![Err(HttpError::timeout("deadline exceeded"))]);
        let symbol = Symbol::parse("HDFCBANK").expect("valid");

        let error = block_on(client.price_history(&symbol, "2024-03-01", "2024-03-05"))
            .expect_err("must fail");
        assert_eq!(error.kind(), crate::error::UpstreamErrorKind::Timeout);
    }

    #[test]
    fn breaker_blocks_after_repeated_failures() {
        let (client, _) = client_with(vec![
            Err(HttpError::new("reset")),
            Err(HttpError::new("reset")),
            Err(HttpError::new("reset")),
        ]);
        let symbol = Symbol::parse("HDFCBANK").expect("valid");

        for _ in 0..3 {
            let _ = block_on(client.price_history(&symbol, "2024-03-01", "2024-03-05"));
        }

        let error = block_on(client.price_history(&symbol, "2024-03-01", "2024-03-05"))
            .expect_err("breaker should block");
        assert!(error.message().contains("circuit breaker is open"));
    }

    #[test]
    fn noop_client_body_is_not_a_price_array() {
        let client = BackendClient::new(BackendConfig::default(), Arc::new(NoopHttpClient));
        let symbol = Symbol::parse("TCS").expect("valid");
        // Noop transport returns `{}`, which is not a price array.
        let error = block_on(client.price_history(&symbol, "2024-03-01", "2024-03-05"))
            .expect_err("object body should fail to decode");
        assert_eq!(error.kind(), crate::error::UpstreamErrorKind::Decode);
    }

    fn block_on<F>(future: F) -> F::Output
    where
        F: Future,
    {
        let waker = noop_waker();
        let mut context = Context::from_waker(&waker);
        let mut future = std::pin::pin!(future);

        loop {
            match future.as_mut().poll(&mut context) {
                Poll::Ready(output) => return output,
                Poll::Pending => std::thread::yield_now(),
            }
        }
    }

    fn noop_waker() -> Waker {
        // SAFETY: The vtable functions never dereference the data pointer.
        unsafe { Waker::from_raw(noop_raw_waker()) }
    }

    fn noop_raw_waker() -> RawWaker {
        RawWaker::new(std::ptr::null(), &NOOP_RAW_WAKER_VTABLE)
    }

    unsafe fn noop_raw_waker_clone(_: *const ()) -> RawWaker {
        noop_raw_waker()
    }

    unsafe fn noop_raw_waker_wake(_: *const ()) {}

    unsafe fn noop_raw_waker_wake_by_ref(_: *const ()) {}

    unsafe fn noop_raw_waker_drop(_: *const ()) {}

    static NOOP_RAW_WAKER_VTABLE: RawWakerVTable = RawWakerVTable::new(
        noop_raw_waker_clone,
        noop_raw_waker_wake,
        noop_raw_waker_wake_by_ref,
        noop_raw_waker_drop,
    );
}
