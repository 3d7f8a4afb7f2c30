//! Adaptive evidence retrieval.
//!
//! One embed call per request, then a descending threshold ladder across
//! symbol variants, recency/symbol reranking, and a symbol-free fallback
//! search when the filtered ladder comes back empty.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use tickerlens_core::{EvidenceDocument, MatchQuality, Symbol, UpstreamError};
use time::macros::format_description;
use time::Date;
use tracing::{debug, info, warn};

use crate::embedding::EmbeddingProvider;
use crate::vector_store::{StoredDocument, VectorSearch, VectorStore, VectorStoreStats};

const DATE_FORMAT: &[time::format_description::FormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

/// Retrieval tunables. Defaults reproduce the production ladder.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Similarity thresholds tried in order, highest first.
    pub threshold_ladder: Vec<f64>,
    /// Stop descending once this many unique documents have accumulated
    /// after a threshold completes.
    pub early_exit_min: usize,
    /// Half-life of the recency weight, in days.
    pub recency_half_life_days: f64,
    /// Age assigned to documents without a publish date. Large enough to
    /// push them to the bottom of any ranking.
    pub missing_date_age_days: f64,
    /// Multiplier when the document's symbol matches a query variant.
    pub exact_symbol_boost: f64,
    /// Multiplier when the document text mentions a company alias.
    pub alias_mention_boost: f64,
    /// Threshold for the symbol-free fallback search.
    pub fallback_min_similarity: f64,
    /// Fallback candidate pool size, as a multiple of `top_k`.
    pub fallback_pool_multiplier: usize,
    /// Domain terms appended to every query before embedding.
    pub domain_vocabulary: Vec<String>,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            threshold_ladder: vec![0.70, 0.65, 0.60, 0.55, 0.50],
            early_exit_min: 3,
            recency_half_life_days: 30.0,
            missing_date_age_days: 999.0,
            exact_symbol_boost: 1.08,
            alias_mention_boost: 1.05,
            fallback_min_similarity: 0.50,
            fallback_pool_multiplier: 3,
            domain_vocabulary: default_domain_vocabulary(),
        }
    }
}

/// Banking and market-events vocabulary that sharpens query embeddings for
/// the covered universe.
fn default_domain_vocabulary() -> Vec<String> {
    [
        "earnings",
        "quarterly results",
        "Q1",
        "Q2",
        "Q3",
        "Q4",
        "NIM",
        "net interest margin",
        "provisioning",
        "provisions",
        "asset quality",
        "GNPA",
        "NNPA",
        "slippages",
        "delinquencies",
        "CASA",
        "deposit growth",
        "credit growth",
        "loan growth",
        "RBI",
        "regulatory",
        "directive",
        "circular",
        "penalty",
        "capital adequacy",
        "CAR",
        "capital raise",
        "AT1",
        "QIP",
        "liquidity",
        "LCR",
        "margin",
        "NPA",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

/// One (threshold, symbol variant) step of the candidate pipeline.
///
/// `closes_threshold` marks the last variant within a threshold; the
/// early-exit predicate is only evaluated there, so a threshold always
/// runs to completion before the ladder stops descending.
#[derive(Debug, Clone, PartialEq)]
struct SearchPass {
    threshold: f64,
    variant: String,
    closes_threshold: bool,
}

fn search_passes(config: &RetrieverConfig, symbol: &Symbol) -> Vec<SearchPass> {
    let variants = symbol.variants();
    let mut passes = Vec::with_capacity(config.threshold_ladder.len() * variants.len());
    for &threshold in &config.threshold_ladder {
        for (index, variant) in variants.iter().enumerate() {
            passes.push(SearchPass {
                threshold,
                variant: variant.clone(),
                closes_threshold: index + 1 == variants.len(),
            });
        }
    }
    passes
}

/// Candidate tagged with the ladder pass that produced it, plus its
/// derived rank score. Fallback hits bypass the ladder and carry no pass.
#[derive(Debug, Clone)]
struct Candidate {
    doc: StoredDocument,
    pass: Option<SearchPass>,
    final_score: f64,
}

/// Semantic evidence retriever over an embedding provider and vector store.
#[derive(Clone)]
pub struct AdaptiveRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    config: RetrieverConfig,
}

impl AdaptiveRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Retrieve the `top_k` most relevant evidence documents for a symbol
    /// over a date window.
    pub async fn retrieve(
        &self,
        symbol: &Symbol,
        start_date: &str,
        end_date: &str,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<EvidenceDocument>, UpstreamError> {
        info!(
            symbol = %symbol,
            query = query_text.chars().take(50).collect::<String>(),
            period = format!("{start_date} to {end_date}"),
            "evidence search"
        );

        let expanded_query = self.expand_query(symbol, query_text);
        let query_vector = self.embedder.embed(&expanded_query).await?;

        let candidates = self
            .run_ladder(&query_vector, symbol, start_date, end_date, top_k)
            .await?;

        let alias_terms = symbol.alias_terms();
        let mut ranked: Vec<Candidate> = candidates
            .into_iter()
            .map(|(doc, pass)| {
                let final_score = self.final_score(&doc, symbol, &alias_terms, end_date);
                Candidate {
                    doc,
                    pass: Some(pass),
                    final_score,
                }
            })
            .collect();
        sort_by_score_desc(&mut ranked);
        ranked.truncate(top_k);
        for candidate in &ranked {
            debug!(
                id = %candidate.doc.id,
                threshold = candidate.pass.as_ref().map(|p| p.threshold),
                variant = candidate.pass.as_ref().map(|p| p.variant.as_str()),
                final_score = candidate.final_score,
                "ranked candidate"
            );
        }

        if ranked.is_empty() {
            info!(symbol = %symbol, "no filtered matches, trying symbol-free fallback");
            ranked = self
                .fallback(&query_vector, symbol, start_date, end_date, top_k)
                .await;
        }

        let evidence: Vec<EvidenceDocument> = ranked
            .into_iter()
            .map(|candidate| to_evidence(candidate.doc, candidate.final_score))
            .collect();

        info!(symbol = %symbol, returned = evidence.len(), "evidence search finished");
        Ok(evidence)
    }

    /// Corpus statistics passthrough.
    pub async fn stats(&self) -> Result<VectorStoreStats, UpstreamError> {
        self.store.stats().await
    }

    /// Query text plus domain vocabulary plus company alias phrases.
    fn expand_query(&self, symbol: &Symbol, query_text: &str) -> String {
        let mut parts = Vec::with_capacity(2 + self.config.domain_vocabulary.len());
        parts.push(query_text.to_owned());
        parts.extend(self.config.domain_vocabulary.iter().cloned());
        parts.extend(symbol.alias_terms());
        parts.join(" ")
    }

    /// Descend the threshold ladder across symbol variants, accumulating
    /// unique documents tagged with the pass that found them. First
    /// occurrence of an id wins.
    async fn run_ladder(
        &self,
        query_vector: &[f32],
        symbol: &Symbol,
        start_date: &str,
        end_date: &str,
        top_k: usize,
    ) -> Result<Vec<(StoredDocument, SearchPass)>, UpstreamError> {
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut accumulated: Vec<(StoredDocument, SearchPass)> = Vec::new();

        for pass in search_passes(&self.config, symbol) {
            let rows = self
                .store
                .search(
                    query_vector,
                    VectorSearch {
                        symbol: Some(pass.variant.clone()),
                        start_date: Some(start_date.to_owned()),
                        end_date: Some(end_date.to_owned()),
                        top_k,
                        min_similarity: pass.threshold,
                    },
                )
                .await?;

            for row in rows {
                if seen_ids.insert(row.id.clone()) {
                    accumulated.push((row, pass.clone()));
                }
            }

            debug!(
                threshold = pass.threshold,
                variant = %pass.variant,
                accumulated = accumulated.len(),
                "ladder pass complete"
            );

            if pass.closes_threshold && accumulated.len() >= self.config.early_exit_min {
                break;
            }
        }

        Ok(accumulated)
    }

    /// similarity × recency decay × symbol boosts.
    fn final_score(
        &self,
        doc: &StoredDocument,
        symbol: &Symbol,
        alias_terms: &[String],
        end_date: &str,
    ) -> f64 {
        let recency_weight = match doc.published_at.as_deref().filter(|s| !s.is_empty()) {
            None => half_life_weight(
                self.config.missing_date_age_days,
                self.config.recency_half_life_days,
            ),
            Some(published_at) => match age_days(published_at, end_date) {
                Some(age) => half_life_weight(age, self.config.recency_half_life_days),
                // Unparseable dates carry no recency signal either way.
                None => 1.0,
            },
        };

        let mut boost = 1.0;
        if let Some(doc_symbol) = doc.symbol.as_deref() {
            let upper = doc_symbol.to_uppercase();
            if symbol.variants().iter().any(|v| v.eq_ignore_ascii_case(&upper)) {
                boost *= self.config.exact_symbol_boost;
            }
        }
        let haystack = format!("{} {}", doc.title, doc.content_preview).to_lowercase();
        if alias_terms
            .iter()
            .any(|alias| haystack.contains(&alias.to_lowercase()))
        {
            boost *= self.config.alias_mention_boost;
        }

        doc.similarity * recency_weight * boost
    }

    /// Symbol-free wide search, filtered by textual symbol mentions and
    /// ranked by raw similarity. Failures degrade to an empty result; the
    /// primary path already came back empty.
    async fn fallback(
        &self,
        query_vector: &[f32],
        symbol: &Symbol,
        start_date: &str,
        end_date: &str,
        top_k: usize,
    ) -> Vec<Candidate> {
        let pool = match self
            .store
            .search(
                query_vector,
                VectorSearch {
                    symbol: None,
                    start_date: Some(start_date.to_owned()),
                    end_date: Some(end_date.to_owned()),
                    top_k: top_k.saturating_mul(self.config.fallback_pool_multiplier),
                    min_similarity: self.config.fallback_min_similarity,
                },
            )
            .await
        {
            Ok(rows) => rows,
            Err(error) => {
                warn!(symbol = %symbol, error = %error, "fallback search failed");
                return Vec::new();
            }
        };

        let needles = fallback_needles(symbol);
        let mut filtered: Vec<Candidate> = pool
            .into_iter()
            .filter(|row| {
                let haystack = format!(
                    "{} {} {}",
                    row.title,
                    row.content_preview,
                    row.symbol.as_deref().unwrap_or(""),
                )
                .to_lowercase();
                needles.iter().any(|needle| haystack.contains(needle))
            })
            .map(|doc| Candidate {
                final_score: doc.similarity,
                pass: None,
                doc,
            })
            .collect();

        sort_by_score_desc(&mut filtered);
        filtered.truncate(top_k);
        info!(
            symbol = %symbol,
            matches = filtered.len(),
            "fallback search finished"
        );
        filtered
    }
}

/// Lowercased text needles identifying the company: raw and suffixed
/// symbol forms plus alias phrases.
fn fallback_needles(symbol: &Symbol) -> Vec<String> {
    let mut needles = vec![
        symbol.as_str().to_lowercase(),
        symbol.display_form().to_lowercase(),
        symbol.suffixed_form().to_lowercase(),
    ];
    needles.extend(symbol.alias_terms().iter().map(|a| a.to_lowercase()));
    needles.sort_unstable();
    needles.dedup();
    needles
}

fn half_life_weight(age_days: f64, half_life_days: f64) -> f64 {
    0.5_f64.powf(age_days / half_life_days)
}

/// Whole days between the document's publish date and the window end,
/// clamped at zero. `None` when the date prefix does not parse.
fn age_days(published_at: &str, end_date: &str) -> Option<f64> {
    let prefix = published_at.get(..10)?;
    let published = Date::parse(prefix, DATE_FORMAT).ok()?;
    let end = Date::parse(end_date, DATE_FORMAT).ok()?;
    Some(((end - published).whole_days().max(0)) as f64)
}

fn sort_by_score_desc(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(Ordering::Equal)
    });
}

fn to_evidence(doc: StoredDocument, final_score: f64) -> EvidenceDocument {
    let final_score = (final_score * 1000.0).round() / 1000.0;
    EvidenceDocument {
        id: doc.id,
        title: doc.title,
        summary: doc.content_preview,
        url: doc.url,
        source: doc.source,
        published_at: doc.published_at,
        sentiment_label: doc.sentiment,
        sentiment_score: doc.sentiment_score,
        similarity_score: doc.similarity,
        final_score,
        match_quality: MatchQuality::from_score(final_score),
    }
}
