//! Behavior-driven tests for the tool invocation boundary
//!
//! These tests verify HOW wire-level tool calls are dispatched, validated,
//! and wrapped in uniform responses.

use serde_json::json;
use tickerlens_core::{BackendClient, BackendConfig, RetryConfig};
use tickerlens_engine::{Orchestrator, OrchestratorConfig, ToolRegistry};
use tickerlens_retrieval::{AdaptiveRetriever, RetrieverConfig};
use tickerlens_tests::{stored_doc, Arc, FixedEmbedder, RoutingHttpClient, ScriptedStore};

fn registry_over(store: Arc<ScriptedStore>) -> ToolRegistry {
    let http = Arc::new(RoutingHttpClient::new(Vec::new()));
    let backend = Arc::new(BackendClient::new(
        BackendConfig {
            retry: RetryConfig::no_retry(),
            ..BackendConfig::default()
        },
        http,
    ));
    let retriever = Arc::new(AdaptiveRetriever::new(
        Arc::new(FixedEmbedder {
            vector: vec![0.1, 0.2, 0.3],
        }),
        store,
        RetrieverConfig::default(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        backend,
        retriever.clone(),
        OrchestratorConfig::default(),
    ));
    ToolRegistry::new(orchestrator, retriever)
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn when_an_unknown_tool_is_called_the_response_says_not_found() {
    // Given: a registry
    let registry = registry_over(Arc::new(ScriptedStore::new(Vec::new())));

    // When: a nonexistent tool is requested
    let response = registry.call("get_weather", json!({})).await;

    // Then: the failure is a structured response, not a panic
    assert!(!response.success);
    assert!(response.result.is_none());
    assert!(response.error.as_deref().unwrap().contains("not found"));
    assert!(!response.timestamp.is_empty());
}

#[tokio::test]
async fn when_arguments_do_not_match_the_schema_the_response_names_the_tool() {
    // Given: a registry
    let registry = registry_over(Arc::new(ScriptedStore::new(Vec::new())));

    // When: the correlation tool gets a string where an array belongs
    let response = registry
        .call(
            "calculate_correlation",
            json!({"series_a": "oops", "series_b": [1.0, 2.0, 3.0]}),
        )
        .await;

    // Then: the error identifies the offending tool
    assert!(!response.success);
    assert!(response
        .error
        .as_deref()
        .unwrap()
        .contains("calculate_correlation"));
}

// =============================================================================
// Tool execution through the registry
// =============================================================================

#[tokio::test]
async fn when_correlation_is_called_with_valid_series_the_result_is_structured() {
    // Given: a registry
    let registry = registry_over(Arc::new(ScriptedStore::new(Vec::new())));

    // When: two linear series are correlated with default names
    let response = registry
        .call(
            "calculate_correlation",
            json!({"series_a": [1.0, 2.0, 3.0], "series_b": [2.0, 4.0, 6.0]}),
        )
        .await;

    // Then: the payload carries the full correlation result
    assert!(response.success);
    let result = response.result.expect("result present");
    assert_eq!(result["correlation_coefficient"], 1.0);
    assert_eq!(result["strength"], "VERY_STRONG");
    assert_eq!(result["series_a_name"], "Series A");
}

#[tokio::test]
async fn when_sentiment_price_series_mismatch_the_validation_error_is_reported() {
    // Given: a registry
    let registry = registry_over(Arc::new(ScriptedStore::new(Vec::new())));

    // When: the series lengths differ
    let response = registry
        .call(
            "calculate_sentiment_price_correlation",
            json!({"price_changes": [1.0, 2.0, 3.0], "sentiment_scores": [0.1, 0.2]}),
        )
        .await;

    // Then: the failure surfaces as a message, never a panic
    assert!(!response.success);
    assert!(response.error.is_some());
}

#[tokio::test]
async fn when_rag_evidence_is_called_the_registry_runs_the_retriever() {
    // Given: a store with one strong document per variant pass
    let store = Arc::new(ScriptedStore::new(vec![
        vec![
            stored_doc("e1", 0.84, "2024-03-05"),
            stored_doc("e2", 0.8, "2024-03-04"),
        ],
        vec![stored_doc("e3", 0.76, "2024-03-03")],
    ]));
    let registry = registry_over(store);

    // When: evidence is requested over the wire shape
    let response = registry
        .call(
            "get_rag_evidence",
            json!({
                "symbol": "HDFCBANK",
                "start_date": "2024-03-01",
                "end_date": "2024-03-10",
                "query_text": "reasons for price drop"
            }),
        )
        .await;

    // Then: the documents come back ranked with scores and bands
    assert!(response.success);
    let result = response.result.expect("result present");
    let items = result.as_array().expect("array of evidence");
    assert_eq!(items.len(), 3);
    assert!(items[0]["final_score"].as_f64().unwrap() >= items[1]["final_score"].as_f64().unwrap());
    assert!(items[0]["match_quality"].is_string());
}

#[tokio::test]
async fn when_an_invalid_symbol_reaches_a_tool_the_response_is_a_clean_failure() {
    // Given: a registry
    let registry = registry_over(Arc::new(ScriptedStore::new(Vec::new())));

    // When: the symbol is empty
    let response = registry
        .call(
            "get_rag_evidence",
            json!({
                "symbol": "",
                "start_date": "2024-03-01",
                "end_date": "2024-03-10",
                "query_text": "anything"
            }),
        )
        .await;

    // Then: validation fails without touching any collaborator
    assert!(!response.success);
    assert!(response.error.is_some());
}

#[tokio::test]
async fn when_rag_stats_is_called_the_store_statistics_are_returned() {
    // Given: a registry
    let registry = registry_over(Arc::new(ScriptedStore::new(Vec::new())));

    // When: stats are requested
    let response = registry.call("get_rag_stats", json!({})).await;

    // Then: the corpus statistics are structured
    assert!(response.success);
    let result = response.result.expect("result present");
    assert_eq!(result["total_embeddings"], 0);
    assert_eq!(result["vector_dimension"], 3);
}
