//! HTTP API Integration Tests
//!
//! Drives the benchmark endpoints through the router over the memory
//! backend: seeding, the four test views, cleanup, and error output.

mod common;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{create_test_app, expected_flagged, memory_config, response_text};
use dsbench::datastore::{Datastore, FetchOptions, Query};
use dsbench::runner::parse_times;
use dsbench::{create_router, AppState, BenchError, BenchResult, Client, Key, Record, SomeData};
use std::sync::Arc;
use tower::ServiceExt; // for oneshot

async fn get(app: &Router, path: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, response_text(response).await)
}

/// First line of a test view: the result count
fn result_count(body: &str) -> usize {
    body.lines().next().unwrap().parse().unwrap()
}

// ============================================================================
// Plain endpoints
// ============================================================================

#[tokio::test]
async fn test_index() {
    let app = create_test_app(memory_config());
    let (status, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok\n");
}

#[tokio::test]
async fn test_unknown_route() {
    let app = create_test_app(memory_config());
    let (status, _) = get(&app, "/test5").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Seed, query, clean up
// ============================================================================

#[tokio::test]
async fn test_full_cycle() {
    let config = memory_config();
    let flagged = expected_flagged(&config.seed);
    let app = create_test_app(config);

    let (status, body) = get(&app, "/init").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok\n");

    let (status, body) = get(&app, "/test1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result_count(&body), flagged);
    assert!(flagged > 0 && flagged < 400);

    let (_, body) = get(&app, "/test2").await;
    assert_eq!(result_count(&body), flagged);

    // Nothing seeds Something records
    let (_, body) = get(&app, "/test3").await;
    assert_eq!(result_count(&body), 0);
    let (_, body) = get(&app, "/test4").await;
    assert_eq!(result_count(&body), 0);

    let (status, body) = get(&app, "/cleanup").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok\n");

    let (_, body) = get(&app, "/test1").await;
    assert_eq!(result_count(&body), 0);
}

#[tokio::test]
async fn test_init_twice_doubles_records() {
    let config = memory_config();
    let flagged = expected_flagged(&config.seed);
    let app = create_test_app(config);

    get(&app, "/init").await;
    get(&app, "/init").await;

    let (_, body) = get(&app, "/test1").await;
    assert_eq!(result_count(&body), flagged * 2);
}

#[tokio::test]
async fn test_init_and_cleanup_totals() {
    let config = memory_config();
    let total = config.seed.total_records();
    let client = Client::from_config(&config).unwrap();
    let app = create_router(AppState::with_client(config, client.clone()));
    let all = Query::for_entity::<SomeData>();

    get(&app, "/init").await;
    assert_eq!(total, 400);
    assert_eq!(client.count(&all, None).await.unwrap(), total);

    // Items ride along inside each record
    let records = client.fetch(&all, &FetchOptions::new()).await.unwrap();
    let first: SomeData = records[0].to_entity().unwrap();
    assert_eq!(first.items.len(), 30);

    let (_, body) = get(&app, "/cleanup").await;
    assert_eq!(body, "ok\n");
    assert_eq!(client.count(&all, None).await.unwrap(), 0);

    // 800 keys span many delete chunks of 50
    get(&app, "/init").await;
    get(&app, "/init").await;
    assert_eq!(client.count(&all, None).await.unwrap(), total * 2);
    get(&app, "/cleanup").await;
    assert_eq!(client.count(&all, None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cleanup_on_empty_store() {
    let app = create_test_app(memory_config());
    let (status, body) = get(&app, "/cleanup").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok\n");
}

// ============================================================================
// Timing output
// ============================================================================

#[tokio::test]
async fn test_view_reports_timings() {
    let mut config = memory_config();
    config.memory.rpc_latency_ms = 1;
    let app = create_test_app(config);
    get(&app, "/init").await;

    let (_, body) = get(&app, "/test2").await;
    let lines: Vec<&str> = body.lines().collect();
    assert!(lines[1].starts_with("time: "));
    assert!(lines[2].starts_with("rpc_time: "));
    assert!(lines[2].ends_with("%)"));
    assert!(lines[3].starts_with("wait_time: "));
    assert!(body.ends_with("\n\n"));

    let times = parse_times(&body);
    assert!(times["time"] >= 0.0);
    assert!(times["rpc_time"] > 0.0);
    assert!(times["wait_time"] > 0.0);
    assert!(times["wait_time"] <= times["time"]);
}

#[tokio::test]
async fn test_rpc_time_is_per_request() {
    let mut config = memory_config();
    config.memory.rpc_latency_ms = 5;
    let app = create_test_app(config);

    // A long /init must not leak into the next request's numbers
    get(&app, "/init").await;
    let (_, body) = get(&app, "/test1").await;
    let times = parse_times(&body);
    assert!(times["rpc_time"] < 0.04, "rpc_time {}", times["rpc_time"]);
}

#[tokio::test]
async fn test_profile_table() {
    let mut config = memory_config();
    config.profile = true;
    let app = create_test_app(config);
    get(&app, "/init").await;

    let (_, body) = get(&app, "/test1").await;
    assert!(body.contains("datastore calls in"));
    assert!(body.contains("ncalls"));
    assert!(body.contains("memory.count"));
    assert_eq!(parse_times(&body).len(), 3);
}

// ============================================================================
// Errors
// ============================================================================

struct UnreachableDatastore;

#[async_trait]
impl Datastore for UnreachableDatastore {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    async fn put_multi(&self, _records: Vec<Record>) -> BenchResult<Vec<Key>> {
        Err(BenchError::Network("connection refused".to_string()))
    }

    async fn run_query(&self, _query: &Query, _options: &FetchOptions) -> BenchResult<Vec<Record>> {
        Err(BenchError::Network("connection refused".to_string()))
    }

    async fn count(&self, _query: &Query, _limit: Option<usize>) -> BenchResult<usize> {
        Err(BenchError::Network("connection refused".to_string()))
    }

    async fn delete_multi(&self, _keys: &[Key]) -> BenchResult<()> {
        Err(BenchError::Network("connection refused".to_string()))
    }
}

fn unreachable_app() -> Router {
    let client = Client::new(Arc::new(UnreachableDatastore));
    create_router(AppState::with_client(memory_config(), client))
}

#[tokio::test]
async fn test_view_error_is_written_to_body() {
    let app = unreachable_app();

    let (status, body) = get(&app, "/test1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with('\n'));
    assert!(body.contains("counting flagged records"));
    assert!(body.contains("Caused by:"));
    assert!(body.contains("Network error: connection refused"));
    // No timing block once the query failed
    assert!(!body.contains("time: "));

    let (_, body) = get(&app, "/test3").await;
    assert!(body.contains("fetching Something records"));
}

#[tokio::test]
async fn test_init_error_status() {
    let app = unreachable_app();

    let (status, body) = get(&app, "/init").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("connection refused"));

    let (status, _) = get(&app, "/cleanup").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}
