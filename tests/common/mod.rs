//! Common test utilities
//!
//! Provides shared helper functions for:
//! - Building routers over the memory backend
//! - Serving a router on an ephemeral local port
//! - Reading response bodies

#![allow(dead_code)]

use axum::Router;
use dsbench::config::SeedConfig;
use dsbench::seed::Generator;
use dsbench::{create_router, AppState, Config};

/// Memory backend without simulated latency
pub fn memory_config() -> Config {
    let mut config = Config::default();
    config.memory.rpc_latency_ms = 0;
    config
}

pub fn create_test_app(config: Config) -> Router {
    let state = AppState::new(config).expect("Failed to build app state");
    create_router(state)
}

/// Serve `app` on 127.0.0.1 and return its base URL
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

pub async fn response_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

/// Number of flagged records the seed generator produces
pub fn expected_flagged(seed: &SeedConfig) -> usize {
    Generator::new(seed)
        .batches()
        .iter()
        .flatten()
        .filter(|r| r.flag == Some(true))
        .count()
}
