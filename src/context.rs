//! Per-request RPC accounting
//!
//! Each HTTP request runs inside a [`RequestContext`] installed by
//! [`context_middleware`]. Datastore backends wrap every remote call in
//! [`rpc`], which adds the call's own duration to the context's RPC time.
//! Callers wrap each datastore operation in [`wait`], which adds the wall
//! time spent blocked on it to the wait time. Concurrent calls overlap, so
//! RPC time may exceed wait time.

use axum::{body::Body, extract::Request, middleware::Next, response::Response};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

tokio::task_local! {
    static CONTEXT: RequestContext;
}

/// Aggregated timings of one named call
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CallStats {
    pub calls: u64,
    pub total: Duration,
    pub max: Duration,
}

impl CallStats {
    pub fn per_call(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            self.total / self.calls as u32
        }
    }
}

#[derive(Default)]
struct ContextInner {
    rpc_nanos: AtomicU64,
    wait_nanos: AtomicU64,
    calls: Mutex<HashMap<&'static str, CallStats>>,
}

/// Timing accumulator shared by everything a single request does
#[derive(Clone, Default)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` with this context as the current one
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        CONTEXT.scope(self, fut).await
    }

    /// Total duration of all RPCs issued so far
    pub fn rpc_time(&self) -> Duration {
        Duration::from_nanos(self.inner.rpc_nanos.load(Ordering::Relaxed))
    }

    /// Total time callers spent blocked on datastore operations
    pub fn wait_time(&self) -> Duration {
        Duration::from_nanos(self.inner.wait_nanos.load(Ordering::Relaxed))
    }

    pub fn record_rpc(&self, name: &'static str, elapsed: Duration) {
        self.inner
            .rpc_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);

        let mut calls = self.inner.calls.lock();
        let stats = calls.entry(name).or_default();
        stats.calls += 1;
        stats.total += elapsed;
        stats.max = stats.max.max(elapsed);
    }

    pub fn record_wait(&self, elapsed: Duration) {
        self.inner
            .wait_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Per-call statistics, most expensive first
    pub fn call_stats(&self) -> Vec<(&'static str, CallStats)> {
        let mut stats: Vec<_> = self
            .inner
            .calls
            .lock()
            .iter()
            .map(|(name, stats)| (*name, *stats))
            .collect();
        stats.sort_by(|a, b| b.1.total.cmp(&a.1.total).then_with(|| a.0.cmp(b.0)));
        stats
    }
}

/// The context of the request being served, if any
pub fn current() -> Option<RequestContext> {
    CONTEXT.try_with(|ctx| ctx.clone()).ok()
}

/// Time one remote call and charge it to the current context
pub async fn rpc<F, T>(name: &'static str, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let output = fut.await;
    let elapsed = start.elapsed();

    tracing::debug!(call = name, elapsed_us = elapsed.as_micros() as u64, "rpc");
    if let Some(ctx) = current() {
        ctx.record_rpc(name, elapsed);
    }
    output
}

/// Time a blocking wait on datastore work and charge it to the current context
pub async fn wait<F, T>(fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let output = fut.await;
    if let Some(ctx) = current() {
        ctx.record_wait(start.elapsed());
    }
    output
}

/// Axum middleware giving every request a fresh context
pub async fn context_middleware(req: Request<Body>, next: Next) -> Response {
    RequestContext::new().scope(next.run(req)).await
}
