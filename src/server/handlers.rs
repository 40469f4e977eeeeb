use anyhow::Context;
use axum::extract::State;
use std::sync::Arc;

use crate::config::Config;
use crate::datastore::{Client, FetchOptions, Query};
use crate::error::{BenchError, BenchResult};
use crate::model::{Entity, SomeData, Something};
use crate::output::ViewOutput;
use crate::profile::Profile;
use crate::seed::Generator;

/// Result cap of the `Something` queries
pub const SOMETHING_LIMIT: usize = 100_000;

/// Properties fetched by `/test2`
pub const PROJECTION: [&str; 5] = ["prop0", "prop1", "prop2", "prop3", "prop4"];

#[derive(Clone)]
pub struct AppState {
    pub client: Client,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> BenchResult<Self> {
        let client = Client::from_config(&config)?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: Config, client: Client) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }
}

/// Flagged records under the common parent
pub fn flagged_query() -> Query {
    Query::for_entity::<SomeData>()
        .filter("flag", true)
        .ancestor(SomeData::parent_key())
}

pub fn something_query() -> Query {
    Query::for_entity::<Something>()
        .filter("foo", "two")
        .filter("bar", true)
}

pub async fn index() -> &'static str {
    "ok\n"
}

/// Write the synthetic data set, one `put_multi` per batch
pub async fn init(State(state): State<AppState>) -> Result<&'static str, BenchError> {
    let seed = &state.config.seed;
    let mut generator = Generator::new(seed);
    let parent = SomeData::parent_key();

    for _ in 0..seed.batches {
        let batch = generator.batch();
        state.client.put_entities(&batch, Some(&parent)).await?;
    }

    tracing::info!(
        "Seeded {} {} records in {} batches",
        seed.total_records(),
        SomeData::KIND,
        seed.batches
    );
    Ok("ok\n")
}

/// Delete every `SomeData` record, a chunk of keys at a time
pub async fn cleanup(State(state): State<AppState>) -> Result<&'static str, BenchError> {
    let keys = state
        .client
        .fetch_keys(&Query::for_entity::<SomeData>())
        .await?;

    for chunk in keys.chunks(state.config.cleanup_chunk) {
        state.client.delete_multi(chunk).await?;
    }

    tracing::info!("Deleted {} {} records", keys.len(), SomeData::KIND);
    Ok("ok\n")
}

pub async fn test1(State(state): State<AppState>) -> String {
    let mut out = ViewOutput::new();
    let result = count_flagged(&state, &mut out).await;
    out.finish(result)
}

async fn count_flagged(state: &AppState, out: &mut ViewOutput) -> anyhow::Result<()> {
    let profile = Profile::start(state.config.profile);
    let count = state
        .client
        .count(&flagged_query(), None)
        .await
        .context("counting flagged records")?;
    out.line(count);
    profile.finish(out);
    Ok(())
}

pub async fn test2(State(state): State<AppState>) -> String {
    let mut out = ViewOutput::new();
    let result = fetch_flagged_projection(&state, &mut out).await;
    out.finish(result)
}

async fn fetch_flagged_projection(state: &AppState, out: &mut ViewOutput) -> anyhow::Result<()> {
    let profile = Profile::start(state.config.profile);
    let query = flagged_query().order("prop0");
    let items = state
        .client
        .fetch(&query, &FetchOptions::new().projection(&PROJECTION))
        .await
        .context("fetching projected flagged records")?;
    out.line(items.len());
    profile.finish(out);
    Ok(())
}

pub async fn test3(State(state): State<AppState>) -> String {
    let mut out = ViewOutput::new();
    let result = fetch_something(&state, &mut out).await;
    out.finish(result)
}

async fn fetch_something(state: &AppState, out: &mut ViewOutput) -> anyhow::Result<()> {
    let profile = Profile::start(state.config.profile);
    let results = state
        .client
        .fetch(&something_query(), &FetchOptions::new().limit(SOMETHING_LIMIT))
        .await
        .context("fetching Something records")?;
    out.line(results.len());
    profile.finish(out);
    Ok(())
}

pub async fn test4(State(state): State<AppState>) -> String {
    let mut out = ViewOutput::new();
    let result = count_something(&state, &mut out).await;
    out.finish(result)
}

async fn count_something(state: &AppState, out: &mut ViewOutput) -> anyhow::Result<()> {
    let profile = Profile::start(state.config.profile);
    let count = state
        .client
        .count(&something_query(), Some(SOMETHING_LIMIT))
        .await
        .context("counting Something records")?;
    out.line(count);
    profile.finish(out);
    Ok(())
}
