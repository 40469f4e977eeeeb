//! Datastore client seam
//!
//! [`Datastore`] is what a backend implements; [`Client`] is what the
//! handlers call. The client charges every operation's wall time to the
//! current request's wait time, while backends charge each remote call to
//! its RPC time.

pub mod memory;
pub mod query;
pub mod solidb;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{BackendKind, Config};
use crate::context;
use crate::error::BenchResult;
use crate::model::{Entity, Key, Record};

pub use memory::MemoryDatastore;
pub use query::{Direction, FetchOptions, Filter, Order, Query};
pub use solidb::SolidbDatastore;

#[async_trait]
pub trait Datastore: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Store every record, allocating ids for incomplete keys.
    /// Returned keys are in input order.
    async fn put_multi(&self, records: Vec<Record>) -> BenchResult<Vec<Key>>;

    async fn run_query(&self, query: &Query, options: &FetchOptions) -> BenchResult<Vec<Record>>;

    async fn count(&self, query: &Query, limit: Option<usize>) -> BenchResult<usize>;

    /// Delete the given keys; keys that do not exist are ignored
    async fn delete_multi(&self, keys: &[Key]) -> BenchResult<()>;
}

/// Handle used by request handlers
#[derive(Clone)]
pub struct Client {
    inner: Arc<dyn Datastore>,
}

impl Client {
    pub fn new(inner: Arc<dyn Datastore>) -> Self {
        Self { inner }
    }

    /// Build the backend selected by the configuration
    pub fn from_config(config: &Config) -> BenchResult<Self> {
        let inner: Arc<dyn Datastore> = match config.backend {
            BackendKind::Memory => Arc::new(MemoryDatastore::new(&config.memory)),
            BackendKind::Solidb => Arc::new(SolidbDatastore::new(&config.solidb)?),
        };
        tracing::info!("Using {} datastore backend", inner.name());
        Ok(Self { inner })
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.name()
    }

    pub async fn put_multi(&self, records: Vec<Record>) -> BenchResult<Vec<Key>> {
        context::wait(self.inner.put_multi(records)).await
    }

    /// Store typed entities under a common parent
    pub async fn put_entities<E: Entity>(&self, entities: &[E], parent: Option<&Key>) -> BenchResult<Vec<Key>> {
        let records = entities
            .iter()
            .map(|e| Record::from_entity(e, parent.cloned()))
            .collect::<BenchResult<Vec<_>>>()?;
        self.put_multi(records).await
    }

    pub async fn fetch(&self, query: &Query, options: &FetchOptions) -> BenchResult<Vec<Record>> {
        context::wait(self.inner.run_query(query, options)).await
    }

    pub async fn fetch_keys(&self, query: &Query) -> BenchResult<Vec<Key>> {
        let records = self.fetch(query, &FetchOptions::new().keys_only()).await?;
        Ok(records.into_iter().map(|r| r.key).collect())
    }

    pub async fn count(&self, query: &Query, limit: Option<usize>) -> BenchResult<usize> {
        context::wait(self.inner.count(query, limit)).await
    }

    pub async fn delete_multi(&self, keys: &[Key]) -> BenchResult<()> {
        context::wait(self.inner.delete_multi(keys)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::context::RequestContext;
    use crate::model::{SomeData, Something};

    fn client() -> Client {
        let config = MemoryConfig {
            rpc_latency_ms: 1,
            ..Default::default()
        };
        Client::new(Arc::new(MemoryDatastore::new(&config)))
    }

    #[tokio::test]
    async fn test_put_and_fetch_entities() {
        let client = client();
        let things = vec![
            Something {
                foo: Some("two".to_string()),
                bar: Some(true),
            },
            Something {
                foo: Some("two".to_string()),
                bar: Some(false),
            },
        ];
        let keys = client.put_entities(&things, None).await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| k.is_complete()));

        let query = Query::for_entity::<Something>()
            .filter("foo", "two")
            .filter("bar", true);
        let results = client.fetch(&query, &FetchOptions::new().limit(100_000)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].to_entity::<Something>().unwrap(), things[0]);
    }

    #[tokio::test]
    async fn test_operations_charge_wait_time() {
        let client = client();
        let ctx = RequestContext::new();
        ctx.clone()
            .scope(async {
                let parent = SomeData::parent_key();
                client
                    .put_entities(&[SomeData::default()], Some(&parent))
                    .await
                    .unwrap();
                let keys = client.fetch_keys(&Query::for_entity::<SomeData>()).await.unwrap();
                client.delete_multi(&keys).await.unwrap();
            })
            .await;

        assert!(ctx.rpc_time() > std::time::Duration::ZERO);
        assert!(ctx.wait_time() >= ctx.rpc_time());
        assert_eq!(client.backend_name(), "memory");
    }
}
