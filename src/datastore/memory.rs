//! In-process datastore
//!
//! Records live in an ordered map. Every operation first pays one simulated
//! round trip; queries pay one more per extra result batch, the way a
//! cursor-based remote store would.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use super::{Datastore, FetchOptions, Query};
use crate::config::MemoryConfig;
use crate::context;
use crate::error::BenchResult;
use crate::model::{Key, KeyId, Record};

pub struct MemoryDatastore {
    records: RwLock<BTreeMap<Key, Record>>,
    next_id: AtomicI64,
    latency: Duration,
    batch_size: usize,
}

impl MemoryDatastore {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            latency: Duration::from_millis(config.rpc_latency_ms),
            batch_size: config.batch_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    async fn round_trip(&self, call: &'static str) {
        let latency = self.latency;
        context::rpc(call, async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
        })
        .await;
    }

    fn allocate(&self, mut key: Key) -> Key {
        if !key.is_complete() {
            key.id = Some(KeyId::Id(self.next_id.fetch_add(1, Ordering::Relaxed)));
        }
        key
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put_multi(&self, records: Vec<Record>) -> BenchResult<Vec<Key>> {
        self.round_trip("memory.put").await;

        let mut table = self.records.write();
        let mut keys = Vec::with_capacity(records.len());
        for mut record in records {
            record.key = self.allocate(record.key);
            keys.push(record.key.clone());
            table.insert(record.key.clone(), record);
        }
        Ok(keys)
    }

    async fn run_query(&self, query: &Query, options: &FetchOptions) -> BenchResult<Vec<Record>> {
        self.round_trip("memory.query").await;

        let results = {
            let table = self.records.read();
            query.evaluate(table.values(), options)?
        };

        let extra_batches = results.len().saturating_sub(1) / self.batch_size;
        for _ in 0..extra_batches {
            self.round_trip("memory.next").await;
        }
        Ok(results)
    }

    async fn count(&self, query: &Query, limit: Option<usize>) -> BenchResult<usize> {
        self.round_trip("memory.count").await;

        let table = self.records.read();
        Ok(query.count(table.values(), limit))
    }

    async fn delete_multi(&self, keys: &[Key]) -> BenchResult<()> {
        self.round_trip("memory.delete").await;

        let mut table = self.records.write();
        for key in keys {
            table.remove(key);
        }
        Ok(())
    }
}
