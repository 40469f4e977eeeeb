pub mod config;
pub mod context;
pub mod datastore;
pub mod error;
pub mod model;
pub mod output;
pub mod profile;
pub mod runner;
pub mod seed;
pub mod server;

pub use config::{BackendKind, Config};
pub use datastore::{Client, Datastore, FetchOptions, MemoryDatastore, Query, SolidbDatastore};
pub use error::{BenchError, BenchResult};
pub use model::{Entity, Key, KeyId, Record, SomeData, Something, SubData};
pub use server::{create_router, AppState};
