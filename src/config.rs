//! Configuration handling for the benchmark server
//!
//! Settings are layered: built-in defaults, then an optional `dsbench.toml`,
//! then environment variables (a `.env` file in the working directory is
//! loaded first), then command line flags applied by the binary.
//!
//! ## Environment Variables
//!
//! - `DSBENCH_BACKEND` - `memory` or `solidb`
//! - `DSBENCH_PROFILE` - `True`/`true`/`1` enables call profiles in test views
//! - `DSBENCH_PORT` - HTTP listen port
//! - `DSBENCH_RPC_LATENCY_MS` - simulated round trip of the memory backend
//! - `DSBENCH_SOLIDB_URL` - SoliDB server base URL
//! - `DSBENCH_SOLIDB_DATABASE` - SoliDB database name
//! - `DSBENCH_SOLIDB_TOKEN` - bearer token for SoliDB

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{BenchError, BenchResult};

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "dsbench.toml";

/// Environment variable names
pub const ENV_BACKEND: &str = "DSBENCH_BACKEND";
pub const ENV_PROFILE: &str = "DSBENCH_PROFILE";
pub const ENV_PORT: &str = "DSBENCH_PORT";
pub const ENV_RPC_LATENCY_MS: &str = "DSBENCH_RPC_LATENCY_MS";
pub const ENV_SOLIDB_URL: &str = "DSBENCH_SOLIDB_URL";
pub const ENV_SOLIDB_DATABASE: &str = "DSBENCH_SOLIDB_DATABASE";
pub const ENV_SOLIDB_TOKEN: &str = "DSBENCH_SOLIDB_TOKEN";

/// Which datastore client the server talks through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process store with simulated round trips
    #[default]
    Memory,
    /// Remote SoliDB server over its REST API
    Solidb,
}

impl FromStr for BackendKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "solidb" => Ok(BackendKind::Solidb),
            other => Err(BenchError::Config(format!("unknown backend '{}'", other))),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub backend: BackendKind,
    /// Append call statistics to every test view
    #[serde(default)]
    pub profile: bool,
    /// Keys deleted per request by `/cleanup`
    #[serde(default = "default_cleanup_chunk")]
    pub cleanup_chunk: usize,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub solidb: SolidbConfig,
    #[serde(default)]
    pub seed: SeedConfig,
}

fn default_port() -> u16 {
    8080
}

fn default_cleanup_chunk() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Simulated duration of one round trip, in milliseconds
    #[serde(default = "default_rpc_latency_ms")]
    pub rpc_latency_ms: u64,
    /// Results returned per simulated query batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_rpc_latency_ms() -> u64 {
    2
}

fn default_batch_size() -> usize {
    300
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            rpc_latency_ms: default_rpc_latency_ms(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolidbConfig {
    #[serde(default = "default_solidb_url")]
    pub url: String,
    #[serde(default = "default_solidb_database")]
    pub database: String,
    /// Prepended to the record kind to name each collection
    #[serde(default = "default_collection_prefix")]
    pub collection_prefix: String,
    #[serde(default)]
    pub token: String,
    /// Upper bound on concurrent document requests
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Cursor batch size requested from the server
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_solidb_url() -> String {
    "http://localhost:6745".to_string()
}

fn default_solidb_database() -> String {
    "_system".to_string()
}

fn default_collection_prefix() -> String {
    "dsbench_".to_string()
}

fn default_max_in_flight() -> usize {
    16
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for SolidbConfig {
    fn default() -> Self {
        Self {
            url: default_solidb_url(),
            database: default_solidb_database(),
            collection_prefix: default_collection_prefix(),
            token: String::new(),
            max_in_flight: default_max_in_flight(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Shape of the synthetic data written by `/init`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Number of `put_multi` calls
    #[serde(default = "default_batches")]
    pub batches: usize,
    /// Records per `put_multi` call
    #[serde(default = "default_records_per_batch")]
    pub records_per_batch: usize,
    /// Nested sub-records per record
    #[serde(default = "default_items_per_record")]
    pub items_per_record: usize,
    #[serde(default = "default_string_len")]
    pub string_len: usize,
    /// Integers are drawn from `1..=max_int`
    #[serde(default = "default_max_int")]
    pub max_int: i64,
}

fn default_seed() -> u64 {
    123
}

fn default_batches() -> usize {
    10
}

fn default_records_per_batch() -> usize {
    40
}

fn default_items_per_record() -> usize {
    30
}

fn default_string_len() -> usize {
    30
}

fn default_max_int() -> i64 {
    2000
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            batches: default_batches(),
            records_per_batch: default_records_per_batch(),
            items_per_record: default_items_per_record(),
            string_len: default_string_len(),
            max_int: default_max_int(),
        }
    }
}

impl SeedConfig {
    /// Total number of records one `/init` writes
    pub fn total_records(&self) -> usize {
        self.batches * self.records_per_batch
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            backend: BackendKind::default(),
            profile: false,
            cleanup_chunk: default_cleanup_chunk(),
            memory: MemoryConfig::default(),
            solidb: SolidbConfig::default(),
            seed: SeedConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration
    ///
    /// Reads `.env` if present, then the given TOML file (which must exist),
    /// or `dsbench.toml` in the working directory when no path is given and
    /// the file is there. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> BenchResult<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file without environment overrides
    pub fn from_file(path: &Path) -> BenchResult<Self> {
        if !path.exists() {
            return Err(BenchError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply environment variable overrides to the configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides read through `lookup`, ignoring empty or malformed values
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(backend) = get(ENV_BACKEND) {
            match backend.parse() {
                Ok(kind) => self.backend = kind,
                Err(e) => tracing::warn!("Ignoring {}: {}", ENV_BACKEND, e),
            }
        }

        if let Some(profile) = get(ENV_PROFILE) {
            self.profile = parse_flag(&profile);
        }

        if let Some(port) = get(ENV_PORT).and_then(|p| p.parse::<u16>().ok()) {
            self.port = port;
        }

        if let Some(ms) = get(ENV_RPC_LATENCY_MS).and_then(|v| v.parse::<u64>().ok()) {
            self.memory.rpc_latency_ms = ms;
        }

        if let Some(url) = get(ENV_SOLIDB_URL) {
            self.solidb.url = url;
        }

        if let Some(database) = get(ENV_SOLIDB_DATABASE) {
            self.solidb.database = database;
        }

        if let Some(token) = get(ENV_SOLIDB_TOKEN) {
            self.solidb.token = token;
        }
    }

    /// Reject settings that would make the endpoints misbehave
    pub fn validate(&self) -> BenchResult<()> {
        if self.cleanup_chunk == 0 {
            return Err(BenchError::Config("cleanup_chunk must be at least 1".to_string()));
        }
        if self.memory.batch_size == 0 || self.solidb.batch_size == 0 {
            return Err(BenchError::Config("batch_size must be at least 1".to_string()));
        }
        if self.solidb.max_in_flight == 0 {
            return Err(BenchError::Config("max_in_flight must be at least 1".to_string()));
        }
        if self.seed.max_int < 1 {
            return Err(BenchError::Config("seed.max_int must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Interpret an environment flag the way the deployment scripts write them
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}
