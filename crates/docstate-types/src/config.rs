//! Storage configuration types.
//!
//! `StorageConfig` is supplied once when a storage coordinator is built and is
//! immutable afterwards. It is usually loaded from the `[storage]` table of
//! `config.toml`; every field except the names has a default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

/// Throughput at or below which collections are created unpartitioned.
pub const PARTITION_THROUGHPUT_THRESHOLD: u32 = 10_000;

/// Default provisioned throughput for new collections.
pub const DEFAULT_COLLECTION_THROUGHPUT: u32 = 10_000;

/// Default document time-to-live: one week.
pub const DEFAULT_TTL_SECS: u64 = 604_800;

/// In-flight document operations per call when `parallel` is enabled.
pub const PARALLEL_FAN_OUT: usize = 3;

/// What a coordinator does after provisioning the database/collection failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitFailurePolicy {
    /// Forget the failure; the next call provisions again.
    #[default]
    Retry,
    /// Replay the recorded failure to every later call without retrying.
    Sticky,
}

/// Configuration for one database/collection pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_name")]
    pub database_name: String,

    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Request units provisioned when the collection is created.
    #[serde(default = "default_collection_throughput")]
    pub collection_throughput: u32,

    /// Default document expiry in seconds. `None` disables expiry.
    ///
    /// Absent uses one week; `0` or `null` disables.
    #[serde(
        default = "default_ttl",
        deserialize_with = "deserialize_ttl",
        serialize_with = "serialize_ttl"
    )]
    pub default_ttl: Option<u64>,

    /// Up to three document operations in flight per call when true, one otherwise.
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    #[serde(default)]
    pub init_failure: InitFailurePolicy,
}

fn default_database_name() -> String {
    "botstate".to_string()
}

fn default_collection_name() -> String {
    "state".to_string()
}

fn default_collection_throughput() -> u32 {
    DEFAULT_COLLECTION_THROUGHPUT
}

fn default_ttl() -> Option<u64> {
    Some(DEFAULT_TTL_SECS)
}

fn default_parallel() -> bool {
    true
}

fn serialize_ttl<S>(ttl: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(ttl.unwrap_or(0))
}

fn deserialize_ttl<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let ttl = Option::<u64>::deserialize(deserializer)?;
    Ok(ttl.filter(|secs| *secs > 0))
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_name: default_database_name(),
            collection_name: default_collection_name(),
            collection_throughput: default_collection_throughput(),
            default_ttl: default_ttl(),
            parallel: default_parallel(),
            init_failure: InitFailurePolicy::default(),
        }
    }
}

impl StorageConfig {
    /// Config for the given names with every other field defaulted.
    pub fn new(database_name: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            collection_name: collection_name.into(),
            ..Self::default()
        }
    }

    pub fn with_throughput(mut self, throughput: u32) -> Self {
        self.collection_throughput = throughput;
        self
    }

    pub fn with_default_ttl(mut self, ttl_secs: Option<u64>) -> Self {
        self.default_ttl = ttl_secs.filter(|secs| *secs > 0);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_init_failure(mut self, policy: InitFailurePolicy) -> Self {
        self.init_failure = policy;
        self
    }

    /// Whether documents are routed by a partition key equal to their id.
    pub fn is_partitioned(&self) -> bool {
        self.collection_throughput > PARTITION_THROUGHPUT_THRESHOLD
    }

    /// Maximum concurrent document operations within one load/save call.
    pub fn max_concurrency(&self) -> usize {
        if self.parallel {
            PARALLEL_FAN_OUT
        } else {
            1
        }
    }

    /// Reject configurations no backend can provision.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "database_name must not be empty".to_string(),
            ));
        }
        if self.collection_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "collection_name must not be empty".to_string(),
            ));
        }
        if self.database_name.contains('/') || self.collection_name.contains('/') {
            return Err(ConfigError::Invalid(
                "database and collection names must not contain '/'".to_string(),
            ));
        }
        if self.collection_throughput == 0 {
            return Err(ConfigError::Invalid(
                "collection_throughput must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which document database implementation backs the storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local maps; state is lost on exit.
    Memory,
    /// One JSON file per document under a root directory.
    #[default]
    Fs,
}

/// The `[backend]` table of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// Root directory for the filesystem backend. Relative paths are resolved
    /// against the data directory; absent means `{data_dir}/db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

impl BackendConfig {
    pub fn root_dir(&self, data_dir: &Path) -> PathBuf {
        match &self.root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => data_dir.join(root),
            None => data_dir.join("db"),
        }
    }
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocstateConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub backend: BackendConfig,
}
