use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{deserialize_flag, deserialize_non_empty_string, LegacyEnv};
use crate::error::{CommonError, CommonResult};

/// The prefix that marks a relation as a built-in dataset.
pub const INTERNAL_RELATION_PREFIX: char = '$';

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Maps a dotted relation prefix (e.g. `warehouse` or `warehouse.raw`) to the
    /// backend that serves every relation under that prefix.
    #[serde(default)]
    pub relations: BTreeMap<String, SourceKind>,
    #[serde(default)]
    pub disk: Option<DiskConfig>,
    #[serde(default)]
    pub s3: Option<S3Config>,
    #[serde(default)]
    pub gcs: Option<GcsConfig>,
    #[serde(default)]
    pub azure: Option<AzureConfig>,
    #[serde(default)]
    pub mongodb: Option<MongoDbConfig>,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

impl AppConfig {
    /// Loads the configuration from the built-in defaults and the environment.
    ///
    /// Variables prefixed with `QUARRY__` take precedence over the legacy names
    /// listed in [`LegacyEnv`]. A double underscore separates nested keys,
    /// e.g. `QUARRY__CACHE__TTL_SECS=60`.
    pub fn load() -> CommonResult<Self> {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(LegacyEnv::provider())
            .merge(Env::prefixed("QUARRY__").map(|p| p.as_str().replace("__", ".").into()))
            .extract()
            .map_err(|e| CommonError::InvalidConfig(e.to_string()))
    }

    /// Registers a relation prefix served by the given backend.
    pub fn with_relation(mut self, prefix: impl Into<String>, kind: SourceKind) -> Self {
        self.relations.insert(prefix.into(), kind);
        self
    }

    /// Checks the configuration syntactically.
    ///
    /// Reachability of the configured endpoints is not checked here.
    pub fn validate(&self) -> CommonResult<()> {
        self.execution.validate()?;
        self.cache.validate()?;
        for prefix in self.relations.keys() {
            validate_relation_prefix(prefix)?;
        }
        if let Some(s3) = &self.s3 {
            if s3.endpoint.is_some() {
                s3.endpoint_url()?;
            }
        }
        if let Some(gcs) = &self.gcs {
            if gcs.endpoint.is_some() {
                gcs.endpoint_url()?;
            }
        }
        if let Some(azure) = &self.azure {
            azure.parse_connection_string()?;
        }
        if let Some(mongodb) = &self.mongodb {
            mongodb.validate()?;
        }
        if let Some(redis) = &self.redis {
            redis.url()?;
        }
        Ok(())
    }
}

fn validate_relation_prefix(prefix: &str) -> CommonResult<()> {
    if prefix.starts_with(INTERNAL_RELATION_PREFIX) {
        return Err(CommonError::invalid(format!(
            "relation prefix `{prefix}` must not start with `{INTERNAL_RELATION_PREFIX}`"
        )));
    }
    if prefix.split('.').any(|segment| segment.trim().is_empty()) {
        return Err(CommonError::invalid(format!(
            "relation prefix `{prefix}` has an empty segment"
        )));
    }
    Ok(())
}

/// The backend technologies a relation prefix can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A directory on the local filesystem, read through the object store interface.
    Disk,
    /// Amazon S3 or an S3-compatible service such as MinIO.
    S3,
    /// Google Cloud Storage or its emulator.
    Gcs,
    /// Azure Blob Storage or Azurite.
    Azure,
    /// A MongoDB database.
    MongoDb,
    /// A Redis key-value cache service.
    Redis,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Disk => "disk",
            SourceKind::S3 => "s3",
            SourceKind::Gcs => "gcs",
            SourceKind::Azure => "azure",
            SourceKind::MongoDb => "mongodb",
            SourceKind::Redis => "redis",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// The upper bound for every connector call and every batch pulled from a connector.
    pub timeout_secs: u64,
    /// The number of rows a connector produces per batch.
    pub batch_size: usize,
    pub worker_threads: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            batch_size: 1024,
            worker_threads: 2,
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> CommonResult<()> {
        if self.timeout_secs == 0 {
            return Err(CommonError::invalid("execution timeout must be positive"));
        }
        if self.batch_size == 0 {
            return Err(CommonError::invalid("execution batch size must be positive"));
        }
        if self.worker_threads == 0 {
            return Err(CommonError::invalid(
                "execution worker thread count must be positive",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: u64,
    /// Batches with more rows than this are returned to the caller but not retained.
    pub max_entry_rows: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_entries: 256,
            max_entry_rows: 1_000_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    fn validate(&self) -> CommonResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.ttl_secs == 0 {
            return Err(CommonError::invalid("cache TTL must be positive"));
        }
        if self.max_entries == 0 {
            return Err(CommonError::invalid("cache capacity must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// The directory that relation paths are resolved against.
    /// The current directory is used when this is not set.
    #[serde(deserialize_with = "deserialize_non_empty_string")]
    pub root: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Either a URL or a bare `host:port` pair, in which case `secure` picks the scheme.
    #[serde(deserialize_with = "deserialize_non_empty_string")]
    pub endpoint: Option<String>,
    #[serde(deserialize_with = "deserialize_non_empty_string")]
    pub access_key: Option<String>,
    #[serde(deserialize_with = "deserialize_non_empty_string")]
    pub secret_key: Option<String>,
    pub region: String,
    #[serde(deserialize_with = "deserialize_flag")]
    pub secure: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            access_key: None,
            secret_key: None,
            region: "us-east-1".to_string(),
            secure: true,
        }
    }
}

impl S3Config {
    pub fn endpoint_url(&self) -> CommonResult<Option<Url>> {
        self.endpoint
            .as_deref()
            .map(|endpoint| parse_endpoint(endpoint, self.secure))
            .transpose()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GcsConfig {
    /// The base URL of a storage emulator, e.g. `http://localhost:4443`.
    #[serde(deserialize_with = "deserialize_non_empty_string")]
    pub endpoint: Option<String>,
    #[serde(deserialize_with = "deserialize_non_empty_string")]
    pub project_id: Option<String>,
    /// The service account key in JSON.
    #[serde(deserialize_with = "deserialize_non_empty_string")]
    pub service_account_key: Option<String>,
}

impl GcsConfig {
    pub fn endpoint_url(&self) -> CommonResult<Option<Url>> {
        self.endpoint
            .as_deref()
            .map(|endpoint| parse_endpoint(endpoint, false))
            .transpose()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    pub connection_string: String,
}

/// The parts of an Azure storage connection string that the blob store uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AzureConnectionString {
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub blob_endpoint: Option<String>,
    pub use_emulator: bool,
}

impl AzureConfig {
    pub fn parse_connection_string(&self) -> CommonResult<AzureConnectionString> {
        let mut output = AzureConnectionString::default();
        for part in self.connection_string.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let Some((key, value)) = part.split_once('=') else {
                return Err(CommonError::invalid(format!(
                    "invalid Azure connection string segment: {part}"
                )));
            };
            match key.trim() {
                "AccountName" => output.account_name = Some(value.to_string()),
                "AccountKey" => output.account_key = Some(value.to_string()),
                "BlobEndpoint" => {
                    Url::parse(value).map_err(|e| {
                        CommonError::invalid(format!("invalid Azure blob endpoint: {e}"))
                    })?;
                    output.blob_endpoint = Some(value.to_string());
                }
                "UseDevelopmentStorage" => {
                    output.use_emulator = value.eq_ignore_ascii_case("true");
                }
                _ => {}
            }
        }
        if output.account_name.is_none() && !output.use_emulator {
            return Err(CommonError::invalid(
                "Azure connection string must contain `AccountName` or `UseDevelopmentStorage=true`",
            ));
        }
        Ok(output)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoDbConfig {
    pub connection_string: String,
    pub database: String,
}

impl MongoDbConfig {
    fn validate(&self) -> CommonResult<()> {
        if !(self.connection_string.starts_with("mongodb://")
            || self.connection_string.starts_with("mongodb+srv://"))
        {
            return Err(CommonError::invalid(
                "MongoDB connection string must start with `mongodb://` or `mongodb+srv://`",
            ));
        }
        if self.database.is_empty() {
            return Err(CommonError::missing("MongoDB database name"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Either `host:port` or a `redis://` URL.
    pub server: String,
}

impl RedisConfig {
    pub fn url(&self) -> CommonResult<Url> {
        if self.server.is_empty() {
            return Err(CommonError::missing("Redis server address"));
        }
        let url = if self.server.contains("://") {
            self.server.clone()
        } else {
            format!("redis://{}/", self.server)
        };
        Url::parse(&url).map_err(|e| CommonError::invalid(format!("invalid Redis server: {e}")))
    }
}

fn parse_endpoint(endpoint: &str, secure: bool) -> CommonResult<Url> {
    let endpoint = if endpoint.contains("://") {
        endpoint.to_string()
    } else if secure {
        format!("https://{endpoint}")
    } else {
        format!("http://{endpoint}")
    };
    Url::parse(&endpoint).map_err(|e| CommonError::invalid(format!("invalid endpoint: {e}")))
}
