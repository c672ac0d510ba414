//! Configuration management for TierQ
//!
//! Settings are layered with the `config` crate:
//! - Environment variables (`TIERQ_` prefix, `__` separator), highest priority
//! - Config file named by the `TIERQ_CONFIG` env var
//! - `./config/tierq.{yaml,toml,json}`
//! - Hardcoded defaults, lowest priority

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, CoreResult};
use crate::table::SqlDialect;

/// Default number of tables tracked as promotion candidates.
pub const DEFAULT_TRACKER_CAPACITY: usize = 10;

/// Root configuration structure for TierQ
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TierqConfig {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub local: LocalConfig,

    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub promotion: PromotionConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl TierqConfig {
    /// Load configuration from all sources and validate it.
    pub fn load() -> CoreResult<Self> {
        let mut builder = Self::set_defaults(Config::builder())?;

        if let Ok(config_path) = std::env::var("TIERQ_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        builder = builder.add_source(File::with_name("./config/tierq").required(false));

        // Example: TIERQ_TRACKER__CAPACITY=20
        builder = builder.add_source(
            Environment::with_prefix("TIERQ")
                .separator("__")
                .try_parsing(true),
        );

        let config: TierqConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let config: TierqConfig = Self::set_defaults(Config::builder())?
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        builder
            .set_default("remote.location", "US")?
            .set_default("local.storage_root", "./datasets/tierq")?
            .set_default("local.catalog", "tierq")?
            .set_default("local.schema", "public")?
            .set_default("tracker.capacity", DEFAULT_TRACKER_CAPACITY as i64)?
            .set_default("promotion.timeout_secs", 3600)?
            .set_default("query.source_dialect", "bigquery")?
            .set_default("query.local_dialect", "generic")?
            .set_default("discovery.precedence", "prefer_local")
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` describing the first invalid setting.
    pub fn validate(&self) -> CoreResult<()> {
        if self.remote.project.trim().is_empty() {
            return Err(CoreError::Configuration(
                "remote.project must not be empty".to_string(),
            ));
        }

        if self.remote.namespace.trim().is_empty() {
            return Err(CoreError::Configuration(
                "remote.namespace must not be empty".to_string(),
            ));
        }

        if !self.remote.export_staging_uri.contains("://") {
            return Err(CoreError::Configuration(format!(
                "remote.export_staging_uri must be a URI (got `{}`)",
                self.remote.export_staging_uri
            )));
        }

        if let Some(path) = &self.remote.credentials_path {
            if !path.is_file() {
                return Err(CoreError::Configuration(format!(
                    "remote.credentials_path does not exist: {}",
                    path.display()
                )));
            }
        }

        if self.local.storage_root.as_os_str().is_empty() {
            return Err(CoreError::Configuration(
                "local.storage_root must not be empty".to_string(),
            ));
        }

        if self.local.storage_root.is_file() {
            return Err(CoreError::Configuration(format!(
                "local.storage_root is a file: {}",
                self.local.storage_root.display()
            )));
        }

        if self.tracker.capacity == 0 {
            return Err(CoreError::Configuration(
                "tracker.capacity must be > 0".to_string(),
            ));
        }

        if self.promotion.timeout_secs == 0 {
            return Err(CoreError::Configuration(
                "promotion.timeout_secs must be > 0".to_string(),
            ));
        }

        if self.promotion.worker_interval_secs == Some(0) {
            return Err(CoreError::Configuration(
                "promotion.worker_interval_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Remote warehouse settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    /// Warehouse project / account identifier
    #[serde(default)]
    pub project: String,

    /// Dataset that holds the routed tables
    #[serde(default)]
    pub namespace: String,

    /// Service account key file
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,

    /// Bucket URI tables are exported to before download (e.g. `gs://bucket/exports`)
    #[serde(default)]
    pub export_staging_uri: String,

    /// Warehouse location used for export jobs
    #[serde(default = "default_remote_location")]
    pub location: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            namespace: String::new(),
            credentials_path: None,
            export_staging_uri: String::new(),
            location: default_remote_location(),
        }
    }
}

fn default_remote_location() -> String {
    "US".to_string()
}

/// Local tier settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalConfig {
    /// Directory holding one parquet directory per promoted table
    pub storage_root: PathBuf,

    /// Catalog name tables are registered under in the local engine
    pub catalog: String,

    /// Schema name tables are registered under in the local engine
    pub schema: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./datasets/tierq"),
            catalog: "tierq".to_string(),
            schema: "public".to_string(),
        }
    }
}

/// Usage tracker settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    /// Maximum number of tables kept in the hot set
    pub capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_TRACKER_CAPACITY,
        }
    }
}

/// Promotion settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PromotionConfig {
    /// Upper bound for a single table promotion, export to registration
    pub timeout_secs: u64,

    /// Background rebalance interval; `None` keeps rebalancing manual
    #[serde(default)]
    pub worker_interval_secs: Option<u64>,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 3600,
            worker_interval_secs: None,
        }
    }
}

impl PromotionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn worker_interval(&self) -> Option<Duration> {
        self.worker_interval_secs.map(Duration::from_secs)
    }
}

/// Query translation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Dialect incoming queries are written in
    pub source_dialect: SqlDialect,

    /// Dialect accepted by the local engine
    pub local_dialect: SqlDialect,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            source_dialect: SqlDialect::BigQuery,
            local_dialect: SqlDialect::Generic,
        }
    }
}

/// Which discovery source wins when a table is both listed remotely and found locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryPrecedence {
    /// Local directories override the remote listing.
    #[default]
    PreferLocal,
    /// Remote listing overrides local directories.
    PreferRemote,
}

/// Registry population settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub precedence: DiscoveryPrecedence,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> TierqConfig {
        let mut config = TierqConfig::default();
        config.remote.project = "analytics-sandbox".to_string();
        config.remote.namespace = "tpcds_100G".to_string();
        config.remote.export_staging_uri = "gs://tierq-export".to_string();
        config
    }

    #[test]
    fn test_default_configuration() {
        let config = TierqConfig::default();
        assert_eq!(config.tracker.capacity, DEFAULT_TRACKER_CAPACITY);
        assert_eq!(config.promotion.timeout_secs, 3600);
        assert!(config.promotion.worker_interval().is_none());
        assert_eq!(config.query.source_dialect, SqlDialect::BigQuery);
        assert_eq!(config.query.local_dialect, SqlDialect::Generic);
        assert_eq!(config.discovery.precedence, DiscoveryPrecedence::PreferLocal);
        assert_eq!(config.remote.location, "US");
    }

    #[test]
    fn test_validation_errors() {
        let mut config = valid_config();
        assert!(config.validate().is_ok());

        config.tracker.capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(CoreError::Configuration(_))
        ));
        config.tracker.capacity = 2;

        config.remote.export_staging_uri = "tierq-export".to_string();
        assert!(config.validate().is_err());
        config.remote.export_staging_uri = "gs://tierq-export".to_string();

        config.remote.namespace = " ".to_string();
        assert!(config.validate().is_err());
        config.remote.namespace = "tpcds".to_string();

        config.promotion.worker_interval_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_credentials_file() {
        let mut config = valid_config();
        config.remote.credentials_path = Some(PathBuf::from("/nonexistent/key.json"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("credentials_path"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[remote]
project = "analytics-sandbox"
namespace = "tpcds_100G"
export_staging_uri = "gs://tierq-export"

[tracker]
capacity = 4

[query]
local_dialect = "duckdb"

[discovery]
precedence = "prefer_remote"
"#
        )
        .unwrap();

        let config = TierqConfig::from_file(file.path()).unwrap();
        assert_eq!(config.remote.namespace, "tpcds_100G");
        assert_eq!(config.tracker.capacity, 4);
        assert_eq!(config.query.local_dialect, SqlDialect::DuckDb);
        assert_eq!(config.query.source_dialect, SqlDialect::BigQuery);
        assert_eq!(config.discovery.precedence, DiscoveryPrecedence::PreferRemote);
        assert_eq!(config.local.catalog, "tierq");
    }
}
