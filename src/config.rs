//! Configuration module
//!
//! Layers built-in defaults, an optional YAML file and `BALANCE_*`
//! environment variables, in that order.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Environment, File, FileFormat};
use serde::Deserialize;

/// Prefix of environment variables read into [`Config`]
pub const ENV_PREFIX: &str = "BALANCE";

/// Where the ledger is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Postgres,
    Memory,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server host
    pub server_host: String,

    /// Server port
    pub server_port: u16,

    pub db_host: String,
    pub db_port: u16,
    pub db_username: String,
    pub db_password: String,
    pub database_name: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Seconds to wait for a pooled connection
    pub database_timeout_secs: u64,

    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_level: String,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// Directory exported reports are written to and served from
    pub file_server_directory: PathBuf,

    /// History rows returned when a request asks for `limit=0`
    pub history_page_size: i64,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    pub storage: StorageKind,
}

impl Config {
    /// Load configuration, reading `.env` and the YAML file at `path` if present
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_sources(path, Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    fn from_sources(path: Option<&Path>, environment: Environment) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder()
            .set_default("server_host", "0.0.0.0")?
            .set_default("server_port", 8080)?
            .set_default("db_host", "localhost")?
            .set_default("db_port", 5432)?
            .set_default("db_username", "postgres")?
            .set_default("db_password", "postgres")?
            .set_default("database_name", "balance")?
            .set_default("database_max_connections", 10)?
            .set_default("database_timeout_secs", 5)?
            .set_default("log_level", "balance_service=info,tower_http=info")?
            .set_default("log_json", false)?
            .set_default("file_server_directory", "static")?
            .set_default("history_page_size", 100)?
            .set_default("request_timeout_secs", 15)?
            .set_default("storage", "postgres")?;

        if let Some(path) = path {
            builder = builder.add_source(
                File::new(&path.to_string_lossy(), FileFormat::Yaml).required(false),
            );
        }

        let config: Config = builder.add_source(environment).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server_port == 0 {
            return Err(ConfigError::InvalidValue("server_port"));
        }
        if self.database_max_connections == 0 {
            return Err(ConfigError::InvalidValue("database_max_connections"));
        }
        if self.history_page_size < 1 {
            return Err(ConfigError::InvalidValue("history_page_size"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("request_timeout_secs"));
        }
        Ok(())
    }

    /// Address the HTTP server binds to
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn database_timeout(&self) -> Duration {
        Duration::from_secs(self.database_timeout_secs)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid value for configuration key: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn environment(vars: &[(&str, &str)]) -> Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(Some(source))
    }

    fn scratch_file(content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("balance-config-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(None, environment(&[])).unwrap();

        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert_eq!(config.db_port, 5432);
        assert_eq!(config.history_page_size, 100);
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.storage, StorageKind::Postgres);
        assert_eq!(config.file_server_directory, PathBuf::from("static"));
        assert!(!config.log_json);
    }

    #[test]
    fn test_missing_file_is_optional() {
        let path = std::env::temp_dir().join("balance-config-does-not-exist.yaml");
        let config = Config::from_sources(Some(path.as_path()), environment(&[])).unwrap();
        assert_eq!(config.server_port, 8080);
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let path = scratch_file("server_port: 9000\nstorage: memory\nhistory_page_size: 25\n");

        let config = Config::from_sources(Some(path.as_path()), environment(&[])).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.server_port, 9000);
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.history_page_size, 25);
        assert_eq!(config.db_host, "localhost");
    }

    #[test]
    fn test_environment_overrides_file() {
        let path = scratch_file("server_port: 9000\n");

        let config = Config::from_sources(
            Some(path.as_path()),
            environment(&[("BALANCE_SERVER_PORT", "9100"), ("BALANCE_LOG_JSON", "true")]),
        )
        .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.server_port, 9100);
        assert!(config.log_json);
    }

    #[test]
    fn test_invalid_page_size_rejected() {
        let err = Config::from_sources(None, environment(&[("BALANCE_HISTORY_PAGE_SIZE", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("history_page_size")));
    }
}
