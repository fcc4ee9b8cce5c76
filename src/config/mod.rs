use crate::utils::{DEFAULT_SHUTDOWN_TIMEOUT_MS, DEFAULT_STATE_COLLECTION};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Aliases appear in log fields and file names.
static ALIAS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("alias pattern is valid"));

fn default_state_collection() -> String {
    DEFAULT_STATE_COLLECTION.to_string()
}

fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

/// A logical database: a stable alias used by code, mapped onto a physical store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalDatabase {
    /// Stable identifier used by code and by migration step tags
    pub alias: String,
    /// Actual store (database) name
    pub name: String,
    #[serde(default)]
    pub connection_string: String,
    /// Collection holding this database's version records
    #[serde(default = "default_state_collection")]
    pub migration_state_collection_name: String,
    /// Pin the database to this version, downgrading if necessary.
    /// When absent the database is upgraded to the highest available version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_target_version: Option<i64>,
}

impl LogicalDatabase {
    pub fn new(alias: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            name: name.into(),
            connection_string: String::new(),
            migration_state_collection_name: default_state_collection(),
            fixed_target_version: None,
        }
    }

    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = connection_string.into();
        self
    }

    pub fn with_state_collection(mut self, name: impl Into<String>) -> Self {
        self.migration_state_collection_name = name.into();
        self
    }

    pub fn with_fixed_target(mut self, version: i64) -> Self {
        self.fixed_target_version = Some(version);
        self
    }
}

/// Migration runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationConfig {
    #[serde(default)]
    pub databases: Vec<LogicalDatabase>,
    /// How long `stop` waits for in-flight runs, in milliseconds
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            databases: Vec::new(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl MigrationConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn database(&self, alias: &str) -> Option<&LogicalDatabase> {
        self.databases.iter().find(|db| db.alias == alias)
    }

    /// Check aliases and names before any run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();

        for db in &self.databases {
            if db.alias.is_empty() {
                return Err(ConfigError::Invalid("database alias must not be empty".into()));
            }
            if !ALIAS_PATTERN.is_match(&db.alias) {
                return Err(ConfigError::Invalid(format!(
                    "database alias '{}' may only contain letters, digits, '_', '.' and '-'",
                    db.alias
                )));
            }
            if db.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "database '{}' has an empty store name",
                    db.alias
                )));
            }
            if db.migration_state_collection_name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "database '{}' has an empty migration state collection name",
                    db.alias
                )));
            }
            if !seen.insert(db.alias.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate database alias '{}'",
                    db.alias
                )));
            }
        }

        Ok(())
    }
}

/// Read and validate the configuration file
pub async fn read_config(path: &Path) -> Result<MigrationConfig, ConfigError> {
    let content = fs::read_to_string(path).await?;
    let config: MigrationConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Write the configuration file
pub async fn write_config(path: &Path, config: &MigrationConfig) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config: MigrationConfig =
            serde_json::from_str(r#"{"databases":[{"alias":"main","name":"app"}]}"#).unwrap();

        assert_eq!(config.shutdown_timeout_ms, DEFAULT_SHUTDOWN_TIMEOUT_MS);
        let db = &config.databases[0];
        assert_eq!(db.migration_state_collection_name, DEFAULT_STATE_COLLECTION);
        assert_eq!(db.fixed_target_version, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_camel_case_fields() {
        let config: MigrationConfig = serde_json::from_str(
            r#"{"databases":[{"alias":"main","name":"app","connectionString":"/tmp/x","migrationStateCollectionName":"versions","fixedTargetVersion":40}],"shutdownTimeoutMs":5}"#,
        )
        .unwrap();

        let db = config.database("main").unwrap();
        assert_eq!(db.connection_string, "/tmp/x");
        assert_eq!(db.migration_state_collection_name, "versions");
        assert_eq!(db.fixed_target_version, Some(40));
        assert_eq!(config.shutdown_timeout(), Duration::from_millis(5));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let config = MigrationConfig {
            databases: vec![LogicalDatabase::new("a", "x"), LogicalDatabase::new("a", "y")],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_alias_rejected() {
        let config = MigrationConfig {
            databases: vec![LogicalDatabase::new("has space", "x")],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MigrationConfig {
            databases: vec![LogicalDatabase::new("ok", "  ")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_read_write_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = MigrationConfig {
            databases: vec![LogicalDatabase::new("main", "app").with_fixed_target(3)],
            shutdown_timeout_ms: 100,
        };

        write_config(&path, &config).await.unwrap();
        let loaded = read_config(&path).await.unwrap();
        assert_eq!(loaded.databases, config.databases);
        assert_eq!(loaded.shutdown_timeout_ms, 100);
    }
}
