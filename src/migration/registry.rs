//! Migration registry for managing and querying available migrations.

use super::types::{Migration, MigrationStep, StepTag};
use crate::config::{LogicalDatabase, MigrationConfig};
use std::sync::Arc;
use tracing::warn;

/// Source of logical databases and their migration steps.
///
/// How steps are discovered is up to the implementation; the engine only
/// needs the descriptors and, per alias, the steps in a stable order.
pub trait MigrationSource: Send + Sync {
    /// Every registered logical database.
    fn databases(&self) -> Vec<LogicalDatabase>;

    /// Steps tagged for `alias`, in registration order.
    fn steps_for(&self, alias: &str) -> Vec<MigrationStep>;
}

/// Registry of all available migrations.
///
/// Steps keep their registration order, which decides ties between
/// equally short migration paths.
#[derive(Default)]
pub struct MigrationRegistry {
    databases: Vec<LogicalDatabase>,
    steps: Vec<MigrationStep>,
}

impl MigrationRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every database of `config`.
    pub fn from_config(config: &MigrationConfig) -> Self {
        let mut registry = Self::new();
        for database in &config.databases {
            registry.register_database(database.clone());
        }
        registry
    }

    /// Register a logical database. A database with the same alias is replaced.
    pub fn register_database(&mut self, database: LogicalDatabase) {
        if let Some(existing) = self.databases.iter_mut().find(|d| d.alias == database.alias) {
            warn!(alias = %database.alias, "Replacing registered database");
            *existing = database;
        } else {
            self.databases.push(database);
        }
    }

    /// Register a migration step.
    pub fn register(&mut self, step: MigrationStep) {
        self.steps.push(step);
    }

    /// Register a migration body under the given tag.
    pub fn register_migration(&mut self, tag: StepTag, migration: Arc<dyn Migration>) {
        self.register(MigrationStep::new(tag, migration));
    }

    /// Get all versions that appear in `alias`'s steps, ascending.
    pub fn available_versions(&self, alias: &str) -> Vec<i64> {
        let mut versions: Vec<i64> = self
            .steps
            .iter()
            .filter(|s| s.database() == alias)
            .flat_map(|s| [s.tag.down_version, s.tag.up_version])
            .collect();

        versions.sort_unstable();
        versions.dedup();
        versions
    }

    /// Steps tagged for an alias that was never registered as a database.
    pub fn orphaned_steps(&self) -> Vec<&StepTag> {
        self.steps
            .iter()
            .filter(|s| !self.databases.iter().any(|d| d.alias == s.database()))
            .map(|s| &s.tag)
            .collect()
    }
}

impl MigrationSource for MigrationRegistry {
    fn databases(&self) -> Vec<LogicalDatabase> {
        self.databases.clone()
    }

    fn steps_for(&self, alias: &str) -> Vec<MigrationStep> {
        self.steps
            .iter()
            .filter(|s| s.database() == alias)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreHandle;

    // Mock migration for testing
    struct MockMigration;

    #[async_trait::async_trait]
    impl Migration for MockMigration {
        async fn up(&self, _store: &dyn StoreHandle) -> anyhow::Result<()> {
            Ok(())
        }

        async fn down(&self, _store: &dyn StoreHandle) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn step(alias: &str, down: i64, up: i64) -> MigrationStep {
        MigrationStep::new(StepTag::new(alias, down, up), Arc::new(MockMigration))
    }

    #[test]
    fn test_empty_registry() {
        let registry = MigrationRegistry::new();
        assert!(registry.databases().is_empty());
        assert!(registry.steps_for("main").is_empty());
        assert!(registry.available_versions("main").is_empty());
    }

    #[test]
    fn test_steps_keep_registration_order() {
        let mut registry = MigrationRegistry::new();
        registry.register(step("main", 50, 60));
        registry.register(step("other", 0, 1));
        registry.register(step("main", 0, 50));

        let steps = registry.steps_for("main");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].tag.down_version, 50);
        assert_eq!(steps[1].tag.down_version, 0);
    }

    #[test]
    fn test_available_versions() {
        let mut registry = MigrationRegistry::new();
        registry.register(step("main", 0, 10));
        registry.register(step("main", 10, 20));
        registry.register(step("main", 0, 20));
        registry.register(step("other", 0, 99));

        assert_eq!(registry.available_versions("main"), vec![0, 10, 20]);
    }

    #[test]
    fn test_register_database_replaces_alias() {
        let mut registry = MigrationRegistry::new();
        registry.register_database(LogicalDatabase::new("main", "app"));
        registry.register_database(LogicalDatabase::new("main", "app_v2"));

        let databases = registry.databases();
        assert_eq!(databases.len(), 1);
        assert_eq!(databases[0].name, "app_v2");
    }

    #[test]
    fn test_from_config_and_orphans() {
        let config = MigrationConfig {
            databases: vec![LogicalDatabase::new("main", "app")],
            ..Default::default()
        };
        let mut registry = MigrationRegistry::from_config(&config);
        registry.register(step("main", 0, 1));
        registry.register(step("ghost", 0, 1));

        let orphans = registry.orphaned_steps();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].database, "ghost");
    }
}
