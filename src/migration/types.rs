//! Types for the migration system.

use crate::state::StateError;
use crate::store::{StoreError, StoreHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// One reason a migration path could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathProblem {
    /// No chain of steps leads from `from` to `to`.
    NoPath { from: i64, to: i64 },
    /// No in-range step departs from the starting version, although other steps exist.
    StartDisconnected { version: i64 },
}

impl fmt::Display for PathProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathProblem::NoPath { from, to } => {
                write!(f, "no migration path from version {} to version {}", from, to)
            }
            PathProblem::StartDisconnected { version } => write!(
                f,
                "version {} is not connected to any available migration step",
                version
            ),
        }
    }
}

/// Path resolution failure, listing every problem found.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", join_problems(.problems))]
pub struct PathError {
    pub problems: Vec<PathProblem>,
}

fn join_problems(problems: &[PathProblem]) -> String {
    problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error types for migration operations.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Path resolution failed for {database}: {source}")]
    PathResolution {
        database: String,
        #[source]
        source: PathError,
    },

    #[error(
        "Database {database} has incomplete migrations at versions {versions:?}; \
         a previous run did not finish and requires manual intervention"
    )]
    CorruptState { database: String, versions: Vec<i64> },

    #[error("Migration {database} {from} -> {to}{} failed: {source}", describe(.description))]
    StepExecution {
        database: String,
        from: i64,
        to: i64,
        description: Option<String>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Migration of {database} was cancelled")]
    Cancelled { database: String },

    #[error("Store error for {database}: {source}")]
    Store {
        database: String,
        #[source]
        source: StoreError,
    },

    #[error("State tracking error for {database}: {source}")]
    State {
        database: String,
        #[source]
        source: StateError,
    },
}

fn describe(description: &Option<String>) -> String {
    match description {
        Some(d) => format!(" ({})", d),
        None => String::new(),
    }
}

impl MigrationError {
    /// Alias of the logical database the error belongs to.
    pub fn database(&self) -> &str {
        match self {
            MigrationError::PathResolution { database, .. }
            | MigrationError::CorruptState { database, .. }
            | MigrationError::StepExecution { database, .. }
            | MigrationError::Cancelled { database }
            | MigrationError::Store { database, .. }
            | MigrationError::State { database, .. } => database,
        }
    }
}

/// Direction of migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationDirection {
    /// Upgrading to a newer version.
    Up,
    /// Downgrading to an older version.
    Down,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationDirection::Up => write!(f, "up"),
            MigrationDirection::Down => write!(f, "down"),
        }
    }
}

/// Body of a single migration.
///
/// The engine treats bodies as opaque: they receive the open store and may
/// do anything with it. `down` must revert what `up` did.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Apply the migration (upgrade).
    async fn up(&self, store: &dyn StoreHandle) -> anyhow::Result<()>;

    /// Revert the migration (downgrade).
    async fn down(&self, store: &dyn StoreHandle) -> anyhow::Result<()>;
}

/// Declarative metadata of a step: which database it belongs to and which
/// edge of the version graph it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTag {
    pub database: String,
    pub down_version: i64,
    pub up_version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl StepTag {
    pub fn new(database: impl Into<String>, down_version: i64, up_version: i64) -> Self {
        Self {
            database: database.into(),
            down_version,
            up_version,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Display for StepTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.down_version, self.up_version)?;
        if let Some(description) = &self.description {
            write!(f, ": {}", description)?;
        }
        Ok(())
    }
}

/// An edge of the version graph.
pub trait StepEdge {
    fn down_version(&self) -> i64;
    fn up_version(&self) -> i64;
}

impl StepEdge for StepTag {
    fn down_version(&self) -> i64 {
        self.down_version
    }

    fn up_version(&self) -> i64 {
        self.up_version
    }
}

/// A registered migration step: its tag plus the body that applies it.
#[derive(Clone)]
pub struct MigrationStep {
    pub tag: StepTag,
    pub migration: Arc<dyn Migration>,
}

impl MigrationStep {
    pub fn new(tag: StepTag, migration: Arc<dyn Migration>) -> Self {
        Self { tag, migration }
    }

    pub fn database(&self) -> &str {
        &self.tag.database
    }

    pub fn description(&self) -> Option<&str> {
        self.tag.description.as_deref()
    }
}

impl StepEdge for MigrationStep {
    fn down_version(&self) -> i64 {
        self.tag.down_version
    }

    fn up_version(&self) -> i64 {
        self.tag.up_version
    }
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep").field("tag", &self.tag).finish()
    }
}

/// Result of one database's migration run.
#[derive(Debug)]
pub struct MigrationResult {
    /// Alias of the logical database.
    pub database_alias: String,
    /// Physical store name.
    pub database_name: String,
    /// Version before the run (0 when nothing was applied yet).
    pub from_version: i64,
    /// Version reached by the run.
    pub final_version: i64,
    /// Direction of the executed path, if any step was planned.
    pub direction: Option<MigrationDirection>,
    /// Steps that were applied, as "from -> to: description".
    pub migrations_applied: Vec<String>,
    /// Why the run stopped early, if it did.
    pub error: Option<MigrationError>,
}

impl MigrationResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<i64, MigrationError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.final_version),
        }
    }
}
