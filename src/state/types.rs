use crate::migration::MigrationDirection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub(crate) const FIELD_ID: &str = "id";
pub(crate) const FIELD_DATABASE: &str = "database";
pub(crate) const FIELD_COMPLETED_AT: &str = "completedAt";

/// One applied or in-flight migration step.
///
/// Timestamps are stored as microseconds since the epoch so that stores
/// order them chronologically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub id: String,
    /// Alias of the logical database
    pub database: String,
    /// Version the step moves the database to
    pub version: i64,
    pub direction: MigrationDirection,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub started_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_microseconds_option")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl VersionRecord {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Handle returned by `begin_step`, used to complete the record later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHandle {
    pub id: String,
    pub version: i64,
    pub direction: MigrationDirection,
}

/// Migration state of one logical database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    /// Number of completed records
    pub applied_count: u64,
    pub earliest_completed: Option<VersionRecord>,
    pub most_recent_completed: Option<VersionRecord>,
    /// Versions of records that were started but never completed
    pub incomplete_versions: Vec<i64>,
}

impl StateSnapshot {
    /// Version of the most recently completed record, if any.
    pub fn current_version(&self) -> Option<i64> {
        self.most_recent_completed.as_ref().map(|r| r.version)
    }

    pub fn is_corrupt(&self) -> bool {
        !self.incomplete_versions.is_empty()
    }
}
