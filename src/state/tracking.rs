use super::types::{
    RecordHandle, StateSnapshot, VersionRecord, FIELD_COMPLETED_AT, FIELD_DATABASE, FIELD_ID,
};
use super::StateError;
use crate::migration::MigrationDirection;
use crate::store::{Collection, Document, Filter, FindOptions, IndexSpec, SortOrder, TypedCollection};
use crate::utils::{Clock, COMPLETION_INDEX_NAME};
use std::sync::Arc;
use tracing::{debug, info};

/// Version-record tracking for one logical database.
///
/// All reads and writes are scoped to the database alias, so several
/// logical databases may share one state collection.
pub struct StateStore {
    alias: String,
    records: TypedCollection<VersionRecord>,
    clock: Arc<dyn Clock>,
}

impl StateStore {
    pub fn new(alias: impl Into<String>, collection: Arc<dyn Collection>, clock: Arc<dyn Clock>) -> Self {
        Self {
            alias: alias.into(),
            records: TypedCollection::new(collection),
            clock,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    fn scope(&self) -> Filter {
        Filter::new().eq(FIELD_DATABASE, self.alias.as_str())
    }

    fn completion_index() -> IndexSpec {
        IndexSpec::new(COMPLETION_INDEX_NAME, FIELD_COMPLETED_AT, SortOrder::Descending)
    }

    /// Create the completion-order index if it is missing.
    ///
    /// Safe to call repeatedly and from concurrent runs. Returns true if
    /// this call created the index.
    pub async fn ensure_prepared(&self) -> Result<bool, StateError> {
        let indexes = self.records.list_indexes().await?;
        if indexes.iter().any(|i| i.name == COMPLETION_INDEX_NAME) {
            return Ok(false);
        }

        let created = self
            .records
            .create_index_if_absent(Self::completion_index())
            .await?;
        if created {
            info!(
                database = %self.alias,
                collection = %self.records.name(),
                index = COMPLETION_INDEX_NAME,
                "Created migration state index"
            );
        }
        Ok(created)
    }

    /// Read the current migration state.
    ///
    /// "Most recent" is the completed record with the latest completion
    /// time; among equal times the later-inserted record wins.
    pub async fn snapshot(&self) -> Result<StateSnapshot, StateError> {
        let completed = self.scope().not_null(FIELD_COMPLETED_AT);

        let applied_count = self.records.count(&completed).await?;

        let most_recent_completed = self
            .records
            .find_first(
                &completed,
                &FindOptions::new().sort_by_descending(FIELD_COMPLETED_AT),
            )
            .await?;

        let earliest_completed = self
            .records
            .find_first(&completed, &FindOptions::new().sort_by(FIELD_COMPLETED_AT))
            .await?;

        let incomplete_versions = self
            .records
            .find(&self.scope().is_null(FIELD_COMPLETED_AT), &FindOptions::new())
            .await?
            .into_iter()
            .map(|r| r.version)
            .collect();

        Ok(StateSnapshot {
            applied_count,
            earliest_completed,
            most_recent_completed,
            incomplete_versions,
        })
    }

    /// All records of this database in natural order.
    pub async fn records(&self) -> Result<Vec<VersionRecord>, StateError> {
        Ok(self.records.find(&self.scope(), &FindOptions::new()).await?)
    }

    /// Durably mark a step as started.
    pub async fn begin_step(
        &self,
        version: i64,
        direction: MigrationDirection,
    ) -> Result<RecordHandle, StateError> {
        let record = VersionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            database: self.alias.clone(),
            version,
            direction,
            started_at: self.clock.now(),
            completed_at: None,
        };

        self.records.insert_one(&record).await?;
        debug!(database = %self.alias, version, %direction, id = %record.id, "Began step");

        Ok(RecordHandle {
            id: record.id,
            version,
            direction,
        })
    }

    /// Durably mark a previously started step as completed.
    pub async fn complete_step(&self, handle: &RecordHandle) -> Result<(), StateError> {
        let completed_at = self.clock.now().timestamp_micros();

        let mut fields = Document::new();
        fields.insert(FIELD_COMPLETED_AT.to_string(), completed_at.into());

        let filter = self.scope().eq(FIELD_ID, handle.id.as_str());
        let modified = self.records.update_one(&filter, fields).await?;
        if modified == 0 {
            return Err(StateError::RecordNotFound(handle.id.clone()));
        }

        debug!(database = %self.alias, version = handle.version, id = %handle.id, "Completed step");
        Ok(())
    }
}
