//! Migration executor for running migrations.

use super::resolver::resolve_path;
use super::types::{Migration, MigrationDirection, MigrationError, MigrationResult, MigrationStep};
use crate::config::LogicalDatabase;
use crate::state::{StateError, StateStore};
use crate::store::{StoreConnector, StoreError, StoreHandle};
use crate::utils::{Clock, SystemClock};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Executor for running migrations.
///
/// The executor brings one logical database to its target version: it
/// reads the persisted state, resolves the path, and applies each step in
/// sequence with a durable marker written before and after the step body.
pub struct MigrationExecutor {
    connector: Arc<dyn StoreConnector>,
    clock: Arc<dyn Clock>,
}

/// What a run has achieved so far; survives early exits.
struct Progress {
    from_version: i64,
    version: i64,
    direction: Option<MigrationDirection>,
    applied: Vec<String>,
}

impl MigrationExecutor {
    /// Create a new executor with the given store connector and clock.
    pub fn new(connector: Arc<dyn StoreConnector>, clock: Arc<dyn Clock>) -> Self {
        Self { connector, clock }
    }

    pub fn with_system_clock(connector: Arc<dyn StoreConnector>) -> Self {
        Self::new(connector, Arc::new(SystemClock))
    }

    /// Migrate `database` using the given steps.
    ///
    /// This method:
    /// 1. Reads the persisted state and refuses to continue over an
    ///    incomplete record left by an earlier run
    /// 2. Resolves the shortest path to the fixed target, or to the highest
    ///    available version when no target is configured
    /// 3. Applies each step in order, recording it before and after
    /// 4. Stops at the first failing step, leaving its record incomplete
    ///
    /// The result always carries the version actually reached, even when the
    /// run fails.
    pub async fn run(
        &self,
        database: &LogicalDatabase,
        steps: &[MigrationStep],
        cancel: &CancellationToken,
    ) -> MigrationResult {
        let mut progress = Progress {
            from_version: 0,
            version: 0,
            direction: None,
            applied: Vec::new(),
        };

        let outcome = self.execute(database, steps, cancel, &mut progress).await;

        match &outcome {
            Ok(()) => info!(
                database = %database.alias,
                from = progress.from_version,
                to = progress.version,
                count = progress.applied.len(),
                "Migration completed successfully"
            ),
            Err(MigrationError::Cancelled { .. }) => warn!(
                database = %database.alias,
                version = progress.version,
                "Migration cancelled"
            ),
            Err(e) => error!(
                database = %database.alias,
                version = progress.version,
                error = %e,
                "Migration failed"
            ),
        }

        MigrationResult {
            database_alias: database.alias.clone(),
            database_name: database.name.clone(),
            from_version: progress.from_version,
            final_version: progress.version,
            direction: progress.direction,
            migrations_applied: progress.applied,
            error: outcome.err(),
        }
    }

    /// Version `database` is at according to its state collection, without
    /// preparing or writing anything. `None` if nothing has been applied.
    pub async fn current_version(&self, database: &LogicalDatabase) -> Result<Option<i64>, MigrationError> {
        let alias = database.alias.as_str();
        let store_err = |source: StoreError| MigrationError::Store {
            database: alias.to_string(),
            source,
        };

        let handle = self.connector.connect(database).await.map_err(store_err)?;
        let collection = handle
            .collection(&database.migration_state_collection_name)
            .await
            .map_err(store_err)?;

        let state = StateStore::new(alias, collection, Arc::clone(&self.clock));
        let snapshot = state.snapshot().await.map_err(|source| MigrationError::State {
            database: alias.to_string(),
            source,
        })?;
        Ok(snapshot.current_version())
    }

    async fn execute(
        &self,
        database: &LogicalDatabase,
        steps: &[MigrationStep],
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<(), MigrationError> {
        let alias = database.alias.as_str();
        let store_err = |source: StoreError| MigrationError::Store {
            database: alias.to_string(),
            source,
        };
        let state_err = |source: StateError| MigrationError::State {
            database: alias.to_string(),
            source,
        };

        let handle = until_cancelled(cancel, alias, self.connector.connect(database))
            .await?
            .map_err(store_err)?;
        let collection = until_cancelled(
            cancel,
            alias,
            handle.collection(&database.migration_state_collection_name),
        )
        .await?
        .map_err(store_err)?;

        let state = StateStore::new(alias, collection, Arc::clone(&self.clock));
        until_cancelled(cancel, alias, state.ensure_prepared())
            .await?
            .map_err(state_err)?;

        let snapshot = until_cancelled(cancel, alias, state.snapshot())
            .await?
            .map_err(state_err)?;
        let current = snapshot.current_version();
        progress.from_version = current.unwrap_or(0);
        progress.version = progress.from_version;

        if snapshot.is_corrupt() {
            error!(
                database = %alias,
                versions = ?snapshot.incomplete_versions,
                "Found incomplete migrations from an earlier run"
            );
            return Err(MigrationError::CorruptState {
                database: alias.to_string(),
                versions: snapshot.incomplete_versions,
            });
        }

        let own_steps: Vec<MigrationStep> = steps
            .iter()
            .filter(|s| {
                let matches = s.database() == alias;
                if !matches {
                    warn!(database = %alias, step = %s.tag, "Ignoring step tagged for another database");
                }
                matches
            })
            .cloned()
            .collect();

        let path = resolve_path(&own_steps, current, database.fixed_target_version).map_err(
            |source| MigrationError::PathResolution {
                database: alias.to_string(),
                source,
            },
        )?;

        if path.is_empty() {
            info!(database = %alias, version = progress.version, "No migrations needed, already at target version");
            return Ok(());
        }

        let direction = path.direction;
        progress.direction = Some(direction);
        info!(
            database = %alias,
            from = path.from,
            to = path.to,
            %direction,
            count = path.steps.len(),
            "Starting migration"
        );

        for step in &path.steps {
            if cancel.is_cancelled() {
                return Err(MigrationError::Cancelled {
                    database: alias.to_string(),
                });
            }

            let from = progress.version;
            let to = match direction {
                MigrationDirection::Up => step.tag.up_version,
                MigrationDirection::Down => step.tag.down_version,
            };
            let label = step_label(from, to, step.description());

            let record = state.begin_step(to, direction).await.map_err(state_err)?;
            info!(database = %alias, migration = %label, %direction, "Applying migration");

            let applied = match direction {
                MigrationDirection::Up => step.migration.up(handle.as_ref()).await,
                MigrationDirection::Down => step.migration.down(handle.as_ref()).await,
            };

            if let Err(e) = applied {
                error!(database = %alias, migration = %label, error = %e, "Migration step failed");
                return Err(MigrationError::StepExecution {
                    database: alias.to_string(),
                    from,
                    to,
                    description: step.tag.description.clone(),
                    source: e.into(),
                });
            }

            state.complete_step(&record).await.map_err(state_err)?;
            progress.version = to;
            progress.applied.push(label);
        }

        Ok(())
    }
}

fn step_label(from: i64, to: i64, description: Option<&str>) -> String {
    match description {
        Some(d) => format!("{} -> {}: {}", from, to, d),
        None => format!("{} -> {}", from, to),
    }
}

/// Run `future` unless `cancel` fires first.
async fn until_cancelled<F>(
    cancel: &CancellationToken,
    alias: &str,
    future: F,
) -> Result<F::Output, MigrationError>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MigrationError::Cancelled {
            database: alias.to_string(),
        }),
        output = future => Ok(output),
    }
}
