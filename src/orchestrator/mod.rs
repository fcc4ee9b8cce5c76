//! Runs migrations for every registered logical database.
//!
//! Databases migrate concurrently and independently: one database failing
//! never blocks or fails another. Each finished run, successful or not, is
//! published through the [`CompletionNotifier`] so waiters are never left
//! hanging.

use crate::config::LogicalDatabase;
use crate::migration::{MigrationExecutor, MigrationResult, MigrationSource};
use crate::notifier::{CompletionNotifier, MigrationCompleted};
use crate::utils::DEFAULT_SHUTDOWN_TIMEOUT_MS;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct MigrationOrchestrator {
    source: Arc<dyn MigrationSource>,
    executor: Arc<MigrationExecutor>,
    notifier: Arc<CompletionNotifier>,
    shutdown_timeout: Duration,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<Vec<MigrationResult>>>>,
}

impl MigrationOrchestrator {
    pub fn new(
        source: Arc<dyn MigrationSource>,
        executor: Arc<MigrationExecutor>,
        notifier: Arc<CompletionNotifier>,
    ) -> Self {
        Self {
            source,
            executor,
            notifier,
            shutdown_timeout: Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn notifier(&self) -> Arc<CompletionNotifier> {
        Arc::clone(&self.notifier)
    }

    /// Token observed by every run started by this orchestrator.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Migrate every registered database and wait for all of them.
    ///
    /// Results are returned in registration order.
    pub async fn run_all(&self) -> Vec<MigrationResult> {
        let databases = self.source.databases();
        self.notifier
            .set_known_aliases(databases.iter().map(|d| d.alias.clone()));

        info!(count = databases.len(), "Starting migrations");

        let mut handles = Vec::with_capacity(databases.len());
        for database in databases {
            let steps = self.source.steps_for(&database.alias);
            let descriptor = database.clone();
            let executor = Arc::clone(&self.executor);
            let notifier = Arc::clone(&self.notifier);
            let cancel = self.cancel.child_token();

            let handle = tokio::spawn(async move {
                let result = executor.run(&database, &steps, &cancel).await;
                notifier.mark_completed(MigrationCompleted {
                    database_name: result.database_name.clone(),
                    database_alias: result.database_alias.clone(),
                    version: result.final_version,
                });
                result
            });
            handles.push((descriptor, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (database, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    // A panicking step body takes its task down before the
                    // completion is published; publish it here instead.
                    error!(database = %database.alias, error = %e, "Migration task aborted");
                    let version = self.recorded_version(&database).await;
                    self.notifier.mark_completed(MigrationCompleted {
                        database_name: database.name,
                        database_alias: database.alias,
                        version,
                    });
                }
            }
        }

        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(
            total = results.len(),
            failed,
            "Migrations finished"
        );
        results
    }

    /// Last durably completed version of `database`, or 0 if it cannot be read.
    async fn recorded_version(&self, database: &LogicalDatabase) -> i64 {
        match self.executor.current_version(database).await {
            Ok(version) => version.unwrap_or(0),
            Err(e) => {
                warn!(database = %database.alias, error = %e, "Could not read version after aborted run");
                0
            }
        }
    }

    /// Start `run_all` in the background. Does nothing if already started.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            warn!("Migration orchestrator already started");
            return;
        }

        let this = Arc::clone(self);
        *task = Some(tokio::spawn(async move { this.run_all().await }));
    }

    /// Request cancellation and wait, bounded by the shutdown timeout, for
    /// in-flight runs. Returns the results if the background run finished in
    /// time.
    pub async fn stop(&self) -> Option<Vec<MigrationResult>> {
        self.cancel.cancel();

        let handle = self.task.lock().take()?;
        match tokio::time::timeout(self.shutdown_timeout, handle).await {
            Ok(Ok(results)) => {
                info!("Migration orchestrator stopped");
                Some(results)
            }
            Ok(Err(e)) => {
                error!(error = %e, "Migration orchestrator task failed");
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.shutdown_timeout.as_millis() as u64,
                    "Timed out waiting for migrations to stop"
                );
                None
            }
        }
    }
}
