//! Completion notifications for migration runs.
//!
//! Callers that depend on a migrated database can wait for its run to
//! finish without holding a reference to the orchestrator. Aliases the
//! current run does not manage resolve immediately with `None`.

use crate::migration::MigrationError;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A logical database finished its migration run.
///
/// "Finished" is not "succeeded": a failed run still completes, carrying
/// the version it reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationCompleted {
    pub database_name: String,
    pub database_alias: String,
    pub version: i64,
}

#[derive(Default)]
struct NotifierState {
    /// `None` until the first `set_known_aliases`.
    known: Option<HashSet<String>>,
    completed: HashMap<String, MigrationCompleted>,
    waiters: HashMap<String, Vec<oneshot::Sender<MigrationCompleted>>>,
}

/// Where a wait stands once the lock is released.
enum Registration {
    Ready(Option<MigrationCompleted>),
    Pending(oneshot::Receiver<MigrationCompleted>),
}

#[derive(Default)]
pub struct CompletionNotifier {
    state: Mutex<NotifierState>,
}

impl CompletionNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of aliases callers may wait on and forget previous
    /// completions. Pending waiters on aliases that are no longer known
    /// resolve with `None`.
    pub fn set_known_aliases<I, S>(&self, aliases: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let known: HashSet<String> = aliases.into_iter().map(Into::into).collect();

        let mut state = self.state.lock();
        state.completed.clear();
        state.waiters.retain(|alias, _| known.contains(alias));
        debug!(count = known.len(), "Registered migration-managed aliases");
        state.known = Some(known);
    }

    /// Record that `event.database_alias` finished and wake everyone waiting on it.
    pub fn mark_completed(&self, event: MigrationCompleted) {
        let waiters = {
            let mut state = self.state.lock();
            let waiters = state
                .waiters
                .remove(&event.database_alias)
                .unwrap_or_default();
            state
                .completed
                .insert(event.database_alias.clone(), event.clone());
            waiters
        };

        debug!(
            alias = %event.database_alias,
            version = event.version,
            waiters = waiters.len(),
            "Migration completion published"
        );

        for waiter in waiters {
            // The receiver may have given up already.
            let _ = waiter.send(event.clone());
        }
    }

    /// Completion of `alias`, if it has already been recorded.
    pub fn completed(&self, alias: &str) -> Option<MigrationCompleted> {
        self.state.lock().completed.get(alias).cloned()
    }

    /// Whether `alias` is managed by the current run.
    pub fn is_known(&self, alias: &str) -> bool {
        self.state
            .lock()
            .known
            .as_ref()
            .is_some_and(|known| known.contains(alias))
    }

    fn register(&self, alias: &str) -> Registration {
        let mut state = self.state.lock();

        let managed = state
            .known
            .as_ref()
            .is_some_and(|known| known.contains(alias));
        if !managed {
            return Registration::Ready(None);
        }
        if let Some(done) = state.completed.get(alias) {
            return Registration::Ready(Some(done.clone()));
        }

        let (tx, rx) = oneshot::channel();
        let waiters = state.waiters.entry(alias.to_string()).or_default();
        // Drop waiters that gave up (cancelled or timed out).
        waiters.retain(|w| !w.is_closed());
        waiters.push(tx);
        Registration::Pending(rx)
    }

    #[cfg(test)]
    fn pending_waiters(&self, alias: &str) -> usize {
        self.state.lock().waiters.get(alias).map_or(0, Vec::len)
    }

    /// Wait until `alias` has finished migrating.
    ///
    /// Resolves immediately with `None` for aliases that are not managed,
    /// and immediately with the recorded event for aliases already done.
    /// Fails with `MigrationError::Cancelled` if `cancel` fires first.
    pub async fn wait(
        &self,
        alias: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<MigrationCompleted>, MigrationError> {
        let rx = match self.register(alias) {
            Registration::Ready(done) => return Ok(done),
            Registration::Pending(rx) => rx,
        };

        tokio::select! {
            received = rx => Ok(received.ok()),
            _ = cancel.cancelled() => Err(MigrationError::Cancelled {
                database: alias.to_string(),
            }),
        }
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    pub async fn wait_timeout(
        &self,
        alias: &str,
        timeout: Duration,
    ) -> Result<Option<MigrationCompleted>, MigrationError> {
        let cancel = CancellationToken::new();
        match tokio::time::timeout(timeout, self.wait(alias, &cancel)).await {
            Ok(result) => result,
            Err(_) => Err(MigrationError::Cancelled {
                database: alias.to_string(),
            }),
        }
    }
}
