#![allow(dead_code)]

use anyhow::bail;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use docstore_migrate::store::into_document;
use docstore_migrate::{
    Collection, LogicalDatabase, ManualClock, Migration, MigrationStep, StepTag, StoreHandle,
};
use serde_json::json;
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared log of step invocations, e.g. "up 0->20" or "down 40->20".
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().clone()
}

/// Step body that records each call and writes a marker document.
pub struct RecordingMigration {
    name: String,
    log: CallLog,
    fail_up: bool,
    fail_down: bool,
}

impl RecordingMigration {
    pub fn new(name: impl Into<String>, log: CallLog) -> Self {
        Self {
            name: name.into(),
            log,
            fail_up: false,
            fail_down: false,
        }
    }

    pub fn failing_up(mut self) -> Self {
        self.fail_up = true;
        self
    }

    pub fn failing_down(mut self) -> Self {
        self.fail_down = true;
        self
    }

    async fn apply(&self, direction: &str, store: &dyn StoreHandle, fail: bool) -> anyhow::Result<()> {
        self.log
            .lock()
            .push(format!("{} {}", direction, self.name));

        if fail {
            bail!("{} {} exploded", direction, self.name);
        }

        let changes = store.collection("changes").await?;
        changes
            .insert_one(into_document(json!({"step": self.name, "direction": direction}))?)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Migration for RecordingMigration {
    async fn up(&self, store: &dyn StoreHandle) -> anyhow::Result<()> {
        self.apply("up", store, self.fail_up).await
    }

    async fn down(&self, store: &dyn StoreHandle) -> anyhow::Result<()> {
        self.apply("down", store, self.fail_down).await
    }
}

/// Build recording steps for `alias`, one per (down, up) pair, in order.
pub fn steps(alias: &str, edges: &[(i64, i64)], log: &CallLog) -> Vec<MigrationStep> {
    edges
        .iter()
        .map(|&(down, up)| step(alias, down, up, log))
        .collect()
}

pub fn step(alias: &str, down: i64, up: i64, log: &CallLog) -> MigrationStep {
    MigrationStep::new(
        StepTag::new(alias, down, up).with_description(format!("step {}->{}", down, up)),
        Arc::new(RecordingMigration::new(format!("{}->{}", down, up), log.clone())),
    )
}

pub fn failing_step(alias: &str, down: i64, up: i64, log: &CallLog) -> MigrationStep {
    MigrationStep::new(
        StepTag::new(alias, down, up),
        Arc::new(RecordingMigration::new(format!("{}->{}", down, up), log.clone()).failing_up()),
    )
}

pub fn database(alias: &str) -> LogicalDatabase {
    LogicalDatabase::new(alias, format!("{}_store", alias))
}

/// Clock starting at 2024-01-01 and advancing one second per reading.
pub fn ticking_clock() -> Arc<ManualClock> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    Arc::new(ManualClock::ticking(start, Duration::seconds(1)))
}

/// The branching graph used throughout the tests.
pub const BRANCHING: &[(i64, i64)] = &[
    (0, 10),
    (0, 20),
    (15, 50),
    (20, 40),
    (40, 50),
    (50, 60),
    (50, 80),
    (60, 90),
    (80, 90),
];
