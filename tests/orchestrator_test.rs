mod common;

use async_trait::async_trait;
use common::{calls, database, failing_step, new_log, step, steps, ticking_clock, BRANCHING};
use docstore_migrate::{
    CompletionNotifier, MemoryStore, Migration, MigrationCompleted, MigrationError,
    MigrationExecutor, MigrationOrchestrator, MigrationRegistry, MigrationStep, StepTag,
    StoreHandle,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct SlowMigration;

#[async_trait]
impl Migration for SlowMigration {
    async fn up(&self, _store: &dyn StoreHandle) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }

    async fn down(&self, _store: &dyn StoreHandle) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }
}

struct PanickingMigration;

#[async_trait]
impl Migration for PanickingMigration {
    async fn up(&self, _store: &dyn StoreHandle) -> anyhow::Result<()> {
        panic!("step body panicked");
    }

    async fn down(&self, _store: &dyn StoreHandle) -> anyhow::Result<()> {
        Ok(())
    }
}

fn orchestrator(registry: MigrationRegistry, store: &Arc<MemoryStore>) -> MigrationOrchestrator {
    MigrationOrchestrator::new(
        Arc::new(registry),
        Arc::new(MigrationExecutor::new(store.clone(), ticking_clock())),
        Arc::new(CompletionNotifier::new()),
    )
}

#[tokio::test]
async fn test_runs_every_database_in_registration_order() {
    let store = Arc::new(MemoryStore::new());
    let log = new_log();
    let mut registry = MigrationRegistry::new();
    registry.register_database(database("main"));
    registry.register_database(database("audit"));
    for s in steps("main", BRANCHING, &log) {
        registry.register(s);
    }
    for s in steps("audit", &[(0, 1), (1, 2)], &log) {
        registry.register(s);
    }

    let orchestrator = orchestrator(registry, &store);
    let results = orchestrator.run_all().await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].database_alias, "main");
    assert_eq!(results[0].final_version, 90);
    assert_eq!(results[1].database_alias, "audit");
    assert_eq!(results[1].final_version, 2);
    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(calls(&log).len(), 7);

    let notifier = orchestrator.notifier();
    assert_eq!(notifier.completed("audit").map(|c| c.version), Some(2));
    assert_eq!(
        notifier.completed("main"),
        Some(MigrationCompleted {
            database_name: "main_store".to_string(),
            database_alias: "main".to_string(),
            version: 90,
        })
    );
}

#[tokio::test]
async fn test_failing_database_does_not_affect_others() {
    let store = Arc::new(MemoryStore::new());
    let log = new_log();
    let mut registry = MigrationRegistry::new();
    registry.register_database(database("broken"));
    registry.register_database(database("main"));
    registry.register(step("broken", 0, 1, &log));
    registry.register(failing_step("broken", 1, 2, &log));
    for s in steps("main", &[(0, 10), (10, 20)], &log) {
        registry.register(s);
    }

    let orchestrator = orchestrator(registry, &store);
    let notifier = orchestrator.notifier();
    let results = orchestrator.run_all().await;

    assert_eq!(results[0].final_version, 1);
    assert!(matches!(
        results[0].error,
        Some(MigrationError::StepExecution { .. })
    ));
    assert!(results[1].is_success());
    assert_eq!(results[1].final_version, 20);

    // A failed run still completes, carrying the version it reached.
    assert_eq!(notifier.completed("broken").map(|c| c.version), Some(1));
    assert_eq!(notifier.completed("main").map(|c| c.version), Some(20));
}

#[tokio::test]
async fn test_waiters_receive_completion() {
    let store = Arc::new(MemoryStore::new());
    let log = new_log();
    let mut registry = MigrationRegistry::new();
    registry.register_database(database("main"));
    for s in steps("main", &[(0, 5)], &log) {
        registry.register(s);
    }

    let orchestrator = orchestrator(registry, &store);
    let notifier = orchestrator.notifier();
    notifier.set_known_aliases(["main"]);

    let mut waiters = Vec::new();
    for _ in 0..2 {
        let notifier = Arc::clone(&notifier);
        waiters.push(tokio::spawn(async move {
            notifier.wait("main", &CancellationToken::new()).await
        }));
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    orchestrator.run_all().await;

    for waiter in waiters {
        let completed = waiter.await.unwrap().unwrap();
        assert_eq!(completed.map(|c| c.version), Some(5));
    }

    let unmanaged = notifier
        .wait("elsewhere", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(unmanaged, None);
}

#[tokio::test]
async fn test_panicking_step_still_publishes_completion() {
    let store = Arc::new(MemoryStore::new());
    let log = new_log();
    let mut registry = MigrationRegistry::new();
    registry.register_database(database("main"));
    registry.register_database(database("audit"));
    registry.register(step("main", 0, 1, &log));
    registry.register(MigrationStep::new(
        StepTag::new("main", 1, 2),
        Arc::new(PanickingMigration),
    ));
    registry.register(step("audit", 0, 3, &log));

    let orchestrator = orchestrator(registry, &store);
    let notifier = orchestrator.notifier();
    let results = orchestrator.run_all().await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].database_alias, "audit");
    assert_eq!(notifier.completed("audit").map(|c| c.version), Some(3));

    // The step before the panic completed durably; that is what gets published.
    assert_eq!(notifier.completed("main").map(|c| c.version), Some(1));
}

#[tokio::test]
async fn test_panic_before_any_step_publishes_zero() {
    let store = Arc::new(MemoryStore::new());
    let mut registry = MigrationRegistry::new();
    registry.register_database(database("main"));
    registry.register(MigrationStep::new(
        StepTag::new("main", 0, 1),
        Arc::new(PanickingMigration),
    ));

    let orchestrator = orchestrator(registry, &store);
    let results = orchestrator.run_all().await;

    assert!(results.is_empty());
    assert_eq!(
        orchestrator.notifier().completed("main").map(|c| c.version),
        Some(0)
    );
}

#[tokio::test]
async fn test_start_then_stop_after_completion() {
    let store = Arc::new(MemoryStore::new());
    let log = new_log();
    let mut registry = MigrationRegistry::new();
    registry.register_database(database("main"));
    for s in steps("main", &[(0, 1), (1, 2)], &log) {
        registry.register(s);
    }

    let orchestrator = Arc::new(orchestrator(registry, &store));
    let notifier = orchestrator.notifier();
    notifier.set_known_aliases(["main"]);

    orchestrator.start();
    orchestrator.start();

    let completed = notifier
        .wait_timeout("main", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(completed.map(|c| c.version), Some(2));

    let results = orchestrator.stop().await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_success());
    assert_eq!(calls(&log).len(), 2);

    // Nothing left to stop.
    assert!(orchestrator.stop().await.is_none());
}

#[tokio::test]
async fn test_stop_cancels_in_flight_runs() {
    let store = Arc::new(MemoryStore::new());
    let mut registry = MigrationRegistry::new();
    registry.register_database(database("main"));
    for (down, up) in [(0, 10), (10, 20), (20, 30), (30, 40), (40, 50)] {
        registry.register(MigrationStep::new(
            StepTag::new("main", down, up),
            Arc::new(SlowMigration),
        ));
    }

    let orchestrator = Arc::new(
        orchestrator(registry, &store).with_shutdown_timeout(Duration::from_secs(5)),
    );
    orchestrator.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let results = orchestrator.stop().await.unwrap();

    assert_eq!(results.len(), 1);
    assert!(matches!(
        results[0].error,
        Some(MigrationError::Cancelled { .. })
    ));
    assert!(results[0].final_version < 50);
    assert!(orchestrator.cancellation_token().is_cancelled());

    // The cancelled run is still published.
    assert!(orchestrator.notifier().completed("main").is_some());
}
