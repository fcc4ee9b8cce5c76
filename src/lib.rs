pub mod config;
pub mod migration;
pub mod notifier;
pub mod orchestrator;
pub mod state;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::{read_config, ConfigError, LogicalDatabase, MigrationConfig};
pub use migration::{
    resolve_path, Migration, MigrationDirection, MigrationError, MigrationExecutor,
    MigrationRegistry, MigrationResult, MigrationSource, MigrationStep, PathError, PathProblem,
    ResolvedPath, StepEdge, StepTag,
};
pub use notifier::{CompletionNotifier, MigrationCompleted};
pub use orchestrator::MigrationOrchestrator;
pub use state::{RecordHandle, StateError, StateSnapshot, StateStore, VersionRecord};
pub use store::{
    Collection, Filter, FindOptions, JsonFileConnector, MemoryStore, StoreConnector, StoreError,
    StoreHandle,
};
pub use utils::{Clock, ManualClock, SystemClock};
