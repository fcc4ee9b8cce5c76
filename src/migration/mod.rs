//! Migration system: step model, registry, path resolution, and execution.
//!
//! # Overview
//!
//! - Each step is an edge in a graph of versions, tagged with its database
//!   alias and its down/up versions; its body implements the `Migration`
//!   trait with `up()` and `down()`
//! - Steps are registered in a `MigrationRegistry`, which preserves order
//! - `resolve_path` finds the path with the fewest steps between versions,
//!   upgrading or downgrading
//! - The `MigrationExecutor` applies the path one step at a time, recording
//!   each step durably before and after it runs
//! - A failed step is never rolled back automatically: its record stays
//!   incomplete and later runs refuse to proceed until it is resolved
//!
//! # Usage
//!
//! ```ignore
//! let mut registry = MigrationRegistry::from_config(&config);
//! registry.register_migration(StepTag::new("main", 0, 1), Arc::new(CreateUsers));
//! let executor = MigrationExecutor::with_system_clock(Arc::new(MemoryStore::new()));
//! let result = executor.run(&database, &registry.steps_for("main"), &cancel).await;
//! ```

mod executor;
mod registry;
mod resolver;
mod types;

pub use executor::MigrationExecutor;
pub use registry::{MigrationRegistry, MigrationSource};
pub use resolver::{resolve_path, ResolvedPath};
pub use types::{
    Migration, MigrationDirection, MigrationError, MigrationResult, MigrationStep, PathError,
    PathProblem, StepEdge, StepTag,
};
