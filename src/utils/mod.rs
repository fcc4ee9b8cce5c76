mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

/// Default name of the collection holding version records
pub const DEFAULT_STATE_COLLECTION: &str = "_migrations";

/// Name of the index ordering version records by completion time
pub const COMPLETION_INDEX_NAME: &str = "OrderByCompletionIndex";

/// Default bound on how long a stopping orchestrator waits for in-flight runs
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 30_000;
