//! Durable record of applied and in-flight migration steps.
//!
//! Each logical database keeps its version records in its own collection.
//! A record is inserted with no completion time before a step runs and is
//! completed afterwards; a record that was never completed marks a run that
//! crashed or failed mid-step.

mod tracking;
mod types;

pub use tracking::StateStore;
pub use types::{RecordHandle, StateSnapshot, VersionRecord};

use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Version record not found: {0}")]
    RecordNotFound(String),
}
