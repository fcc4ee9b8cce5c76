//! Document-store abstraction used by the migration engine.
//!
//! The engine never talks to a driver directly. It needs a connector that
//! opens a logical database, and collections supporting insert, filtered
//! find with sorting, single-document update, and index management.
//!
//! Two implementations ship with the crate:
//! - [`MemoryStore`], process-local and used heavily by tests
//! - [`JsonFileConnector`], which persists each collection as a JSON file

mod file;
mod memory;
mod typed;
mod types;

pub use file::{JsonFileConnector, JsonFileStore};
pub use memory::{MemoryCollection, MemoryDatabase, MemoryStore};
pub use typed::TypedCollection;
pub use types::{Condition, Documents, Filter, FindOptions, IndexSpec, Sort, SortOrder};

use crate::config::LogicalDatabase;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// A stored document.
pub type Document = Map<String, Value>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Document is not a JSON object")]
    NotAnObject,

    #[error("Connection failed for {database}: {reason}")]
    Connection { database: String, reason: String },

    #[error("Index conflict on {collection}: {reason}")]
    IndexConflict { collection: String, reason: String },
}

/// Opens a handle on the physical store behind a logical database.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, database: &LogicalDatabase) -> Result<Arc<dyn StoreHandle>, StoreError>;
}

/// An open store (one physical database).
#[async_trait]
pub trait StoreHandle: Send + Sync {
    /// Physical database name.
    fn name(&self) -> &str;

    /// Get a collection, creating it lazily if the store supports that.
    async fn collection(&self, name: &str) -> Result<Arc<dyn Collection>, StoreError>;
}

/// The minimal collection surface the engine relies on.
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    async fn insert_one(&self, document: Document) -> Result<(), StoreError>;

    /// Documents matching `filter`, in natural order unless `options` sorts them.
    async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<Document>, StoreError>;

    async fn count(&self, filter: &Filter) -> Result<u64, StoreError>;

    /// Set `fields` on the first matching document. Returns the number of
    /// documents modified (0 or 1).
    async fn update_one(&self, filter: &Filter, fields: Document) -> Result<u64, StoreError>;

    async fn list_indexes(&self) -> Result<Vec<IndexSpec>, StoreError>;

    /// Create the index unless one with the same name exists.
    /// Returns true if the index was created by this call.
    async fn create_index_if_absent(&self, index: IndexSpec) -> Result<bool, StoreError>;
}

/// Convert a serde_json value into a document.
pub fn into_document(value: Value) -> Result<Document, StoreError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject),
    }
}
