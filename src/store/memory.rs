use super::types::{Documents, Filter, FindOptions, IndexSpec};
use super::{Collection, Document, StoreConnector, StoreError, StoreHandle};
use crate::config::LogicalDatabase;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-local document store.
///
/// Databases are keyed by (connection string, store name), so two logical
/// databases pointing at the same physical store share state.
#[derive(Debug, Default)]
pub struct MemoryStore {
    databases: Mutex<HashMap<(String, String), Arc<MemoryDatabase>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the database a logical database resolves to.
    pub fn database(&self, database: &LogicalDatabase) -> Arc<MemoryDatabase> {
        let key = (database.connection_string.clone(), database.name.clone());
        let mut databases = self.databases.lock();
        Arc::clone(
            databases
                .entry(key)
                .or_insert_with(|| Arc::new(MemoryDatabase::new(database.name.clone()))),
        )
    }
}

#[async_trait]
impl StoreConnector for MemoryStore {
    async fn connect(&self, database: &LogicalDatabase) -> Result<Arc<dyn StoreHandle>, StoreError> {
        Ok(self.database(database))
    }
}

#[derive(Debug)]
pub struct MemoryDatabase {
    name: String,
    collections: Mutex<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: Mutex::new(HashMap::new()),
        }
    }

    pub fn memory_collection(&self, name: &str) -> Arc<MemoryCollection> {
        let mut collections = self.collections.lock();
        Arc::clone(
            collections
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryCollection::new(name))),
        )
    }

    /// Total mutating calls across every collection of this database.
    pub fn write_count(&self) -> u64 {
        self.collections
            .lock()
            .values()
            .map(|c| c.write_count())
            .sum()
    }
}

#[async_trait]
impl StoreHandle for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collection(&self, name: &str) -> Result<Arc<dyn Collection>, StoreError> {
        Ok(self.memory_collection(name))
    }
}

#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    data: Mutex<Documents>,
    writes: AtomicU64,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Mutex::new(Documents::default()),
            writes: AtomicU64::new(0),
        }
    }

    /// Number of insert, update, and index-creation calls that changed state.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Copy of every document in natural order.
    pub fn snapshot(&self) -> Vec<Document> {
        self.data.lock().documents.clone()
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, document: Document) -> Result<(), StoreError> {
        self.data.lock().insert(document);
        self.record_write();
        Ok(())
    }

    async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<Document>, StoreError> {
        Ok(self.data.lock().find(filter, options))
    }

    async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        Ok(self.data.lock().count(filter))
    }

    async fn update_one(&self, filter: &Filter, fields: Document) -> Result<u64, StoreError> {
        let modified = self.data.lock().update_one(filter, fields);
        if modified > 0 {
            self.record_write();
        }
        Ok(modified)
    }

    async fn list_indexes(&self) -> Result<Vec<IndexSpec>, StoreError> {
        Ok(self.data.lock().indexes.clone())
    }

    async fn create_index_if_absent(&self, index: IndexSpec) -> Result<bool, StoreError> {
        let created = self.data.lock().create_index_if_absent(&self.name, index)?;
        if created {
            self.record_write();
        }
        Ok(created)
    }
}
