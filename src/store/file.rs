use super::types::{Documents, Filter, FindOptions, IndexSpec};
use super::{Collection, Document, StoreConnector, StoreError, StoreHandle};
use crate::config::LogicalDatabase;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

const FILE_SCHEME: &str = "file://";

/// Connector for the JSON-file store.
///
/// A logical database's connection string names a directory (optionally
/// `file://`-prefixed); an empty connection string falls back to the
/// connector's default root. Each collection is stored at
/// `<root>/<database name>/<collection>.json`.
#[derive(Debug)]
pub struct JsonFileConnector {
    default_root: PathBuf,
    stores: Mutex<HashMap<PathBuf, Arc<JsonFileStore>>>,
}

impl JsonFileConnector {
    pub fn new(default_root: impl Into<PathBuf>) -> Self {
        Self {
            default_root: default_root.into(),
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding the collections of `database`.
    pub fn database_dir(&self, database: &LogicalDatabase) -> PathBuf {
        let root = database.connection_string.trim();
        let root = root.strip_prefix(FILE_SCHEME).unwrap_or(root);
        let root = if root.is_empty() {
            self.default_root.clone()
        } else {
            PathBuf::from(root)
        };
        root.join(&database.name)
    }

    /// Open `database` only if its directory already exists. Never creates
    /// anything on disk.
    pub async fn open_existing(
        &self,
        database: &LogicalDatabase,
    ) -> Result<Option<Arc<dyn StoreHandle>>, StoreError> {
        let dir = self.database_dir(database);
        if !fs::try_exists(&dir).await? {
            return Ok(None);
        }
        Ok(Some(self.store_for(database, dir)))
    }

    fn store_for(&self, database: &LogicalDatabase, dir: PathBuf) -> Arc<dyn StoreHandle> {
        let mut stores = self.stores.lock();
        let store = stores
            .entry(dir.clone())
            .or_insert_with(|| Arc::new(JsonFileStore::new(database.name.clone(), dir)));
        Arc::clone(store) as Arc<dyn StoreHandle>
    }
}

#[async_trait]
impl StoreConnector for JsonFileConnector {
    async fn connect(&self, database: &LogicalDatabase) -> Result<Arc<dyn StoreHandle>, StoreError> {
        let dir = self.database_dir(database);

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::Connection {
                database: database.alias.clone(),
                reason: format!("cannot create {}: {}", dir.display(), e),
            })?;

        Ok(self.store_for(database, dir))
    }
}

/// One database directory.
#[derive(Debug)]
pub struct JsonFileStore {
    name: String,
    dir: PathBuf,
    collections: Mutex<HashMap<String, Arc<JsonFileCollection>>>,
}

impl JsonFileStore {
    pub fn new(name: impl Into<String>, dir: PathBuf) -> Self {
        Self {
            name: name.into(),
            dir,
            collections: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl StoreHandle for JsonFileStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collection(&self, name: &str) -> Result<Arc<dyn Collection>, StoreError> {
        let mut collections = self.collections.lock();
        let collection = collections.entry(name.to_string()).or_insert_with(|| {
            Arc::new(JsonFileCollection::new(
                name,
                self.dir.join(format!("{}.json", name)),
            ))
        });
        Ok(Arc::clone(collection) as Arc<dyn Collection>)
    }
}

/// A collection persisted as a single JSON file.
///
/// Every operation re-reads the file under the collection lock; mutations
/// are written atomically via temp file + rename.
#[derive(Debug)]
struct JsonFileCollection {
    name: String,
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonFileCollection {
    fn new(name: &str, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            path,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Documents, StoreError> {
        if !self.path.exists() {
            return Ok(Documents::default());
        }

        let content = fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn save(&self, documents: &Documents) -> Result<(), StoreError> {
        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(documents)?;
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &self.path).await?;

        debug!(collection = %self.name, path = %self.path.display(), "Saved collection");
        Ok(())
    }
}

#[async_trait]
impl Collection for JsonFileCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, document: Document) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut documents = self.load().await?;
        documents.insert(document);
        self.save(&documents).await
    }

    async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<Document>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.find(filter, options))
    }

    async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.count(filter))
    }

    async fn update_one(&self, filter: &Filter, fields: Document) -> Result<u64, StoreError> {
        let _guard = self.lock.lock().await;
        let mut documents = self.load().await?;
        let modified = documents.update_one(filter, fields);
        if modified > 0 {
            self.save(&documents).await?;
        }
        Ok(modified)
    }

    async fn list_indexes(&self) -> Result<Vec<IndexSpec>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.indexes)
    }

    async fn create_index_if_absent(&self, index: IndexSpec) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut documents = self.load().await?;
        let created = documents.create_index_if_absent(&self.name, index)?;
        if created {
            self.save(&documents).await?;
        }
        Ok(created)
    }
}
