use super::types::{Filter, FindOptions, IndexSpec};
use super::{into_document, Collection, Document, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Typed view over a document collection, (de)serializing through serde.
pub struct TypedCollection<T> {
    inner: Arc<dyn Collection>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedCollection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _marker: PhantomData,
        }
    }
}

impl<T> TypedCollection<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(inner: Arc<dyn Collection>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn raw(&self) -> &Arc<dyn Collection> {
        &self.inner
    }

    pub async fn insert_one(&self, item: &T) -> Result<(), StoreError> {
        let document = into_document(serde_json::to_value(item)?)?;
        self.inner.insert_one(document).await
    }

    pub async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<T>, StoreError> {
        self.inner
            .find(filter, options)
            .await?
            .into_iter()
            .map(|d| serde_json::from_value(serde_json::Value::Object(d)).map_err(StoreError::from))
            .collect()
    }

    pub async fn find_first(&self, filter: &Filter, options: &FindOptions) -> Result<Option<T>, StoreError> {
        let options = options.clone().limit(1);
        Ok(self.find(filter, &options).await?.into_iter().next())
    }

    pub async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        self.inner.count(filter).await
    }

    pub async fn update_one(&self, filter: &Filter, fields: Document) -> Result<u64, StoreError> {
        self.inner.update_one(filter, fields).await
    }

    pub async fn list_indexes(&self) -> Result<Vec<IndexSpec>, StoreError> {
        self.inner.list_indexes().await
    }

    pub async fn create_index_if_absent(&self, index: IndexSpec) -> Result<bool, StoreError> {
        self.inner.create_index_if_absent(index).await
    }
}
