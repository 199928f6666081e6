//! The persistent-document interface exposed on the handler context.
//!
//! This is an interface-only component: a narrow trait plus a reference in-memory implementation
//! for local development and tests. A MongoDB-backed implementation is a drop-in behind the same
//! trait and lives outside this runtime.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no document at key '{0}'")]
    NotFound(String),
}

/// A handle to a collection of JSON documents, keyed by an opaque string id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<serde_json::Value>, Error>;
    async fn put(&self, collection: &str, key: &str, value: serde_json::Value) -> Result<(), Error>;
    async fn delete(&self, collection: &str, key: &str) -> Result<(), Error>;
}

/// An in-memory [`DocumentStore`]. Contents do not survive process restart.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, serde_json::Value>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<serde_json::Value>, Error> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|c| c.get(key)).cloned())
    }

    async fn put(&self, collection: &str, key: &str, value: serde_json::Value) -> Result<(), Error> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), Error> {
        let mut collections = self.collections.write().await;
        match collections.get_mut(collection).and_then(|c| c.remove(key)) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(key.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_then_get_round_trips_a_document() {
        let store = InMemoryStore::new();
        store.put("users", "u1", json!({"name": "ada"})).await.unwrap();

        let doc = store.get("users", "u1").await.unwrap();
        assert_eq!(doc, Some(json!({"name": "ada"})));
    }

    #[tokio::test]
    async fn get_on_a_missing_key_returns_none() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("users", "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_on_a_missing_key_errors() {
        let store = InMemoryStore::new();
        let err = store.delete("users", "missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
