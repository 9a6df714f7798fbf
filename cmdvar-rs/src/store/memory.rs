//! In-memory variable store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{check_path, Store};
use crate::error::StoreError;
use crate::value::Value;

/// Process-local [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    vars: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from existing entries (already in persisted form).
    pub fn with_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        let vars = entries
            .into_iter()
            .map(|(k, v)| (k, v.into_persisted()))
            .collect();
        Self {
            vars: RwLock::new(vars),
        }
    }

    /// Copy of every entry.
    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.vars.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.vars.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.vars.read().await.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        check_path(path)?;
        Ok(self.vars.read().await.get(path).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        check_path(path)?;
        self.vars
            .write()
            .await
            .insert(path.to_owned(), value.into_persisted());
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        check_path(path)?;
        self.vars.write().await.remove(path);
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_get() {
        let store = MemoryStore::new();
        store.set("variables/wrap", Value::Number(1.0)).await.unwrap();
        assert_eq!(
            store.get("variables/wrap").await.unwrap(),
            Some(Value::Number(1.0))
        );
    }

    #[tokio::test]
    async fn overwrite() {
        let store = MemoryStore::new();
        store.set("x", "old".into()).await.unwrap();
        store.set("x", "new".into()).await.unwrap();
        assert_eq!(store.get("x").await.unwrap(), Some("new".into()));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn sets_persist_as_sequences() {
        let store = MemoryStore::new();
        store
            .set("s", Value::UniqueSet(vec!["a".into(), "b".into(), "a".into()]))
            .await
            .unwrap();
        assert_eq!(
            store.get("s").await.unwrap(),
            Some(Value::Sequence(vec!["a".into(), "b".into()]))
        );
    }

    #[tokio::test]
    async fn remove() {
        let store = MemoryStore::new();
        store.set("gone", "bye".into()).await.unwrap();
        store.remove("gone").await.unwrap();
        assert_eq!(store.get("gone").await.unwrap(), None);
        store.remove("gone").await.unwrap(); // already gone
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn rejects_empty_path() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get("").await,
            Err(StoreError::InvalidPath(_))
        ));
    }
}
