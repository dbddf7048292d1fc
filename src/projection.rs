use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

/// A keyed read model owned by whoever builds the listeners writing to it.
///
/// Clones share the same data, so the store can be handed to a listener and still be queried by
/// the application.
pub struct ProjectionStore<V> {
    rows: Arc<RwLock<HashMap<String, V>>>,
}

impl<V> ProjectionStore<V> {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Inserts or replaces the row stored under `key`.
    pub async fn upsert(&self, key: impl Into<String>, value: V) {
        self.rows.write().await.insert(key.into(), value);
    }

    /// Updates the row stored under `key`, starting from a default row if there is none.
    pub async fn update<F>(&self, key: impl Into<String>, f: F)
    where
        V: Default,
        F: FnOnce(&mut V),
    {
        let mut rows = self.rows.write().await;
        f(rows.entry(key.into()).or_default());
    }

    pub async fn remove(&self, key: &str) -> Option<V> {
        self.rows.write().await.remove(key)
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Drops every row. Used before rebuilding the read model from the event log.
    pub async fn reset(&self) {
        self.rows.write().await.clear();
    }
}

impl<V: Clone> ProjectionStore<V> {
    pub async fn get(&self, key: &str) -> Option<V> {
        self.rows.read().await.get(key).cloned()
    }

    /// A copy of every row, sorted by key.
    pub async fn snapshot(&self) -> Vec<(String, V)> {
        let mut rows: Vec<(String, V)> = self
            .rows
            .read()
            .await
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        rows.sort_by(|(a, _), (b, _)| a.cmp(b));
        rows
    }
}

impl<V> Clone for ProjectionStore<V> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
        }
    }
}

impl<V> Default for ProjectionStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for ProjectionStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionStore").finish_non_exhaustive()
    }
}
