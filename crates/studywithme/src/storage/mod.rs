//! Local storage - string key/value persistence surviving reloads
pub mod schema;
pub mod sqlite_store;
pub use sqlite_store::SqliteLocalStorage;
use dashmap::DashMap;
use std::sync::Arc;

pub const HISTORY_KEY: &str = "studywithme_history";
pub const STREAK_KEY: &str = "studywithme_streak";
pub const QUIZ_CACHE_KEY: &str = "studywithme_quiz_cache";

pub trait LocalStorage: Send + Sync {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove_item(&self, key: &str) -> anyhow::Result<()>;
}

/// Volatile storage; clones share the same map.
#[derive(Clone)]
pub struct InMemoryLocalStorage {
    store: Arc<DashMap<String, String>>,
}
impl InMemoryLocalStorage {
    pub fn new() -> Self {
        Self::default()
    }
}
impl Default for InMemoryLocalStorage {
    fn default() -> Self {
        Self {
            store: Arc::new(DashMap::new()),
        }
    }
}
impl LocalStorage for InMemoryLocalStorage {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.store.get(key).map(|v| v.clone()))
    }
    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.store.insert(key.to_string(), value.to_string());
        Ok(())
    }
    fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        self.store.remove(key);
        Ok(())
    }
}
