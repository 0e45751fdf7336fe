use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use crate::error::PersistenceError;
use crate::history::KeyValueStore;

#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let entries = self.entries
            .lock()
            .map_err(|e| PersistenceError::Backend(format!("memory store poisoned: {}", e)))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut entries = self.entries
            .lock()
            .map_err(|e| PersistenceError::Backend(format!("memory store poisoned: {}", e)))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
