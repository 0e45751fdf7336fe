mod file;
mod memory;
mod redis;

use async_trait::async_trait;
use log::{ error, info, warn };
use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;
use crate::cli::Args;
use crate::error::PersistenceError;
use crate::models::chat::ConversationList;

pub use self::file::FileKeyValueStore;
pub use self::memory::MemoryKeyValueStore;
pub use self::redis::RedisKeyValueStore;

pub const DEFAULT_HISTORY_KEY: &str = "claude-chats";

/// String-keyed, string-valued storage. A `set` replaces the whole value at once.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// The durable conversation list, kept as one JSON document under a fixed key.
#[derive(Clone)]
pub struct ConversationStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
}

impl ConversationStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self { backend, key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Reads the stored list. Later entries that repeat an earlier id are dropped.
    pub async fn try_load(&self) -> Result<ConversationList, PersistenceError> {
        let Some(raw) = self.backend.get(&self.key).await? else {
            return Ok(Vec::new());
        };
        let mut list: ConversationList = serde_json::from_str(&raw)?;
        let mut seen = HashSet::new();
        list.retain(|c| {
            let first = seen.insert(c.id.clone());
            if !first {
                warn!("Dropping duplicate conversation {} from '{}'", c.id, self.key);
            }
            first
        });
        Ok(list)
    }

    /// Loads the stored list, falling back to an empty one when it cannot be read.
    pub async fn load(&self) -> ConversationList {
        match self.try_load().await {
            Ok(list) => list,
            Err(e) => {
                error!("Failed to load conversations from '{}': {}", self.key, e);
                Vec::new()
            }
        }
    }

    pub async fn save(&self, list: &ConversationList) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(list)?;
        self.backend.set(&self.key, &json).await
    }
}

pub fn create_history_store(
    args: &Args
) -> Result<Arc<dyn KeyValueStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "file" => Ok(Arc::new(FileKeyValueStore::new(&args.history_dir))),
        "memory" => Ok(Arc::new(MemoryKeyValueStore::new())),
        "redis" => {
            let store = RedisKeyValueStore::new(&args.history_host, &args.history_redis_prefix)?;
            Ok(Arc::new(store))
        }
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported history store type: {}", args.history_type)
                    )
                )
            ),
    }
}

pub fn initialize_history_store(
    args: &Args
) -> Result<ConversationStore, Box<dyn Error + Send + Sync>> {
    let location = match args.history_type.to_lowercase().as_str() {
        "file" => args.history_dir.clone(),
        "redis" => args.history_host.clone(),
        _ => "process memory".to_string(),
    };
    info!("Conversations will be stored in: {} at {}", args.history_type, location);
    let backend = create_history_store(args)?;
    Ok(ConversationStore::new(backend, args.history_key.clone()))
}
