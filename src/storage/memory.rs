use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Storage, StorageError, validate_key};

/// In-process storage. Durable for the life of the process only.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        validate_key(key)?;
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StorageError> {
        validate_key(key)?;
        self.values.write().await.insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        validate_key(key)?;
        Ok(self.values.write().await.remove(key).is_some())
    }
}
