//! Durable key-value storage private to one instance.
//!
//! The collection service only needs `get`/`put`/`delete` by key with
//! read-your-writes consistency. Values are whole JSON documents: a put
//! replaces the stored snapshot, it never patches it.

mod file;
mod memory;

pub use self::file::FileStorage;
pub use self::memory::MemoryStorage;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ApiError;

/// Storage failures. Always surfaced to the caller as a 500.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),

    #[error("storage io on `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt value under `{key}`: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

/// Get/put/delete by key, read-your-writes within one instance.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// The stored value, or `None` if the key was never written (or deleted).
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    async fn put(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;
}

/// Keys and scope segments become file names, so they are restricted to
/// `[A-Za-z0-9_-]`.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid { Ok(()) } else { Err(StorageError::InvalidKey(key.to_owned())) }
}

/// Hands out the private storage of one instance scope.
///
/// A scope is `(class, routing key)`: two namespaces may reuse a routing key
/// without sharing data. Memory scopes are kept for the life of the backend,
/// so an instance restarted after a crash sees what its predecessor wrote.
#[derive(Clone)]
pub struct StorageBackend {
    kind: BackendKind,
}

#[derive(Clone)]
enum BackendKind {
    Memory(Arc<Mutex<HashMap<(String, String), Arc<MemoryStorage>>>>),
    Directory(PathBuf),
}

impl StorageBackend {
    pub fn memory() -> Self {
        Self { kind: BackendKind::Memory(Arc::default()) }
    }

    /// One sub-directory per scope under `root`: `<root>/<class>/<name>/<key>.json`.
    pub fn directory(root: impl Into<PathBuf>) -> Self {
        Self { kind: BackendKind::Directory(root.into()) }
    }

    pub fn open(&self, class: &str, name: &str) -> Result<Arc<dyn Storage>, StorageError> {
        validate_key(class)?;
        validate_key(name)?;
        match &self.kind {
            BackendKind::Memory(scopes) => {
                let mut scopes = scopes.lock().unwrap_or_else(|p| p.into_inner());
                let storage = scopes
                    .entry((class.to_owned(), name.to_owned()))
                    .or_insert_with(|| Arc::new(MemoryStorage::new()));
                Ok(Arc::clone(storage) as Arc<dyn Storage>)
            }
            BackendKind::Directory(root) => {
                Ok(Arc::new(FileStorage::new(root.join(class).join(name))))
            }
        }
    }
}
