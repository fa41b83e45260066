use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::NamedTempFile;

use super::{Storage, StorageError, validate_key};

/// One JSON file per key inside a scope directory.
///
/// A put serialises the whole value into a temp file in the same directory,
/// fsyncs it and renames it over `<key>.json`. Readers see either the old
/// snapshot or the new one, never a torn write.
///
/// The directory is created by the first put; until then every key reads
/// as absent.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `dir`. Touches nothing on disk.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

fn io_error(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io { key: key.to_owned(), source }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(key)(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StorageError::Corrupt { key: key.to_owned(), source })
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let bytes = serde_json::to_vec(&value)
            .map_err(|source| StorageError::Corrupt { key: key.to_owned(), source })?;
        let dir = self.dir.clone();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| io_error(key)(std::io::Error::other(e)))?
        .map_err(io_error(key))
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(key)(e)),
        }
    }
}
