//! JSON-file secondary snapshot tier.
//!
//! One `<key>.json` file per key under a flat directory. Plain files with no
//! database in the way, so this tier keeps working when the structured store
//! cannot even be opened. A write interrupted mid-flight leaves a payload
//! the codec rejects, which the load path treats as a miss.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::backend::StorageBackend;
use crate::error::{AutosaveError, AutosaveResult};

pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    /// Use `dir` as the keyspace root. The directory is created on the
    /// first write, so construction cannot fail.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> AutosaveResult<PathBuf> {
        // Keys must stay a single file-name component.
        if key.is_empty() || !key.chars().all(valid_key_char) {
            return Err(AutosaveError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

fn valid_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

#[async_trait]
impl StorageBackend for JsonFileBackend {
    fn name(&self) -> &'static str {
        "json-file"
    }

    async fn put(&self, key: &str, payload: &str) -> AutosaveResult<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, payload).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> AutosaveResult<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(payload) => Ok(Some(payload)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, key: &str) -> AutosaveResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
