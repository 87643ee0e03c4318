use crate::errors::{LinkError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

/// Read access to delimited files kept in object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the full content of `key` in `bucket`.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}

/// Objects held in memory, keyed by (bucket, key).
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, key: &str, content: impl Into<Vec<u8>>) -> Result<()> {
        self.objects
            .lock()
            .map_err(|_| LinkError::Storage("object map lock poisoned".into()))?
            .insert((bucket.to_string(), key.to_string()), content.into());
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| LinkError::Storage("object map lock poisoned".into()))?;
        objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| LinkError::Storage(format!("s3://{bucket}/{key} does not exist")))
    }
}

/// Objects laid out on disk as `{root}/{bucket}/{key}`.
#[derive(Debug, Clone)]
pub struct DirObjectStore {
    root: PathBuf,
}

impl DirObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let relative = Path::new(bucket).join(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(LinkError::InvalidArg(format!(
                "object path '{bucket}/{key}' escapes the store root"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for DirObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(bucket, key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|err| LinkError::Storage(format!("reading {}: {err}", path.display())))
    }
}
