/// Object storage behind the worker's file references
use crate::envelope::StorageRef;
use crate::error::StorageError;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Fetches job inputs and stores job outputs.
pub trait ObjectStore: Send + Sync {
    /// Copy the referenced object into `dest_dir`, returning the local path
    fn fetch(&self, reference: &StorageRef, dest_dir: &Path) -> Result<PathBuf, StorageError>;

    /// Store `bytes` under `key` in the result bucket
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<StorageRef, StorageError>;
}

/// Store backed by a directory with one sub-directory per bucket
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    bucket: String,
}

impl LocalObjectStore {
    /// Create new store rooted at `root`, writing results into `bucket`
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Local path of an object, refusing keys that escape the bucket
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        let bucket_ok = !bucket.is_empty() && Path::new(bucket).components().count() == 1;
        if key.is_empty() || escapes || !bucket_ok {
            return Err(StorageError::InvalidKey {
                key: format!("{}/{}", bucket, key),
            });
        }
        Ok(self.root.join(bucket).join(relative))
    }
}

impl ObjectStore for LocalObjectStore {
    fn fetch(&self, reference: &StorageRef, dest_dir: &Path) -> Result<PathBuf, StorageError> {
        let source = self.object_path(&reference.bucket, &reference.object_key)?;
        if !source.is_file() {
            return Err(StorageError::NotFound {
                bucket: reference.bucket.clone(),
                key: reference.object_key.clone(),
            });
        }
        let file_name = source
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("object"));
        let dest = dest_dir.join(file_name);
        let bytes = fs::copy(&source, &dest)?;
        debug!(
            bucket = %reference.bucket,
            key = %reference.object_key,
            bytes,
            "Fetched object"
        );
        Ok(dest)
    }

    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<StorageRef, StorageError> {
        let dest = self.object_path(&self.bucket, key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, bytes)?;
        debug!(
            bucket = %self.bucket,
            key,
            content_type,
            bytes = bytes.len(),
            "Stored object"
        );
        Ok(StorageRef {
            bucket: self.bucket.clone(),
            object_key: key.to_string(),
        })
    }
}
