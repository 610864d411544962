use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use walkdir::WalkDir;

use super::{
    content_generation, validate_key, BlobStore, Generation, Precondition, StoredObject,
};
use crate::error::{AppError, AppResult};

/// Blob store backed by a directory on the local filesystem
///
/// Keys map to relative paths under the root. Writes go to a temporary
/// sibling file and are renamed into place, so readers never observe a
/// partially written object.
pub struct LocalBlobStore {
    root: PathBuf,
    // Serializes precondition checks with the rename that follows them
    write_lock: Mutex<()>,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> AppResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    async fn current_generation(path: &Path) -> AppResult<Option<Generation>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(content_generation(&bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        precondition: Precondition,
    ) -> AppResult<String> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.lock().await;

        match precondition {
            Precondition::None => {}
            Precondition::DoesNotExist => {
                if Self::current_generation(&path).await?.is_some() {
                    return Err(AppError::Conflict(format!("'{}' already exists", key)));
                }
            }
            Precondition::GenerationMatch(expected) => {
                match Self::current_generation(&path).await? {
                    Some(actual) if actual == expected => {}
                    Some(_) => {
                        return Err(AppError::Conflict(format!(
                            "'{}' changed since it was read",
                            key
                        )))
                    }
                    None => {
                        return Err(AppError::Conflict(format!(
                            "'{}' was removed since it was read",
                            key
                        )))
                    }
                }
            }
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp_path, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        tracing::debug!(key = %key, bytes = bytes.len(), "Wrote object");
        Ok(format!("file://{}", path.display()))
    }

    async fn get(&self, key: &str) -> AppResult<StoredObject> {
        let path = self.path_for(key)?;

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let generation = content_generation(&bytes);
                Ok(StoredObject { bytes, generation })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("Object '{}' not found", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<String>> {
        let root = self.root.clone();
        let prefix = prefix.to_string();

        tokio::task::spawn_blocking(move || list_keys(&root, &prefix))
            .await
            .map_err(|e| AppError::Internal(format!("Listing task failed: {}", e)))?
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Walks the store root and returns the sorted keys under `prefix`
fn list_keys(root: &Path, prefix: &str) -> AppResult<Vec<String>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut keys = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        // In-flight temp files are not objects
        if key.contains(".tmp-") {
            continue;
        }
        if key.starts_with(prefix) {
            keys.push(key);
        }
    }

    keys.sort();
    Ok(keys)
}
