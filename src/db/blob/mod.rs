/// Blob storage abstraction
///
/// Every artifact the pipeline produces (raw list snapshots, the weekly view,
/// the historical table, the recommendation table) lives under a key in a
/// blob store. Writes can be made conditional so the history append is a
/// compare-and-swap on the destination object.
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::AppResult;

pub mod keys;
pub mod local;
pub mod memory;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

/// Version of a stored object: the SHA-256 digest of its bytes
pub type Generation = [u8; 32];

/// Condition a write must satisfy to be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional overwrite
    None,
    /// Only create; fails if the key already exists
    DoesNotExist,
    /// Only replace the object at exactly this generation
    GenerationMatch(Generation),
}

/// An object read back from the store together with its generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub generation: Generation,
}

/// Trait for blob storage backends
///
/// `get` fails with `AppError::NotFound` when the key is absent; a failed
/// precondition surfaces as `AppError::Conflict`.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores bytes under a key and returns the object's URI
    async fn put(&self, key: &str, bytes: Vec<u8>, precondition: Precondition)
        -> AppResult<String>;

    /// Reads an object and its current generation
    async fn get(&self, key: &str) -> AppResult<StoredObject>;

    /// Lists keys under a prefix in ascending key order
    async fn list(&self, prefix: &str) -> AppResult<Vec<String>>;

    /// Backend name for logging and debugging
    fn name(&self) -> &'static str;

    /// Uploads a local file to a key
    async fn upload(&self, local_path: &Path, key: &str) -> AppResult<String> {
        let bytes = tokio::fs::read(local_path).await?;
        self.put(key, bytes, Precondition::None).await
    }

    /// Downloads a key into a local file and returns the local path
    async fn download(&self, key: &str, local_path: &Path) -> AppResult<PathBuf> {
        let object = self.get(key).await?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, object.bytes).await?;
        Ok(local_path.to_path_buf())
    }
}

/// Generation of a body, derived from its content
///
/// Two processes reading the same object agree on its generation without
/// any shared counter.
pub fn content_generation(bytes: &[u8]) -> Generation {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Rejects keys that could escape the store root
pub(crate) fn validate_key(key: &str) -> AppResult<()> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");

    if invalid {
        return Err(crate::error::AppError::InvalidInput(format!(
            "Invalid storage key: '{}'",
            key
        )));
    }
    Ok(())
}
