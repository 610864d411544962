use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{content_generation, validate_key, BlobStore, Precondition, StoredObject};
use crate::error::{AppError, AppResult};

/// In-process blob store used by tests and ephemeral runs
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> AppError {
    AppError::Internal("Memory store lock poisoned".to_string())
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        precondition: Precondition,
    ) -> AppResult<String> {
        validate_key(key)?;
        let mut objects = self.objects.write().map_err(poisoned)?;

        let current = objects.get(key).map(|bytes| content_generation(bytes));
        match (precondition, current) {
            (Precondition::None, _) => {}
            (Precondition::DoesNotExist, None) => {}
            (Precondition::DoesNotExist, Some(_)) => {
                return Err(AppError::Conflict(format!("'{}' already exists", key)));
            }
            (Precondition::GenerationMatch(expected), Some(actual)) if expected == actual => {}
            (Precondition::GenerationMatch(_), _) => {
                return Err(AppError::Conflict(format!(
                    "'{}' changed since it was read",
                    key
                )));
            }
        }

        objects.insert(key.to_string(), bytes);
        Ok(format!("memory://{}", key))
    }

    async fn get(&self, key: &str) -> AppResult<StoredObject> {
        let objects = self.objects.read().map_err(poisoned)?;

        objects
            .get(key)
            .map(|bytes| StoredObject {
                generation: content_generation(bytes),
                bytes: bytes.clone(),
            })
            .ok_or_else(|| AppError::NotFound(format!("Object '{}' not found", key)))
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<String>> {
        let objects = self.objects.read().map_err(poisoned)?;

        Ok(objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
