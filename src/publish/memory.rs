use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{BlobStore, StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Blob store kept in process memory. Optionally fails uploads whose path
/// contains a marker, to exercise error handling.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    container_created: Mutex<bool>,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    fail_on: Option<String>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(marker: impl Into<String>) -> Self {
        Self {
            fail_on: Some(marker.into()),
            ..Default::default()
        }
    }

    pub fn container_created(&self) -> bool {
        *self.container_created.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn objects(&self) -> BTreeMap<String, StoredObject> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn get(&self, path: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn create_container_if_not_exists(&self) -> StoreResult<bool> {
        let mut created = self.container_created.lock().unwrap_or_else(|e| e.into_inner());
        if *created {
            return Ok(false);
        }
        *created = true;
        Ok(true)
    }

    async fn upload(&self, remote_path: &str, bytes: Bytes, content_type: &str) -> StoreResult<()> {
        if let Some(marker) = &self.fail_on {
            if remote_path.contains(marker.as_str()) {
                return Err(StoreError::Other(format!("injected failure for {}", remote_path)));
            }
        }
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                remote_path.to_string(),
                StoredObject {
                    bytes,
                    content_type: content_type.to_string(),
                },
            );
        Ok(())
    }
}
