//! Publishing the report tree to remote object storage.
//!
//! The store itself is behind [`BlobStore`] so the mirror logic runs the same
//! against Azure Blob Storage and the in-memory store used in tests.

pub mod azure;
pub mod error;
pub mod memory;
pub mod mirror;

use async_trait::async_trait;
use bytes::Bytes;

pub use azure::{AzureBlobStore, ConnectionString};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryBlobStore;
pub use mirror::{content_type_for, remote_root, MirrorPublisher, MirrorSummary, PublishState};

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create the target container, readable anonymously, unless it already
    /// exists. Returns `true` when this call created it.
    async fn create_container_if_not_exists(&self) -> StoreResult<bool>;

    /// Upload `bytes` as a single object at `remote_path`, replacing any
    /// existing object.
    async fn upload(&self, remote_path: &str, bytes: Bytes, content_type: &str) -> StoreResult<()>;
}
