use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_UPLOAD_CONCURRENCY, REMOTE_NAMESPACE};

use super::{BlobStore, StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Idle,
    ContainerEnsuring,
    Uploading,
    Done,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorSummary {
    pub files: usize,
    pub bytes: u64,
}

/// Mirrors a local directory tree into a [`BlobStore`].
pub struct MirrorPublisher {
    store: Arc<dyn BlobStore>,
    state: PublishState,
    concurrency: usize,
}

impl MirrorPublisher {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            state: PublishState::Idle,
            concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }

    /// Upload up to `n` files at once. 0 is treated as 1.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn state(&self) -> PublishState {
        self.state
    }

    /// Ensure the container, then mirror `local_dir` under `remote_prefix`.
    /// Never fails: errors are logged and leave the publisher in `Failed`.
    pub async fn publish(&mut self, local_dir: &Path, remote_prefix: &str) -> PublishState {
        match self.try_publish(local_dir, remote_prefix).await {
            Ok(summary) => {
                info!(
                    "Uploaded {} files ({} bytes) to {}",
                    summary.files, summary.bytes, remote_prefix
                );
                self.state = PublishState::Done;
            }
            Err(e) if e.is_auth_failure() => {
                error!(
                    "Report upload to {} was rejected, check the storage credentials: {}",
                    remote_prefix, e
                );
                self.state = PublishState::Failed;
            }
            Err(e) => {
                error!("Report upload to {} failed: {}", remote_prefix, e);
                self.state = PublishState::Failed;
            }
        }
        self.state
    }

    async fn try_publish(&mut self, local_dir: &Path, remote_prefix: &str) -> StoreResult<MirrorSummary> {
        self.state = PublishState::ContainerEnsuring;
        self.ensure_container().await?;
        self.state = PublishState::Uploading;
        self.mirror(local_dir, remote_prefix).await
    }

    /// Create-if-absent with public read access on the whole container.
    pub async fn ensure_container(&self) -> StoreResult<()> {
        let created = self
            .store
            .create_container_if_not_exists()
            .await?;
        if created {
            info!("Created blob container");
        } else {
            debug!("Blob container already exists");
        }
        Ok(())
    }

    /// Upload every file under `local_dir` to `remote_prefix/<relative path>`,
    /// always with `/` separators.
    pub async fn mirror(&self, local_dir: &Path, remote_prefix: &str) -> StoreResult<MirrorSummary> {
        let files = list_files(local_dir, remote_prefix.trim_end_matches('/')).await?;
        let count = files.len();

        let sizes: Vec<u64> = futures::stream::iter(files)
            .map(|(path, remote)| self.upload_file(path, remote))
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        Ok(MirrorSummary {
            files: count,
            bytes: sizes.iter().sum(),
        })
    }

    async fn upload_file(&self, path: PathBuf, remote_path: String) -> StoreResult<u64> {
        let content = tokio::fs::read(&path).await.map_err(|e| StoreError::Read {
            path: path.clone(),
            source: e,
        })?;
        let size = content.len() as u64;
        let content_type = content_type_for(&path);

        self.store
            .upload(&remote_path, Bytes::from(content), content_type)
            .await?;

        debug!("Uploaded {:?} -> {} ({})", path, remote_path, content_type);
        Ok(size)
    }
}

/// Walk `root` and pair every file with its remote path. Symlinked
/// directories are not followed; symlinked files are uploaded.
async fn list_files(root: &Path, remote_prefix: &str) -> StoreResult<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    let mut pending = vec![(root.to_path_buf(), remote_prefix.to_string())];

    while let Some((dir, prefix)) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| StoreError::Read {
            path: dir.clone(),
            source: e,
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::Read {
            path: dir.clone(),
            source: e,
        })? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            let remote = join_remote(&prefix, &name);

            let file_type = entry.file_type().await.map_err(|e| StoreError::Read {
                path: path.clone(),
                source: e,
            })?;
            if file_type.is_dir() {
                pending.push((path, remote));
            } else if file_type.is_symlink() {
                match tokio::fs::metadata(&path).await {
                    Ok(target) if target.is_file() => files.push((path, remote)),
                    Ok(_) => warn!("Skipping symlinked directory {:?}", path),
                    Err(e) => warn!("Skipping dangling symlink {:?}: {}", path, e),
                }
            } else {
                files.push((path, remote));
            }
        }
    }

    Ok(files)
}

fn join_remote(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Content type by file extension, case-insensitive.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "html" => "text/html",
        "json" => "application/json",
        "txt" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// `chalisha-reporter/<app>/<run id>`. Separators inside the app name are
/// replaced so the root always has exactly three segments.
pub fn remote_root(app_name: &str, run_id: &str) -> String {
    let app: String = app_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '-' } else { c })
        .collect();
    format!("{}/{}/{}", REMOTE_NAMESPACE, app, run_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::InMemoryBlobStore;
    use tempfile::TempDir;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("index.html")), "text/html");
        assert_eq!(content_type_for(Path::new("report.JSON")), "application/json");
        assert_eq!(content_type_for(Path::new("log.txt")), "text/plain");
        assert_eq!(content_type_for(Path::new("a.Png")), "image/png");
        assert_eq!(content_type_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a.JPEG")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("trace.zip")), "application/octet-stream");
        assert_eq!(content_type_for(Path::new("style.css")), "application/octet-stream");
        assert_eq!(content_type_for(Path::new("README")), "application/octet-stream");
    }

    #[test]
    fn test_remote_root() {
        assert_eq!(
            remote_root("checkout-web", "abc"),
            "chalisha-reporter/checkout-web/abc"
        );
        assert_eq!(remote_root("@scope/app", "abc"), "chalisha-reporter/@scope-app/abc");
    }

    #[tokio::test]
    async fn test_mirror_preserves_structure() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.json"), "{}").unwrap();
        std::fs::create_dir_all(tmp.path().join("sub").join("deeper")).unwrap();
        std::fs::write(tmp.path().join("sub").join("b.png"), [1u8, 2, 3]).unwrap();
        std::fs::write(tmp.path().join("sub").join("deeper").join("c.bin"), "x").unwrap();

        let store = Arc::new(InMemoryBlobStore::new());
        let publisher = MirrorPublisher::new(store.clone());
        let summary = publisher.mirror(tmp.path(), "P/").await.unwrap();

        assert_eq!(summary, MirrorSummary { files: 3, bytes: 6 });
        let objects = store.objects();
        let keys: Vec<&str> = objects.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["P/a.json", "P/sub/b.png", "P/sub/deeper/c.bin"]);
        assert_eq!(objects["P/a.json"].content_type, "application/json");
        assert_eq!(objects["P/sub/b.png"].content_type, "image/png");
        assert_eq!(objects["P/sub/b.png"].bytes.to_vec(), vec![1u8, 2, 3]);
        assert_eq!(objects["P/sub/deeper/c.bin"].content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn test_parallel_mirror_uploads_everything() {
        let tmp = TempDir::new().unwrap();
        for i in 0..20 {
            std::fs::write(tmp.path().join(format!("f{}.txt", i)), "x").unwrap();
        }
        let store = Arc::new(InMemoryBlobStore::new());
        let publisher = MirrorPublisher::new(store.clone()).with_concurrency(4);
        let summary = publisher.mirror(tmp.path(), "run").await.unwrap();

        assert_eq!(summary.files, 20);
        assert_eq!(store.objects().len(), 20);
    }

    #[tokio::test]
    async fn test_publish_success_reaches_done() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("report.json"), "{}").unwrap();
        let store = Arc::new(InMemoryBlobStore::new());
        let mut publisher = MirrorPublisher::new(store.clone());
        assert_eq!(publisher.state(), PublishState::Idle);

        let state = publisher.publish(tmp.path(), "ns/app/run").await;
        assert_eq!(state, PublishState::Done);
        assert!(store.container_created());
        assert!(store.get("ns/app/run/report.json").is_some());
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("ok.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("broken.png"), "x").unwrap();
        let store = Arc::new(InMemoryBlobStore::failing_on("broken"));
        let mut publisher = MirrorPublisher::new(store);

        let state = publisher.publish(tmp.path(), "p").await;
        assert_eq!(state, PublishState::Failed);
    }

    struct RejectingStore;

    #[async_trait::async_trait]
    impl BlobStore for RejectingStore {
        async fn create_container_if_not_exists(&self) -> StoreResult<bool> {
            Err(StoreError::Http {
                status: 403,
                code: "AuthenticationFailed".to_string(),
                message: String::new(),
            })
        }

        async fn upload(&self, _: &str, _: Bytes, _: &str) -> StoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_rejected_credentials_fail_publish() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("report.json"), "{}").unwrap();
        let mut publisher = MirrorPublisher::new(Arc::new(RejectingStore));

        let state = publisher.publish(tmp.path(), "p").await;
        assert_eq!(state, PublishState::Failed);
    }

    #[tokio::test]
    async fn test_missing_local_dir_fails_publish() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(InMemoryBlobStore::new());
        let mut publisher = MirrorPublisher::new(store);
        let state = publisher.publish(&tmp.path().join("nope"), "p").await;
        assert_eq!(state, PublishState::Failed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_mirror_does_not_follow_directory_symlinks() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("data")).unwrap();
        std::fs::write(tmp.path().join("data").join("a.png"), "x").unwrap();
        std::os::unix::fs::symlink(tmp.path(), tmp.path().join("data").join("loop")).unwrap();
        std::os::unix::fs::symlink(
            tmp.path().join("data").join("a.png"),
            tmp.path().join("alias.png"),
        )
        .unwrap();
        std::os::unix::fs::symlink(tmp.path().join("gone"), tmp.path().join("dangling.txt")).unwrap();

        let store = Arc::new(InMemoryBlobStore::new());
        let publisher = MirrorPublisher::new(store.clone());
        let summary = publisher.mirror(tmp.path(), "p").await.unwrap();

        assert_eq!(summary.files, 2);
        let objects = store.objects();
        let keys: Vec<&str> = objects.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["p/alias.png", "p/data/a.png"]);
    }

    #[tokio::test]
    async fn test_ensure_container_is_idempotent() {
        let store = Arc::new(InMemoryBlobStore::new());
        let publisher = MirrorPublisher::new(store.clone());
        publisher.ensure_container().await.unwrap();
        publisher.ensure_container().await.unwrap();
        assert!(store.container_created());
    }
}
