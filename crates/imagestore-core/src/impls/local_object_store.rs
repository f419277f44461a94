//! LocalObjectStore - ローカルディレクトリを durable backend として使う実装
//!
//! レイアウト: `<root>/<region>/<bucket>/<handle>`
//!
//! 書き込みは `<bucket>/.tmp/` に一時ファイルを作ってから rename するので、
//! 途中で失敗しても handle の下には何も見えません（all-or-nothing）。

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::domain::{BackendError, Handle, MemoryType};
use crate::ports::{BlobBackend, ObjectInfo, ObjectStore};

pub const DEFAULT_BUCKET: &str = "image-store-bucket";
pub const DEFAULT_REGION: &str = "gateway";

const TMP_DIR: &str = ".tmp";

pub struct LocalObjectStore {
    bucket: String,
    bucket_dir: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl AsRef<Path>, region: &str, bucket: &str) -> Self {
        let bucket_dir = root.as_ref().join(region).join(bucket);
        Self {
            bucket: bucket.to_string(),
            bucket_dir,
        }
    }

    pub fn bucket_dir(&self) -> &Path {
        &self.bucket_dir
    }

    fn object_path(&self, handle: &Handle) -> Result<PathBuf, BackendError> {
        let key = handle.as_str();
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && !key.contains(['/', '\\', '\0']);
        if !valid {
            return Err(BackendError::InvalidKey(key.to_string()));
        }
        Ok(self.bucket_dir.join(key))
    }

    fn tmp_dir(&self) -> PathBuf {
        self.bucket_dir.join(TMP_DIR)
    }
}

#[async_trait]
impl BlobBackend for LocalObjectStore {
    fn kind(&self) -> MemoryType {
        MemoryType::Durable
    }

    async fn put(&self, handle: &Handle, blob: Bytes) -> Result<(), BackendError> {
        let path = self.object_path(handle)?;
        let tmp_path = self.tmp_dir().join(Ulid::new().to_string());

        let written = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(&blob).await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &path).await
        }
        .await;

        if let Err(e) = written {
            // 一時ファイルは handle として見えないので、消せなくても次回起動時に掃除される
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        debug!(handle = %handle, size = blob.len(), "stored object");
        Ok(())
    }

    async fn get(&self, handle: &Handle) -> Result<Option<Bytes>, BackendError> {
        let path = self.object_path(handle)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, handle: &Handle) -> Result<bool, BackendError> {
        let path = self.object_path(handle)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn ensure_bucket(&self) -> Result<bool, BackendError> {
        let created = match fs::metadata(&self.bucket_dir).await {
            Ok(meta) if meta.is_dir() => false,
            Ok(_) => {
                return Err(BackendError::Unavailable(format!(
                    "{} exists but is not a directory",
                    self.bucket_dir.display()
                )));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        // 前回プロセスの書きかけは捨てる
        let tmp_dir = self.tmp_dir();
        if let Err(e) = fs::remove_dir_all(&tmp_dir).await
            && e.kind() != ErrorKind::NotFound
        {
            warn!(path = %tmp_dir.display(), error = %e, "failed to clear partial uploads");
        }
        fs::create_dir_all(&tmp_dir).await?;

        if created {
            info!(bucket = %self.bucket, path = %self.bucket_dir.display(), "created bucket");
        }
        Ok(created)
    }

    async fn list_objects(&self) -> Result<Vec<ObjectInfo>, BackendError> {
        let mut entries = fs::read_dir(&self.bucket_dir).await?;
        let mut listing = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                // list と remove が競合した場合
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !meta.is_file() {
                continue;
            }
            listing.push(ObjectInfo {
                handle: Handle::new(name),
                size: meta.len(),
                last_modified: DateTime::<Utc>::from(meta.modified()?),
            });
        }
        listing.sort_by(|a, b| a.handle.cmp(&b.handle));
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_in(dir: &tempfile::TempDir) -> LocalObjectStore {
        let store = LocalObjectStore::new(dir.path(), DEFAULT_REGION, DEFAULT_BUCKET);
        store.ensure_bucket().await.unwrap();
        store
    }

    #[tokio::test]
    async fn round_trips_objects_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let handle = Handle::new("01HZX");

        store.put(&handle, Bytes::from_static(b"pixels")).await.unwrap();
        assert!(dir.path().join("gateway/image-store-bucket/01HZX").is_file());
        assert_eq!(store.get(&handle).await.unwrap(), Some(Bytes::from_static(b"pixels")));

        assert!(store.delete(&handle).await.unwrap());
        assert_eq!(store.get(&handle).await.unwrap(), None);
        assert!(!store.delete(&handle).await.unwrap());
    }

    #[tokio::test]
    async fn ensure_bucket_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), DEFAULT_REGION, DEFAULT_BUCKET);
        assert!(store.ensure_bucket().await.unwrap());
        assert!(!store.ensure_bucket().await.unwrap());
    }

    #[tokio::test]
    async fn listing_skips_partial_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        store.put(&Handle::new("a"), Bytes::from_static(b"123")).await.unwrap();
        std::fs::write(store.bucket_dir().join(TMP_DIR).join("half"), b"x").unwrap();

        let listing = store.list_objects().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].handle, Handle::new("a"));
        assert_eq!(listing[0].size, 3);
    }

    #[tokio::test]
    async fn path_like_handles_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        for key in ["../escape", "a/b", ".hidden", ""] {
            let err = store.put(&Handle::new(key), Bytes::from_static(b"x")).await.unwrap_err();
            assert!(matches!(err, BackendError::InvalidKey(_)), "key {key:?}");
        }
    }
}
