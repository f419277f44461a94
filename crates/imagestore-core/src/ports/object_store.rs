//! ObjectStore port - durable backend（MinIO/S3/Local）
//!
//! BlobBackend に加えて、retention sweeper が使う listing と一括削除を提供します。
//!
//! # 設計原則
//! - bucket 名と region は固定（起動時に `ensure_bucket` で作成）
//! - object key == handle
//! - 一括削除の結果は key ごとに独立

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use futures_util::stream;
use thiserror::Error;
use tokio::time::timeout;

use crate::domain::{BackendError, Handle};
use crate::ports::BlobBackend;

/// How many deletions a default `remove_objects` keeps in flight.
pub const REMOVE_CONCURRENCY: usize = 8;

/// Listing entry of one durable object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub handle: Handle,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Error)]
#[error("failed to remove {handle}: {reason}")]
pub struct RemoveObjectError {
    pub handle: Handle,
    pub reason: String,
}

#[async_trait]
pub trait ObjectStore: BlobBackend {
    fn bucket(&self) -> &str;

    /// Create the bucket if it does not exist yet. Returns `true` when created.
    async fn ensure_bucket(&self) -> Result<bool, BackendError>;

    async fn list_objects(&self) -> Result<Vec<ObjectInfo>, BackendError>;

    /// Remove a batch of objects, each delete bounded by `delete_timeout`.
    /// Only failures are reported; removing an already-absent object counts
    /// as success.
    async fn remove_objects(
        &self,
        handles: Vec<Handle>,
        delete_timeout: Duration,
    ) -> Vec<RemoveObjectError> {
        stream::iter(handles)
            .map(|handle| async move {
                let reason = match timeout(delete_timeout, self.delete(&handle)).await {
                    Ok(Ok(_)) => return None,
                    Ok(Err(e)) => e.to_string(),
                    Err(_) => BackendError::Timeout(delete_timeout).to_string(),
                };
                Some(RemoveObjectError { handle, reason })
            })
            .buffer_unordered(REMOVE_CONCURRENCY)
            .filter_map(|failure| async move { failure })
            .collect()
            .await
    }
}
