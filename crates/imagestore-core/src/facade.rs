//! StoreFacade - Store / Read / Remove のルーティング
//!
//! # フロー
//! - Store: サイズ検査 → handle 決定 → MemoryType の backend に 1 回 put
//! - Read: `MemoryType::LOOKUP_ORDER` の順に get（volatile → durable）
//! - Remove: 同じ順に delete、最初に key を持っていた backend から消す
//!
//! Facade 自身はロックを持ちません。backend client が並行呼び出し安全であることが前提です。
//! 各 backend 呼び出しには timeout がかかります（put/get は `data_timeout`、delete は `backend_timeout`）。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::codec::DEFAULT_MAX_FRAME_SIZE;
use crate::domain::{BackendError, ErrorKind, Handle, MemoryType, StoreError};
use crate::ports::{BlobBackend, HandleGenerator};

/// Bound of control calls (delete).
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Bound of data calls (put/get), which move whole blobs.
pub const DEFAULT_DATA_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacadeLimits {
    pub max_frame_size: usize,
    pub backend_timeout: Duration,
    pub data_timeout: Duration,
}

impl Default for FacadeLimits {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
            data_timeout: DEFAULT_DATA_TIMEOUT,
        }
    }
}

/// The single shared entry point of the Dispatcher, the Ingestion Manager and
/// the transfer service.
pub struct StoreFacade {
    volatile: Arc<dyn BlobBackend>,
    durable: Arc<dyn BlobBackend>,
    handles: Arc<dyn HandleGenerator>,
    limits: FacadeLimits,
}

impl StoreFacade {
    pub fn new(
        volatile: Arc<dyn BlobBackend>,
        durable: Arc<dyn BlobBackend>,
        handles: Arc<dyn HandleGenerator>,
        limits: FacadeLimits,
    ) -> Self {
        debug_assert_eq!(volatile.kind(), MemoryType::Volatile);
        debug_assert_eq!(durable.kind(), MemoryType::Durable);
        Self {
            volatile,
            durable,
            handles,
            limits,
        }
    }

    pub fn limits(&self) -> FacadeLimits {
        self.limits
    }

    fn backend(&self, memory_type: MemoryType) -> &dyn BlobBackend {
        match memory_type {
            MemoryType::Volatile => self.volatile.as_ref(),
            MemoryType::Durable => self.durable.as_ref(),
        }
    }

    async fn call<T, F>(&self, memory_type: MemoryType, limit: Duration, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        match timeout(limit, op).await {
            Ok(result) => result.map_err(|e| StoreError::backend(memory_type, e)),
            Err(_) => Err(StoreError::backend(memory_type, BackendError::Timeout(limit))),
        }
    }

    async fn put(&self, memory_type: MemoryType, handle: &Handle, blob: Bytes) -> Result<(), StoreError> {
        let limit = self.limits.data_timeout;
        self.call(memory_type, limit, self.backend(memory_type).put(handle, blob))
            .await
    }

    async fn get(&self, memory_type: MemoryType, handle: &Handle) -> Result<Option<Bytes>, StoreError> {
        let limit = self.limits.data_timeout;
        self.call(memory_type, limit, self.backend(memory_type).get(handle))
            .await
    }

    async fn delete(&self, memory_type: MemoryType, handle: &Handle) -> Result<bool, StoreError> {
        let limit = self.limits.backend_timeout;
        self.call(memory_type, limit, self.backend(memory_type).delete(handle))
            .await
    }

    /// Store a complete blob. An empty `key` asks for a freshly generated handle.
    ///
    /// Oversized blobs are rejected before any backend I/O. A caller-supplied key
    /// is removed from the other backend afterwards, so the handle keeps naming
    /// a single blob. If that removal fails the new copy is deleted again and the
    /// store fails.
    pub async fn store(
        &self,
        blob: Bytes,
        key: &str,
        memory_type: MemoryType,
    ) -> Result<Handle, StoreError> {
        if blob.len() > self.limits.max_frame_size {
            return Err(StoreError::FrameTooLarge {
                size: blob.len(),
                max: self.limits.max_frame_size,
            });
        }

        let handle = if key.is_empty() {
            self.handles.generate()
        } else {
            Handle::new(key)
        };
        let size = blob.len();

        self.put(memory_type, &handle, blob).await?;

        if !key.is_empty()
            && let Err(e) = self.evict_elsewhere(&handle, memory_type).await
        {
            // 古いコピーが残るなら新しい方を取り消して失敗として返す
            if let Err(rollback) = self.delete(memory_type, &handle).await {
                warn!(handle = %handle, error = %rollback, "failed to roll back store");
            }
            return Err(e);
        }

        debug!(handle = %handle, backend = %memory_type, size, "stored blob");
        Ok(handle)
    }

    /// Delete `handle` from every backend except `kept`.
    async fn evict_elsewhere(&self, handle: &Handle, kept: MemoryType) -> Result<(), StoreError> {
        for memory_type in MemoryType::LOOKUP_ORDER {
            if memory_type == kept {
                continue;
            }
            match self.delete(memory_type, handle).await {
                Ok(true) => debug!(handle = %handle, backend = %memory_type, "dropped stale copy"),
                Ok(false) => {}
                Err(e) if e.kind() == ErrorKind::Validation => {}
                Err(e) => {
                    warn!(handle = %handle, error = %e, "failed to drop stale copy");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Resolve the backend holding `handle` and return its blob.
    pub async fn read(&self, handle: &Handle) -> Result<Bytes, StoreError> {
        let mut failure = None;
        for memory_type in MemoryType::LOOKUP_ORDER {
            match self.get(memory_type, handle).await {
                Ok(Some(blob)) => return Ok(blob),
                Ok(None) => {}
                // この backend では存在し得ない key
                Err(e) if e.kind() == ErrorKind::Validation => {}
                Err(e) => {
                    warn!(handle = %handle, error = %e, "read lookup failed");
                    failure = Some(e);
                }
            }
        }
        Err(failure.unwrap_or_else(|| StoreError::NotFound(handle.clone())))
    }

    /// Remove `handle` from whichever backend holds it and report that backend.
    pub async fn remove(&self, handle: &Handle) -> Result<MemoryType, StoreError> {
        let mut failure = None;
        for memory_type in MemoryType::LOOKUP_ORDER {
            match self.delete(memory_type, handle).await {
                Ok(true) => {
                    debug!(handle = %handle, backend = %memory_type, "removed blob");
                    return Ok(memory_type);
                }
                Ok(false) => {}
                Err(e) if e.kind() == ErrorKind::Validation => {}
                Err(e) => {
                    warn!(handle = %handle, error = %e, "remove lookup failed");
                    failure = Some(e);
                }
            }
        }
        Err(failure.unwrap_or_else(|| StoreError::NotFound(handle.clone())))
    }
}
