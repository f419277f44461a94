//! BlobBackend port - volatile cache と durable object store の共通インターフェース
//!
//! Facade は backend の種類を `kind()` で知り、`MemoryType::LOOKUP_ORDER` の順に
//! 同じ操作を試します。個々の backend への呼び出しは常に 1 回で完結します。

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::{BackendError, Handle, MemoryType};

/// Narrow client interface of one backing store.
///
/// Implementations must be safe for concurrent use; the facade adds no locking.
/// `put` must be all-or-nothing: after a failed put the handle is either absent
/// or still maps to its previous complete blob.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    fn kind(&self) -> MemoryType;

    async fn put(&self, handle: &Handle, blob: Bytes) -> Result<(), BackendError>;

    async fn get(&self, handle: &Handle) -> Result<Option<Bytes>, BackendError>;

    /// Returns `false` when the handle was not present.
    async fn delete(&self, handle: &Handle) -> Result<bool, BackendError>;
}
