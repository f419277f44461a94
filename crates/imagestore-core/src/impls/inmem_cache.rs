//! InMemoryCache - volatile backend
//!
//! プロセス内の HashMap を volatile backend として使います。
//! eviction はこの backend 自身の関心事なので、ここでは実装しません。

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::domain::{BackendError, Handle, MemoryType};
use crate::ports::BlobBackend;

#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<Handle, Bytes>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl BlobBackend for InMemoryCache {
    fn kind(&self) -> MemoryType {
        MemoryType::Volatile
    }

    async fn put(&self, handle: &Handle, blob: Bytes) -> Result<(), BackendError> {
        self.entries.write().await.insert(handle.clone(), blob);
        Ok(())
    }

    async fn get(&self, handle: &Handle) -> Result<Option<Bytes>, BackendError> {
        Ok(self.entries.read().await.get(handle).cloned())
    }

    async fn delete(&self, handle: &Handle) -> Result<bool, BackendError> {
        Ok(self.entries.write().await.remove(handle).is_some())
    }
}
