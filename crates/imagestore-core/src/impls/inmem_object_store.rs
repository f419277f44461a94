//! InMemoryObjectStore - テスト用の durable backend
//!
//! last_modified は注入された Clock から取るので、
//! FixedClock を進めるだけで Sweeper の age を決定的に作れます。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{BackendError, Handle, MemoryType};
use crate::ports::{BlobBackend, Clock, ObjectInfo, ObjectStore};

#[derive(Debug, Clone)]
struct StoredObject {
    blob: Bytes,
    last_modified: DateTime<Utc>,
}

pub struct InMemoryObjectStore {
    bucket: String,
    bucket_exists: AtomicBool,
    objects: RwLock<HashMap<Handle, StoredObject>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryObjectStore {
    pub fn new(bucket: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            bucket: bucket.into(),
            bucket_exists: AtomicBool::new(false),
            objects: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl BlobBackend for InMemoryObjectStore {
    fn kind(&self) -> MemoryType {
        MemoryType::Durable
    }

    async fn put(&self, handle: &Handle, blob: Bytes) -> Result<(), BackendError> {
        let object = StoredObject {
            blob,
            last_modified: self.clock.now(),
        };
        self.objects.write().await.insert(handle.clone(), object);
        Ok(())
    }

    async fn get(&self, handle: &Handle) -> Result<Option<Bytes>, BackendError> {
        Ok(self.objects.read().await.get(handle).map(|o| o.blob.clone()))
    }

    async fn delete(&self, handle: &Handle) -> Result<bool, BackendError> {
        Ok(self.objects.write().await.remove(handle).is_some())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn ensure_bucket(&self) -> Result<bool, BackendError> {
        Ok(!self.bucket_exists.swap(true, Ordering::SeqCst))
    }

    async fn list_objects(&self) -> Result<Vec<ObjectInfo>, BackendError> {
        let objects = self.objects.read().await;
        let mut listing: Vec<ObjectInfo> = objects
            .iter()
            .map(|(handle, object)| ObjectInfo {
                handle: handle.clone(),
                size: object.blob.len() as u64,
                last_modified: object.last_modified,
            })
            .collect();
        listing.sort_by(|a, b| a.handle.cmp(&b.handle));
        Ok(listing)
    }
}
