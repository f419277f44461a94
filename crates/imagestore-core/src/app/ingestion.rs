//! IngestionManager - topic ごとの受信ループ
//!
//! 起動時に topic → FrameSource の束縛を作り、以後は変更しません。
//! topic ごとに独立したループが frame を受け取り、Facade の Store に渡します。
//!
//! # 既知の制約
//! 失敗した frame は warn ログとカウンタに残るだけで、publisher には何も返りません
//! （dead-letter なし）。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::TaskGroup;
use crate::domain::{Handle, MemoryType, SetupError};
use crate::facade::StoreFacade;
use crate::observability::IngestCounts;
use crate::ports::{Frame, FrameSource};

const RECEIVE_BACKOFF: Duration = Duration::from_millis(100);

/// Per-topic ingestion counters.
#[derive(Debug, Default)]
pub struct IngestStats {
    stored: AtomicU64,
    failed: AtomicU64,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestCounts {
        IngestCounts {
            stored: self.stored.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

struct Binding {
    source: Box<dyn FrameSource>,
    stats: Arc<IngestStats>,
}

pub struct IngestionManager {
    facade: Arc<StoreFacade>,
    memory_type: MemoryType,
    bindings: BTreeMap<String, Binding>,
}

impl IngestionManager {
    pub fn new(facade: Arc<StoreFacade>, memory_type: MemoryType) -> Self {
        Self {
            facade,
            memory_type,
            bindings: BTreeMap::new(),
        }
    }

    /// Bind `topic` to its frame source. Each topic may be bound once.
    pub fn bind(
        &mut self,
        topic: impl Into<String>,
        source: Box<dyn FrameSource>,
    ) -> Result<Arc<IngestStats>, SetupError> {
        let topic = topic.into();
        if topic.is_empty() {
            return Err(SetupError::Config("topic name must not be empty".into()));
        }
        if self.bindings.contains_key(&topic) {
            return Err(SetupError::DuplicateTopic(topic));
        }
        let stats = Arc::new(IngestStats::default());
        self.bindings.insert(
            topic,
            Binding {
                source,
                stats: stats.clone(),
            },
        );
        Ok(stats)
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn stats(&self, topic: &str) -> Option<Arc<IngestStats>> {
        self.bindings.get(topic).map(|binding| binding.stats.clone())
    }

    /// Spawn one receive loop per bound topic into `group`.
    pub fn spawn(self, group: &mut TaskGroup) {
        for (topic, binding) in self.bindings {
            let worker = TopicWorker {
                topic,
                facade: self.facade.clone(),
                memory_type: self.memory_type,
                stats: binding.stats,
            };
            let source = binding.source;
            group.spawn(format!("ingest:{}", worker.topic), move |cancel| {
                worker.run(source, cancel)
            });
        }
    }
}

struct TopicWorker {
    topic: String,
    facade: Arc<StoreFacade>,
    memory_type: MemoryType,
    stats: Arc<IngestStats>,
}

impl TopicWorker {
    async fn run(self, mut source: Box<dyn FrameSource>, cancel: CancellationToken) {
        info!(topic = %self.topic, memory_type = %self.memory_type, "ingesting topic");
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = source.next_frame() => next,
            };
            match next {
                Some(Ok(frame)) => self.ingest(frame).await,
                Some(Err(e)) => {
                    warn!(topic = %self.topic, error = %e, "failed to receive frame");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECEIVE_BACKOFF) => {}
                    }
                }
                None => {
                    info!(topic = %self.topic, "topic subscription closed");
                    break;
                }
            }
        }
        info!(topic = %self.topic, counts = ?self.stats.snapshot(), "ingestion stopped");
    }

    async fn ingest(&self, frame: Frame) {
        let handle = Handle::for_topic(&self.topic, frame.key.as_deref());
        let size = frame.payload.len();
        match self
            .facade
            .store(frame.payload, handle.as_str(), self.memory_type)
            .await
        {
            Ok(handle) => {
                self.stats.stored.fetch_add(1, Ordering::Relaxed);
                debug!(topic = %self.topic, handle = %handle, size, "ingested frame");
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(topic = %self.topic, handle = %handle, size, error = %e, "dropped frame");
            }
        }
    }
}
