//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! backend・transport・topic を集めて、1 つの StoreFacade を共有する App を作ります。
//!
//! # Fail-fast 設計
//! - build() で durable bucket を ensure し、volatile backend に疎通確認する
//! - expect_topics() で期待される topic を登録し、「期待集合 ⊆ 束縛済み集合」をチェック
//! - どれかが失敗したら SetupError（プロセス終了）

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use crate::app::dispatcher::CommandDispatcher;
use crate::app::ingestion::{IngestStats, IngestionManager};
use crate::app::sweeper::RetentionSweeper;
use crate::app::task_group::TaskGroup;
use crate::config::RuntimeSettings;
use crate::domain::{Handle, MemoryType, SetupError};
use crate::facade::StoreFacade;
use crate::ports::{
    BlobBackend, Clock, FrameSource, ObjectStore, RequestTransport, SystemClock, UlidGenerator,
};
use crate::transfer::TransferService;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const STARTUP_CHECK_HANDLE: &str = "imagestore-startup-check";

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(Arc::new(InMemoryCache::new()), durable)
///     .settings(args.runtime_settings()?)
///     .request_transport(Box::new(transport))
///     .topic("cam-a", Box::new(source))
///     .expect_topics(&["cam-a"])
///     .build()
///     .await?;
/// let tasks = app.start();
/// ```
pub struct AppBuilder {
    volatile: Arc<dyn BlobBackend>,
    durable: Arc<dyn BlobBackend>,
    object_store: Arc<dyn ObjectStore>,
    settings: RuntimeSettings,
    clock: Arc<dyn Clock>,
    request_transport: Option<Box<dyn RequestTransport>>,
    topics: Vec<(String, Box<dyn FrameSource>)>,
    expected_topics: Option<Vec<String>>,
}

impl AppBuilder {
    pub fn new<D>(volatile: Arc<dyn BlobBackend>, durable: Arc<D>) -> Self
    where
        D: ObjectStore + 'static,
    {
        Self {
            volatile,
            durable: durable.clone(),
            object_store: durable,
            settings: RuntimeSettings::default(),
            clock: Arc::new(SystemClock),
            request_transport: None,
            topics: Vec::new(),
            expected_topics: None,
        }
    }

    pub fn settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Transport the dispatcher serves. Without one no dispatcher is started.
    pub fn request_transport(mut self, transport: Box<dyn RequestTransport>) -> Self {
        self.request_transport = Some(transport);
        self
    }

    pub fn topic(mut self, name: impl Into<String>, source: Box<dyn FrameSource>) -> Self {
        self.topics.push((name.into(), source));
        self
    }

    /// 期待される topic のリストを設定
    pub fn expect_topics(mut self, topics: &[&str]) -> Self {
        self.expected_topics = Some(topics.iter().map(|t| t.to_string()).collect());
        self
    }

    /// Verify backends and bindings, then wire the facade and its loops.
    pub async fn build(self) -> Result<App, SetupError> {
        if self.volatile.kind() != MemoryType::Volatile
            || self.object_store.kind() != MemoryType::Durable
        {
            return Err(SetupError::Config(
                "backends must be given as (volatile, durable)".into(),
            ));
        }

        if let Some(expected) = &self.expected_topics {
            let missing: Vec<String> = expected
                .iter()
                .filter(|topic| !self.topics.iter().any(|(bound, _)| bound == *topic))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(SetupError::MissingTopics(missing));
            }
        }

        self.check_backends().await?;

        let facade = Arc::new(StoreFacade::new(
            self.volatile,
            self.durable,
            Arc::new(UlidGenerator::new(self.clock.clone())),
            self.settings.limits,
        ));

        let mut ingestion = IngestionManager::new(facade.clone(), self.settings.ingest_memory_type);
        let mut ingest_stats = BTreeMap::new();
        for (topic, source) in self.topics {
            let stats = ingestion.bind(topic.clone(), source)?;
            ingest_stats.insert(topic, stats);
        }

        let dispatcher = self.request_transport.map(|transport| {
            CommandDispatcher::new(facade.clone(), transport, self.settings.dispatch_memory_type)
        });

        let sweeper = RetentionSweeper::new(
            self.object_store,
            self.clock,
            self.settings.retention,
        )
        .map(|sweeper| sweeper.with_delete_timeout(self.settings.limits.backend_timeout));
        if sweeper.is_none() {
            info!("retention time is infinite, sweeper disabled");
        }

        Ok(App {
            facade,
            chunk_size: self.settings.chunk_size,
            sweeper,
            dispatcher,
            ingestion,
            ingest_stats,
        })
    }

    async fn check_backends(&self) -> Result<(), SetupError> {
        let bucket = self.object_store.bucket().to_string();
        match timeout(STARTUP_TIMEOUT, self.object_store.ensure_bucket()).await {
            Ok(Ok(true)) => info!(%bucket, "created durable bucket"),
            Ok(Ok(false)) => info!(%bucket, "durable bucket exists"),
            Ok(Err(e)) => {
                return Err(SetupError::Backend {
                    backend: MemoryType::Durable,
                    reason: format!("ensure bucket {bucket}: {e}"),
                });
            }
            Err(_) => {
                return Err(SetupError::Backend {
                    backend: MemoryType::Durable,
                    reason: format!("ensure bucket {bucket}: timed out after {STARTUP_TIMEOUT:?}"),
                });
            }
        }

        let check = Handle::new(STARTUP_CHECK_HANDLE);
        match timeout(STARTUP_TIMEOUT, self.volatile.get(&check)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(SetupError::Backend {
                backend: MemoryType::Volatile,
                reason: e.to_string(),
            }),
            Err(_) => Err(SetupError::Backend {
                backend: MemoryType::Volatile,
                reason: format!("timed out after {STARTUP_TIMEOUT:?}"),
            }),
        }
    }
}

/// App はアプリケーションのランタイム
///
/// build 済みで、まだどのループも動いていない状態です。`start()` で TaskGroup に移ります。
pub struct App {
    facade: Arc<StoreFacade>,
    chunk_size: usize,
    sweeper: Option<RetentionSweeper>,
    dispatcher: Option<CommandDispatcher>,
    ingestion: IngestionManager,
    ingest_stats: BTreeMap<String, Arc<IngestStats>>,
}

impl App {
    pub fn facade(&self) -> Arc<StoreFacade> {
        self.facade.clone()
    }

    pub fn transfer_service(&self) -> TransferService {
        TransferService::with_chunk_size(self.facade.clone(), self.chunk_size)
    }

    pub fn ingest_stats(&self, topic: &str) -> Option<Arc<IngestStats>> {
        self.ingest_stats.get(topic).cloned()
    }

    pub fn has_sweeper(&self) -> bool {
        self.sweeper.is_some()
    }

    /// Spawn every long-running loop into a fresh task group.
    pub fn start(self) -> TaskGroup {
        let mut group = TaskGroup::new();
        if let Some(sweeper) = self.sweeper {
            group.spawn("retention-sweeper", move |cancel| sweeper.run(cancel));
        }
        match self.dispatcher {
            Some(dispatcher) => group.spawn("dispatcher", move |cancel| dispatcher.run(cancel)),
            None => warn!("no request transport bound, dispatcher not started"),
        }
        self.ingestion.spawn(&mut group);
        info!(tasks = group.len(), "imagestore started");
        group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BackendError, Command, Response, RetentionPolicy, Ttl};
    use crate::impls::{InMemoryCache, InMemoryObjectStore, frame_channel, request_channel};
    use crate::ports::{FixedClock, Frame, ObjectInfo};
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};

    fn stores() -> (Arc<InMemoryCache>, Arc<InMemoryObjectStore>) {
        (
            Arc::new(InMemoryCache::new()),
            Arc::new(InMemoryObjectStore::new("test-bucket", Arc::new(SystemClock))),
        )
    }

    /// Durable store whose bucket can never be created.
    struct NoBucket;

    #[async_trait]
    impl BlobBackend for NoBucket {
        fn kind(&self) -> MemoryType {
            MemoryType::Durable
        }
        async fn put(&self, _: &Handle, _: Bytes) -> Result<(), BackendError> {
            Err(BackendError::Unavailable("no bucket".into()))
        }
        async fn get(&self, _: &Handle) -> Result<Option<Bytes>, BackendError> {
            Err(BackendError::Unavailable("no bucket".into()))
        }
        async fn delete(&self, _: &Handle) -> Result<bool, BackendError> {
            Err(BackendError::Unavailable("no bucket".into()))
        }
    }

    #[async_trait]
    impl ObjectStore for NoBucket {
        fn bucket(&self) -> &str {
            "missing"
        }
        async fn ensure_bucket(&self) -> Result<bool, BackendError> {
            Err(BackendError::Unavailable("connection refused".into()))
        }
        async fn list_objects(&self) -> Result<Vec<ObjectInfo>, BackendError> {
            Err(BackendError::Unavailable("no bucket".into()))
        }
    }

    #[tokio::test]
    async fn build_creates_the_bucket() {
        let (cache, objects) = stores();
        let app = AppBuilder::new(cache, objects.clone()).build().await.unwrap();
        assert!(!app.has_sweeper());
        // 2 回目の ensure は「既に存在」
        assert!(!objects.ensure_bucket().await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_durable_backend_is_fatal() {
        let result = AppBuilder::new(Arc::new(InMemoryCache::new()), Arc::new(NoBucket))
            .build()
            .await;
        assert!(matches!(
            result,
            Err(SetupError::Backend { backend: MemoryType::Durable, .. })
        ));
    }

    #[tokio::test]
    async fn swapped_backends_are_rejected() {
        let (_, objects) = stores();
        let result = AppBuilder::new(objects.clone(), objects).build().await;
        assert!(matches!(result, Err(SetupError::Config(_))));
    }

    #[tokio::test]
    async fn missing_topics_are_reported() {
        let (cache, objects) = stores();
        let (_tx, source) = frame_channel(1);
        let result = AppBuilder::new(cache, objects)
            .topic("cam-a", Box::new(source))
            .expect_topics(&["cam-a", "cam-b"])
            .build()
            .await;
        assert!(matches!(
            result,
            Err(SetupError::MissingTopics(missing)) if missing == vec!["cam-b".to_string()]
        ));
    }

    #[tokio::test]
    async fn duplicate_topics_are_reported() {
        let (cache, objects) = stores();
        let (_tx1, first) = frame_channel(1);
        let (_tx2, second) = frame_channel(1);
        let result = AppBuilder::new(cache, objects)
            .topic("cam", Box::new(first))
            .topic("cam", Box::new(second))
            .build()
            .await;
        assert!(matches!(result, Err(SetupError::DuplicateTopic(topic)) if topic == "cam"));
    }

    #[tokio::test]
    async fn started_app_serves_requests_and_topics() {
        let (cache, objects) = stores();
        let (client, transport) = request_channel(4);
        let (publisher, source) = frame_channel(4);
        let app = AppBuilder::new(cache, objects)
            .request_transport(Box::new(transport))
            .topic("cam", Box::new(source))
            .expect_topics(&["cam"])
            .build()
            .await
            .unwrap();
        let facade = app.facade();
        let stats = app.ingest_stats("cam").unwrap();
        let tasks = app.start();
        assert_eq!(tasks.len(), 2);

        let reply = client
            .send_command(&Command::Store {
                handle: Handle::new("frame-1"),
                blob: Bytes::from_static(b"jpeg"),
            })
            .await
            .unwrap();
        assert_eq!(reply, Response::stored(&Handle::new("frame-1")));

        publisher.send(Frame::new(Bytes::from_static(b"live"))).await.unwrap();
        for _ in 0..1000 {
            if stats.snapshot().stored == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(facade.read(&Handle::new("cam")).await.unwrap(), Bytes::from_static(b"live"));

        tasks.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn sweeper_runs_a_cold_start_cycle() {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let objects = Arc::new(InMemoryObjectStore::new("b", clock.clone()));
        objects.put(&Handle::new("stale"), Bytes::from_static(b"x")).await.unwrap();
        clock.advance(Duration::from_secs(7200));

        let settings = RuntimeSettings {
            retention: RetentionPolicy::new(
                Ttl::Finite(Duration::from_secs(3600)),
                Duration::from_secs(3600),
            ),
            ..RuntimeSettings::default()
        };
        let app = AppBuilder::new(Arc::new(InMemoryCache::new()), objects.clone())
            .settings(settings)
            .clock(clock)
            .build()
            .await
            .unwrap();
        assert!(app.has_sweeper());
        let tasks = app.start();

        for _ in 0..1000 {
            if objects.is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(objects.is_empty().await);

        tasks.shutdown_and_join().await;
    }
}
