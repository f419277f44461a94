//! TaskGroup - 長時間動くループの監督
//!
//! Sweeper / Dispatcher / topic ごとの Ingestion ループをまとめて持ちます。
//! - `request_shutdown()` で CancellationToken をキャンセル
//! - `shutdown_and_join()` で全タスクがキャンセルを観測して終わるまで待つ

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Supervised set of long-running tasks sharing one cancellation token.
#[derive(Default)]
pub struct TaskGroup {
    cancel: CancellationToken,
    joins: Vec<(String, JoinHandle<()>)>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task. The closure receives the group's token and must return
    /// once the token is cancelled.
    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        debug!(task = %name, "spawning task");
        let join = tokio::spawn(task(self.cancel.clone()));
        self.joins.push((name, join));
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.joins.iter().map(|(name, _)| name.as_str())
    }

    /// Request shutdown for all tasks. In-flight backend calls are not interrupted;
    /// each loop stops before waiting for its next input.
    pub fn request_shutdown(&self) {
        self.cancel.cancel();
    }

    /// Shutdown and wait for all tasks.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for (name, join) in self.joins {
            match join.await {
                Ok(()) => debug!(task = %name, "task stopped"),
                Err(e) => error!(task = %name, error = %e, "task ended abnormally"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn shutdown_waits_for_every_task() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let mut group = TaskGroup::new();

        for i in 0..3 {
            let stopped = stopped.clone();
            group.spawn(format!("task-{i}"), move |cancel| async move {
                cancel.cancelled().await;
                stopped.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(group.len(), 3);
        assert_eq!(group.names().collect::<Vec<_>>(), ["task-0", "task-1", "task-2"]);

        group.shutdown_and_join().await;
        assert_eq!(stopped.load(Ordering::SeqCst), 3);
    }

    async fn explode() {
        panic!("boom")
    }

    #[tokio::test]
    async fn panicking_task_does_not_block_shutdown() {
        let mut group = TaskGroup::new();
        group.spawn("boom", |_cancel| explode());
        group.spawn("quiet", |cancel| async move { cancel.cancelled().await });

        group.shutdown_and_join().await;
    }
}
