//! RetentionSweeper - durable backend の TTL 掃除
//!
//! # フロー
//! 1. Listing: durable backend の全 object のメタデータを取得
//! 2. Evaluating: `age = now - last_modified` が ttl を超えたものを選ぶ
//! 3. Deleting: 一括削除（key ごとの結果は独立）
//! 4. Idle に戻り、次の tick を待つ
//!
//! 起動直後に 1 回（cold-start cleanup）、以後 poll_interval ごとに実行します。
//! listing の失敗はそのサイクルだけを中断し、Sweeper 自体は止まりません。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::domain::{Handle, RetentionPolicy};
use crate::ports::{Clock, ObjectStore};

pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound of each single delete in the Deleting phase.
pub const DEFAULT_DELETE_TIMEOUT: Duration = Duration::from_secs(1);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    Listing,
    Evaluating,
    Deleting,
}

/// Outcome of one sweep cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub listed: usize,
    pub expired: usize,
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("listing bucket {bucket} failed: {reason}")]
    Listing { bucket: String, reason: String },
}

pub struct RetentionSweeper {
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    policy: RetentionPolicy,
    list_timeout: Duration,
    delete_timeout: Duration,
    state: watch::Sender<SweepState>,
}

impl RetentionSweeper {
    /// Returns `None` when the ttl is infinite: the sweeper never starts.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
        policy: RetentionPolicy,
    ) -> Option<Self> {
        if !policy.is_enabled() {
            return None;
        }
        let (state, _) = watch::channel(SweepState::Idle);
        Some(Self {
            store,
            clock,
            policy,
            list_timeout: DEFAULT_LIST_TIMEOUT,
            delete_timeout: DEFAULT_DELETE_TIMEOUT,
            state,
        })
    }

    pub fn with_list_timeout(mut self, list_timeout: Duration) -> Self {
        self.list_timeout = list_timeout;
        self
    }

    pub fn with_delete_timeout(mut self, delete_timeout: Duration) -> Self {
        self.delete_timeout = delete_timeout;
        self
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SweepState> {
        self.state.subscribe()
    }

    /// Run one list-evaluate-delete cycle.
    pub async fn sweep_once(&self) -> Result<SweepReport, SweepError> {
        let result = self.sweep_cycle().await;
        self.state.send_replace(SweepState::Idle);
        result
    }

    async fn sweep_cycle(&self) -> Result<SweepReport, SweepError> {
        self.state.send_replace(SweepState::Listing);
        let listing = match timeout(self.list_timeout, self.store.list_objects()).await {
            Ok(Ok(listing)) => listing,
            Ok(Err(e)) => {
                return Err(SweepError::Listing {
                    bucket: self.store.bucket().to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(SweepError::Listing {
                    bucket: self.store.bucket().to_string(),
                    reason: format!("timed out after {:?}", self.list_timeout),
                });
            }
        };

        self.state.send_replace(SweepState::Evaluating);
        let now = self.clock.now();
        let expired: Vec<Handle> = listing
            .iter()
            .filter(|object| {
                let age = now - object.last_modified;
                let expired = self.policy.is_expired(age);
                if expired {
                    debug!(handle = %object.handle, age_secs = age.num_seconds(), "deleting expired object");
                } else {
                    trace!(handle = %object.handle, age_secs = age.num_seconds(), "keeping object");
                }
                expired
            })
            .map(|object| object.handle.clone())
            .collect();

        let mut report = SweepReport {
            listed: listing.len(),
            expired: expired.len(),
            ..SweepReport::default()
        };
        if expired.is_empty() {
            return Ok(report);
        }

        self.state.send_replace(SweepState::Deleting);
        let failures = self
            .store
            .remove_objects(expired, self.delete_timeout)
            .await;
        for failure in &failures {
            warn!(handle = %failure.handle, reason = %failure.reason, "failed to remove expired object");
        }
        report.failed = failures.len();
        report.deleted = report.expired - report.failed;
        Ok(report)
    }

    /// Sweep immediately, then every `poll_interval` until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let poll_interval = self.policy.poll_interval.max(MIN_POLL_INTERVAL);
        info!(bucket = %self.store.bucket(), ?poll_interval, "running retention policy");

        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.sweep_once().await {
                Ok(report) if report.expired > 0 => info!(?report, "retention sweep finished"),
                Ok(report) => debug!(?report, "retention sweep finished"),
                Err(e) => warn!(error = %e, "retention sweep aborted, retrying on next tick"),
            }
        }
        info!("retention sweeper stopped");
    }
}
