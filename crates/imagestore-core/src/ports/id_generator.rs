//! HandleGenerator port - handle 生成の抽象化
//!
//! 呼び出し側が key を渡さない Store では、Facade がここで新しい handle を作ります。
//! テスト容易性のために、trait として抽象化しています。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::Handle;
use crate::ports::Clock;
use ulid::Ulid;

/// HandleGenerator は分散システムで使える handle を生成
///
/// # ULID の特性
/// - 時刻でソート可能
/// - 分散環境で生成可能（調整不要）
/// - 128-bit（UUID 互換）
///
/// # Thread Safety
/// - `Send + Sync` を要求（Dispatcher と Ingestion から同時に使われる）
pub trait HandleGenerator: Send + Sync {
    fn generate(&self) -> Handle;
}

/// UlidGenerator は ULID ベースの handle 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// これにより、テスト時に FixedClock を使って timestamp 部分を固定できます。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> HandleGenerator for UlidGenerator<C> {
    fn generate(&self) -> Handle {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        Handle::new(ulid.to_string())
    }
}
