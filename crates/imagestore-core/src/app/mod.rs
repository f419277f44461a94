//! App - アプリケーション層
//!
//! ports を組み合わせて、長時間動くループとその起動を実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: backend・transport・topic のワイヤリングと起動時検証
//! - **RetentionSweeper**: durable backend の TTL 掃除（timer 駆動）
//! - **CommandDispatcher**: request/response ループ
//! - **IngestionManager**: topic ごとの受信ループ
//! - **TaskGroup**: 上記ループの監督とシャットダウン

pub mod builder;
pub mod dispatcher;
pub mod ingestion;
pub mod sweeper;
pub mod task_group;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder};
pub use self::dispatcher::{CommandDispatcher, CommandHandler};
pub use self::ingestion::{IngestStats, IngestionManager};
pub use self::sweeper::{RetentionSweeper, SweepError, SweepReport, SweepState};
pub use self::task_group::TaskGroup;
