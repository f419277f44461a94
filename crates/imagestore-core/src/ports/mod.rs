//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（volatile cache, object store, メッセージ transport）への
//! 狭いインターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - backend client は個別に並行呼び出し安全（`Send + Sync`）
//! - Facade は追加のロックを持たない
//! - 各操作はちょうど 1 つの backend への 1 回の呼び出し

pub mod blob_backend;
pub mod clock;
pub mod frame_source;
pub mod id_generator;
pub mod object_store;
pub mod request_transport;

// 主要な trait を再エクスポート
pub use self::blob_backend::BlobBackend;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::frame_source::{Frame, FrameSource};
pub use self::id_generator::{HandleGenerator, UlidGenerator};
pub use self::object_store::{ObjectInfo, ObjectStore, RemoveObjectError};
pub use self::request_transport::{InboundRequest, ReplySink, RequestTransport};
