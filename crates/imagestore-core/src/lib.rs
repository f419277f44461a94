//! imagestore-core
//!
//! Image blob gateway over a volatile cache and a durable object store.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（Handle, MemoryType, RetentionPolicy, messages, errors）
//! - **ports**: 抽象化レイヤー（BlobBackend, ObjectStore, Clock, RequestTransport, FrameSource）
//! - **codec**: chunked transfer の encode/decode
//! - **facade**: Store / Read / Remove のルーティング（StoreFacade）
//! - **transfer**: chunk ストリーム上の Store / Read / Remove
//! - **app**: 長時間動くループ（sweeper, dispatcher, ingestion）と builder
//! - **impls**: 実装（in-memory, local filesystem, channel, NATS）
//! - **config**: CLI 引数と型付き設定
//! - **observability**: ログ初期化と運用カウンタ

pub mod app;
pub mod codec;
pub mod config;
pub mod domain;
pub mod facade;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod transfer;
