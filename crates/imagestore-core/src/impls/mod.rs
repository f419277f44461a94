//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryCache**: volatile backend
//! - **InMemoryObjectStore**: テスト用の durable backend
//! - **LocalObjectStore**: ローカルディレクトリ上の durable backend
//! - **channel_transport**: プロセス内の request/response と topic
//! - **nats**: NATS 上の request/response と topic

pub mod channel_transport;
pub mod inmem_cache;
pub mod inmem_object_store;
pub mod local_object_store;
pub mod nats;

// 主要な型を再エクスポート
pub use self::channel_transport::{
    ChannelFrameSource, ChannelRequestTransport, RequestClient, frame_channel, request_channel,
};
pub use self::inmem_cache::InMemoryCache;
pub use self::inmem_object_store::InMemoryObjectStore;
pub use self::local_object_store::{DEFAULT_BUCKET, DEFAULT_REGION, LocalObjectStore};
pub use self::nats::{NatsFrameSource, NatsRequestTransport};
