//! Domain model (handles, memory types, errors, retention, messages).
//!
//! - handle: Handle（blob の不透明な識別子）
//! - memory_type: MemoryType（Volatile / Durable の選択と lookup 順）
//! - errors: StoreError / TransportError / SetupError と ErrorKind 分類
//! - retention: RetentionPolicy（TTL と poll 間隔）
//! - message: Dispatcher の request/response メッセージ

pub mod errors;
pub mod handle;
pub mod memory_type;
pub mod message;
pub mod retention;

pub use self::errors::{BackendError, ErrorKind, SetupError, StoreError, TransportError};
pub use self::handle::Handle;
pub use self::memory_type::MemoryType;
pub use self::message::{Command, RequestError, Response};
pub use self::retention::{RetentionPolicy, Ttl};
