//! Errors - エラー型と分類
//!
//! - ValidationError: 呼び出し側の入力不備（リトライしない）
//! - BackendError: backend 呼び出しの失敗・not-found（ループは継続）
//! - SetupError: 起動時の致命的エラー（プロセス終了）
//! - SweepError（app::sweeper）: retention の listing 失敗（そのサイクルだけ中断）

use thiserror::Error;

use super::handle::Handle;
use super::memory_type::MemoryType;

/// ErrorKind は StoreError の運用分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Backend,
    Transfer,
}

/// Errors surfaced by the store facade and the transfer service.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("frame of {size} bytes exceeds the maximum frame size of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    #[error("handle not found: {0}")]
    NotFound(Handle),

    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable { backend: MemoryType, reason: String },

    #[error("transfer failed: {0}")]
    TransferFailed(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::FrameTooLarge { .. } | StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::NotFound(_) | StoreError::BackendUnavailable { .. } => ErrorKind::Backend,
            StoreError::TransferFailed(_) => ErrorKind::Transfer,
        }
    }

    pub(crate) fn backend(backend: MemoryType, err: BackendError) -> Self {
        match err {
            BackendError::InvalidKey(key) => {
                StoreError::Validation(format!("handle '{key}' is not a valid {backend} key"))
            }
            other => StoreError::BackendUnavailable {
                backend,
                reason: other.to_string(),
            },
        }
    }
}

/// Failure reported by a backend client.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0}")]
    Unavailable(String),
}

/// Failure of a message transport (request/response, topic, chunk stream).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("send failed: {0}")]
    Send(String),
}

/// Fatal startup error. The binary exits non-zero on any of these.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot reach {backend} backend: {reason}")]
    Backend { backend: MemoryType, reason: String },

    #[error("cannot bind transport: {0}")]
    Transport(String),

    #[error("topic '{0}' is bound twice")]
    DuplicateTopic(String),

    #[error("missing topic bindings: {0:?}. These topics are configured but have no source.")]
    MissingTopics(Vec<String>),
}
