//! Chunked transfer codec
//!
//! 巨大な blob を上限付きフレームの transport に流すための encode/decode。
//! 状態は 1 回の transfer 分だけ。
//!
//! - chunker: blob → 遅延評価の chunk 列（最後以外はちょうど chunk_size）
//! - assembler: chunk 列 → blob（end-of-stream で初めて完成、途中エラーなら破棄）

pub mod assembler;
pub mod chunker;

pub use self::assembler::{ChunkAssembler, assemble};
pub use self::chunker::{Chunks, chunk_stream, chunks};

/// Default chunk size of clients: just under 4 MiB so a chunk plus
/// its framing fits a 4 MiB message limit.
pub const DEFAULT_CHUNK_SIZE: usize = 4095 * 1024;

pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;
