//! MemoryType - 新しい blob をどの backend に置くか
//!
//! 既存の handle は「どの backend が key を持っているか」で暗黙に backend を覚えています。
//! Read/Remove は `LOOKUP_ORDER` の順に backend を問い合わせます。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::StoreError;

/// Backend variant selected by a Store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MemoryType {
    /// Fast memory-resident key-value cache with its own eviction.
    #[default]
    #[serde(rename = "inmemory")]
    Volatile,
    /// Object store, subject to the retention sweeper.
    #[serde(rename = "persistent")]
    Durable,
}

impl MemoryType {
    /// Lookup order for handles whose backend is not known by the caller.
    /// The volatile lookup is the cheap one, so it goes first.
    pub const LOOKUP_ORDER: [MemoryType; 2] = [MemoryType::Volatile, MemoryType::Durable];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Volatile => "inmemory",
            MemoryType::Durable => "persistent",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inmemory" | "volatile" => Ok(MemoryType::Volatile),
            "persistent" | "durable" => Ok(MemoryType::Durable),
            other => Err(StoreError::Validation(format!("unknown memory type '{other}'"))),
        }
    }
}
