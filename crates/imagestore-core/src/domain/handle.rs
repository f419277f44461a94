//! Handle - blob の不透明な識別子
//!
//! Handle は呼び出し側から見ると単なる文字列です。
//! Facade が生成する場合は ULID、ingestion の場合は topic 名（+ frame key）になります。

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of one stored blob.
///
/// At any instant a handle names at most one live blob in at most one backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Handle for a frame ingested from `topic`.
    ///
    /// A frame without its own key lands in the topic's latest-frame slot.
    pub fn for_topic(topic: &str, frame_key: Option<&str>) -> Self {
        match frame_key {
            Some(key) if !key.is_empty() => Self(format!("{topic}:{key}")),
            _ => Self(topic.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Handle {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Handle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
