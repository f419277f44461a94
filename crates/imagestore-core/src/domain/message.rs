//! Dispatcher messages - request/response のワイヤ形式
//!
//! ワイヤ上は `{Command, ImageHandle, Blob}` の JSON ですが、
//! 内部では command ごとに必要なフィールドだけを持つ `Command` enum に変換します。
//! 変換時にすべての検証を済ませるので、Dispatcher は map を引き回しません。
//!
//! `Blob` は base64 文字列で書き出します。読むときは base64 文字列とバイト配列の両方を受け付けます。

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::handle::Handle;

/// Raw wire shape of a request. Every field is optional here; `Command::decode`
/// decides what is actually required.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RequestMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "blob")]
    blob: Option<Vec<u8>>,
}

/// A validated dispatcher command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Read { handle: Handle },
    /// An empty `handle` asks the facade to generate one.
    Store { handle: Handle, blob: Bytes },
}

/// Why a request could not be turned into a `Command`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("empty blob in Store request")]
    EmptyBlob,

    #[error("Invalid Command {0}")]
    InvalidCommand(String),
}

impl Command {
    pub const READ: &'static str = "Read";
    pub const STORE: &'static str = "Store";

    pub fn decode(payload: &[u8]) -> Result<Self, RequestError> {
        let message: RequestMessage =
            serde_json::from_slice(payload).map_err(|e| RequestError::Malformed(e.to_string()))?;

        let command = message.command.ok_or(RequestError::MissingField("Command"))?;
        match command.as_str() {
            Self::READ => {
                let handle = message
                    .image_handle
                    .ok_or(RequestError::MissingField("ImageHandle"))?;
                Ok(Command::Read {
                    handle: Handle::new(handle),
                })
            }
            Self::STORE => {
                let handle = message
                    .image_handle
                    .ok_or(RequestError::MissingField("ImageHandle"))?;
                let blob = message.blob.ok_or(RequestError::MissingField("Blob"))?;
                if blob.is_empty() {
                    return Err(RequestError::EmptyBlob);
                }
                Ok(Command::Store {
                    handle: Handle::new(handle),
                    blob: Bytes::from(blob),
                })
            }
            _ => Err(RequestError::InvalidCommand(command)),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let message = match self {
            Command::Read { handle } => RequestMessage {
                command: Some(Self::READ.to_string()),
                image_handle: Some(handle.to_string()),
                blob: None,
            },
            Command::Store { handle, blob } => RequestMessage {
                command: Some(Self::STORE.to_string()),
                image_handle: Some(handle.to_string()),
                blob: Some(blob.to_vec()),
            },
        };
        serde_json::to_vec(&message)
    }
}

/// Dispatcher reply: `{ImageHandle, [Blob]}` on success, `{Error}` on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Success {
        #[serde(rename = "ImageHandle")]
        handle: String,
        #[serde(
            rename = "Blob",
            default,
            skip_serializing_if = "Option::is_none",
            with = "blob"
        )]
        blob: Option<Vec<u8>>,
    },
    Failure {
        #[serde(rename = "Error")]
        error: String,
    },
}

impl Response {
    pub fn stored(handle: &Handle) -> Self {
        Response::Success {
            handle: handle.to_string(),
            blob: None,
        }
    }

    pub fn read(handle: &Handle, blob: &[u8]) -> Self {
        Response::Success {
            handle: handle.to_string(),
            blob: Some(blob.to_vec()),
        }
    }

    pub fn error(message: impl ToString) -> Self {
        Response::Failure {
            error: message.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Failure { .. })
    }

    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// Serde adapter for the optional `Blob` field.
mod blob {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Base64(String),
        Bytes(Vec<u8>),
    }

    pub fn serialize<S: Serializer>(blob: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match blob {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<Repr>::deserialize(deserializer)? {
            Some(Repr::Base64(text)) => STANDARD
                .decode(text)
                .map(Some)
                .map_err(serde::de::Error::custom),
            Some(Repr::Bytes(bytes)) => Ok(Some(bytes)),
            None => Ok(None),
        }
    }
}
