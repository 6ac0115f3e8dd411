//! Inbound frame decoding and outbound payload encoding.
//!
//! Decoding never fails: text that is not JSON is delivered as [`Payload::Text`], binary data
//! as [`Payload::Binary`]. Keep-alive replies are recognised here so they never reach
//! consumers.

use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

use super::config::KeepAlive;

/// Application data received from the server.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Text frame that parsed as JSON
    Json(Value),
    /// Text frame that did not parse as JSON, unchanged
    Text(String),
    /// Binary frame, unchanged
    Binary(Vec<u8>),
}

impl Payload {
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Result of decoding a single inbound frame.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Heartbeat reply; transport bookkeeping only
    KeepAlive,
    /// Application data for consumers
    Data(Payload),
}

/// Decodes text as JSON, falling back to the raw text.
#[must_use]
pub fn decode(text: &str) -> Payload {
    serde_json::from_str(text).map_or_else(|_| Payload::Text(text.to_owned()), Payload::Json)
}

/// Frame decoder aware of the configured keep-alive reply.
#[derive(Debug, Clone)]
pub struct Codec {
    pong: String,
    /// `type` field of the reply when the reply is itself a JSON object
    pong_type: Option<String>,
}

impl Codec {
    #[must_use]
    pub fn new(keep_alive: &KeepAlive) -> Self {
        let pong_type = serde_json::from_str::<Value>(&keep_alive.pong)
            .ok()
            .and_then(|value| message_type(&value).map(str::to_owned));

        Self {
            pong: keep_alive.pong.trim().to_owned(),
            pong_type,
        }
    }

    #[must_use]
    pub fn decode_text(&self, text: &str) -> Frame {
        if text.trim() == self.pong {
            return Frame::KeepAlive;
        }

        let payload = decode(text);
        if let Payload::Json(value) = &payload
            && self.pong_type.is_some()
            && message_type(value) == self.pong_type.as_deref()
        {
            return Frame::KeepAlive;
        }

        Frame::Data(payload)
    }

    #[must_use]
    pub fn decode_binary(&self, bytes: &[u8]) -> Frame {
        Frame::Data(Payload::Binary(bytes.to_vec()))
    }
}

fn message_type(value: &Value) -> Option<&str> {
    value.as_object()?.get("type")?.as_str()
}

/// Payload accepted by [`ConnectionManager::send`](super::ConnectionManager::send).
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// Written as a text frame unchanged
    Text(String),
    /// Serialized to JSON text
    Json(Value),
    /// Written as a binary frame
    Binary(Vec<u8>),
}

impl Outgoing {
    pub(crate) fn into_message(self) -> Message {
        match self {
            Self::Text(text) => Message::Text(text.into()),
            Self::Json(value) => Message::Text(value.to_string().into()),
            Self::Binary(bytes) => Message::Binary(bytes.into()),
        }
    }
}

impl From<String> for Outgoing {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Outgoing {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Value> for Outgoing {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Vec<u8>> for Outgoing {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}
