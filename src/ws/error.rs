#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// The handshake did not complete within the configured connect timeout
    ConnectTimeout,
    /// Every reconnection attempt in the budget failed
    ReconnectExhausted {
        /// Number of reconnection attempts that were made
        attempts: u32,
    },
    /// The endpoint is not a usable `ws://` or `wss://` URL
    InvalidUrl(String),
    /// Error serializing an outgoing payload
    MessageParse(serde_json::Error),
    /// Subscription stream lagged and missed messages
    Lagged {
        /// Number of messages that were missed
        count: u64,
    },
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::ConnectTimeout => write!(f, "WebSocket handshake timed out"),
            Self::ReconnectExhausted { attempts } => {
                write!(f, "Max reconnection attempts ({attempts}) reached")
            }
            Self::InvalidUrl(url) => write!(f, "Invalid WebSocket URL: {url}"),
            Self::MessageParse(e) => write!(f, "Failed to serialize WebSocket message: {e}"),
            Self::Lagged { count } => write!(f, "Subscription lagged, missed {count} messages"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::MessageParse(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        let kind = match e {
            WsError::InvalidUrl(_) => crate::error::Kind::Validation,
            _ => crate::error::Kind::WebSocket,
        };
        crate::error::Error::with_source(kind, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::Connection(e))
    }
}
