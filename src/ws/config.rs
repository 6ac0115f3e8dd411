#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use bon::Builder;

const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_RECONNECT_INTERVAL_DURATION: Duration = Duration::from_millis(3_000);
const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_millis(30_000);
const DEFAULT_HEARTBEAT_TIMEOUT_DURATION: Duration = Duration::from_millis(10_000);
const DEFAULT_CONNECT_TIMEOUT_DURATION: Duration = Duration::from_millis(10_000);
const DEFAULT_MESSAGE_BUFFER: usize = 1024;

const DEFAULT_PING_FRAME: &str = r#"{"type":"ping"}"#;
const DEFAULT_PONG_FRAME: &str = r#"{"type":"pong"}"#;

/// Configuration for [`ConnectionManager`](super::ConnectionManager) behavior.
///
/// Every field has a default, so `Config::default()` and `Config::builder().build()`
/// are equivalent.
///
/// ```
/// use std::time::Duration;
/// use resilient_ws::ws::config::Config;
///
/// let config = Config::builder()
///     .reconnect_attempts(3)
///     .heartbeat_interval(Duration::from_secs(15))
///     .build();
///
/// assert_eq!(config.reconnect_attempts, 3);
/// assert!(config.auto_connect);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Maximum number of consecutive reconnection attempts before giving up
    #[builder(default = DEFAULT_RECONNECT_ATTEMPTS)]
    pub reconnect_attempts: u32,
    /// Base delay for the reconnection backoff
    #[builder(default = DEFAULT_RECONNECT_INTERVAL_DURATION)]
    pub reconnect_interval: Duration,
    /// Interval between keep-alive frames while the connection is open
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL_DURATION)]
    pub heartbeat_interval: Duration,
    /// Time allowed for the server to answer a keep-alive frame before the socket is abandoned
    /// and the reconnect path taken
    #[builder(default = DEFAULT_HEARTBEAT_TIMEOUT_DURATION)]
    pub heartbeat_timeout: Duration,
    /// Maximum time allowed for the opening handshake
    #[builder(default = DEFAULT_CONNECT_TIMEOUT_DURATION)]
    pub connect_timeout: Duration,
    /// Whether construction immediately opens the connection
    #[builder(default = true)]
    pub auto_connect: bool,
    /// Keep-alive frames written and swallowed by the heartbeat
    #[builder(default)]
    pub keep_alive: KeepAlive,
    /// Capacity of the broadcast channel feeding message subscribers
    #[builder(default = DEFAULT_MESSAGE_BUFFER)]
    pub message_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Keep-alive frames exchanged with the server.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAlive {
    /// Text frame written on every heartbeat tick
    pub ping: String,
    /// Text frame the server answers with; never delivered to consumers. It must arrive within
    /// [`Config::heartbeat_timeout`] of each ping
    pub pong: String,
}

impl KeepAlive {
    #[must_use]
    pub fn new<P: Into<String>, Q: Into<String>>(ping: P, pong: Q) -> Self {
        Self {
            ping: ping.into(),
            pong: pong.into(),
        }
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self::new(DEFAULT_PING_FRAME, DEFAULT_PONG_FRAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();

        assert_eq!(config.reconnect_attempts, 5);
        assert_eq!(config.reconnect_interval, Duration::from_secs(3));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(10));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.auto_connect);
        assert_eq!(config.keep_alive.ping, r#"{"type":"ping"}"#);
        assert_eq!(config.keep_alive.pong, r#"{"type":"pong"}"#);
    }

    #[test]
    fn builder_overrides_only_given_fields() {
        let config = Config::builder()
            .heartbeat_interval(Duration::from_secs(15))
            .auto_connect(false)
            .keep_alive(KeepAlive::new("PING", "PONG"))
            .build();

        assert_eq!(config.heartbeat_interval, Duration::from_secs(15));
        assert!(!config.auto_connect);
        assert_eq!(config.keep_alive.pong, "PONG");
        assert_eq!(config.reconnect_attempts, 5);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }
}
