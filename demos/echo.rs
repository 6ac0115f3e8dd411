//! Connect to an echo server, send a few messages and print what comes back.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info cargo run --example echo --features tracing -- wss://ws.postman-echo.com/raw
//! ```

use std::time::Duration;

use futures::StreamExt as _;
use resilient_ws::ws::config::{Config, KeepAlive};
use resilient_ws::ws::{Callbacks, ConnectionManager, ConnectionStatus};
use serde_json::json;
use tokio::time::timeout;
use tracing::{info, warn};

const PING: &str = r#"{"type":"ping"}"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "wss://ws.postman-echo.com/raw".to_owned());

    let config = Config::builder()
        .reconnect_attempts(3)
        .reconnect_interval(Duration::from_secs(1))
        .heartbeat_interval(Duration::from_secs(15))
        // An echo server answers the keep-alive frame with itself
        .keep_alive(KeepAlive::new(PING, PING))
        .build();
    let callbacks = Callbacks::new()
        .on_open(|| info!(event = "open"))
        .on_close(|code, reason| info!(event = "close", code, reason))
        .on_error(|error| warn!(event = "error", %error));

    let connection = ConnectionManager::new(&endpoint, config, callbacks)?;
    let mut messages = Box::pin(connection.messages());

    let mut status = connection.status_receiver();
    timeout(
        Duration::from_secs(10),
        status.wait_for(|status| *status == ConnectionStatus::Open),
    )
    .await??;
    info!(endpoint = %connection.url(), "Connected");

    for n in 1..=3 {
        let sent = connection.send_json(&json!({ "type": "echo", "n": n }));
        info!(n, sent);
    }
    connection.send("plain text survives untouched");

    while let Ok(Some(result)) = timeout(Duration::from_secs(5), messages.next()).await {
        match result {
            Ok(payload) => info!(?payload, "Received"),
            Err(e) => warn!(error = %e, "Stream error"),
        }
    }

    info!(last = ?connection.last_data(), attempts = connection.attempts());
    connection.disconnect();

    Ok(())
}
