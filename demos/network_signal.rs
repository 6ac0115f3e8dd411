//! Drive a connection from a connectivity feed.
//!
//! The demo flips a `watch` channel between online and offline to show how the manager closes
//! the socket when the host goes offline and reconnects with a fresh budget when it comes back.
//!
//! ```sh
//! RUST_LOG=debug cargo run --example network_signal --features tracing -- wss://ws.postman-echo.com/raw
//! ```

use std::time::Duration;

use resilient_ws::ws::config::Config;
use resilient_ws::ws::{Callbacks, ConnectionManager, NetworkSignal};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "wss://ws.postman-echo.com/raw".to_owned());

    let callbacks = Callbacks::new()
        .on_open(|| info!(event = "open"))
        .on_close(|code, reason| info!(event = "close", code, reason));
    let connection = ConnectionManager::new(&endpoint, Config::default(), callbacks)?;

    let (network_tx, network_rx) = watch::channel(NetworkSignal::Online);
    connection.follow_network(network_rx);

    let mut status = connection.status_receiver();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            info!(status = %current);
        }
    });

    for signal in [NetworkSignal::Offline, NetworkSignal::Online] {
        sleep(Duration::from_secs(3)).await;
        info!(%signal, "Simulating connectivity change");
        network_tx.send_replace(signal);
    }

    sleep(Duration::from_secs(3)).await;
    info!(
        connected = connection.is_connected(),
        since = ?connection.connected_since(),
        attempts = connection.attempts()
    );

    Ok(())
}
