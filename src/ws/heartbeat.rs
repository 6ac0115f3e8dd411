use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval, timeout};

use super::socket::Outbound;
use super::timer::TaskGuard;

/// Periodic keep-alive for one open socket.
///
/// Started once per successful open and stopped by dropping it; the first frame goes out one
/// full interval after the open. Each frame must be answered within the reply timeout, otherwise
/// the socket is told to give up so the connection takes the reconnect path.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    _guard: TaskGuard,
}

impl Heartbeat {
    pub(crate) fn start(
        runtime: &Handle,
        period: Duration,
        reply_timeout: Duration,
        socket_tx: mpsc::UnboundedSender<Outbound>,
        mut replies: watch::Receiver<Instant>,
    ) -> Self {
        let guard = TaskGuard::spawn(runtime, async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                // Mark the current reply as seen so a stale one cannot satisfy this round
                drop(replies.borrow_and_update());

                if socket_tx.send(Outbound::Heartbeat).is_err() {
                    // Socket task has terminated
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Heartbeat stopping, socket writer is gone");
                    break;
                }

                #[cfg(feature = "tracing")]
                tracing::trace!("Heartbeat queued");

                match timeout(reply_timeout, replies.changed()).await {
                    Ok(Ok(())) => {
                        #[cfg(feature = "tracing")]
                        tracing::trace!("Keep-alive answered");
                    }
                    // Socket task has terminated
                    Ok(Err(_)) => break,
                    Err(_) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            "No keep-alive reply within {reply_timeout:?}, abandoning socket"
                        );
                        _ = socket_tx.send(Outbound::KeepAliveMissed);
                        break;
                    }
                }
            }
        });

        Self { _guard: guard }
    }
}
