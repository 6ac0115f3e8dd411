//! One WebSocket connection attempt and its read/write loop.
//!
//! Each [`SocketLink`] owns a background task that performs the handshake and then pumps frames
//! in both directions. The task reports back through an [`EventSink`] it only holds weakly, so a
//! dropped manager is never kept alive by its own socket.

use std::sync::Weak;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, timeout};
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::{CancellationToken, DropGuard};

use super::codec::{Codec, Frame, Payload};
use super::error::WsError;
use super::machine::{Event, SocketId, close_code};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// How long to wait for the peer to finish a closing handshake it started.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Receiver of socket task outcomes.
pub(crate) trait EventSink: Send + Sync + 'static {
    /// Feed a lifecycle event into the state machine.
    fn dispatch(&self, event: Event);

    /// Hand an application payload from `socket` to consumers.
    fn deliver(&self, socket: SocketId, payload: Payload);
}

/// Frames queued for the socket's writer.
#[derive(Debug)]
pub(crate) enum Outbound {
    Message(Message),
    Heartbeat,
    /// The peer stopped answering keep-alive frames; abandon the socket
    KeepAliveMissed,
    Close { code: u16, reason: &'static str },
}

/// Handle to a live (or still handshaking) socket task.
///
/// Dropping the link cancels the handshake if it is still in flight, or closes an open socket
/// with a normal closure once any queued frames have been written.
#[derive(Debug)]
pub(crate) struct SocketLink {
    tx: mpsc::UnboundedSender<Outbound>,
    replies: watch::Receiver<Instant>,
    _guard: DropGuard,
}

impl SocketLink {
    pub(crate) fn open<S: EventSink>(
        runtime: &Handle,
        id: SocketId,
        request: Request,
        codec: Codec,
        ping: String,
        sink: Weak<S>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (reply_tx, replies) = watch::channel(Instant::now());
        let token = CancellationToken::new();

        runtime.spawn(run(
            SocketTask {
                id,
                codec,
                ping,
                sink,
                reply_tx,
            },
            request,
            rx,
            token.clone(),
        ));

        Self {
            tx,
            replies,
            _guard: token.drop_guard(),
        }
    }

    /// Queue a frame; `false` once the socket task has stopped writing.
    pub(crate) fn send(&self, outbound: Outbound) -> bool {
        self.tx.send(outbound).is_ok()
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<Outbound> {
        self.tx.clone()
    }

    /// Arrival time of the latest keep-alive reply. Closed once the socket task ends.
    pub(crate) fn keep_alive_replies(&self) -> watch::Receiver<Instant> {
        self.replies.clone()
    }

    /// Close with `code`, then release the link.
    pub(crate) fn close(self, code: u16, reason: &'static str) {
        _ = self.send(Outbound::Close { code, reason });
    }
}

struct SocketTask<S> {
    id: SocketId,
    codec: Codec,
    ping: String,
    sink: Weak<S>,
    reply_tx: watch::Sender<Instant>,
}

impl<S: EventSink> SocketTask<S> {
    fn emit(&self, event: Event) {
        if let Some(sink) = self.sink.upgrade() {
            sink.dispatch(event);
        }
    }

    fn fail(&self, error: tokio_tungstenite::tungstenite::Error) -> (u16, String) {
        let reason = error.to_string();
        self.emit(Event::Errored {
            socket: self.id,
            error: WsError::Connection(error).into(),
        });
        (close_code::ABNORMAL, reason)
    }

    fn receive(&self, frame: Frame) {
        match frame {
            Frame::Data(payload) => {
                if let Some(sink) = self.sink.upgrade() {
                    sink.deliver(self.id, payload);
                }
            }
            Frame::KeepAlive => {
                #[cfg(feature = "tracing")]
                tracing::trace!(socket = self.id, "Keep-alive reply received");
                self.reply_tx.send_replace(Instant::now());
            }
        }
    }
}

async fn run<S: EventSink>(
    task: SocketTask<S>,
    request: Request,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        () = cancel.cancelled() => return,
        result = connect_async(request) => result,
    };

    let ws_stream = match connected {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(socket = task.id, error = %e, "Unable to connect");
            let (code, reason) = task.fail(e);
            task.emit(Event::Closed {
                socket: task.id,
                code,
                reason,
            });
            return;
        }
    };

    task.emit(Event::Opened { socket: task.id });
    let (mut write, mut read) = ws_stream.split();

    let (code, reason) = loop {
        tokio::select! {
            // Drain queued frames (including a requested close) before honouring cancellation
            biased;

            outbound = rx.recv() => {
                let message = match outbound {
                    Some(Outbound::Message(message)) => message,
                    Some(Outbound::Heartbeat) => Message::Text(task.ping.clone().into()),
                    Some(Outbound::KeepAliveMissed) => {
                        break (close_code::ABNORMAL, "keep-alive reply timed out".to_owned());
                    }
                    Some(Outbound::Close { code, reason }) => {
                        close(&mut write, code, reason).await;
                        return;
                    }
                    None => {
                        close(&mut write, close_code::NORMAL, "client dropped").await;
                        return;
                    }
                };

                if let Err(e) = write.send(message).await {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(socket = task.id, error = %e, "WebSocket write failed");
                    break task.fail(e);
                }
            }

            () = cancel.cancelled() => {
                close(&mut write, close_code::NORMAL, "client disconnect").await;
                return;
            }

            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(socket = task.id, %text, "Received WebSocket text message");
                    task.receive(task.codec.decode_text(text.as_str()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    task.receive(task.codec.decode_binary(&bytes));
                }
                Some(Ok(Message::Close(frame))) => {
                    acknowledge_close(&mut write, &mut read).await;
                    break frame.map_or_else(
                        || (close_code::NO_STATUS, String::new()),
                        |frame| (u16::from(frame.code), frame.reason.as_str().to_owned()),
                    );
                }
                Some(Ok(_)) => {
                    // Protocol-level ping/pong is answered by tungstenite itself
                }
                Some(Err(e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(socket = task.id, error = %e, "WebSocket read failed");
                    break task.fail(e);
                }
                None => break (close_code::ABNORMAL, "connection dropped".to_owned()),
            }
        }
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(socket = task.id, code, %reason, "WebSocket closed");
    task.emit(Event::Closed {
        socket: task.id,
        code,
        reason,
    });
}

/// Finish a closing handshake started by the peer.
///
/// tungstenite queues the close reply on receipt but only writes it on the next flush.
async fn acknowledge_close(write: &mut WsSink, read: &mut WsSource) {
    if let Err(e) = write.flush().await {
        #[cfg(feature = "tracing")]
        tracing::debug!(error = %e, "Close reply not delivered");
        #[cfg(not(feature = "tracing"))]
        let _ = &e;
    }

    // A peer that keeps the transport open past the grace period is simply abandoned
    _ = timeout(CLOSE_GRACE, async {
        while let Some(Ok(_)) = read.next().await {}
    })
    .await;
}

async fn close(write: &mut WsSink, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: Utf8Bytes::from_static(reason),
    };

    if let Err(e) = write.send(Message::Close(Some(frame))).await {
        #[cfg(feature = "tracing")]
        tracing::debug!(error = %e, "Close frame not delivered");
        #[cfg(not(feature = "tracing"))]
        let _ = &e;
    }
}
