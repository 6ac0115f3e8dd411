#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use resilient_ws::ws::{Callbacks, ConnectionManager, ConnectionStatus, Payload, WsError};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

pub const PING: &str = r#"{"type":"ping"}"#;
pub const PONG: &str = r#"{"type":"pong"}"#;

/// Instruction pushed to every live server-side connection.
#[derive(Debug, Clone)]
pub enum Command {
    Text(String),
    Close(u16),
    /// Drop the TCP stream without a closing handshake
    Drop,
}

/// Mock WebSocket server.
///
/// Replies to keep-alive pings with a pong, reports every text frame and close code it receives,
/// and forwards [`Command`]s to all connected clients.
pub struct MockWsServer {
    addr: SocketAddr,
    command_tx: broadcast::Sender<Command>,
    received_rx: mpsc::UnboundedReceiver<String>,
    closes_rx: mpsc::UnboundedReceiver<Option<u16>>,
    accepted: Arc<AtomicUsize>,
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (command_tx, _) = broadcast::channel::<Command>(100);
        let (received_tx, received_rx) = mpsc::unbounded_channel::<String>();
        let (closes_tx, closes_rx) = mpsc::unbounded_channel::<Option<u16>>();
        let accepted = Arc::new(AtomicUsize::new(0));

        let commands = command_tx.clone();
        let counter = Arc::clone(&accepted);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);

                // Subscribe before the handshake so a command sent once the client is open is
                // never missed
                let command_rx = commands.subscribe();
                tokio::spawn(serve(
                    stream,
                    command_rx,
                    received_tx.clone(),
                    closes_tx.clone(),
                ));
            }
        });

        Self {
            addr,
            command_tx,
            received_rx,
            closes_rx,
            accepted,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Number of TCP connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn send(&self, text: &str) {
        _ = self.command_tx.send(Command::Text(text.to_owned()));
    }

    pub fn close(&self, code: u16) {
        _ = self.command_tx.send(Command::Close(code));
    }

    pub fn drop_connections(&self) {
        _ = self.command_tx.send(Command::Drop);
    }

    /// Receive the next text frame sent by a client.
    pub async fn recv(&mut self) -> Option<String> {
        timeout(Duration::from_secs(2), self.received_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Receive the next non-keep-alive text frame sent by a client.
    pub async fn recv_data(&mut self) -> Option<String> {
        loop {
            let text = self.recv().await?;
            if text != PING {
                return Some(text);
            }
        }
    }

    /// Receive the close code of the next close frame sent by a client, whether it started the
    /// closing handshake or answered one.
    pub async fn recv_close(&mut self) -> Option<Option<u16>> {
        timeout(Duration::from_secs(2), self.closes_rx.recv())
            .await
            .ok()
            .flatten()
    }
}

async fn serve(
    stream: TcpStream,
    mut command_rx: broadcast::Receiver<Command>,
    received_tx: mpsc::UnboundedSender<String>,
    closes_tx: mpsc::UnboundedSender<Option<u16>>,
) {
    let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str() == PING
                            && write.send(Message::Text(PONG.into())).await.is_err()
                        {
                            break;
                        }
                        _ = received_tx.send(text.to_string());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        _ = closes_tx.send(frame.map(|frame| u16::from(frame.code)));
                        break;
                    }
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
            command = command_rx.recv() => {
                match command {
                    Ok(Command::Text(text)) => {
                        if write.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Ok(Command::Close(code)) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: "server closing".into(),
                        };
                        if write.send(Message::Close(Some(frame))).await.is_err() {
                            break;
                        }

                        // Record the client's reply to complete the closing handshake
                        let reply = timeout(Duration::from_secs(2), async {
                            loop {
                                match read.next().await {
                                    Some(Ok(Message::Close(frame))) => return Some(frame),
                                    Some(Ok(_)) => {}
                                    _ => return None,
                                }
                            }
                        })
                        .await;
                        if let Ok(Some(frame)) = reply {
                            _ = closes_tx.send(frame.map(|frame| u16::from(frame.code)));
                        }
                        break;
                    }
                    Ok(Command::Drop) | Err(_) => break,
                }
            }
        }
    }
}

/// A listener that accepts TCP connections but never answers the WebSocket handshake.
pub async fn stalled_listener() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    addr
}

/// An address nothing is listening on.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    format!("ws://{addr}/ws")
}

/// Callback invocation, as observed by a [`Recorder`].
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Open,
    Message(Payload),
    Close(u16, String),
    Error(String),
    Exhausted,
}

/// Records every callback invocation in order.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    records: Arc<Mutex<Vec<Record>>>,
}

impl Recorder {
    pub fn callbacks(&self) -> Callbacks {
        let open = self.clone();
        let message = self.clone();
        let close = self.clone();
        let error = self.clone();

        Callbacks::new()
            .on_open(move || open.push(Record::Open))
            .on_message(move |payload| message.push(Record::Message(payload.clone())))
            .on_close(move |code, reason| close.push(Record::Close(code, reason.to_owned())))
            .on_error(move |e| {
                if matches!(
                    e.downcast_ref::<WsError>(),
                    Some(WsError::ReconnectExhausted { .. })
                ) {
                    error.push(Record::Exhausted);
                } else {
                    error.push(Record::Error(e.to_string()));
                }
            })
    }

    fn push(&self, record: Record) {
        self.records.lock().unwrap().push(record);
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    pub fn count<F: Fn(&Record) -> bool>(&self, predicate: F) -> usize {
        self.records().iter().filter(|record| predicate(record)).count()
    }

    pub fn closes(&self) -> Vec<u16> {
        self.records()
            .iter()
            .filter_map(|record| match record {
                Record::Close(code, _) => Some(*code),
                _ => None,
            })
            .collect()
    }

    /// Poll until `predicate` holds for the recorded callbacks.
    pub async fn wait_until<F: Fn(&[Record]) -> bool>(&self, predicate: F) {
        timeout(Duration::from_secs(5), async {
            while !predicate(&self.records()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}

/// Wait until the connection reports `status`.
pub async fn wait_for_status(connection: &ConnectionManager, status: ConnectionStatus) {
    let mut rx = connection.status_receiver();
    timeout(Duration::from_secs(5), rx.wait_for(|current| *current == status))
        .await
        .unwrap()
        .unwrap();
}
