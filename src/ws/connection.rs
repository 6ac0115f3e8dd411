#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use async_stream::try_stream;
use futures::Stream;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::callbacks::Callbacks;
use super::codec::{Codec, Outgoing, Payload};
use super::config::Config;
use super::error::WsError;
use super::heartbeat::Heartbeat;
use super::machine::{Action, ConnectionStatus, Event, Machine, Notification, Phase, SocketId};
use super::network::NetworkSignal;
use super::socket::{EventSink, Outbound, SocketLink};
use super::timer::{TaskGuard, schedule};
use crate::Result;
use crate::error::Error;

/// Manages one WebSocket connection: lifecycle, reconnection, heartbeat and connect timeout.
///
/// The manager is the handle consumers hold. Every state change flows through a single
/// lock-protected state machine, so concurrent `connect`/`disconnect` calls, socket events and
/// timer firings are totally ordered. No method blocks; progress is reported through
/// [`Callbacks`], [`status_receiver`](Self::status_receiver) and [`subscribe`](Self::subscribe).
///
/// Dropping the manager disconnects it: all timers are cancelled and a live socket is closed
/// with a normal closure.
///
/// # Example
///
/// ```no_run
/// use resilient_ws::ws::{Callbacks, ConnectionManager, config::Config};
///
/// #[tokio::main]
/// async fn main() -> resilient_ws::Result<()> {
///     let callbacks = Callbacks::new().on_message(|payload| println!("{payload:?}"));
///     let connection = ConnectionManager::new("wss://example.com/ws", Config::default(), callbacks)?;
///
///     let mut status = connection.status_receiver();
///     while status.changed().await.is_ok() {
///         if connection.is_connected() {
///             connection.send(r#"{"type":"subscribe","channel":"tasks"}"#);
///         }
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    url: Url,
    config: Config,
    callbacks: Callbacks,
    codec: Codec,
    runtime: Handle,
    /// Weak self-reference handed to background tasks
    this: Weak<Shared>,
    inner: Mutex<Inner>,
    status_tx: watch::Sender<ConnectionStatus>,
    last_data_tx: watch::Sender<Option<Payload>>,
    broadcast_tx: broadcast::Sender<Payload>,
    /// Cancelled when the manager is dropped; stops detached listeners
    shutdown: CancellationToken,
}

#[derive(Debug)]
struct Inner {
    machine: Machine,
    io: Io,
}

/// Resources owned by the current connection. Clearing a field cancels what it holds.
#[derive(Debug, Default)]
struct Io {
    socket: Option<SocketLink>,
    heartbeat: Option<Heartbeat>,
    reconnect: Option<TaskGuard>,
    connect_timeout: Option<TaskGuard>,
}

/// Work produced while the lock is held: follow-up events, and notifications to deliver once
/// it is released.
struct Effects {
    events: VecDeque<Event>,
    notifications: Vec<Notification>,
}

impl ConnectionManager {
    /// Create a connection manager for `url`.
    ///
    /// Must be called from within a tokio runtime. When [`Config::auto_connect`] is set the first
    /// connection attempt starts immediately.
    ///
    /// # Errors
    ///
    /// A URL that does not parse or is not `ws://`/`wss://` is rejected here with a
    /// [`Kind::Validation`](crate::error::Kind::Validation) error, as are a zero heartbeat
    /// interval, heartbeat timeout or message buffer. Calling outside a tokio runtime returns a
    /// [`Kind::Internal`](crate::error::Kind::Internal) error. A handshake request that cannot be
    /// built from an accepted URL is not an `Err`: it surfaces later as
    /// [`ConnectionStatus::Error`] and one `on_error` callback, with no retry.
    pub fn new(url: &str, config: Config, callbacks: Callbacks) -> Result<Self> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(WsError::InvalidUrl(url.to_string()).into());
        }
        if config.heartbeat_interval.is_zero() {
            return Err(Error::validation("heartbeat interval must be non-zero"));
        }
        if config.heartbeat_timeout.is_zero() {
            return Err(Error::validation("heartbeat timeout must be non-zero"));
        }
        if config.message_buffer == 0 {
            return Err(Error::validation("message buffer must be non-zero"));
        }

        let runtime = Handle::try_current()?;
        let (status_tx, _) = watch::channel(ConnectionStatus::Closed);
        let (last_data_tx, _) = watch::channel(None);
        let (broadcast_tx, _) = broadcast::channel(config.message_buffer);

        let shared = Arc::new_cyclic(|this| Shared {
            url,
            codec: Codec::new(&config.keep_alive),
            inner: Mutex::new(Inner {
                machine: Machine::new(&config),
                io: Io::default(),
            }),
            config,
            callbacks,
            runtime,
            this: this.clone(),
            status_tx,
            last_data_tx,
            broadcast_tx,
            shutdown: CancellationToken::new(),
        });

        let manager = Self { shared };
        if manager.shared.config.auto_connect {
            manager.connect();
        }

        Ok(manager)
    }

    /// Open the connection. No-op while already open or connecting.
    pub fn connect(&self) {
        self.shared.dispatch(Event::Connect);
    }

    /// Close the connection with a normal closure and cancel every pending timer.
    ///
    /// Resets the reconnect budget. Safe to call any number of times from any state.
    pub fn disconnect(&self) {
        self.shared.dispatch(Event::Disconnect);
    }

    /// Disconnect, then connect again with the full reconnect budget restored.
    pub fn reconnect(&self) {
        self.shared.dispatch(Event::Reconnect);
    }

    /// Send a text, JSON or binary payload.
    ///
    /// Returns `false` without side effects unless the connection is open and its writer is
    /// still accepting frames.
    pub fn send<P: Into<Outgoing>>(&self, payload: P) -> bool {
        let inner = self.shared.lock();
        if !inner.machine.status().is_open() {
            return false;
        }

        let outgoing: Outgoing = payload.into();
        inner
            .io
            .socket
            .as_ref()
            .is_some_and(|socket| socket.send(Outbound::Message(outgoing.into_message())))
    }

    /// Serialize `payload` as JSON and send it. Returns `false` if serialization fails.
    pub fn send_json<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        match serde_json::to_string(payload) {
            Ok(text) => self.send(text),
            Err(e) => {
                let error = WsError::MessageParse(e);
                #[cfg(feature = "tracing")]
                tracing::warn!(%error, "Unable to serialize outgoing payload");
                #[cfg(not(feature = "tracing"))]
                let _ = &error;
                false
            }
        }
    }

    /// Feed a host connectivity change into the manager.
    pub fn handle_network_signal(&self, signal: NetworkSignal) {
        self.shared.dispatch(Event::Network(signal));
    }

    /// Follow host connectivity changes published on `signals`.
    ///
    /// The listener stops when the sender is dropped or the manager is dropped. The value
    /// current at the time of the call is not replayed; only subsequent changes are applied.
    pub fn follow_network(&self, mut signals: watch::Receiver<NetworkSignal>) {
        let this = self.shared.this.clone();
        let shutdown = self.shared.shutdown.clone();

        self.shared.runtime.spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    changed = signals.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let signal = *signals.borrow_and_update();
                let Some(shared) = this.upgrade() else {
                    break;
                };

                #[cfg(feature = "tracing")]
                tracing::debug!(%signal, "Network signal received");
                shared.dispatch(Event::Network(signal));
            }
        });
    }

    /// Get the current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status_tx.borrow()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status().is_open()
    }

    /// The most recent payload delivered to consumers, if any.
    #[must_use]
    pub fn last_data(&self) -> Option<Payload> {
        self.shared.last_data_tx.borrow().clone()
    }

    /// When the current connection was opened, if it is open.
    #[must_use]
    pub fn connected_since(&self) -> Option<Instant> {
        match self.shared.lock().machine.phase() {
            Phase::Open { since, .. } => Some(since),
            _ => None,
        }
    }

    /// Reconnect attempts made since the last successful open or manual reset.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.shared.lock().machine.attempts()
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.shared.url
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Subscribe to connection status changes.
    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Subscribe to incoming payloads.
    ///
    /// Each call returns a new independent receiver. Keep-alive replies are never delivered.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Payload> {
        self.shared.broadcast_tx.subscribe()
    }

    /// Incoming payloads as a stream. A slow consumer sees a [`WsError::Lagged`] item and then
    /// continues with the newest payloads.
    pub fn messages(&self) -> impl Stream<Item = Result<Payload>> + use<> {
        let mut rx = self.subscribe();

        try_stream! {
            loop {
                match rx.recv().await {
                    Ok(payload) => yield payload,
                    Err(RecvError::Lagged(n)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Message subscription lagged, missed {n} messages");
                        Err(WsError::Lagged { count: n })?;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
        self.shared.dispatch(Event::Disconnect);
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // No multi-step invariant spans a panic point inside the lock, so a poisoned guard is
        // still consistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, io: &mut Io, action: Action, effects: &mut Effects) {
        match action {
            Action::OpenSocket { socket } => match self.url.as_str().into_client_request() {
                Ok(request) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(socket, url = %self.url, "Opening WebSocket");
                    io.socket = Some(SocketLink::open(
                        &self.runtime,
                        socket,
                        request,
                        self.codec.clone(),
                        self.config.keep_alive.ping.clone(),
                        self.this.clone(),
                    ));
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(error = %e, "Unable to create WebSocket request");
                    effects.events.push_back(Event::Unavailable {
                        socket,
                        error: e.into(),
                    });
                }
            },
            Action::CloseSocket { code, reason } => {
                if let Some(link) = io.socket.take() {
                    link.close(code, reason);
                }
            }
            Action::DropSocket => io.socket = None,
            Action::ArmConnectTimeout { socket } => {
                let this = self.this.clone();
                io.connect_timeout = Some(schedule(
                    &self.runtime,
                    self.config.connect_timeout,
                    move || {
                        if let Some(shared) = this.upgrade() {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(socket, "WebSocket handshake timed out");
                            shared.dispatch(Event::ConnectTimedOut { socket });
                        }
                    },
                ));
            }
            Action::CancelConnectTimeout => io.connect_timeout = None,
            Action::StartHeartbeat => {
                #[cfg(feature = "tracing")]
                tracing::debug!(interval = ?self.config.heartbeat_interval, "Starting heartbeat");
                io.heartbeat = io.socket.as_ref().map(|link| {
                    Heartbeat::start(
                        &self.runtime,
                        self.config.heartbeat_interval,
                        self.config.heartbeat_timeout,
                        link.sender(),
                        link.keep_alive_replies(),
                    )
                });
            }
            Action::StopHeartbeat => io.heartbeat = None,
            Action::ArmReconnect { timer, delay } => {
                #[cfg(feature = "tracing")]
                tracing::info!(?delay, "Scheduling reconnect");
                let this = self.this.clone();
                io.reconnect = Some(schedule(&self.runtime, delay, move || {
                    if let Some(shared) = this.upgrade() {
                        shared.dispatch(Event::ReconnectDue { timer });
                    }
                }));
            }
            Action::CancelReconnect => io.reconnect = None,
            Action::Status(status) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%status, "Connection status changed");
                self.status_tx.send_replace(status);
            }
            Action::Notify(notification) => effects.notifications.push(notification),
        }
    }

    fn notify(&self, notification: Notification) {
        match notification {
            Notification::Open => self.callbacks.open(),
            Notification::Close { code, reason } => self.callbacks.close(code, &reason),
            Notification::Error(error) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%error, "WebSocket error");
                self.callbacks.error(&error);
            }
        }
    }
}

impl EventSink for Shared {
    fn dispatch(&self, event: Event) {
        let mut effects = Effects {
            events: VecDeque::from([event]),
            notifications: Vec::new(),
        };

        {
            let mut inner = self.lock();
            let Inner { machine, io } = &mut *inner;

            while let Some(event) = effects.events.pop_front() {
                for action in machine.handle(event) {
                    self.apply(io, action, &mut effects);
                }
            }
        }

        // Callbacks run outside the lock so they may call back into the manager
        for notification in effects.notifications {
            self.notify(notification);
        }
    }

    fn deliver(&self, socket: SocketId, payload: Payload) {
        if self.lock().machine.phase().socket() != Some(socket) {
            return;
        }

        self.last_data_tx.send_replace(Some(payload.clone()));
        // No subscribers is fine
        _ = self.broadcast_tx.send(payload.clone());
        self.callbacks.message(&payload);
    }
}
