use std::fmt;
use std::sync::Arc;

use super::codec::Payload;
use crate::error::Error;

type OpenFn = dyn Fn() + Send + Sync;
type MessageFn = dyn Fn(&Payload) + Send + Sync;
type CloseFn = dyn Fn(u16, &str) + Send + Sync;
type ErrorFn = dyn Fn(&Error) + Send + Sync;

/// Lifecycle callbacks invoked by the connection manager.
///
/// Callbacks run on the runtime's worker threads after the manager has released its internal
/// lock, so they may call back into the manager. They must not block.
///
/// ```
/// use resilient_ws::ws::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .on_open(|| println!("connected"))
///     .on_close(|code, reason| println!("closed with {code}: {reason}"));
/// ```
#[derive(Clone, Default)]
pub struct Callbacks {
    on_open: Option<Arc<OpenFn>>,
    on_message: Option<Arc<MessageFn>>,
    on_close: Option<Arc<CloseFn>>,
    on_error: Option<Arc<ErrorFn>>,
}

impl Callbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoked once per successful handshake.
    #[must_use]
    pub fn on_open<F: Fn() + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_open = Some(Arc::new(f));
        self
    }

    /// Invoked for every inbound frame except keep-alive replies.
    #[must_use]
    pub fn on_message<F: Fn(&Payload) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_message = Some(Arc::new(f));
        self
    }

    /// Invoked with the close code and reason whenever a socket closes.
    #[must_use]
    pub fn on_close<F: Fn(u16, &str) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_close = Some(Arc::new(f));
        self
    }

    /// Invoked on socket errors, socket creation failures, and once when the reconnect budget is
    /// exhausted.
    #[must_use]
    pub fn on_error<F: Fn(&Error) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn open(&self) {
        if let Some(f) = &self.on_open {
            f();
        }
    }

    pub(crate) fn message(&self, payload: &Payload) {
        if let Some(f) = &self.on_message {
            f(payload);
        }
    }

    pub(crate) fn close(&self, code: u16, reason: &str) {
        if let Some(f) = &self.on_close {
            f(code, reason);
        }
    }

    pub(crate) fn error(&self, error: &Error) {
        if let Some(f) = &self.on_error {
            f(error);
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
