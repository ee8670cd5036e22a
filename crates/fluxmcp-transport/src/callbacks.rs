//! The callback block a transport reports through.
//!
//! Engines install callbacks before `start`. The transport owns delivery
//! discipline: messages arrive in wire order, errors are advisory unless
//! followed by close, and `on_close` fires exactly once per transport
//! lifetime no matter how many paths race to it.

use fluxmcp_protocol::JsonRpcMessage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::TransportError;
use crate::message::AuthInfo;

type MessageFn = dyn Fn(JsonRpcMessage, Option<AuthInfo>) + Send + Sync;
type ErrorFn = dyn Fn(TransportError) + Send + Sync;
type VoidFn = dyn Fn() + Send + Sync;

/// Callbacks installed on a transport before `start`.
///
/// All slots are optional; an unset slot drops the event.
#[derive(Clone, Default)]
pub struct TransportCallbacks {
    on_message: Option<Arc<MessageFn>>,
    on_error: Option<Arc<ErrorFn>>,
    on_close: Option<Arc<VoidFn>>,
    on_connect: Option<Arc<VoidFn>>,
}

impl TransportCallbacks {
    /// Empty callback block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inbound-message callback.
    pub fn on_message<F>(mut self, f: F) -> Self
    where
        F: Fn(JsonRpcMessage, Option<AuthInfo>) + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(f));
        self
    }

    /// Set the error callback.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(TransportError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Set the close callback.
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_close = Some(Arc::new(f));
        self
    }

    /// Set the connect callback.
    pub fn on_connect<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_connect = Some(Arc::new(f));
        self
    }
}

/// Shared emitter handed to a transport's reader and writer tasks.
///
/// Cloning shares the once-only close latch.
#[derive(Clone, Default)]
pub struct EventSink {
    callbacks: Arc<TransportCallbacks>,
    closed: Arc<AtomicBool>,
}

impl EventSink {
    /// Wrap a callback block for emission.
    pub fn new(callbacks: TransportCallbacks) -> Self {
        Self {
            callbacks: Arc::new(callbacks),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Deliver one inbound message.
    pub fn message(&self, message: JsonRpcMessage, auth: Option<AuthInfo>) {
        if let Some(f) = &self.callbacks.on_message {
            f(message, auth);
        }
    }

    /// Report a transport error. Does not imply close.
    pub fn error(&self, error: TransportError) {
        if let Some(f) = &self.callbacks.on_error {
            f(error);
        }
    }

    /// Report that the transport connected.
    pub fn connected(&self) {
        if let Some(f) = &self.callbacks.on_connect {
            f();
        }
    }

    /// Report close. Idempotent: only the first call reaches the callback.
    pub fn closed(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(f) = &self.callbacks.on_close {
            f();
        }
    }

    /// Whether close has already been emitted.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn close_fires_exactly_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&count);
        let sink = EventSink::new(TransportCallbacks::new().on_close(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        }));

        sink.closed();
        sink.closed();
        sink.clone().closed();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(sink.is_closed());
    }

    #[test]
    fn unset_slots_drop_events() {
        let sink = EventSink::new(TransportCallbacks::new());
        sink.error(TransportError::NotConnected);
        sink.connected();
        sink.closed();
    }

    #[test]
    fn messages_reach_the_callback_with_auth() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&seen);
        let sink = EventSink::new(TransportCallbacks::new().on_message(move |_, auth| {
            assert_eq!(auth, Some(AuthInfo::bearer("tok")));
            counted.fetch_add(1, Ordering::SeqCst);
        }));

        sink.message(
            fluxmcp_protocol::jsonrpc::JsonRpcNotification::new("ping", None).into(),
            Some(AuthInfo::bearer("tok")),
        );
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
