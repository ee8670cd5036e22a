//! In-memory transport pair, used by engine tests.
//!
//! [`InMemoryTransport::pair`] yields two connected ends; what one sends
//! the other delivers through its callbacks, in order, with no framing
//! layer in between. Dropping or stopping either end closes both.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tracing::debug;

use fluxmcp_protocol::JsonRpcMessage;

use crate::callbacks::{EventSink, TransportCallbacks};
use crate::error::{TransportError, TransportResult};
use crate::message::SendOptions;
use crate::traits::Transport;

/// One end of an in-memory transport pair.
pub struct InMemoryTransport {
    outbox: StdMutex<Option<mpsc::UnboundedSender<JsonRpcMessage>>>,
    inbox: TokioMutex<Option<mpsc::UnboundedReceiver<JsonRpcMessage>>>,
    callbacks: StdMutex<TransportCallbacks>,
    sink: StdMutex<Option<EventSink>>,
    pump: StdMutex<Option<tokio::task::JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
}

impl InMemoryTransport {
    /// Two connected ends.
    pub fn pair() -> (Self, Self) {
        let (left_tx, right_rx) = mpsc::unbounded_channel();
        let (right_tx, left_rx) = mpsc::unbounded_channel();
        (Self::end(left_tx, left_rx), Self::end(right_tx, right_rx))
    }

    fn end(
        outbox: mpsc::UnboundedSender<JsonRpcMessage>,
        inbox: mpsc::UnboundedReceiver<JsonRpcMessage>,
    ) -> Self {
        Self {
            outbox: StdMutex::new(Some(outbox)),
            inbox: TokioMutex::new(Some(inbox)),
            callbacks: StdMutex::new(TransportCallbacks::new()),
            sink: StdMutex::new(None),
            pump: StdMutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    fn sink(&self) -> Option<EventSink> {
        self.sink.lock().expect("sink mutex poisoned").clone()
    }
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn set_callbacks(&self, callbacks: TransportCallbacks) {
        *self.callbacks.lock().expect("callbacks mutex poisoned") = callbacks;
    }

    async fn start(&self) -> TransportResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        let callbacks = self
            .callbacks
            .lock()
            .expect("callbacks mutex poisoned")
            .clone();
        let sink = EventSink::new(callbacks);
        *self.sink.lock().expect("sink mutex poisoned") = Some(sink.clone());

        let mut inbox = self
            .inbox
            .lock()
            .await
            .take()
            .ok_or_else(|| TransportError::Configuration("transport already started".into()))?;

        let connected = Arc::clone(&self.connected);
        let handle = tokio::spawn(async move {
            while let Some(message) = inbox.recv().await {
                sink.message(message, None);
            }
            debug!("in-memory peer disconnected");
            connected.store(false, Ordering::SeqCst);
            sink.closed();
        });
        *self.pump.lock().expect("pump mutex poisoned") = Some(handle);

        self.connected.store(true, Ordering::SeqCst);
        if let Some(sink) = self.sink() {
            sink.connected();
        }
        Ok(())
    }

    async fn stop(&self) -> TransportResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        // Dropping the sender closes the peer's inbox.
        self.outbox.lock().expect("outbox mutex poisoned").take();
        if let Some(handle) = self.pump.lock().expect("pump mutex poisoned").take() {
            handle.abort();
        }
        if let Some(sink) = self.sink() {
            sink.closed();
        }
        *self.sink.lock().expect("sink mutex poisoned") = None;
        *self.callbacks.lock().expect("callbacks mutex poisoned") = TransportCallbacks::new();
        Ok(())
    }

    async fn send(&self, message: JsonRpcMessage, _options: SendOptions) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let outbox = self.outbox.lock().expect("outbox mutex poisoned");
        let outbox = outbox.as_ref().ok_or(TransportError::NotConnected)?;
        outbox
            .send(message)
            .map_err(|_| TransportError::ConnectionLost("peer inbox closed".into()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluxmcp_protocol::jsonrpc::JsonRpcRequest;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn pair_delivers_in_order() {
        let (left, right) = InMemoryTransport::pair();
        let (tx, mut rx) = mpsc::unbounded_channel();
        right.set_callbacks(TransportCallbacks::new().on_message(move |msg, _| {
            let _ = tx.send(msg);
        }));
        left.start().await.unwrap();
        right.start().await.unwrap();

        for i in 0..5 {
            left.send(
                JsonRpcRequest::new(i, "ping", None).into(),
                SendOptions::default(),
            )
            .await
            .unwrap();
        }
        for i in 0..5i64 {
            let JsonRpcMessage::Request(req) = rx.recv().await.unwrap() else {
                panic!("expected request");
            };
            assert_eq!(req.id, i.into());
        }
    }

    #[tokio::test]
    async fn stopping_one_end_closes_the_other() {
        let (left, right) = InMemoryTransport::pair();
        let closes = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&closes);
        right.set_callbacks(TransportCallbacks::new().on_close(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        }));
        left.start().await.unwrap();
        right.start().await.unwrap();

        left.stop().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(!right.is_connected());
    }
}
