//! Session ids and the request-to-stream mapping.

use fluxmcp_protocol::RequestId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Opaque session identifier minted by the server on `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a fresh unguessable id.
    pub fn mint() -> Self {
        Self(format!("mcp-{}", Uuid::new_v4().simple()))
    }

    /// Wrap an existing id, e.g. one received in a header.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one SSE stream within a transport.
pub type StreamKey = u64;

/// An outbound SSE frame: the serialized message plus its event-store id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    /// Event-store id, present when a store is configured.
    pub id: Option<u64>,
    /// Serialized JSON-RPC message.
    pub data: String,
}

/// Sender half of one SSE stream.
pub type StreamSender = mpsc::UnboundedSender<OutboundEvent>;

/// The two tables §request/stream routing needs: which sender serves each
/// stream, and which stream each outstanding request is pinned to.
///
/// One mutex guards the whole structure; hold it only for map operations,
/// never across await points.
#[derive(Debug, Default)]
pub struct StreamTables {
    next_stream: StreamKey,
    senders: HashMap<StreamKey, StreamSender>,
    request_to_stream: HashMap<RequestId, StreamKey>,
    unanswered: HashMap<StreamKey, HashSet<RequestId>>,
}

impl StreamTables {
    /// Empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a stream pinned to `requests` and return its key.
    pub fn open_stream(&mut self, sender: StreamSender, requests: Vec<RequestId>) -> StreamKey {
        self.next_stream += 1;
        let key = self.next_stream;
        self.senders.insert(key, sender);
        let mut pinned = HashSet::new();
        for id in requests {
            self.request_to_stream.insert(id.clone(), key);
            pinned.insert(id);
        }
        self.unanswered.insert(key, pinned);
        key
    }

    /// The sender for the stream a request is pinned to.
    pub fn sender_for(&self, request: &RequestId) -> Option<StreamSender> {
        let key = self.request_to_stream.get(request)?;
        self.senders.get(key).cloned()
    }

    /// The stream a request is pinned to, until it is answered.
    pub fn stream_of(&self, request: &RequestId) -> Option<StreamKey> {
        self.request_to_stream.get(request).copied()
    }

    /// Record that `request` has been answered. When the whole stream is
    /// answered its sender is dropped (closing the SSE body) and the
    /// stream key is returned.
    pub fn mark_answered(&mut self, request: &RequestId) -> Option<StreamKey> {
        let key = *self.request_to_stream.get(request)?;
        self.request_to_stream.remove(request);
        let pinned = self.unanswered.get_mut(&key)?;
        pinned.remove(request);
        if pinned.is_empty() {
            self.unanswered.remove(&key);
            self.senders.remove(&key);
            Some(key)
        } else {
            None
        }
    }

    /// Drop every stream, e.g. on session termination.
    pub fn clear(&mut self) {
        self.senders.clear();
        self.request_to_stream.clear();
        self.unanswered.clear();
    }

    /// Number of live streams.
    pub fn stream_count(&self) -> usize {
        self.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn minted_ids_are_unique_and_prefixed() {
        let a = SessionId::mint();
        let b = SessionId::mint();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("mcp-"));
    }

    #[test]
    fn stream_closes_when_all_pinned_requests_answered() {
        let mut tables = StreamTables::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let key = tables.open_stream(tx, vec![RequestId::from(1), RequestId::from(2)]);

        assert!(tables.sender_for(&RequestId::from(1)).is_some());
        assert_eq!(tables.mark_answered(&RequestId::from(1)), None);
        assert_eq!(tables.mark_answered(&RequestId::from(2)), Some(key));
        assert_eq!(tables.stream_count(), 0);
        assert!(tables.sender_for(&RequestId::from(2)).is_none());
    }

    #[test]
    fn streams_are_independent() {
        let mut tables = StreamTables::new();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let a = tables.open_stream(tx_a, vec![RequestId::from(1)]);
        let b = tables.open_stream(tx_b, vec![RequestId::from(2)]);
        assert_ne!(a, b);

        assert_eq!(tables.mark_answered(&RequestId::from(2)), Some(b));
        assert_eq!(tables.stream_count(), 1);
        assert_eq!(tables.mark_answered(&RequestId::from(1)), Some(a));
    }

    #[test]
    fn unknown_request_routes_nowhere() {
        let mut tables = StreamTables::new();
        assert!(tables.sender_for(&RequestId::from(9)).is_none());
        assert_eq!(tables.mark_answered(&RequestId::from(9)), None);
    }
}
