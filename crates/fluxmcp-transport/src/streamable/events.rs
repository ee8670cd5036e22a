//! SSE event storage for resumable streams.
//!
//! Every outbound SSE event is first appended to the store, yielding the
//! monotonic id emitted on the `id:` line. A client reconnecting with
//! `Last-Event-Id: E` is replayed every stored event with id > E from the
//! stream E belonged to, in order, before going live.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use super::session::StreamKey;

/// Monotonic event id. Opaque to clients; they echo it verbatim.
pub type EventId = u64;

/// One stored event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    /// Resumption id.
    pub id: EventId,
    /// Serialized JSON-RPC message.
    pub data: String,
}

/// Append-only per-stream event log.
///
/// Implementations may persist; the engine requires no durability.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append `data` to `stream`'s log and return the id minted for it.
    async fn append(&self, stream: StreamKey, data: String) -> EventId;

    /// Events with id strictly greater than `after`, in order, from the
    /// stream `after` belongs to. Empty when the id is unknown.
    async fn replay_after(&self, after: EventId) -> Vec<StoredEvent>;

    /// Discard a stream's log.
    async fn drop_stream(&self, stream: StreamKey);
}

/// Default per-stream capacity of [`InMemoryEventStore`].
pub const DEFAULT_EVENTS_PER_STREAM: usize = 1024;

/// Heap-backed event store; ids are monotonic across all streams so an id
/// names both its stream and its position.
#[derive(Debug)]
pub struct InMemoryEventStore {
    next_id: AtomicU64,
    capacity: usize,
    streams: Mutex<HashMap<StreamKey, VecDeque<StoredEvent>>>,
}

impl InMemoryEventStore {
    /// Store with the default per-stream capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENTS_PER_STREAM)
    }

    /// Store bounding each stream's log at `capacity` events, evicting
    /// oldest first.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            streams: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, stream: StreamKey, data: String) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut streams = self.streams.lock().expect("event store poisoned");
        let log = streams.entry(stream).or_default();
        if log.len() >= self.capacity {
            log.pop_front();
        }
        log.push_back(StoredEvent { id, data });
        id
    }

    async fn replay_after(&self, after: EventId) -> Vec<StoredEvent> {
        let streams = self.streams.lock().expect("event store poisoned");
        // Locate the stream whose log contains (or once contained) the id,
        // then hand back everything after it.
        for log in streams.values() {
            let (Some(first), Some(last)) = (log.front(), log.back()) else {
                continue;
            };
            if after >= first.id && after <= last.id {
                return log.iter().filter(|e| e.id > after).cloned().collect();
            }
        }
        Vec::new()
    }

    async fn drop_stream(&self, stream: StreamKey) {
        self.streams
            .lock()
            .expect("event store poisoned")
            .remove(&stream);
    }
}
