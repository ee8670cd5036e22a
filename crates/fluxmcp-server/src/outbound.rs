//! Pending table for server-initiated requests (ping, sampling, roots).

use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::oneshot;
use tracing::debug;

use fluxmcp_protocol::{McpError, RequestId};

type Waiter = oneshot::Sender<Result<Value, McpError>>;

/// `id → waiter` with monotonic id allocation. Exactly one of
/// {response, error, cancellation, timeout, session close} resolves each
/// waiter; whichever arrives later finds the entry gone.
#[derive(Debug, Default)]
pub struct PendingOutbound {
    next_id: AtomicI64,
    waiters: DashMap<RequestId, Waiter>,
}

impl PendingOutbound {
    /// Empty table; ids start at 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            waiters: DashMap::new(),
        }
    }

    /// Allocate a fresh id. Never reused within the session.
    pub fn allocate(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Install the waiter for `id`. Call before handing bytes to the
    /// transport so the reply can never race the registration.
    pub fn register(&self, id: RequestId) -> oneshot::Receiver<Result<Value, McpError>> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(id, tx);
        rx
    }

    /// Resolve `id` with a result or error. Returns false for unknown ids
    /// (already resolved, or never ours) — those are dropped and logged
    /// by the caller, never surfaced.
    pub fn resolve(&self, id: &RequestId, outcome: Result<Value, McpError>) -> bool {
        match self.waiters.remove(id) {
            Some((_, waiter)) => {
                let _ = waiter.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Remove the waiter without resolving, e.g. after a local timeout
    /// already returned an error to the caller.
    pub fn forget(&self, id: &RequestId) {
        self.waiters.remove(id);
    }

    /// Whether `id` is still outstanding.
    pub fn contains(&self, id: &RequestId) -> bool {
        self.waiters.contains_key(id)
    }

    /// Resolve every outstanding waiter with `error`; used at session
    /// close.
    pub fn fail_all(&self, error: &McpError) {
        let ids: Vec<RequestId> = self.waiters.iter().map(|e| e.key().clone()).collect();
        debug!(count = ids.len(), "failing all pending outbound requests");
        for id in ids {
            self.resolve(&id, Err(error.clone()));
        }
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Whether nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}
