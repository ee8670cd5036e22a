//! The client-side pending-request table.
//!
//! Every outbound request owns exactly one entry from insert (before the
//! bytes reach the transport) to resolution by the first of: a matching
//! response or error, explicit cancellation, deadline expiry, or session
//! close. Ids are allocated from one monotonic counter and never reused
//! within a session.
//!
//! Deadlines are mutable: a progress notification for a request issued
//! with `reset_timeout_on_progress` pushes the deadline out by the
//! per-request timeout again, but never past `max_total_timeout`.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use fluxmcp_protocol::types::{ProgressParams, ProgressToken};
use fluxmcp_protocol::{McpError, RequestId};

/// Progress observer attached to one request.
pub type ProgressCallback = Arc<dyn Fn(ProgressParams) + Send + Sync>;

/// Per-request options for [`crate::Client`] sends.
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Per-request deadline; the client default applies when `None`.
    pub timeout: Option<Duration>,
    /// Hard ceiling progress can never extend past.
    pub max_total_timeout: Option<Duration>,
    /// Push the deadline out on every progress event for this request.
    pub reset_timeout_on_progress: bool,
    /// Ask the peer for progress under this token; defaults to the
    /// request id when an observer is set.
    pub progress_token: Option<ProgressToken>,
    /// Observer for progress events.
    pub on_progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("timeout", &self.timeout)
            .field("max_total_timeout", &self.max_total_timeout)
            .field("reset_timeout_on_progress", &self.reset_timeout_on_progress)
            .field("progress_token", &self.progress_token)
            .field("on_progress", &self.on_progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

pub(crate) struct PendingEntry {
    pub method: String,
    pub started_at: Instant,
    pub deadline: Arc<StdMutex<Instant>>,
    pub hard_deadline: Option<Instant>,
    pub reset_by: Duration,
    pub reset_on_progress: bool,
    pub progress_token: Option<ProgressToken>,
    pub on_progress: Option<ProgressCallback>,
    waiter: oneshot::Sender<Result<Value, McpError>>,
}

/// `id → waiter` plus id allocation.
pub struct PendingRequests {
    next_id: AtomicI64,
    entries: DashMap<RequestId, PendingEntry>,
}

impl PendingRequests {
    /// Empty table; ids start at 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            entries: DashMap::new(),
        }
    }

    /// Allocate a fresh monotonic id.
    pub fn allocate(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Install an entry and return its waiter half plus the shared
    /// deadline cell the timeout loop watches.
    pub(crate) fn register(
        &self,
        id: RequestId,
        method: &str,
        per_request: Duration,
        options: &RequestOptions,
    ) -> (
        oneshot::Receiver<Result<Value, McpError>>,
        Arc<StdMutex<Instant>>,
    ) {
        let now = Instant::now();
        let deadline = Arc::new(StdMutex::new(now + per_request));
        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            id,
            PendingEntry {
                method: method.to_string(),
                started_at: now,
                deadline: Arc::clone(&deadline),
                hard_deadline: options.max_total_timeout.map(|d| now + d),
                reset_by: per_request,
                reset_on_progress: options.reset_timeout_on_progress,
                progress_token: options.progress_token.clone(),
                on_progress: options.on_progress.clone(),
                waiter: tx,
            },
        );
        (rx, deadline)
    }

    /// Resolve `id`. Returns false when the id is unknown — late replies
    /// and duplicates land here and are dropped.
    pub fn resolve(&self, id: &RequestId, outcome: Result<Value, McpError>) -> bool {
        match self.entries.remove(id) {
            Some((_, entry)) => {
                trace!(%id, method = %entry.method, "resolving pending request");
                let _ = entry.waiter.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Whether `id` is outstanding.
    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries.contains_key(id)
    }

    /// The method an outstanding request was sent with.
    pub fn method_of(&self, id: &RequestId) -> Option<String> {
        self.entries.get(id).map(|e| e.method.clone())
    }

    /// Dispatch a progress event: run the observer and push the deadline
    /// when the owning request asked for that.
    pub fn on_progress(&self, progress: &ProgressParams) {
        for entry in self.entries.iter() {
            if entry.progress_token.as_ref() != Some(&progress.progress_token) {
                continue;
            }
            if let Some(observer) = &entry.on_progress {
                observer(progress.clone());
            }
            if entry.reset_on_progress {
                let mut deadline = entry.deadline.lock().expect("deadline poisoned");
                let mut next = Instant::now() + entry.reset_by;
                if let Some(hard) = entry.hard_deadline {
                    next = next.min(hard);
                }
                if next > *deadline {
                    trace!(method = %entry.method, "progress reset request deadline");
                    *deadline = next;
                }
            }
            return;
        }
        debug!(token = ?progress.progress_token, "progress event with no matching request");
    }

    /// Resolve every outstanding request with `error`; used at session
    /// close.
    pub fn fail_all(&self, error: &McpError) {
        let ids: Vec<RequestId> = self.entries.iter().map(|e| e.key().clone()).collect();
        debug!(count = ids.len(), "failing all pending requests");
        for id in ids {
            self.resolve(&id, Err(error.clone()));
        }
    }

    /// Ids of all outstanding requests.
    pub fn outstanding(&self) -> Vec<RequestId> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequests")
            .field("outstanding", &self.len())
            .finish()
    }
}
