//! Calls waiting for their responses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::lsp::message::Response;

/// Per-client source of call ids, starting at 1.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator {
    /// Generator whose first id is 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Table of outstanding calls, shared with the response router.
///
/// Each id is fulfilled at most once. Entries are removed on fulfilment,
/// cancellation, or [`PendingRequests::clear`], which drops the senders so
/// waiting callers fail at once.
#[derive(Debug, Clone, Default)]
pub struct PendingRequests {
    inner: Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>,
}

impl PendingRequests {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `id` and return the receiver for its response.
    pub fn register(&self, id: u64) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().insert(id, tx);
        rx
    }

    /// Deliver `response` to the caller waiting on `id`.
    ///
    /// Returns `false` if `id` is not tracked.
    pub fn fulfil(&self, id: u64, response: Response) -> bool {
        let Some(tx) = self.inner.lock().remove(&id) else {
            return false;
        };
        // The caller may have stopped waiting; that still consumes the id.
        let _ = tx.send(response);
        true
    }

    /// Stop tracking `id`. Returns whether it was tracked.
    pub fn cancel(&self, id: u64) -> bool {
        self.inner.lock().remove(&id).is_some()
    }

    /// Drop every outstanding entry.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Whether `id` is tracked.
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.inner.lock().contains_key(&id)
    }

    /// Number of outstanding calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether no call is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
