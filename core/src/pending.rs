//! Pending-call table: correlates outbound RPC requests with inbound responses (§3, §4.4).
//!
//! Grounded on the teacher's `pending_client_requests: HashMap<Id, oneshot::Sender<...>>`
//! (`core/src/lib.rs`), ported from `futures::sync::oneshot` to `tokio::sync::oneshot` per
//! Design Note #3.

use std::collections::HashMap;

use tokio::sync::{oneshot, Mutex};

use crate::envelope::Payload;
use crate::error::RpcError;

type Settlement = Result<Payload, RpcError>;

struct PendingEntry {
    resolver: oneshot::Sender<Settlement>,
    method: String,
}

/// One table per runtime instance (client, or server-side connection). Keyed by envelope `id`.
#[derive(Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<String, PendingEntry>>,
}

impl PendingTable {
    pub fn new() -> Self {
        PendingTable { entries: Mutex::new(HashMap::new()) }
    }

    /// Inserts a new pending entry and returns the receiver half the caller awaits. The timeout
    /// itself is raced against this receiver at the call site (§5 "Cancellation and timeouts") —
    /// this table only tracks whether an id is still outstanding.
    pub async fn register(&self, id: String, method: String) -> oneshot::Receiver<Settlement> {
        let (tx, rx) = oneshot::channel();
        self.entries.lock().await.insert(id, PendingEntry { resolver: tx, method });
        rx
    }

    /// Resolves or rejects the entry for `id`, if still outstanding. Returns `true` if an entry
    /// was found and settled; a late arrival for a settled/expired id is a silent no-op (§4.4
    /// "Tie-break").
    pub async fn settle(&self, id: &str, outcome: Settlement) -> bool {
        if let Some(entry) = self.entries.lock().await.remove(id) {
            let _ = entry.resolver.send(outcome);
            true
        } else {
            false
        }
    }

    /// Removes the entry for `id` without settling it (used when a caller's own timeout or
    /// cancellation wins the race against the table).
    pub async fn abandon(&self, id: &str) {
        self.entries.lock().await.remove(id);
    }

    /// Rejects every outstanding entry with `error` and empties the table (§4.5.5).
    pub async fn abandon_all(&self, error: RpcError) {
        let mut guard = self.entries.lock().await;
        for (_, entry) in guard.drain() {
            let _ = entry.resolver.send(Err(error.clone()));
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn method_of(&self, id: &str) -> Option<String> {
        self.entries.lock().await.get(id).map(|e| e.method.clone())
    }
}
