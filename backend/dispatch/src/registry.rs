//! Registry of by-node-id requests that have been admitted but not yet run.

use nodebridge_core::{CallbackHandle, FetchFlags, NodeId, Query, Request};

pub(crate) struct PendingEntry {
    pub id: u64,
    pub node_id: NodeId,
    pub flags: FetchFlags,
    pub interaction_id: i64,
    pub callback: CallbackHandle,
}

/// Entries in registration order. Each entry leaves exactly once: claimed at
/// execution start or satisfied early by a merge.
#[derive(Default)]
pub(crate) struct PendingRegistry {
    entries: Vec<PendingEntry>,
    next_id: u64,
}

impl PendingRegistry {
    /// Register a by-node-id request that expects a callback.
    ///
    /// Requests asking for extra data are skipped: another fetch's node does
    /// not carry their extras.
    pub fn register(&mut self, request: &Request) -> Option<u64> {
        let Query::ByNodeId { node_id, .. } = &request.query else {
            return None;
        };
        if request.query.extra_data_request().is_some() {
            return None;
        }
        let callback = request.callback.clone()?;
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push(PendingEntry {
            id,
            node_id: *node_id,
            flags: request.flags,
            interaction_id: request.interaction_id,
            callback,
        });
        Some(id)
    }

    /// Claim an entry; `None` if it was already satisfied.
    pub fn take(&mut self, id: u64) -> Option<PendingEntry> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(index))
    }

    /// Drop the entry of a request that will never run.
    pub fn take_pending(&mut self, id: Option<u64>) {
        if let Some(id) = id {
            self.take(id);
        }
    }

    /// Remove and return the first entry matching `predicate`.
    pub fn take_first(&mut self, predicate: impl Fn(&PendingEntry) -> bool) -> Option<PendingEntry> {
        let index = self.entries.iter().position(predicate)?;
        Some(self.entries.remove(index))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
