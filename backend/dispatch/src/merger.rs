//! Answering other pending by-node-id requests from a fetch that just ran.

use nodebridge_core::{CallbackHandle, FetchFlags, Node};
use tracing::debug;

use crate::registry::PendingRegistry;

/// A pending request answered without running it.
pub(crate) struct SatisfiedRequest {
    pub node: Node,
    pub callback: CallbackHandle,
    pub interaction_id: i64,
}

impl SatisfiedRequest {
    pub fn deliver(self) {
        self.callback.deliver_single(Some(self.node), self.interaction_id);
    }
}

/// Satisfy at most one pending request from `primary` or `prefetched`.
///
/// Entries are scanned in registration order; the first whose target was
/// fetched with the same report bits wins. A prefetched hit is moved out of
/// `prefetched` so no node is delivered to two callbacks.
pub(crate) fn satisfy_from_fetch(
    registry: &mut PendingRegistry,
    primary: Option<&Node>,
    prefetched: &mut Vec<Node>,
    flags: FetchFlags,
) -> Option<SatisfiedRequest> {
    if registry.is_empty() || (primary.is_none() && prefetched.is_empty()) {
        return None;
    }
    let entry = registry.take_first(|entry| {
        entry.flags.reports_like(flags)
            && (primary.is_some_and(|p| p.id == entry.node_id)
                || prefetched.iter().any(|n| n.id == entry.node_id))
    })?;

    let node = match primary.filter(|p| p.id == entry.node_id) {
        Some(primary) => primary.clone(),
        None => {
            let index = prefetched.iter().position(|n| n.id == entry.node_id)?;
            prefetched.remove(index)
        }
    };
    debug!(
        interaction_id = entry.interaction_id,
        node = %node.id,
        "Pending request satisfied by earlier fetch"
    );
    Some(SatisfiedRequest {
        node,
        callback: entry.callback,
        interaction_id: entry.interaction_id,
    })
}
