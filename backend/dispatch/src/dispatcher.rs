//! Shared entry point used by both the owning thread and remote callers.
//!
//! All cross-call state lives in one [`DispatcherState`] behind one lock. The
//! lock is held for registry and session bookkeeping only, never while a
//! query runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nodebridge_core::{CallerIdentity, FetchFlags, Node, NodeBridgeError, Query, Request};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::coordinator::{HoldDecision, RequestPreparerCoordinator};
use crate::merger::{satisfy_from_fetch, SatisfiedRequest};
use crate::message::{Message, MessageSender, QueuedRequest};
use crate::preparer::{CompletionToken, RequestPreparer};
use crate::registry::PendingRegistry;

/// Whether a submission may run inline instead of being queued.
///
/// Only submissions made on the owning thread qualify, and then only when the
/// caller is the owner itself or the query owes nobody a delivery.
pub fn takes_fast_path(
    on_owner_thread: bool,
    caller: CallerIdentity,
    owner: CallerIdentity,
    query: &Query,
) -> bool {
    on_owner_thread && (caller == owner || !query.has_callback())
}

#[derive(Default)]
pub(crate) struct DispatcherState {
    registry: PendingRegistry,
    coordinator: RequestPreparerCoordinator<QueuedRequest>,
    preparers: HashMap<u32, Vec<Arc<dyn RequestPreparer>>>,
    /// Set once the owning loop is torn down; later submissions are dropped.
    closed: bool,
}

pub(crate) enum Admission {
    /// Parked behind a preparation session.
    Held,
    Enqueued,
    /// The owning loop is gone.
    Dropped,
    /// Run it now, on the calling (owning) thread.
    Inline(QueuedRequest),
}

pub(crate) struct Dispatcher {
    owner: CallerIdentity,
    sender: MessageSender,
    preparer_timeout: Duration,
    state: Mutex<DispatcherState>,
}

impl Dispatcher {
    pub fn new(owner: CallerIdentity, sender: MessageSender, preparer_timeout: Duration) -> Self {
        Self {
            owner,
            sender,
            preparer_timeout,
            state: Mutex::new(DispatcherState::default()),
        }
    }

    pub fn owner(&self) -> CallerIdentity {
        self.owner
    }

    pub fn sender(&self) -> &MessageSender {
        &self.sender
    }

    pub fn has_queued_work(&self) -> bool {
        self.sender.has_queued_work()
    }

    /// Validate a request, register it and decide where it runs.
    pub fn admit(
        &self,
        request: Request,
        caller: CallerIdentity,
        on_owner_thread: bool,
    ) -> Result<Admission, NodeBridgeError> {
        request.validate()?;
        let inline = takes_fast_path(on_owner_thread, caller, self.owner, &request.query);
        let interaction_id = request.interaction_id;
        let kind = request.query.kind();

        let mut state = self.state.lock();
        if state.closed {
            debug!(interaction_id, %kind, "Owning loop gone, query dropped");
            return Ok(Admission::Dropped);
        }
        let pending_id = state.registry.register(&request);
        let item = QueuedRequest {
            request,
            caller,
            pending_id,
        };
        let Some(item) = self.hold_or_proceed(&mut state, item) else {
            debug!(interaction_id, %kind, "Query held for preparers");
            return Ok(Admission::Held);
        };
        drop(state);

        if inline {
            return Ok(Admission::Inline(item));
        }
        let pending_id = item.pending_id;
        if !self.sender.send(Message::Execute(item)) {
            self.state.lock().registry.take_pending(pending_id);
            return Ok(Admission::Dropped);
        }
        debug!(interaction_id, %kind, caller = %caller, "Query enqueued");
        Ok(Admission::Enqueued)
    }

    /// Route `item` through the coordinator. Opening a session enqueues its
    /// timeout first, then one prepare message per preparer.
    fn hold_or_proceed(
        &self,
        state: &mut DispatcherState,
        item: QueuedRequest,
    ) -> Option<QueuedRequest> {
        if !matches!(item.request.query, Query::ByNodeId { .. }) {
            return Some(item);
        }
        let target = item
            .request
            .query
            .extra_data_request()
            .map(|(node_id, key, args)| (node_id, key.to_string(), args.clone()));
        let preparers: Vec<Arc<dyn RequestPreparer>> = target
            .as_ref()
            .and_then(|(node_id, _, _)| state.preparers.get(&node_id.owner_id))
            .cloned()
            .unwrap_or_default();

        match state.coordinator.maybe_hold(item, preparers.len()) {
            HoldDecision::Proceed(item) => Some(item),
            HoldDecision::Held { started: None } => None,
            HoldDecision::Held {
                started: Some(generation),
            } => {
                let at = Instant::now() + self.preparer_timeout;
                self.sender.send(Message::ArmTimeout { generation, at });
                if let Some((node_id, extra_data_key, args)) = target {
                    for preparer in preparers {
                        self.sender.send(Message::Prepare {
                            preparer,
                            descendant_id: node_id.descendant_id,
                            extra_data_key: extra_data_key.clone(),
                            args: args.clone(),
                            token: CompletionToken::new(generation, self.sender.clone()),
                        });
                    }
                }
                None
            }
        }
    }

    /// Enqueue released items in order. The first runs regardless of
    /// preparers; later ones may open a new session.
    fn release(&self, state: &mut DispatcherState, items: Vec<QueuedRequest>) {
        debug!(released = items.len(), "Releasing held queries");
        let mut items = items.into_iter();
        if let Some(first) = items.next() {
            self.sender.send(Message::Execute(first));
        }
        for item in items {
            if let Some(item) = self.hold_or_proceed(state, item) {
                self.sender.send(Message::Execute(item));
            }
        }
    }

    pub fn on_preparer_done(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        match state.coordinator.on_preparer_done(generation) {
            Some(items) => {
                self.release(&mut state, items);
                true
            }
            None => false,
        }
    }

    pub fn on_timeout(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        match state.coordinator.on_timeout(generation) {
            Some(items) => {
                warn!(
                    generation,
                    held = items.len(),
                    "Preparers did not finish in time; releasing held queries"
                );
                self.release(&mut state, items);
                true
            }
            None => false,
        }
    }

    pub fn is_current_generation(&self, generation: u64) -> bool {
        self.state.lock().coordinator.generation() == Some(generation)
    }

    /// Claim the registry entry of a request about to run. False if a merge
    /// already answered it.
    pub fn begin_execution(&self, pending_id: Option<u64>) -> bool {
        match pending_id {
            Some(id) => self.state.lock().registry.take(id).is_some(),
            None => true,
        }
    }

    pub fn satisfy(
        &self,
        primary: Option<&Node>,
        prefetched: &mut Vec<Node>,
        flags: FetchFlags,
    ) -> Option<SatisfiedRequest> {
        let mut state = self.state.lock();
        satisfy_from_fetch(&mut state.registry, primary, prefetched, flags)
    }

    pub fn register_preparer(&self, owner_id: u32, preparer: Arc<dyn RequestPreparer>) {
        let mut state = self.state.lock();
        state.preparers.entry(owner_id).or_default().push(preparer);
        debug!(owner_id, "Request preparer registered");
    }

    pub fn unregister_preparers(&self, owner_id: u32) {
        if self.state.lock().preparers.remove(&owner_id).is_some() {
            debug!(owner_id, "Request preparers removed");
        }
    }

    /// Forget all pending and held requests and refuse new ones.
    pub fn teardown(&self) {
        let mut state = self.state.lock();
        let pending = state.registry.len();
        let held = state.coordinator.waiting_len();
        state.closed = true;
        state.registry.clear();
        state.coordinator.clear();
        debug!(pending, held, "Dispatcher closed");
    }

    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.state.lock().registry.len()
    }

    #[cfg(test)]
    pub fn held_len(&self) -> usize {
        self.state.lock().coordinator.waiting_len()
    }
}

#[cfg(test)]
mod tests {
    use nodebridge_core::{Direction, NodeId};

    use super::*;

    #[test]
    fn fast_path_is_a_pure_function_of_identities() {
        let owner = CallerIdentity::new(10, 1);
        let other = CallerIdentity::new(10, 2);
        let search = Query::FocusSearch {
            owner_id: 1,
            direction: Direction::Forward,
        };
        let by_id = Query::ByNodeId {
            node_id: NodeId::host(1),
            extra_args: None,
        };

        assert!(takes_fast_path(true, owner, owner, &search));
        assert!(!takes_fast_path(true, other, owner, &by_id));
        assert!(!takes_fast_path(false, owner, owner, &search));
        assert!(takes_fast_path(true, other, owner, &Query::NotifyOutsideTouch));
        assert!(!takes_fast_path(false, other, owner, &Query::NotifyOutsideTouch));
    }
}
