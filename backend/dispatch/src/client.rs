use std::sync::Arc;

use nodebridge_core::{CallerIdentity, NodeBridgeError, Request};

use crate::dispatcher::Dispatcher;
use crate::message::Message;
use crate::preparer::RequestPreparer;

/// Cloneable handle for submitting queries from any thread.
///
/// Everything submitted here goes through the owning thread's queue.
#[derive(Clone)]
pub struct InteractionClient {
    dispatcher: Arc<Dispatcher>,
}

impl InteractionClient {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Identity of the owning thread.
    pub fn owner(&self) -> CallerIdentity {
        self.dispatcher.owner()
    }

    /// Submit a query. Results arrive through the request's callback.
    ///
    /// Contract violations are returned immediately; a torn-down controller
    /// silently drops the query.
    pub fn submit(&self, request: Request, caller: CallerIdentity) -> Result<(), NodeBridgeError> {
        self.dispatcher.admit(request, caller, false)?;
        Ok(())
    }

    /// Register a preparer for extra-data queries against real node `owner_id`.
    pub fn register_preparer(&self, owner_id: u32, preparer: Arc<dyn RequestPreparer>) {
        self.dispatcher.register_preparer(owner_id, preparer);
    }

    pub fn unregister_preparers(&self, owner_id: u32) {
        self.dispatcher.unregister_preparers(owner_id);
    }

    /// Ask the owning loop to stop and drop everything still queued.
    pub fn shutdown(&self) {
        self.dispatcher.sender().send(Message::Shutdown);
    }
}
