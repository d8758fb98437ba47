//! Messages carried to the owning thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nodebridge_core::{CallerIdentity, Request, RequestArguments};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::preparer::{CompletionToken, RequestPreparer};

/// A request admitted for execution on the owning thread.
pub(crate) struct QueuedRequest {
    pub request: Request,
    pub caller: CallerIdentity,
    /// Registry entry to claim before executing, if the request was registered.
    pub pending_id: Option<u64>,
}

pub(crate) enum Message {
    Execute(QueuedRequest),
    Prepare {
        preparer: Arc<dyn RequestPreparer>,
        descendant_id: u32,
        extra_data_key: String,
        args: RequestArguments,
        token: CompletionToken,
    },
    PreparerDone {
        generation: u64,
    },
    /// Deadline of a preparation session, fixed when the session opened.
    ArmTimeout {
        generation: u64,
        at: Instant,
    },
    Shutdown,
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::Execute(_) => "execute",
            Message::Prepare { .. } => "prepare",
            Message::PreparerDone { .. } => "preparer_done",
            Message::ArmTimeout { .. } => "arm_timeout",
            Message::Shutdown => "shutdown",
        }
    }
}

/// Sending half of the owning thread's queue, tracking how many messages are
/// waiting so prefetch can yield to queued work.
#[derive(Clone)]
pub(crate) struct MessageSender {
    tx: mpsc::UnboundedSender<Message>,
    queued: Arc<AtomicUsize>,
}

impl MessageSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                queued: Arc::new(AtomicUsize::new(0)),
            },
            rx,
        )
    }

    /// Enqueue; a closed queue drops the message.
    pub fn send(&self, message: Message) -> bool {
        self.queued.fetch_add(1, Ordering::SeqCst);
        let name = message.name();
        if self.tx.send(message).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            debug!(message = name, "Owning loop gone, message dropped");
            return false;
        }
        true
    }

    /// Called by the owning loop for every message it takes off the queue.
    pub fn mark_dequeued(&self) {
        self.queued.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn has_queued_work(&self) -> bool {
        self.queued.load(Ordering::SeqCst) > 0
    }
}
