use std::fmt;

use nodebridge_core::RequestArguments;

use crate::message::{Message, MessageSender};

/// Setup that must run before an extra-data query against a node executes.
///
/// `prepare` is called on the owning thread. The preparer may finish
/// asynchronously; it signals completion by consuming `token`. A preparer that
/// never completes only delays held queries until the preparation timeout.
pub trait RequestPreparer: Send + Sync {
    fn prepare(
        &self,
        descendant_id: u32,
        extra_data_key: &str,
        args: &RequestArguments,
        token: CompletionToken,
    );
}

/// Completion handle for one preparer in one preparation session.
pub struct CompletionToken {
    generation: u64,
    sender: MessageSender,
}

impl CompletionToken {
    pub(crate) fn new(generation: u64, sender: MessageSender) -> Self {
        Self { generation, sender }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report this preparer as done. Callable from any thread.
    pub fn complete(self) {
        self.sender.send(Message::PreparerDone {
            generation: self.generation,
        });
    }
}

impl fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionToken")
            .field("generation", &self.generation)
            .finish()
    }
}
