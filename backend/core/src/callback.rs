use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::node::Node;

/// Result sink supplied with a request.
///
/// Every method is invoked on the owning thread; implementations forward the
/// result to wherever the caller lives.
pub trait InteractionCallback: Send + Sync {
    /// A single node answer (`None` when the target was not found).
    fn deliver_single(&self, node: Option<Node>, interaction_id: i64);

    /// A batch answer; for by-node-id queries the primary result comes first.
    fn deliver_batch(&self, nodes: Vec<Node>, interaction_id: i64);

    /// Nodes fetched ahead of time, sent after the primary result.
    fn deliver_prefetch(&self, nodes: Vec<Node>, interaction_id: i64);

    fn deliver_action_result(&self, success: bool, interaction_id: i64);
}

pub type CallbackHandle = Arc<dyn InteractionCallback>;

/// One delivered result, as recorded by [`ChannelCallback`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delivery {
    Single {
        node: Option<Node>,
        interaction_id: i64,
    },
    Batch {
        nodes: Vec<Node>,
        interaction_id: i64,
    },
    Prefetch {
        nodes: Vec<Node>,
        interaction_id: i64,
    },
    ActionResult {
        success: bool,
        interaction_id: i64,
    },
}

impl Delivery {
    pub fn interaction_id(&self) -> i64 {
        match self {
            Delivery::Single { interaction_id, .. }
            | Delivery::Batch { interaction_id, .. }
            | Delivery::Prefetch { interaction_id, .. }
            | Delivery::ActionResult { interaction_id, .. } => *interaction_id,
        }
    }
}

/// Callback that forwards every delivery into an unbounded channel.
pub struct ChannelCallback {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ChannelCallback {
    /// Create a callback together with the receiving end of its channel.
    pub fn new() -> (CallbackHandle, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_sender(tx), rx)
    }

    /// Create a callback feeding an existing channel.
    pub fn with_sender(tx: mpsc::UnboundedSender<Delivery>) -> CallbackHandle {
        Arc::new(Self { tx })
    }

    fn forward(&self, delivery: Delivery) {
        if self.tx.send(delivery).is_err() {
            debug!("Delivery receiver dropped");
        }
    }
}

impl InteractionCallback for ChannelCallback {
    fn deliver_single(&self, node: Option<Node>, interaction_id: i64) {
        self.forward(Delivery::Single {
            node,
            interaction_id,
        });
    }

    fn deliver_batch(&self, nodes: Vec<Node>, interaction_id: i64) {
        self.forward(Delivery::Batch {
            nodes,
            interaction_id,
        });
    }

    fn deliver_prefetch(&self, nodes: Vec<Node>, interaction_id: i64) {
        self.forward(Delivery::Prefetch {
            nodes,
            interaction_id,
        });
    }

    fn deliver_action_result(&self, success: bool, interaction_id: i64) {
        self.forward(Delivery::ActionResult {
            success,
            interaction_id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;

    #[test]
    fn test_channel_callback_forwards_in_order() {
        let (callback, mut rx) = ChannelCallback::new();
        callback.deliver_single(Some(Node::new(NodeId::host(1))), 10);
        callback.deliver_action_result(true, 11);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.interaction_id(), 10);
        assert!(matches!(first, Delivery::Single { node: Some(_), .. }));
        assert_eq!(
            rx.try_recv().unwrap(),
            Delivery::ActionResult {
                success: true,
                interaction_id: 11
            }
        );
    }

    #[test]
    fn test_dropped_receiver_is_not_an_error() {
        let (callback, rx) = ChannelCallback::new();
        drop(rx);
        callback.deliver_batch(Vec::new(), 1);
    }
}
