use std::collections::VecDeque;

use nodebridge_core::{snapshot_host, Node, NodeId, NodeSource};

/// Which end of the deque the next node is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOrder {
    /// Children pushed in reverse, taken from the head.
    DepthFirst,
    /// Children pushed in order, taken from the tail.
    BreadthFirst,
}

/// One deque serving as a stack or a queue depending on `order`.
///
/// Items are always pushed at the head; only the removal end differs.
#[derive(Debug)]
pub struct PrefetchDeque<T> {
    order: TraversalOrder,
    items: VecDeque<T>,
}

impl<T> PrefetchDeque<T> {
    pub fn new(order: TraversalOrder) -> Self {
        Self {
            order,
            items: VecDeque::new(),
        }
    }

    pub fn order(&self) -> TraversalOrder {
        self.order
    }

    pub fn push(&mut self, item: T) {
        self.items.push_front(item);
    }

    /// Push children so that they come out in child order.
    pub fn push_children(&mut self, children: Vec<T>) {
        match self.order {
            TraversalOrder::DepthFirst => children.into_iter().rev().for_each(|c| self.push(c)),
            TraversalOrder::BreadthFirst => children.into_iter().for_each(|c| self.push(c)),
        }
    }

    pub fn next(&mut self) -> Option<T> {
        match self.order {
            TraversalOrder::DepthFirst => self.items.pop_front(),
            TraversalOrder::BreadthFirst => self.items.pop_back(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A traversal unit: either a real node or a node reached through a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum DequeNode<H> {
    RealNode { handle: H },
    VirtualNode { node_id: NodeId, provider: H },
}

impl<H: Clone> DequeNode<H> {
    /// Wrap a real node, going through its provider when it has one.
    pub fn for_handle<S>(source: &S, handle: &H) -> Self
    where
        S: NodeSource<Handle = H> + ?Sized,
    {
        if source.has_provider(handle) {
            DequeNode::VirtualNode {
                node_id: NodeId::host(source.owner_id(handle)),
                provider: handle.clone(),
            }
        } else {
            DequeNode::RealNode {
                handle: handle.clone(),
            }
        }
    }

    pub fn id<S>(&self, source: &S) -> NodeId
    where
        S: NodeSource<Handle = H> + ?Sized,
    {
        match self {
            DequeNode::RealNode { handle } => NodeId::host(source.owner_id(handle)),
            DequeNode::VirtualNode { node_id, .. } => *node_id,
        }
    }

    pub fn snapshot<S>(&self, source: &S) -> Option<Node>
    where
        S: NodeSource<Handle = H> + ?Sized,
    {
        match self {
            DequeNode::RealNode { handle } => snapshot_host(source, handle),
            DequeNode::VirtualNode { node_id, provider } => {
                source.snapshot(provider, node_id.descendant_id, None)
            }
        }
    }

    /// Children in child order. Virtual children come from `snapshot`.
    pub fn children<S>(&self, source: &S, snapshot: Option<&Node>) -> Vec<DequeNode<H>>
    where
        S: NodeSource<Handle = H> + ?Sized,
    {
        match self {
            DequeNode::RealNode { handle } => source
                .children_for_accessibility(handle)
                .iter()
                .filter(|child| source.is_visible(child))
                .map(|child| DequeNode::for_handle(source, child))
                .collect(),
            DequeNode::VirtualNode { provider, .. } => snapshot
                .map(|node| {
                    node.child_ids
                        .iter()
                        .map(|id| DequeNode::VirtualNode {
                            node_id: *id,
                            provider: provider.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_first_is_a_stack() {
        let mut deque = PrefetchDeque::new(TraversalOrder::DepthFirst);
        deque.push_children(vec![1, 2, 3]);
        assert_eq!(deque.next(), Some(1));
        deque.push_children(vec![10, 11]);
        let rest: Vec<_> = std::iter::from_fn(|| deque.next()).collect();
        assert_eq!(rest, vec![10, 11, 2, 3]);
    }

    #[test]
    fn test_breadth_first_is_a_queue() {
        let mut deque = PrefetchDeque::new(TraversalOrder::BreadthFirst);
        deque.push_children(vec![1, 2, 3]);
        assert_eq!(deque.next(), Some(1));
        deque.push_children(vec![10, 11]);
        assert_eq!(deque.len(), 4);
        let rest: Vec<_> = std::iter::from_fn(|| deque.next()).collect();
        assert_eq!(rest, vec![2, 3, 10, 11]);
        assert!(deque.is_empty());
    }

    #[test]
    fn test_provider_host_becomes_virtual_node() {
        let tree = crate::fixtures::tree(
            r#"
root: 1
views:
  - id: 1
    children: [2, 3]
  - id: 2
  - id: 3
    provider:
      - id: 7
"#,
        );
        let root = DequeNode::for_handle(&tree, &1);
        let children = root.children(&tree, None);
        assert_eq!(
            children,
            vec![
                DequeNode::RealNode { handle: 2 },
                DequeNode::VirtualNode {
                    node_id: NodeId::host(3),
                    provider: 3
                },
            ]
        );
        let host = children[1].snapshot(&tree).unwrap();
        let virtual_children = children[1].children(&tree, Some(&host));
        assert_eq!(
            virtual_children,
            vec![DequeNode::VirtualNode {
                node_id: NodeId::new(3, 7),
                provider: 3
            }]
        );
    }
}
