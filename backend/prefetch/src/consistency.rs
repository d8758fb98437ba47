//! Structural checks over a result batch, used as a debugging aid.

use std::collections::{HashMap, HashSet, VecDeque};

use nodebridge_core::{Node, NodeId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error("duplicate node {0} in result batch")]
    DuplicateNode(NodeId),

    #[error("both {first} and {second} report accessibility focus")]
    DuplicateAccessibilityFocus { first: NodeId, second: NodeId },

    #[error("both {first} and {second} report input focus")]
    DuplicateInputFocus { first: NodeId, second: NodeId },

    #[error("{count} node(s) not connected to batch root {root}")]
    Disconnected { root: NodeId, count: usize },
}

/// Check that `nodes` form a single tree.
///
/// The root is found by following parent links from the first node while the
/// parent is in the batch; every node must then be reachable from it through
/// child links.
pub fn verify_tree(nodes: &[Node]) -> Result<(), ConsistencyError> {
    let Some(first) = nodes.first() else {
        return Ok(());
    };

    let mut by_id: HashMap<NodeId, &Node> = HashMap::with_capacity(nodes.len());
    let mut accessibility_focus: Option<NodeId> = None;
    let mut input_focus: Option<NodeId> = None;
    for node in nodes {
        if by_id.insert(node.id, node).is_some() {
            return Err(ConsistencyError::DuplicateNode(node.id));
        }
        if node.accessibility_focused {
            if let Some(first) = accessibility_focus {
                return Err(ConsistencyError::DuplicateAccessibilityFocus {
                    first,
                    second: node.id,
                });
            }
            accessibility_focus = Some(node.id);
        }
        if node.focused {
            if let Some(first) = input_focus {
                return Err(ConsistencyError::DuplicateInputFocus {
                    first,
                    second: node.id,
                });
            }
            input_focus = Some(node.id);
        }
    }

    let mut root = first;
    let mut climbed = 0;
    while let Some(parent) = root.parent_id.and_then(|id| by_id.get(&id).copied()) {
        climbed += 1;
        if climbed > nodes.len() {
            break;
        }
        root = parent;
    }

    let mut seen = HashSet::from([root.id]);
    let mut queue = VecDeque::from([root]);
    while let Some(node) = queue.pop_front() {
        for child_id in &node.child_ids {
            if let Some(child) = by_id.get(child_id) {
                if seen.insert(*child_id) {
                    queue.push_back(*child);
                }
            }
        }
    }

    if seen.len() != nodes.len() {
        return Err(ConsistencyError::Disconnected {
            root: root.id,
            count: nodes.len() - seen.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u32, parent: Option<u32>, children: &[u32]) -> Node {
        let mut n = Node::new(NodeId::host(id))
            .with_children(children.iter().map(|c| NodeId::host(*c)));
        n.parent_id = parent.map(NodeId::host);
        n
    }

    #[test]
    fn test_connected_batch_passes() {
        let batch = vec![
            node(2, Some(1), &[4]),
            node(1, None, &[2, 3]),
            node(3, Some(1), &[]),
            node(4, Some(2), &[]),
        ];
        assert_eq!(verify_tree(&batch), Ok(()));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let batch = vec![node(1, None, &[]), node(1, None, &[])];
        assert_eq!(
            verify_tree(&batch),
            Err(ConsistencyError::DuplicateNode(NodeId::host(1)))
        );
    }

    #[test]
    fn test_two_input_focuses_rejected() {
        let mut a = node(1, None, &[2]);
        let mut b = node(2, Some(1), &[]);
        a.focused = true;
        b.focused = true;
        assert!(matches!(
            verify_tree(&[a, b]),
            Err(ConsistencyError::DuplicateInputFocus { .. })
        ));
    }

    #[test]
    fn test_disconnected_node_rejected() {
        let batch = vec![
            node(1, None, &[2]),
            node(2, Some(1), &[]),
            node(9, Some(8), &[]),
        ];
        assert_eq!(
            verify_tree(&batch),
            Err(ConsistencyError::Disconnected {
                root: NodeId::host(1),
                count: 1
            })
        );
    }
}
