//! Bounded prefetch around a primary result.
//!
//! Strategies run in a fixed order (ancestors, siblings, hybrid descendants,
//! full descendants) and share one output list. Every step checks the cap and
//! the interruption probe before adding a node; an interrupted walk keeps what
//! it already produced. Each walk visits a node at most once, so cyclic
//! parent or child links cannot keep it going.

use std::collections::HashSet;

use nodebridge_core::{snapshot_host, FetchFlags, Node, NodeId, NodeSource};
use tracing::debug;

use crate::deque::{DequeNode, PrefetchDeque, TraversalOrder};

/// Compute extra nodes related to `primary`.
///
/// `handle` is the real node `primary` was read from (the provider host when
/// `primary` is virtual). The result never contains `primary`, never repeats a
/// node and never holds more than `cap` nodes.
pub fn prefetch<S, F>(
    source: &S,
    primary: Option<&Node>,
    handle: &S::Handle,
    strategy: FetchFlags,
    cap: usize,
    interrupt: F,
) -> Vec<Node>
where
    S: NodeSource + ?Sized,
    F: Fn() -> bool,
{
    let Some(primary) = primary else {
        return Vec::new();
    };
    let mut prefetcher = Prefetcher {
        source,
        cap,
        interrupt,
        out: Vec::new(),
        seen: HashSet::from([primary.id]),
    };
    prefetcher.run(handle, primary, strategy);
    debug!(
        primary = %primary.id,
        prefetched = prefetcher.out.len(),
        strategy = ?strategy.strategy(),
        "Prefetch finished"
    );
    prefetcher.out
}

struct Prefetcher<'a, S: NodeSource + ?Sized, F> {
    source: &'a S,
    cap: usize,
    interrupt: F,
    out: Vec<Node>,
    /// Ids in `out`, plus the primary.
    seen: HashSet<NodeId>,
}

impl<S, F> Prefetcher<'_, S, F>
where
    S: NodeSource + ?Sized,
    F: Fn() -> bool,
{
    fn should_stop(&self) -> bool {
        self.out.len() >= self.cap || (self.interrupt)()
    }

    fn add(&mut self, node: Node) {
        if self.seen.insert(node.id) {
            self.out.push(node);
        }
    }

    /// Drop everything added since `start`.
    fn discard_from(&mut self, start: usize) {
        debug!(dropped = self.out.len() - start, "Broken ancestor chain");
        for node in self.out.drain(start..) {
            self.seen.remove(&node.id);
        }
    }

    fn run(&mut self, handle: &S::Handle, primary: &Node, strategy: FetchFlags) {
        let through_provider = self.source.has_provider(handle);

        if strategy.contains(FetchFlags::PREFETCH_ANCESTORS) {
            if through_provider {
                self.virtual_ancestors(handle, primary);
            } else {
                let start = self.out.len();
                self.real_ancestors(handle, start);
            }
        }

        if strategy.contains(FetchFlags::PREFETCH_SIBLINGS) {
            if through_provider {
                self.virtual_siblings(handle, primary);
            } else {
                self.real_siblings(handle);
            }
        }

        if strategy.contains(FetchFlags::PREFETCH_DESCENDANTS_HYBRID) {
            if through_provider {
                self.virtual_descendants(handle, primary);
            } else {
                self.hybrid_descendants(handle);
            }
        }

        let order = if strategy.contains(FetchFlags::PREFETCH_DESCENDANTS_DEPTH_FIRST) {
            Some(TraversalOrder::DepthFirst)
        } else if strategy.contains(FetchFlags::PREFETCH_DESCENDANTS_BREADTH_FIRST) {
            Some(TraversalOrder::BreadthFirst)
        } else {
            None
        };
        if let Some(order) = order {
            self.full_descendants(handle, primary, order);
        }
    }

    /// Walk real parents upward. A parent that cannot be snapshotted drops
    /// everything added since `start`.
    fn real_ancestors(&mut self, handle: &S::Handle, start: usize) {
        let mut visited = HashSet::from([self.source.owner_id(handle)]);
        let mut current = self.source.parent_for_accessibility(handle);
        while let Some(parent) = current {
            if self.should_stop() {
                return;
            }
            if !visited.insert(self.source.owner_id(&parent)) {
                debug!("Ancestor cycle, walk stopped");
                return;
            }
            let Some(node) = snapshot_host(self.source, &parent) else {
                self.discard_from(start);
                return;
            };
            self.add(node);
            current = self.source.parent_for_accessibility(&parent);
        }
    }

    /// Follow parent ids through the provider, then continue with the host's
    /// real ancestors once the chain leaves the provider.
    fn virtual_ancestors(&mut self, handle: &S::Handle, primary: &Node) {
        let start = self.out.len();
        let host_owner = self.source.owner_id(handle);
        let mut visited = HashSet::from([primary.id]);
        let mut parent_id = primary.parent_id;
        while let Some(id) = parent_id {
            if self.should_stop() {
                return;
            }
            if id.is_host() && id.owner_id != host_owner {
                self.real_ancestors(handle, start);
                return;
            }
            if !visited.insert(id) {
                debug!(node = %id, "Ancestor cycle, walk stopped");
                return;
            }
            let Some(node) = self.source.snapshot(handle, id.descendant_id, None) else {
                self.discard_from(start);
                return;
            };
            parent_id = node.parent_id;
            self.add(node);
        }
    }

    /// The parent (unless already fetched), then its other visible children.
    fn real_siblings(&mut self, handle: &S::Handle) {
        let Some(parent) = self.source.parent_for_accessibility(handle) else {
            return;
        };
        if let Some(node) = snapshot_host(self.source, &parent) {
            if self.should_stop() {
                return;
            }
            self.add(node);
        }
        let own_id = self.source.owner_id(handle);
        for child in self.source.children_for_accessibility(&parent) {
            if self.should_stop() {
                return;
            }
            if self.source.owner_id(&child) == own_id || !self.source.is_visible(&child) {
                continue;
            }
            if let Some(node) = snapshot_host(self.source, &child) {
                self.add(node);
            }
        }
    }

    fn virtual_siblings(&mut self, handle: &S::Handle, primary: &Node) {
        let Some(parent_id) = primary.parent_id else {
            return;
        };
        if parent_id.is_host() && parent_id.owner_id != self.source.owner_id(handle) {
            self.real_siblings(handle);
            return;
        }
        let Some(parent) = self.source.snapshot(handle, parent_id.descendant_id, None) else {
            return;
        };
        let child_ids = parent.child_ids.clone();
        if self.should_stop() {
            return;
        }
        self.add(parent);
        for child_id in child_ids {
            if self.should_stop() {
                return;
            }
            if child_id == primary.id {
                continue;
            }
            if let Some(node) = self.source.snapshot(handle, child_id.descendant_id, None) {
                self.add(node);
            }
        }
    }

    /// Direct visible children; only provider-backed children are descended.
    fn hybrid_descendants(&mut self, handle: &S::Handle) {
        let mut provider_hosts = Vec::new();
        for child in self.source.children_for_accessibility(handle) {
            if self.should_stop() {
                return;
            }
            if !self.source.is_visible(&child) {
                continue;
            }
            if let Some(node) = snapshot_host(self.source, &child) {
                if self.source.has_provider(&child) {
                    provider_hosts.push((child, node.clone()));
                }
                self.add(node);
            }
        }
        for (host, node) in provider_hosts {
            if self.should_stop() {
                return;
            }
            self.virtual_descendants(&host, &node);
        }
    }

    /// All children of `node` first, then each child's subtree.
    fn virtual_descendants(&mut self, handle: &S::Handle, node: &Node) {
        let start = self.out.len();
        for child_id in &node.child_ids {
            if self.should_stop() {
                return;
            }
            if let Some(child) = self.source.snapshot(handle, child_id.descendant_id, None) {
                self.add(child);
            }
        }
        let added: Vec<Node> = self.out[start..].to_vec();
        for child in added {
            if self.should_stop() {
                return;
            }
            self.virtual_descendants(handle, &child);
        }
    }

    fn full_descendants(&mut self, handle: &S::Handle, primary: &Node, order: TraversalOrder) {
        let root = if self.source.has_provider(handle) {
            DequeNode::VirtualNode {
                node_id: primary.id,
                provider: handle.clone(),
            }
        } else {
            DequeNode::RealNode {
                handle: handle.clone(),
            }
        };
        let mut visited = HashSet::from([root.id(self.source)]);
        let mut deque = PrefetchDeque::new(order);
        deque.push_children(root.children(self.source, Some(primary)));
        while let Some(next) = deque.next() {
            if self.should_stop() {
                return;
            }
            if !visited.insert(next.id(self.source)) {
                continue;
            }
            let snapshot = next.snapshot(self.source);
            deque.push_children(next.children(self.source, snapshot.as_ref()));
            if let Some(node) = snapshot {
                self.add(node);
            }
        }
    }
}
