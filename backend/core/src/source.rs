//! The owning thread's view of the tree.
//!
//! Only the owning thread ever holds a `NodeSource`, so nothing here needs to
//! be `Sync`. A handle names a real node; virtual nodes are addressed as
//! `(handle, descendant_id)` and resolved through the handle's provider.
//! Virtual children are read from the `child_ids` of a provider snapshot.

use std::fmt;

use crate::flags::FetchFlags;
use crate::ids::HOST_ID;
use crate::node::Node;
use crate::query::{ActionId, Direction, FocusKind, RequestArguments};

/// Where accessibility focus currently sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessibilityFocus<H> {
    /// Real node holding the focus, or hosting the focused virtual node.
    pub host: H,
    /// Focused virtual node under `host`, if any.
    pub virtual_descendant: Option<u32>,
}

pub trait NodeSource {
    type Handle: Clone + fmt::Debug;

    /// False once the tree has been torn down.
    fn is_attached(&self) -> bool;

    /// Resolve a real node; [`crate::ROOT_OWNER_ID`] resolves to the root.
    fn lookup(&self, owner_id: u32) -> Option<Self::Handle>;

    fn owner_id(&self, handle: &Self::Handle) -> u32;

    /// Shown on screen, including every ancestor.
    fn is_visible(&self, handle: &Self::Handle) -> bool;

    /// Whether the node's subtree is exposed through a virtual-node provider.
    fn has_provider(&self, handle: &Self::Handle) -> bool;

    /// Snapshot a node.
    ///
    /// For a provider-backed handle `descendant_id` selects the virtual node
    /// ([`HOST_ID`] is the host itself); for a plain real node only
    /// [`HOST_ID`] resolves. When `extra` names an extra-data key the source
    /// attaches that data to the snapshot.
    fn snapshot(
        &self,
        handle: &Self::Handle,
        descendant_id: u32,
        extra: Option<&RequestArguments>,
    ) -> Option<Node>;

    fn parent_for_accessibility(&self, handle: &Self::Handle) -> Option<Self::Handle>;

    /// Real children in accessibility order.
    fn children_for_accessibility(&self, handle: &Self::Handle) -> Vec<Self::Handle>;

    fn is_data_sensitive(&self, _handle: &Self::Handle) -> bool {
        false
    }

    /// False while the tree is stopped or paused.
    fn accepts_actions(&self) -> bool {
        true
    }

    fn set_fetch_flags(&mut self, _flags: FetchFlags) {}

    fn reset_fetch_flags(&mut self) {}

    fn is_descendant_of(&self, handle: &Self::Handle, ancestor: &Self::Handle) -> bool {
        let target = self.owner_id(ancestor);
        let mut current = Some(handle.clone());
        while let Some(node) = current {
            if self.owner_id(&node) == target {
                return true;
            }
            current = self.parent_for_accessibility(&node);
        }
        false
    }

    /// Real nodes under (and including) `root` whose view tag equals `tag`.
    fn views_with_tag(&self, _root: &Self::Handle, _tag: &str) -> Vec<Self::Handle> {
        Vec::new()
    }

    /// Real nodes under (and including) `root` whose text contains `text`.
    fn views_with_text(&self, _root: &Self::Handle, _text: &str) -> Vec<Self::Handle> {
        Vec::new()
    }

    /// Text search delegated to the provider of `handle`.
    fn provider_find_by_text(
        &self,
        _handle: &Self::Handle,
        _descendant_id: u32,
        _text: &str,
    ) -> Vec<Node> {
        Vec::new()
    }

    fn accessibility_focus(&self) -> Option<AccessibilityFocus<Self::Handle>> {
        None
    }

    /// Real node holding input focus under `root`.
    fn input_focus(&self, _root: &Self::Handle) -> Option<Self::Handle> {
        None
    }

    /// Focus lookup delegated to the provider of `handle`.
    fn provider_find_focus(&self, _handle: &Self::Handle, _kind: FocusKind) -> Option<Node> {
        None
    }

    fn focus_search(&self, _root: &Self::Handle, _direction: Direction) -> Option<Self::Handle> {
        None
    }

    /// Perform `action` on `(handle, descendant_id)`; `descendant_id` is
    /// [`HOST_ID`] unless the handle has a provider.
    fn perform_action(
        &mut self,
        _handle: &Self::Handle,
        _descendant_id: u32,
        _action: ActionId,
        _args: Option<&RequestArguments>,
    ) -> bool {
        false
    }

    fn notify_outside_touch(&mut self, _root: &Self::Handle) {}
}

/// Snapshot a real node as itself.
pub fn snapshot_host<S: NodeSource + ?Sized>(source: &S, handle: &S::Handle) -> Option<Node> {
    source.snapshot(handle, HOST_ID, None)
}
