//! In-memory [`NodeSource`] built from a serde-deserialisable tree description.

use std::collections::{BTreeMap, HashMap};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::NodeBridgeError;
use crate::flags::FetchFlags;
use crate::ids::{NodeId, HOST_ID, ROOT_OWNER_ID};
use crate::node::Node;
use crate::query::{ActionId, Direction, FocusKind, RequestArguments};
use crate::source::{AccessibilityFocus, NodeSource};

fn default_visible() -> bool {
    true
}

/// Whole-tree description, e.g. loaded from a YAML fixture.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSpec {
    pub root: u32,
    pub views: Vec<ViewSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility_focus: Option<FocusSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_focus: Option<u32>,
}

/// One real node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSpec {
    pub id: u32,
    #[serde(default)]
    pub children: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub focusable: bool,
    /// Virtual nodes exposed by this node's provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Vec<VirtualSpec>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, serde_json::Value>,
}

/// One virtual node under a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualSpec {
    pub id: u32,
    /// `None` means the provider host is the parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<u32>,
    #[serde(default)]
    pub children: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub focused: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSpec {
    pub host: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_descendant: Option<u32>,
}

/// A tree held entirely in memory; handles are real node ids.
#[derive(Debug, Clone)]
pub struct MemoryTree {
    root: u32,
    views: BTreeMap<u32, ViewSpec>,
    parents: HashMap<u32, u32>,
    attached: bool,
    interactive: bool,
    accessibility_focus: Option<(u32, Option<u32>)>,
    input_focus: Option<u32>,
    fetch_flags: FetchFlags,
    performed: Vec<(NodeId, ActionId)>,
    outside_touches: usize,
}

impl MemoryTree {
    pub fn from_spec(spec: TreeSpec) -> Self {
        let mut parents = HashMap::new();
        for view in &spec.views {
            for child in &view.children {
                parents.insert(*child, view.id);
            }
        }
        Self {
            root: spec.root,
            views: spec.views.into_iter().map(|v| (v.id, v)).collect(),
            parents,
            attached: true,
            interactive: true,
            accessibility_focus: spec
                .accessibility_focus
                .map(|f| (f.host, f.virtual_descendant)),
            input_focus: spec.input_focus,
            fetch_flags: FetchFlags::empty(),
            performed: Vec::new(),
            outside_touches: 0,
        }
    }

    /// Build a tree from a YAML fixture.
    pub fn from_yaml(raw: &str) -> Result<Self, NodeBridgeError> {
        let spec: TreeSpec = serde_yaml::from_str(raw).context("Failed to parse tree fixture")?;
        Ok(Self::from_spec(spec))
    }

    /// Tear the tree down; every later query is dropped.
    pub fn detach(&mut self) {
        self.attached = false;
    }

    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    /// Remove a real node (its children become unreachable).
    pub fn remove_view(&mut self, id: u32) {
        self.views.remove(&id);
        if let Some(parent) = self.parents.remove(&id) {
            if let Some(view) = self.views.get_mut(&parent) {
                view.children.retain(|c| *c != id);
            }
        }
    }

    pub fn view_mut(&mut self, id: u32) -> Option<&mut ViewSpec> {
        self.views.get_mut(&id)
    }

    /// Every action performed so far, in order.
    pub fn performed_actions(&self) -> &[(NodeId, ActionId)] {
        &self.performed
    }

    pub fn outside_touches(&self) -> usize {
        self.outside_touches
    }

    pub fn current_accessibility_focus(&self) -> Option<NodeId> {
        self.accessibility_focus
            .map(|(host, vd)| NodeId::new(host, vd.unwrap_or(HOST_ID)))
    }

    fn virtual_record(&self, host: u32, descendant_id: u32) -> Option<&VirtualSpec> {
        self.views
            .get(&host)?
            .provider
            .as_ref()?
            .iter()
            .find(|v| v.id == descendant_id)
    }

    fn top_level_virtuals(&self, host: u32) -> Vec<u32> {
        self.views
            .get(&host)
            .and_then(|v| v.provider.as_ref())
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.parent.is_none())
                    .map(|r| r.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Real nodes in depth-first order starting at `root`.
    fn walk(&self, root: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(view) = self.views.get(&id) else {
                continue;
            };
            out.push(id);
            stack.extend(view.children.iter().rev());
        }
        out
    }

    fn real_snapshot(&self, view: &ViewSpec, extra: Option<&RequestArguments>) -> Node {
        let id = NodeId::host(view.id);
        let mut node = Node::new(id).with_children(
            view.children
                .iter()
                .filter(|c| self.views.contains_key(c))
                .map(|c| NodeId::host(*c)),
        );
        if view.provider.is_some() {
            node.child_ids = self
                .top_level_virtuals(view.id)
                .into_iter()
                .map(|vd| NodeId::new(view.id, vd))
                .collect();
        }
        node.parent_id = self.parents.get(&view.id).map(|p| NodeId::host(*p));
        node.text = view.text.clone();
        if self.fetch_flags.contains(FetchFlags::REPORT_VIEW_IDS) {
            node.view_tag = view.tag.clone();
        }
        node.focused = self.input_focus == Some(view.id);
        node.accessibility_focused = self.accessibility_focus == Some((view.id, None));
        self.attach_extras(&mut node, view, extra);
        node
    }

    fn virtual_snapshot(
        &self,
        view: &ViewSpec,
        record: &VirtualSpec,
        extra: Option<&RequestArguments>,
    ) -> Node {
        let parent = record
            .parent
            .map(|p| NodeId::new(view.id, p))
            .unwrap_or_else(|| NodeId::host(view.id));
        let mut node = Node::new(NodeId::new(view.id, record.id))
            .with_parent(parent)
            .with_children(record.children.iter().map(|c| NodeId::new(view.id, *c)));
        node.text = record.text.clone();
        node.focused = record.focused;
        node.accessibility_focused = self.accessibility_focus == Some((view.id, Some(record.id)));
        self.attach_extras(&mut node, view, extra);
        node
    }

    fn attach_extras(&self, node: &mut Node, view: &ViewSpec, extra: Option<&RequestArguments>) {
        let Some(key) = extra.and_then(|e| e.extra_data_key.as_deref()) else {
            return;
        };
        if let Some(value) = view.extras.get(key) {
            node.extras.insert(key.to_string(), value.clone());
        }
    }
}

impl NodeSource for MemoryTree {
    type Handle = u32;

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn lookup(&self, owner_id: u32) -> Option<u32> {
        let id = if owner_id == ROOT_OWNER_ID {
            self.root
        } else {
            owner_id
        };
        self.views.contains_key(&id).then_some(id)
    }

    fn owner_id(&self, handle: &u32) -> u32 {
        *handle
    }

    fn is_visible(&self, handle: &u32) -> bool {
        if !self.views.get(handle).is_some_and(|v| v.visible) {
            return false;
        }
        let mut current = self.parents.get(handle).copied();
        while let Some(id) = current {
            match self.views.get(&id) {
                Some(view) if !view.visible => return false,
                Some(_) => current = self.parents.get(&id).copied(),
                // Dangling parent: the rest of the chain is unknown.
                None => break,
            }
        }
        true
    }

    fn has_provider(&self, handle: &u32) -> bool {
        self.views
            .get(handle)
            .is_some_and(|v| v.provider.is_some())
    }

    fn snapshot(
        &self,
        handle: &u32,
        descendant_id: u32,
        extra: Option<&RequestArguments>,
    ) -> Option<Node> {
        let view = self.views.get(handle)?;
        if descendant_id == HOST_ID {
            return Some(self.real_snapshot(view, extra));
        }
        let record = self.virtual_record(*handle, descendant_id)?;
        Some(self.virtual_snapshot(view, record, extra))
    }

    fn parent_for_accessibility(&self, handle: &u32) -> Option<u32> {
        self.parents.get(handle).copied()
    }

    fn children_for_accessibility(&self, handle: &u32) -> Vec<u32> {
        self.views
            .get(handle)
            .map(|v| {
                v.children
                    .iter()
                    .copied()
                    .filter(|c| self.views.contains_key(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_data_sensitive(&self, handle: &u32) -> bool {
        self.views.get(handle).is_some_and(|v| v.sensitive)
    }

    fn accepts_actions(&self) -> bool {
        self.interactive
    }

    fn set_fetch_flags(&mut self, flags: FetchFlags) {
        self.fetch_flags = flags;
    }

    fn reset_fetch_flags(&mut self) {
        self.fetch_flags = FetchFlags::empty();
    }

    fn views_with_tag(&self, root: &u32, tag: &str) -> Vec<u32> {
        self.walk(*root)
            .into_iter()
            .filter(|id| self.views[id].tag.as_deref() == Some(tag))
            .collect()
    }

    fn views_with_text(&self, root: &u32, text: &str) -> Vec<u32> {
        let needle = text.to_lowercase();
        self.walk(*root)
            .into_iter()
            .filter(|id| {
                let view = &self.views[id];
                view.provider.is_some()
                    || view
                        .text
                        .as_deref()
                        .is_some_and(|t| t.to_lowercase().contains(&needle))
            })
            .collect()
    }

    fn provider_find_by_text(&self, handle: &u32, descendant_id: u32, text: &str) -> Vec<Node> {
        let Some(view) = self.views.get(handle) else {
            return Vec::new();
        };
        let needle = text.to_lowercase();
        let mut stack: Vec<u32> = if descendant_id == HOST_ID {
            self.top_level_virtuals(*handle)
        } else {
            vec![descendant_id]
        };
        stack.reverse();
        let mut found = Vec::new();
        while let Some(vd) = stack.pop() {
            let Some(record) = self.virtual_record(*handle, vd) else {
                continue;
            };
            if record
                .text
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains(&needle))
            {
                found.push(self.virtual_snapshot(view, record, None));
            }
            stack.extend(record.children.iter().rev());
        }
        found
    }

    fn accessibility_focus(&self) -> Option<AccessibilityFocus<u32>> {
        self.accessibility_focus
            .filter(|(host, _)| self.views.contains_key(host))
            .map(|(host, virtual_descendant)| AccessibilityFocus {
                host,
                virtual_descendant,
            })
    }

    fn input_focus(&self, root: &u32) -> Option<u32> {
        self.input_focus
            .filter(|f| self.views.contains_key(f) && self.is_descendant_of(f, root))
    }

    fn provider_find_focus(&self, handle: &u32, kind: FocusKind) -> Option<Node> {
        let view = self.views.get(handle)?;
        let record = match kind {
            FocusKind::Input => view.provider.as_ref()?.iter().find(|r| r.focused)?,
            FocusKind::Accessibility => {
                let (host, vd) = self.accessibility_focus?;
                if host != *handle {
                    return None;
                }
                self.virtual_record(host, vd?)?
            }
        };
        Some(self.virtual_snapshot(view, record, None))
    }

    fn focus_search(&self, root: &u32, direction: Direction) -> Option<u32> {
        let order: Vec<u32> = self
            .walk(*root)
            .into_iter()
            .filter(|id| self.views[id].focusable && self.is_visible(id))
            .collect();
        let current = self
            .input_focus
            .and_then(|f| order.iter().position(|id| *id == f));
        let next = match (direction, current) {
            (_, None) => 0,
            (Direction::Forward | Direction::Down | Direction::Right, Some(i)) => i + 1,
            (Direction::Backward | Direction::Up | Direction::Left, Some(i)) => i.checked_sub(1)?,
        };
        order.get(next).copied()
    }

    fn perform_action(
        &mut self,
        handle: &u32,
        descendant_id: u32,
        action: ActionId,
        _args: Option<&RequestArguments>,
    ) -> bool {
        if !self.views.contains_key(handle) {
            return false;
        }
        if descendant_id != HOST_ID && self.virtual_record(*handle, descendant_id).is_none() {
            return false;
        }
        let virtual_descendant = (descendant_id != HOST_ID).then_some(descendant_id);
        match action {
            ActionId::ACCESSIBILITY_FOCUS => {
                self.accessibility_focus = Some((*handle, virtual_descendant));
            }
            ActionId::CLEAR_ACCESSIBILITY_FOCUS => {
                if self.accessibility_focus != Some((*handle, virtual_descendant)) {
                    return false;
                }
                self.accessibility_focus = None;
            }
            ActionId::FOCUS if virtual_descendant.is_none() => {
                self.input_focus = Some(*handle);
            }
            _ => {}
        }
        debug!(owner_id = handle, descendant_id, action = action.0, "Action performed");
        self.performed
            .push((NodeId::new(*handle, descendant_id), action));
        true
    }

    fn notify_outside_touch(&mut self, _root: &u32) {
        self.outside_touches += 1;
    }
}
