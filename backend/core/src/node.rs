use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::NodeId;

/// Immutable snapshot of one tree node, produced on the owning thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// `None` at the top of the tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_ids: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_tag: Option<String>,
    #[serde(default)]
    pub focused: bool,
    #[serde(default)]
    pub accessibility_focused: bool,
    /// Data attached on request through an extra-data key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            parent_id: None,
            child_ids: Vec::new(),
            text: None,
            view_tag: None,
            focused: false,
            accessibility_focused: false,
            extras: BTreeMap::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: NodeId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_children(mut self, child_ids: impl IntoIterator<Item = NodeId>) -> Self {
        self.child_ids = child_ids.into_iter().collect();
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}
