use std::fmt;

use serde::{Deserialize, Serialize};

use crate::callback::CallbackHandle;
use crate::error::NodeBridgeError;
use crate::flags::FetchFlags;
use crate::ids::NodeId;

/// Which focus a `FindFocus` query looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusKind {
    Input,
    Accessibility,
}

impl TryFrom<u32> for FocusKind {
    type Error = NodeBridgeError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            1 => Ok(FocusKind::Input),
            2 => Ok(FocusKind::Accessibility),
            other => Err(NodeBridgeError::UnknownFocusKind(other)),
        }
    }
}

/// Direction of a `FocusSearch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Backward,
    Forward,
    Left,
    Up,
    Right,
    Down,
}

impl TryFrom<u32> for Direction {
    type Error = NodeBridgeError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0x01 => Ok(Direction::Backward),
            0x02 => Ok(Direction::Forward),
            0x11 => Ok(Direction::Left),
            0x21 => Ok(Direction::Up),
            0x42 => Ok(Direction::Right),
            0x82 => Ok(Direction::Down),
            other => Err(NodeBridgeError::UnknownDirection(other)),
        }
    }
}

/// Numeric action identifier understood by the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub u32);

impl ActionId {
    pub const FOCUS: ActionId = ActionId(0x0001);
    pub const CLEAR_FOCUS: ActionId = ActionId(0x0002);
    pub const CLICK: ActionId = ActionId(0x0010);
    pub const ACCESSIBILITY_FOCUS: ActionId = ActionId(0x0040);
    pub const CLEAR_ACCESSIBILITY_FOCUS: ActionId = ActionId(0x0080);
}

/// Free-form arguments attached to a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestArguments {
    /// Asks the source to attach this extra data to the snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data_key: Option<String>,
    #[serde(default)]
    pub values: serde_json::Map<String, serde_json::Value>,
}

impl RequestArguments {
    pub fn extra_data(key: impl Into<String>) -> Self {
        Self {
            extra_data_key: Some(key.into()),
            values: serde_json::Map::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

/// Every kind of query the owning thread can execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Query {
    ByNodeId {
        node_id: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extra_args: Option<RequestArguments>,
    },
    ByViewTag {
        owner_id: u32,
        tag: String,
    },
    ByText {
        owner_id: u32,
        descendant_id: u32,
        text: String,
    },
    FindFocus {
        owner_id: u32,
        descendant_id: u32,
        focus_kind: FocusKind,
    },
    FocusSearch {
        owner_id: u32,
        direction: Direction,
    },
    PerformAction {
        owner_id: u32,
        descendant_id: u32,
        action: ActionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<RequestArguments>,
    },
    /// Internal: clear whatever holds accessibility focus.
    ClearAccessibilityFocus,
    /// Internal: tell the root a touch landed outside it.
    NotifyOutsideTouch,
}

/// Discriminant of [`Query`], used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    ByNodeId,
    ByViewTag,
    ByText,
    FindFocus,
    FocusSearch,
    PerformAction,
    ClearAccessibilityFocus,
    NotifyOutsideTouch,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryKind::ByNodeId => "by_node_id",
            QueryKind::ByViewTag => "by_view_tag",
            QueryKind::ByText => "by_text",
            QueryKind::FindFocus => "find_focus",
            QueryKind::FocusSearch => "focus_search",
            QueryKind::PerformAction => "perform_action",
            QueryKind::ClearAccessibilityFocus => "clear_accessibility_focus",
            QueryKind::NotifyOutsideTouch => "notify_outside_touch",
        };
        f.write_str(name)
    }
}

impl Query {
    pub fn kind(&self) -> QueryKind {
        match self {
            Query::ByNodeId { .. } => QueryKind::ByNodeId,
            Query::ByViewTag { .. } => QueryKind::ByViewTag,
            Query::ByText { .. } => QueryKind::ByText,
            Query::FindFocus { .. } => QueryKind::FindFocus,
            Query::FocusSearch { .. } => QueryKind::FocusSearch,
            Query::PerformAction { .. } => QueryKind::PerformAction,
            Query::ClearAccessibilityFocus => QueryKind::ClearAccessibilityFocus,
            Query::NotifyOutsideTouch => QueryKind::NotifyOutsideTouch,
        }
    }

    /// Whether executing this query owes the caller a delivery.
    pub fn has_callback(&self) -> bool {
        !matches!(
            self,
            Query::ClearAccessibilityFocus | Query::NotifyOutsideTouch
        )
    }

    /// Extra-data key and arguments of a by-node-id query, if it asks for extra data.
    pub fn extra_data_request(&self) -> Option<(NodeId, &str, &RequestArguments)> {
        match self {
            Query::ByNodeId {
                node_id,
                extra_args: Some(args),
            } => args
                .extra_data_key
                .as_deref()
                .map(|key| (*node_id, key, args)),
            _ => None,
        }
    }
}

/// A query plus the metadata needed to answer it.
#[derive(Clone)]
pub struct Request {
    pub query: Query,
    pub flags: FetchFlags,
    pub interaction_id: i64,
    pub callback: Option<CallbackHandle>,
}

impl Request {
    pub fn new(query: Query, flags: FetchFlags, interaction_id: i64) -> Self {
        Self {
            query,
            flags,
            interaction_id,
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: CallbackHandle) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Contract checks performed before a request is accepted.
    pub fn validate(&self) -> Result<(), NodeBridgeError> {
        self.flags.validate()?;
        if self.query.has_callback() && self.callback.is_none() {
            return Err(NodeBridgeError::MissingCallback(self.query.kind()));
        }
        Ok(())
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("query", &self.query)
            .field("flags", &self.flags)
            .field("interaction_id", &self.interaction_id)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
