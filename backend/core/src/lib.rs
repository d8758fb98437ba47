pub mod callback;
pub mod error;
pub mod flags;
pub mod ids;
pub mod memory;
pub mod node;
pub mod query;
pub mod source;

pub use callback::{CallbackHandle, ChannelCallback, Delivery, InteractionCallback};
pub use error::NodeBridgeError;
pub use flags::FetchFlags;
pub use ids::{CallerIdentity, NodeId, ProcessId, ThreadId, HOST_ID, ROOT_OWNER_ID};
pub use memory::{FocusSpec, MemoryTree, TreeSpec, ViewSpec, VirtualSpec};
pub use node::Node;
pub use query::{ActionId, Direction, FocusKind, Query, QueryKind, Request, RequestArguments};
pub use source::{snapshot_host, AccessibilityFocus, NodeSource};
