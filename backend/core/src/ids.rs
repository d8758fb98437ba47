use std::fmt;

use serde::{Deserialize, Serialize};

/// Descendant id meaning "the real node itself" rather than a virtual child.
pub const HOST_ID: u32 = u32::MAX;

/// Owner id that resolves to the root of the tree.
pub const ROOT_OWNER_ID: u32 = u32::MAX - 1;

/// Compound identifier of a node in the tree.
///
/// `owner_id` names a real node; `descendant_id` names either the real node
/// itself ([`HOST_ID`]) or one of the virtual nodes its provider exposes.
/// Ids are only stable for one query/prefetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub owner_id: u32,
    pub descendant_id: u32,
}

impl NodeId {
    pub const fn new(owner_id: u32, descendant_id: u32) -> Self {
        Self {
            owner_id,
            descendant_id,
        }
    }

    /// Id of the real node `owner_id` itself.
    pub const fn host(owner_id: u32) -> Self {
        Self::new(owner_id, HOST_ID)
    }

    pub const fn is_host(&self) -> bool {
        self.descendant_id == HOST_ID
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_host() {
            write!(f, "{}", self.owner_id)
        } else {
            write!(f, "{}:{}", self.owner_id, self.descendant_id)
        }
    }
}

/// Opaque thread identifier supplied by whoever submits a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub u64);

/// Opaque process identifier supplied by whoever submits a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub u32);

/// Where a query came from.
///
/// The same-thread fast path is a pure comparison of two of these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub process_id: ProcessId,
    pub thread_id: ThreadId,
}

impl CallerIdentity {
    pub const fn new(process_id: u32, thread_id: u64) -> Self {
        Self {
            process_id: ProcessId(process_id),
            thread_id: ThreadId(thread_id),
        }
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid={} tid={}", self.process_id.0, self.thread_id.0)
    }
}
