pub mod consistency;
pub mod deque;
pub mod prefetcher;

pub use consistency::{verify_tree, ConsistencyError};
pub use deque::{DequeNode, PrefetchDeque, TraversalOrder};
pub use prefetcher::prefetch;
