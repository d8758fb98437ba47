//! Owning-thread query dispatch for NodeBridge.
//!
//! An [`InteractionController`] owns the tree and runs every query against
//! it; [`InteractionClient`] handles submit from anywhere else. Requests
//! needing extra data can be held back while registered [`RequestPreparer`]s
//! run, and by-node-id fetches answer other pending requests they happen to
//! cover.

pub mod client;
pub mod controller;
pub mod coordinator;
pub mod preparer;

mod dispatcher;
mod execute;
mod merger;
mod message;
mod registry;

pub use client::InteractionClient;
pub use controller::InteractionController;
pub use coordinator::{HoldDecision, RequestPreparerCoordinator};
pub use dispatcher::takes_fast_path;
pub use preparer::{CompletionToken, RequestPreparer};
