use thiserror::Error;

use crate::flags::FetchFlags;
use crate::query::QueryKind;

/// Top-level error type for NodeBridge.
#[derive(Debug, Error)]
pub enum NodeBridgeError {
    #[error("conflicting prefetch strategies: {0:?}")]
    ConflictingStrategies(FetchFlags),

    #[error("unknown focus kind: {0}")]
    UnknownFocusKind(u32),

    #[error("unknown focus direction: {0:#x}")]
    UnknownDirection(u32),

    #[error("{0} query submitted without a callback")]
    MissingCallback(QueryKind),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
