//! Config defaults: fills every unset field with its documented value.

use crate::schema::{DispatchConfig, LoggingConfig, NodeBridgeConfig};

/// Default preparer hold-off before held queries are released (ms).
pub const DEFAULT_PREPARER_TIMEOUT_MS: u64 = 500;

/// Default cap on prefetched nodes per query.
pub const DEFAULT_MAX_PREFETCHED_NODES: usize = 50;

/// Default `tracing` level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: NodeBridgeConfig) -> NodeBridgeConfig {
    let config = apply_dispatch_defaults(config);
    apply_logging_defaults(config)
}

fn apply_dispatch_defaults(mut config: NodeBridgeConfig) -> NodeBridgeConfig {
    let dispatch = config.dispatch.get_or_insert_with(DispatchConfig::default);
    if dispatch.preparer_timeout_ms.is_none() {
        dispatch.preparer_timeout_ms = Some(DEFAULT_PREPARER_TIMEOUT_MS);
    }
    if dispatch.max_prefetched_nodes.is_none() {
        dispatch.max_prefetched_nodes = Some(DEFAULT_MAX_PREFETCHED_NODES);
    }
    if dispatch.enforce_tree_consistency.is_none() {
        dispatch.enforce_tree_consistency = Some(false);
    }
    config
}

fn apply_logging_defaults(mut config: NodeBridgeConfig) -> NodeBridgeConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    if logging.level.is_none() {
        logging.level = Some(DEFAULT_LOG_LEVEL.to_string());
    }
    if logging.json.is_none() {
        logging.json = Some(false);
    }
    config
}
