//! NodeBridge configuration schema, typed for serde YAML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults::{
    DEFAULT_LOG_LEVEL, DEFAULT_MAX_PREFETCHED_NODES, DEFAULT_PREPARER_TIMEOUT_MS,
};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeBridgeConfig {
    /// Owning-thread dispatch settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchConfig>,

    /// Logging configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

impl NodeBridgeConfig {
    pub fn dispatch(&self) -> DispatchConfig {
        self.dispatch.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchConfig {
    /// How long held queries wait for preparers before being released.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preparer_timeout_ms: Option<u64>,
    /// Upper bound on prefetched nodes per query (the primary is not counted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_prefetched_nodes: Option<usize>,
    /// Verify every by-node-id batch forms a tree; panics on violation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce_tree_consistency: Option<bool>,
}

impl DispatchConfig {
    pub fn preparer_timeout(&self) -> Duration {
        Duration::from_millis(
            self.preparer_timeout_ms
                .unwrap_or(DEFAULT_PREPARER_TIMEOUT_MS),
        )
    }

    pub fn max_prefetched_nodes(&self) -> usize {
        self.max_prefetched_nodes
            .unwrap_or(DEFAULT_MAX_PREFETCHED_NODES)
    }

    pub fn enforce_tree_consistency(&self) -> bool {
        self.enforce_tree_consistency.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. "info" or "nodebridge_dispatch=debug".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Directory for the daily-rolling NDJSON log; console only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Emit console output as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,
}

impl LoggingConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn json(&self) -> bool {
        self.json.unwrap_or(false)
    }
}
