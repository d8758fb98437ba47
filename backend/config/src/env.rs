//! Environment variable overrides applied on top of the config file.
//!
//! | Variable | Field |
//! |---|---|
//! | `NODEBRIDGE_PREPARER_TIMEOUT_MS` | `dispatch.preparerTimeoutMs` |
//! | `NODEBRIDGE_MAX_PREFETCHED_NODES` | `dispatch.maxPrefetchedNodes` |
//! | `NODEBRIDGE_LOG_LEVEL` | `logging.level` |
//! | `NODEBRIDGE_LOG_DIR` | `logging.dir` |
//!
//! Empty values are ignored.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use tracing::debug;

use crate::schema::{DispatchConfig, LoggingConfig, NodeBridgeConfig};

pub const ENV_PREPARER_TIMEOUT_MS: &str = "NODEBRIDGE_PREPARER_TIMEOUT_MS";
pub const ENV_MAX_PREFETCHED_NODES: &str = "NODEBRIDGE_MAX_PREFETCHED_NODES";
pub const ENV_LOG_LEVEL: &str = "NODEBRIDGE_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "NODEBRIDGE_LOG_DIR";

/// Error returned when an override cannot be parsed.
#[derive(Debug, thiserror::Error)]
#[error("Invalid value {value:?} for env var \"{var_name}\"")]
pub struct InvalidEnvVarError {
    pub var_name: String,
    pub value: String,
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: NodeBridgeConfig) -> Result<NodeBridgeConfig> {
    apply_env_overrides_with(config, &std::env::vars().collect())
}

/// Apply overrides from a provided map (useful for testing).
pub fn apply_env_overrides_with(
    mut config: NodeBridgeConfig,
    env: &HashMap<String, String>,
) -> Result<NodeBridgeConfig> {
    if let Some(ms) = parse_var::<u64>(env, ENV_PREPARER_TIMEOUT_MS)? {
        config
            .dispatch
            .get_or_insert_with(DispatchConfig::default)
            .preparer_timeout_ms = Some(ms);
    }
    if let Some(cap) = parse_var::<usize>(env, ENV_MAX_PREFETCHED_NODES)? {
        config
            .dispatch
            .get_or_insert_with(DispatchConfig::default)
            .max_prefetched_nodes = Some(cap);
    }
    if let Some(level) = lookup(env, ENV_LOG_LEVEL) {
        config.logging.get_or_insert_with(LoggingConfig::default).level = Some(level.to_string());
    }
    if let Some(dir) = lookup(env, ENV_LOG_DIR) {
        config.logging.get_or_insert_with(LoggingConfig::default).dir = Some(PathBuf::from(dir));
    }
    Ok(config)
}

fn lookup<'a>(env: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    env.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(env: &HashMap<String, String>, name: &str) -> Result<Option<T>> {
    let Some(raw) = lookup(env, name) else {
        return Ok(None);
    };
    let parsed = raw.trim().parse::<T>().map_err(|_| InvalidEnvVarError {
        var_name: name.to_string(),
        value: raw.to_string(),
    })?;
    debug!(var = name, value = raw, "Applied env override");
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn overrides_dispatch_and_logging() {
        let env = env(&[
            (ENV_PREPARER_TIMEOUT_MS, "120"),
            (ENV_LOG_LEVEL, "debug"),
            (ENV_LOG_DIR, "/tmp/nb-logs"),
        ]);
        let cfg = apply_env_overrides_with(NodeBridgeConfig::default(), &env).unwrap();
        assert_eq!(cfg.dispatch().preparer_timeout_ms, Some(120));
        assert_eq!(cfg.logging().level(), "debug");
        assert_eq!(cfg.logging().dir, Some(PathBuf::from("/tmp/nb-logs")));
    }

    #[test]
    fn rejects_unparseable_numbers() {
        let env = env(&[(ENV_MAX_PREFETCHED_NODES, "lots")]);
        let err = apply_env_overrides_with(NodeBridgeConfig::default(), &env).unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_PREFETCHED_NODES));
    }

    #[test]
    fn empty_values_are_ignored() {
        let env = env(&[(ENV_PREPARER_TIMEOUT_MS, "")]);
        let cfg = apply_env_overrides_with(NodeBridgeConfig::default(), &env).unwrap();
        assert!(cfg.dispatch.is_none());
    }
}
