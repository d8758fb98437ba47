//! Config validation: range checks with user-friendly messages.

use thiserror::Error;

use crate::schema::NodeBridgeConfig;

/// Timeouts above this hold queries long enough to be noticeable.
const MAX_SENSIBLE_TIMEOUT_MS: u64 = 10_000;

/// Caps above this make a single prefetch batch expensive to transport.
const MAX_SENSIBLE_PREFETCH: usize = 1_000;

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// A collection of validation errors found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &NodeBridgeConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_dispatch(config, &mut report);
    validate_logging(config, &mut report);
    report
}

fn validate_dispatch(config: &NodeBridgeConfig, report: &mut ValidationReport) {
    let Some(dispatch) = &config.dispatch else { return };
    if let Some(ms) = dispatch.preparer_timeout_ms {
        if ms == 0 {
            report.error(
                "dispatch.preparerTimeoutMs",
                "preparerTimeoutMs must be > 0; held queries would never wait for preparers",
            );
        } else if ms > MAX_SENSIBLE_TIMEOUT_MS {
            report.warn(
                "dispatch.preparerTimeoutMs",
                format!("{ms} ms is a long hold-off; a silent preparer delays queries that long"),
            );
        }
    }
    if let Some(cap) = dispatch.max_prefetched_nodes {
        if cap == 0 {
            report.warn("dispatch.maxPrefetchedNodes", "Prefetching is disabled");
        } else if cap > MAX_SENSIBLE_PREFETCH {
            report.warn(
                "dispatch.maxPrefetchedNodes",
                format!("Cap of {cap} nodes per query is unusually large"),
            );
        }
    }
}

fn validate_logging(config: &NodeBridgeConfig, report: &mut ValidationReport) {
    let Some(logging) = &config.logging else { return };
    if let Some(level) = &logging.level {
        if level.trim().is_empty() {
            report.error("logging.level", "Log level cannot be empty");
        }
    }
}
