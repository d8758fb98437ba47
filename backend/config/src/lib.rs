//! `nodebridge-config`: NodeBridge runtime configuration.
//!
//! Provides:
//! - Typed config schema (dispatch and logging)
//! - YAML read/write
//! - `NODEBRIDGE_*` environment overrides
//! - Default value application
//! - Validation with errors and warnings

pub mod defaults;
pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{apply_env_overrides, apply_env_overrides_with, InvalidEnvVarError};
pub use io::{config_dir, config_file_path, load_config, write_config};
pub use schema::{DispatchConfig, LoggingConfig, NodeBridgeConfig};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use std::path::Path;

use anyhow::{bail, Context, Result};

/// Load a config file, apply env overrides and defaults, then validate.
///
/// Warnings are logged; any validation error fails the load.
pub async fn load_and_prepare(path: &Path) -> Result<NodeBridgeConfig> {
    let config = load_config(path).await?;
    let config = apply_env_overrides(config).context("Failed to apply env overrides")?;
    let config = apply_all_defaults(config);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if let Some(first) = report.errors.into_iter().next() {
        bail!(first);
    }

    Ok(config)
}
