//! CLI subcommands.

pub mod config;
pub mod geodetic;
pub mod load;

use std::path::Path;

use pointlayer::config::{default_config_path, CacheConfig};

use crate::error::CliError;

/// Resolve the effective cache configuration.
///
/// An explicit path must exist; otherwise the default location is used when
/// present, falling back to built-in defaults.
pub fn resolve_config(path: Option<&Path>) -> Result<CacheConfig, CliError> {
    if let Some(path) = path {
        return Ok(CacheConfig::load(path)?);
    }
    match default_config_path() {
        Some(path) if path.exists() => Ok(CacheConfig::load(&path)?),
        _ => Ok(CacheConfig::default()),
    }
}
