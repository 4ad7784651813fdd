//! `config` command: inspect the effective configuration.

use std::path::Path;

use clap::Subcommand;
use pointlayer::config::{default_config_path, CacheConfig, CACHE_SECTION};

use super::resolve_config;
use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration in config-file syntax
    Show,

    /// Show the default configuration file path
    Path,
}

pub fn run(command: ConfigCommands, config_path: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => {
            let config = resolve_config(config_path)?;
            config.validate()?;
            print!("{}", render(&config));
            Ok(())
        }
        ConfigCommands::Path => {
            match default_config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("(no home directory)"),
            }
            Ok(())
        }
    }
}

fn render(config: &CacheConfig) -> String {
    let scale = |s: &pointlayer::grid::Scale| format!("{},{},{}", s.x(), s.y(), s.z());
    let optional = |value: Option<String>| value.unwrap_or_else(|| "none".to_string());

    let mut out = format!("[{}]\n", CACHE_SECTION);
    out.push_str(&format!("tile_scale = {}\n", scale(&config.tile_scale)));
    out.push_str(&format!("aggregate_scale = {}\n", scale(&config.aggregate_scale)));
    out.push_str(&format!(
        "initial_aggregates_per_request = {}\n",
        config.initial_aggregates_per_request
    ));
    out.push_str(&format!("max_loaded_aggregates = {}\n", config.max_loaded_aggregates));
    out.push_str(&format!("max_loaded_objects = {}\n", config.max_loaded_objects));
    out.push_str(&format!("max_empty_aggregates = {}\n", config.max_empty_aggregates));
    out.push_str(&format!("point_stride = {}\n", config.point_stride));
    out.push_str(&format!(
        "max_point_density = {}\n",
        optional(config.max_point_density.map(|d| d.to_string()))
    ));
    out.push_str(&format!("report_statistics = {}\n", config.report_statistics));
    out.push_str(&format!(
        "fallback_zone = {}\n",
        optional(config.fallback_zone.map(|z| z.to_string()))
    ));
    out
}
