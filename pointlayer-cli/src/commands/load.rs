//! `load` command: query a tile service for a world-space box and report
//! what the cache loaded.

use std::path::Path;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use glam::DVec3;
use pointlayer::cache::TileCacheManager;
use pointlayer::coord::CoordinateSystem;
use pointlayer::grid::BoundingBox;
use pointlayer::source::{
    RangeTileSource, ReqwestClient, TileIdTileSource, TileSource, DEFAULT_MAX_IDS_PER_REQUEST,
};
use pointlayer::tile::{AnnotationKind, ContentKind};
use tracing::info;

use super::resolve_config;
use crate::error::CliError;

/// How the service is queried for tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceMode {
    /// Bounding-box range queries
    Range,
    /// Explicit tile-id lookups
    Ids,
}

/// Which content the layer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayerKind {
    PointCloud,
    Annotation,
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Tile service base URL
    #[arg(long)]
    pub url: String,

    /// Layer identifier
    #[arg(long)]
    pub layer: String,

    #[arg(long, value_enum, default_value = "range")]
    pub mode: SourceMode,

    #[arg(long, value_enum, default_value = "point-cloud")]
    pub kind: LayerKind,

    /// World-space box: minx,miny,minz,maxx,maxy,maxz
    #[arg(long, allow_hyphen_values = true)]
    pub bbox: String,

    /// Load every aggregate in the box instead of the initial batch
    #[arg(long)]
    pub all: bool,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Maximum tile ids per request in `ids` mode
    #[arg(long, default_value_t = DEFAULT_MAX_IDS_PER_REQUEST)]
    pub max_ids: usize,
}

pub async fn run(args: LoadArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let config = resolve_config(config_path)?;
    let volume = parse_bbox(&args.bbox)?;
    let client = ReqwestClient::with_timeout(args.timeout)?;

    let source: Arc<dyn TileSource> = match args.mode {
        SourceMode::Range => Arc::new(RangeTileSource::new(client, args.url.clone())),
        SourceMode::Ids => Arc::new(
            TileIdTileSource::new(client, args.url.clone()).with_max_ids_per_request(args.max_ids),
        ),
    };
    let coordinate_system = Arc::new(CoordinateSystem::new());

    info!(url = %args.url, layer = %args.layer, mode = ?args.mode, "Loading tiles");

    match args.kind {
        LayerKind::PointCloud => {
            let manager = TileCacheManager::point_cloud(
                config,
                args.layer.clone(),
                source,
                Arc::clone(&coordinate_system),
            )?;
            load_and_report(&manager, volume, args.all).await
        }
        LayerKind::Annotation => {
            let manager = TileCacheManager::new(
                config,
                args.layer.clone(),
                AnnotationKind::new(),
                source,
                Arc::clone(&coordinate_system),
            )?;
            load_and_report(&manager, volume, args.all).await
        }
    }
}

async fn load_and_report<K: ContentKind>(
    manager: &TileCacheManager<K>,
    volume: BoundingBox,
    load_all: bool,
) -> Result<(), CliError> {
    manager.load_from_volumes(&[volume], load_all).await?;

    println!("{}", manager.stats());
    let cs = manager.coordinate_system();
    if let Some(zone) = cs.zone() {
        println!("zone: {}", zone);
    }
    if let Some(bounds) = manager.bounding_volume() {
        println!(
            "bounds (local): [{:.3}, {:.3}, {:.3}] .. [{:.3}, {:.3}, {:.3}]",
            bounds.min.x, bounds.min.y, bounds.min.z, bounds.max.x, bounds.max.y, bounds.max.z
        );
    }
    if let Some(center) = manager.center_point() {
        let geo = cs.local_to_geodetic(center)?;
        println!(
            "center: lon {:.8} lat {:.8} alt {:.3}",
            geo.longitude, geo.latitude, geo.altitude
        );
    }
    for key in manager.loaded_keys() {
        println!("  {}", key);
    }
    Ok(())
}

fn parse_bbox(text: &str) -> Result<BoundingBox, CliError> {
    let values = text
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CliError::Config(format!("invalid --bbox '{}': {}", text, e)))?;
    if values.iter().any(|v| !v.is_finite()) {
        return Err(CliError::Config(format!(
            "invalid --bbox '{}': values must be finite",
            text
        )));
    }

    match values.as_slice() {
        [min_x, min_y, min_z, max_x, max_y, max_z] => Ok(BoundingBox::new(
            DVec3::new(*min_x, *min_y, *min_z),
            DVec3::new(*max_x, *max_y, *max_z),
        )),
        _ => Err(CliError::Config(format!(
            "--bbox expects six values, got {}",
            values.len()
        ))),
    }
}
