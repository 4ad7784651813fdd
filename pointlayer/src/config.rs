//! Cache configuration.
//!
//! Every setting is optional and falls back to a `DEFAULT_*` constant.
//! Settings can be read from the `[cache]` section of an INI file:
//!
//! ```ini
//! [cache]
//! tile_scale = 8,8,8
//! aggregate_scale = 24
//! initial_aggregates_per_request = 4
//! max_loaded_aggregates = 100
//! max_loaded_objects = 20000000
//! point_stride = 1
//! max_point_density = 0.5
//! report_statistics = false
//! fallback_zone = 32N
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::Ini;

use crate::coord::UtmZone;
use crate::error::CacheError;
use crate::grid::{Scale, TileGrid};
use crate::tile::PointSampling;

/// Section holding cache settings in a config file.
pub const CACHE_SECTION: &str = "cache";

/// Default fine tile scale in world units.
pub const DEFAULT_TILE_SCALE: Scale = Scale::cube_const(8.0);

/// Default coarse aggregate scale; 3 x 3 x 3 tiles.
pub const DEFAULT_AGGREGATE_SCALE: Scale = Scale::cube_const(24.0);

/// Default number of new aggregates fetched by one request.
pub const DEFAULT_INITIAL_AGGREGATES_PER_REQUEST: usize = 4;

/// Default maximum number of aggregates holding loaded content.
pub const DEFAULT_MAX_LOADED_AGGREGATES: usize = 100;

/// Default maximum number of loaded objects across all aggregates.
pub const DEFAULT_MAX_LOADED_OBJECTS: usize = 20_000_000;

/// Default number of remembered aggregates that hold no tiles.
pub const DEFAULT_MAX_EMPTY_AGGREGATES: usize = 1_000;

/// Default point sampling stride; every point is kept.
pub const DEFAULT_POINT_STRIDE: usize = 1;

/// Configuration for a [`TileCacheManager`](crate::cache::TileCacheManager).
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Scale the tile service partitions data into.
    pub tile_scale: Scale,

    /// Scale of cache units. Must be an integer multiple of `tile_scale`.
    pub aggregate_scale: Scale,

    /// New aggregates fetched per request unless the caller asks for all.
    pub initial_aggregates_per_request: usize,

    /// Eviction threshold on loaded aggregates.
    pub max_loaded_aggregates: usize,

    /// Eviction threshold on loaded objects.
    pub max_loaded_objects: usize,

    /// Registered aggregates without tiles kept before the oldest are forgotten.
    pub max_empty_aggregates: usize,

    /// Keep every n-th point of a tile.
    pub point_stride: usize,

    /// Upper bound on points per cubic world unit of a tile.
    pub max_point_density: Option<f64>,

    /// Log a statistics snapshot after every load.
    pub report_statistics: bool,

    /// Zone used when the service reports none for the first request.
    pub fallback_zone: Option<UtmZone>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tile_scale: DEFAULT_TILE_SCALE,
            aggregate_scale: DEFAULT_AGGREGATE_SCALE,
            initial_aggregates_per_request: DEFAULT_INITIAL_AGGREGATES_PER_REQUEST,
            max_loaded_aggregates: DEFAULT_MAX_LOADED_AGGREGATES,
            max_loaded_objects: DEFAULT_MAX_LOADED_OBJECTS,
            max_empty_aggregates: DEFAULT_MAX_EMPTY_AGGREGATES,
            point_stride: DEFAULT_POINT_STRIDE,
            max_point_density: None,
            report_statistics: false,
            fallback_zone: None,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tile_scale(mut self, scale: Scale) -> Self {
        self.tile_scale = scale;
        self
    }

    pub fn with_aggregate_scale(mut self, scale: Scale) -> Self {
        self.aggregate_scale = scale;
        self
    }

    pub fn with_initial_aggregates_per_request(mut self, count: usize) -> Self {
        self.initial_aggregates_per_request = count;
        self
    }

    pub fn with_max_loaded_aggregates(mut self, max: usize) -> Self {
        self.max_loaded_aggregates = max;
        self
    }

    pub fn with_max_loaded_objects(mut self, max: usize) -> Self {
        self.max_loaded_objects = max;
        self
    }

    pub fn with_max_empty_aggregates(mut self, max: usize) -> Self {
        self.max_empty_aggregates = max;
        self
    }

    pub fn with_point_stride(mut self, stride: usize) -> Self {
        self.point_stride = stride;
        self
    }

    pub fn with_max_point_density(mut self, density: Option<f64>) -> Self {
        self.max_point_density = density;
        self
    }

    pub fn with_report_statistics(mut self, enabled: bool) -> Self {
        self.report_statistics = enabled;
        self
    }

    pub fn with_fallback_zone(mut self, zone: Option<UtmZone>) -> Self {
        self.fallback_zone = zone;
        self
    }

    /// Check every setting, returning the validated grid.
    pub fn validate(&self) -> Result<TileGrid, CacheError> {
        let grid = TileGrid::new(self.tile_scale, self.aggregate_scale)?;
        if self.initial_aggregates_per_request == 0 {
            return Err(CacheError::Configuration(
                "initial_aggregates_per_request must be at least 1".to_string(),
            ));
        }
        if self.max_loaded_aggregates == 0 {
            return Err(CacheError::Configuration(
                "max_loaded_aggregates must be at least 1".to_string(),
            ));
        }
        if let Some(zone) = self.fallback_zone {
            if !zone.is_assigned() {
                return Err(CacheError::Configuration(
                    "fallback_zone must be a real zone".to_string(),
                ));
            }
        }
        self.point_sampling()?;
        Ok(grid)
    }

    /// Point sampling derived from the stride and density settings.
    pub fn point_sampling(&self) -> Result<PointSampling, CacheError> {
        PointSampling::new(self.point_stride, self.max_point_density)
    }

    /// Load settings from an INI file, starting from defaults.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let ini = Ini::load_from_file(path).map_err(|e| {
            CacheError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_ini(&ini)
    }

    /// Parse settings from INI text, starting from defaults.
    pub fn from_ini_str(text: &str) -> Result<Self, CacheError> {
        let ini = Ini::load_from_str(text)
            .map_err(|e| CacheError::Configuration(format!("invalid config file: {}", e)))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, CacheError> {
        let mut config = Self::default();
        let Some(section) = ini.section(Some(CACHE_SECTION)) else {
            return Ok(config);
        };

        for (key, value) in section.iter() {
            match key {
                "tile_scale" => config.tile_scale = parse(key, value)?,
                "aggregate_scale" => config.aggregate_scale = parse(key, value)?,
                "initial_aggregates_per_request" => {
                    config.initial_aggregates_per_request = parse(key, value)?
                }
                "max_loaded_aggregates" => config.max_loaded_aggregates = parse(key, value)?,
                "max_loaded_objects" => config.max_loaded_objects = parse(key, value)?,
                "max_empty_aggregates" => config.max_empty_aggregates = parse(key, value)?,
                "point_stride" => config.point_stride = parse(key, value)?,
                "max_point_density" => config.max_point_density = parse_optional(key, value)?,
                "report_statistics" => config.report_statistics = parse(key, value)?,
                "fallback_zone" => config.fallback_zone = parse_optional(key, value)?,
                other => {
                    return Err(CacheError::Configuration(format!(
                        "unknown key '{}' in [{}]",
                        other, CACHE_SECTION
                    )))
                }
            }
        }
        Ok(config)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T, CacheError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        CacheError::Configuration(format!("invalid value '{}' for {}: {}", value, key, e))
    })
}

/// Empty values and `none` clear an optional setting.
fn parse_optional<T>(key: &str, value: &str) -> Result<Option<T>, CacheError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    parse(key, value).map(Some)
}

/// Default config file location, `~/.pointlayer/config.ini`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".pointlayer").join("config.ini"))
}
