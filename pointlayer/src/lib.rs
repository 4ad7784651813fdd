//! PointLayer - spatial tile cache for geo-referenced point clouds
//!
//! This library discovers the tiles covering a queried volume on a remote
//! tile service, fetches and decodes them, groups them into coarser cache
//! aggregates, converts their coordinates into a stable local frame and
//! evicts stale data under object-count pressure.
//!
//! # Modules
//!
//! - [`grid`] - scales, tile indices and bounding boxes
//! - [`coord`] - the session coordinate system and UTM math
//! - [`source`] - the tile service abstraction and its HTTP variants
//! - [`tile`] - loadable tiles, aggregates and content kinds
//! - [`cache`] - the cache manager, events and statistics
//! - [`config`] - cache settings and INI loading
//! - [`logging`] - tracing subscriber setup

pub mod cache;
pub mod config;
pub mod coord;
pub mod error;
pub mod grid;
pub mod logging;
pub mod source;
pub mod tile;

pub use error::CacheError;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
