//! Tile service abstraction.
//!
//! A [`TileSource`] answers two questions for the cache: which tiles exist in
//! a volume (metadata only) and what bytes make up one tile. Both operations
//! are fallible; network failures surface as [`SourceError`] and never as
//! empty results.
//!
//! # Variants
//!
//! | Source | Metadata query |
//! |--------|----------------|
//! | [`RangeTileSource`] | one bounding-box query per volume |
//! | [`TileIdTileSource`] | enumerates tile ids covering the volume, queries them in batches |
//! | [`MemoryTileSource`] | in-process table, for offline use and tests |
//!
//! # Example
//!
//! ```ignore
//! use pointlayer::source::{RangeTileSource, ReqwestClient};
//!
//! let client = ReqwestClient::new()?;
//! let source = RangeTileSource::new(client, "https://tiles.example.com/v1");
//! let tiles = source.search_tiles("lidar", &volume).await?;
//! ```

mod explicit;
mod http;
mod memory;
mod range;
mod wire;

pub use explicit::{TileIdTileSource, DEFAULT_MAX_IDS_PER_REQUEST};
pub use http::{AsyncHttpClient, ReqwestClient};
pub use memory::MemoryTileSource;
pub use range::RangeTileSource;

#[cfg(test)]
pub use http::tests::MockHttpClient;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use bytes::Bytes;
use thiserror::Error;

use crate::coord::UtmZone;
use crate::grid::{BoundingBox, Scale, TileIndex};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors reported by tile sources.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    /// Transport-level failure (connection, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The service answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The metadata response could not be understood.
    #[error("Invalid metadata response: {0}")]
    InvalidResponse(String),

    /// No content is stored under the URL.
    #[error("Tile content not found: {0}")]
    NotFound(String),

    /// The source is temporarily refusing requests.
    #[error("Tile source unavailable: {0}")]
    Unavailable(String),
}

/// Kind of content a tile holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentType {
    PointCloud,
    Annotation,
    /// Anything this crate has no decoder for.
    Other(String),
}

impl ContentType {
    pub fn as_str(&self) -> &str {
        match self {
            ContentType::PointCloud => "point_cloud",
            ContentType::Annotation => "annotation",
            ContentType::Other(name) => name,
        }
    }
}

impl FromStr for ContentType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "point_cloud" => ContentType::PointCloud,
            "annotation" => ContentType::Annotation,
            other => ContentType::Other(other.to_string()),
        })
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for one tile: where it is and where to fetch it. No bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct TileMetadata {
    pub index: TileIndex,
    pub url: String,
    pub content_type: ContentType,
    /// Zone the tile's coordinates are expressed in.
    pub zone: UtmZone,
}

/// A world-space query volume plus the scale tiles are indexed at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchVolume {
    pub bounds: BoundingBox,
    pub tile_scale: Scale,
}

impl SearchVolume {
    pub fn new(bounds: BoundingBox, tile_scale: Scale) -> Self {
        Self { bounds, tile_scale }
    }
}

/// Network-facing tile service consumed by the cache.
///
/// Uses [`BoxFuture`] so sources can be held as `Arc<dyn TileSource>` and
/// shared by several caches.
pub trait TileSource: Send + Sync {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Metadata for every tile of `layer_id` intersecting `volume`.
    fn search_tiles<'a>(
        &'a self,
        layer_id: &'a str,
        volume: &'a SearchVolume,
    ) -> BoxFuture<'a, Result<Vec<TileMetadata>, SourceError>>;

    /// The opaque payload of one tile.
    fn fetch_tile_content<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, SourceError>>;

    /// Probe which zone data in `volume` is expressed in.
    ///
    /// The default searches the volume and reports the first assigned zone
    /// among the results. The tiles found are returned with the zone so the
    /// caller need not search the same volume again.
    fn probe_zone<'a>(
        &'a self,
        layer_id: &'a str,
        volume: &'a SearchVolume,
    ) -> BoxFuture<'a, Result<ZoneProbe, SourceError>> {
        Box::pin(async move {
            let tiles = self.search_tiles(layer_id, volume).await?;
            Ok(ZoneProbe::new(UtmZone::UNSET, tiles))
        })
    }
}

/// Outcome of [`TileSource::probe_zone`].
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneProbe {
    /// The zone reported for the volume, [`UtmZone::UNSET`] when nothing is tagged.
    pub zone: UtmZone,
    /// Every tile found in the probed volume.
    pub tiles: Vec<TileMetadata>,
}

impl ZoneProbe {
    /// An assigned `envelope` zone wins; otherwise the first tagged tile decides.
    pub fn new(envelope: UtmZone, tiles: Vec<TileMetadata>) -> Self {
        let zone = if envelope.is_assigned() {
            envelope
        } else {
            tiles
                .iter()
                .map(|tile| tile.zone)
                .find(UtmZone::is_assigned)
                .unwrap_or(UtmZone::UNSET)
        };
        Self { zone, tiles }
    }
}
