//! Error types surfaced by the tile cache.

use thiserror::Error;

use crate::coord::{OriginError, UtmZone};
use crate::grid::GridError;
use crate::source::SourceError;
use crate::tile::{DecodeError, TileError};

/// Failure of a cache operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    /// A load is already in flight on this manager. Retry later.
    #[error("A tile load is already in progress")]
    Busy,

    /// Invalid settings; fatal at startup.
    #[error("Invalid cache configuration: {0}")]
    Configuration(String),

    /// A requested volume has non-finite coordinates.
    #[error("Invalid search volume: {0}")]
    InvalidVolume(String),

    /// Data is expressed in a zone other than the session's.
    #[error("Coordinate zone mismatch: session uses {expected}, data uses {found}")]
    CoordinateMismatch { expected: UtmZone, found: UtmZone },

    /// The bootstrap probe found no zone and no fallback is configured.
    #[error("Unable to determine the coordinate zone of the requested data")]
    UnknownCoordinateZone,

    /// Tile bytes could not be decoded and the content kind treats that as fatal.
    #[error("Tile decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// The tile service failed.
    #[error("Tile source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),
}

impl CacheError {
    pub fn is_busy(&self) -> bool {
        matches!(self, CacheError::Busy)
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CacheError::Busy | CacheError::SourceUnavailable(_))
    }
}

impl From<TileError> for CacheError {
    fn from(err: TileError) -> Self {
        match err {
            TileError::Source(e) => CacheError::SourceUnavailable(e),
            TileError::Decode(e) => CacheError::Decode(e),
        }
    }
}

impl From<GridError> for CacheError {
    fn from(err: GridError) -> Self {
        CacheError::Configuration(err.to_string())
    }
}

impl From<OriginError> for CacheError {
    fn from(err: OriginError) -> Self {
        match err {
            OriginError::Conflict {
                existing,
                requested,
            } => CacheError::CoordinateMismatch {
                expected: existing.zone,
                found: requested.zone,
            },
            OriginError::InvalidZone(_) => CacheError::UnknownCoordinateZone,
        }
    }
}
