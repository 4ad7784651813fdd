//! Content-kind capability interface.

use std::sync::Arc;

use thiserror::Error;

use crate::coord::{CoordinateError, CoordinateSystem};
use crate::grid::{BoundingBox, TileIndex};
use crate::source::{ContentType, SourceError};

/// Errors raised while decoding one tile's payload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Payload too short: {actual} bytes, need {expected}")]
    Truncated { expected: usize, actual: usize },

    #[error("Payload does not start with the expected magic bytes")]
    BadMagic,

    #[error("Unsupported payload version {0}")]
    UnsupportedVersion(u8),

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Coordinate conversion failed: {0}")]
    Coordinates(#[from] CoordinateError),
}

/// Outcome of loading one tile.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TileError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// What an aggregate does when one of its tiles fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeFailurePolicy {
    /// Log and aggregate the remaining tiles.
    #[default]
    SkipTile,
    /// Fail the whole aggregate load.
    FailAggregate,
}

/// Everything a decoder needs to place one tile's records.
#[derive(Debug, Clone)]
pub struct TileContext {
    pub index: TileIndex,
    pub coordinate_system: Arc<CoordinateSystem>,
}

/// Per-content-kind behaviour plugged into tiles and aggregates.
///
/// The cache manager depends only on this interface.
pub trait ContentKind: Send + Sync + 'static {
    /// One decoded element of a tile.
    type Record: Clone + Send + Sync + 'static;

    /// The merged representation held by a loaded aggregate.
    type Contents: Default + Send + Sync + 'static;

    /// The tile content type this kind decodes.
    fn content_type(&self) -> ContentType;

    /// Decode one tile's bytes into records in the local frame.
    fn decode(&self, context: &TileContext, bytes: &[u8])
        -> Result<Vec<Self::Record>, DecodeError>;

    /// Merge one tile's records into the aggregate contents.
    fn merge(&self, contents: &mut Self::Contents, records: &[Self::Record]);

    /// Number of objects held by `contents`.
    fn object_count(&self, contents: &Self::Contents) -> usize;

    /// Local-frame bounds of `contents`, if this kind has a spatial extent.
    fn contents_bounds(&self, contents: &Self::Contents) -> Option<BoundingBox>;

    fn decode_failure_policy(&self) -> DecodeFailurePolicy {
        DecodeFailurePolicy::SkipTile
    }
}
