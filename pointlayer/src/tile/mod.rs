//! Loadable tiles and the aggregates that group them.
//!
//! A [`Tile`] is the smallest loadable unit: an index plus a deferred
//! loader whose result is memoized. A [`TileAggregate`] is the coarser
//! cache unit: it owns the tiles that fall inside its volume and merges
//! their decoded records once, on demand.
//!
//! What a tile *contains* is abstracted by [`ContentKind`]: each kind knows
//! how to decode one tile's bytes, how to merge records into an aggregate and
//! how to bound the result. Two kinds ship with the crate:
//!
//! - [`PointCloudKind`] - binary point payloads, sampled and colored
//! - [`AnnotationKind`] - JSON annotation records
//!
//! # Lifecycle
//!
//! ```text
//!            load()              loader resolves
//! Unloaded ─────────► Loading ─────────────────► Loaded
//!    ▲                   │ loader fails              │
//!    └───────────────────┴───────── unload() ◄───────┘
//! ```

mod aggregate;
mod annotation;
mod content;
mod loader;
mod point_cloud;

pub use aggregate::TileAggregate;
pub use annotation::{AnnotationContents, AnnotationKind, AnnotationRecord};
pub use content::{ContentKind, DecodeError, DecodeFailurePolicy, TileContext, TileError};
pub use loader::{Tile, TileLoadState, TileLoader};
pub use point_cloud::{
    encode_point_tile, PointCloudContents, PointCloudKind, PointRecord, PointSampling,
    COLOR_SCALE, POSITION_SCALE,
};
