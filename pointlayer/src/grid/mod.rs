//! Discrete spatial grid.
//!
//! World space is partitioned into fixed-size cells described by a [`Scale`].
//! A [`TileIndex`] addresses one cell at a given scale and is the key used by
//! the tile cache. Two scales are in play at runtime: the fine *tile* scale
//! that the tile service partitions data into, and the coarse *aggregate*
//! scale that the cache loads and evicts in. [`TileGrid`] pairs them and
//! guarantees the coarse scale is an exact multiple of the fine one.
//!
//! # Example
//!
//! ```
//! use glam::DVec3;
//! use pointlayer::grid::{Scale, TileGrid, TileIndex};
//!
//! let grid = TileGrid::new(Scale::cube(8.0).unwrap(), Scale::cube(24.0).unwrap()).unwrap();
//! let tile = TileIndex::from_point(grid.tile_scale(), DVec3::new(30.0, 2.0, -1.0));
//! assert_eq!((tile.x(), tile.y(), tile.z()), (3, 0, -1));
//!
//! let aggregate = grid.aggregate_index_of(&tile);
//! assert_eq!((aggregate.x(), aggregate.y(), aggregate.z()), (1, 0, -1));
//! ```

mod bounds;
mod index;
mod scale;

pub use bounds::BoundingBox;
pub use index::TileIndex;
pub use scale::{GridError, Scale};

/// A validated pair of tile and aggregate scales.
///
/// Construction fails fast when the aggregate scale is not an integer
/// multiple of the tile scale: every tile must roll up into exactly one
/// aggregate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGrid {
    tile_scale: Scale,
    aggregate_scale: Scale,
}

impl TileGrid {
    /// Create a grid from a fine tile scale and a coarse aggregate scale.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::NotAMultiple`] if `aggregate_scale` is not an
    /// integer multiple of `tile_scale` on every axis.
    pub fn new(tile_scale: Scale, aggregate_scale: Scale) -> Result<Self, GridError> {
        if !aggregate_scale.is_multiple_of(&tile_scale) {
            return Err(GridError::NotAMultiple {
                coarse: aggregate_scale,
                fine: tile_scale,
            });
        }
        Ok(Self {
            tile_scale,
            aggregate_scale,
        })
    }

    /// The fine scale tiles are addressed at.
    pub fn tile_scale(&self) -> &Scale {
        &self.tile_scale
    }

    /// The coarse scale aggregates are addressed at.
    pub fn aggregate_scale(&self) -> &Scale {
        &self.aggregate_scale
    }

    /// Resolve the aggregate a tile belongs to.
    ///
    /// Uses the tile's center rather than its origin so that floating-point
    /// error on cell boundaries cannot push a tile into a neighbouring
    /// aggregate.
    pub fn aggregate_index_of(&self, tile: &TileIndex) -> TileIndex {
        TileIndex::from_point(&self.aggregate_scale, tile.center())
    }

    /// All aggregate indices whose volume intersects `volume`.
    ///
    /// Indices are produced lazily in x-major, then y, then z order so the
    /// sequence is deterministic for a given volume.
    pub fn aggregate_indices_in(&self, volume: &BoundingBox) -> impl Iterator<Item = TileIndex> {
        TileIndex::covering(&self.aggregate_scale, volume)
    }

    /// All tile indices whose volume intersects `volume`.
    pub fn tile_indices_in(&self, volume: &BoundingBox) -> impl Iterator<Item = TileIndex> {
        TileIndex::covering(&self.tile_scale, volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn grid() -> TileGrid {
        TileGrid::new(Scale::cube(8.0).unwrap(), Scale::cube(24.0).unwrap()).unwrap()
    }

    #[test]
    fn test_grid_rejects_non_multiple() {
        let result = TileGrid::new(Scale::cube(8.0).unwrap(), Scale::cube(20.0).unwrap());
        assert!(matches!(result, Err(GridError::NotAMultiple { .. })));
    }

    #[test]
    fn test_grid_rejects_coarse_smaller_than_fine() {
        let result = TileGrid::new(Scale::cube(24.0).unwrap(), Scale::cube(8.0).unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn test_aggregate_index_of_rolls_up() {
        let grid = grid();
        for x in 0..3 {
            let tile = TileIndex::new(x, 4, -1, *grid.tile_scale());
            let aggregate = grid.aggregate_index_of(&tile);
            assert_eq!((aggregate.x(), aggregate.y(), aggregate.z()), (0, 1, -1));
        }
        let next = grid.aggregate_index_of(&TileIndex::new(3, 0, 0, *grid.tile_scale()));
        assert_eq!(next.x(), 1);
    }

    #[test]
    fn test_aggregate_index_of_negative_tiles() {
        let grid = grid();
        let tile = TileIndex::new(-1, -3, -4, *grid.tile_scale());
        let aggregate = grid.aggregate_index_of(&tile);
        assert_eq!((aggregate.x(), aggregate.y(), aggregate.z()), (-1, -1, -2));
    }

    #[test]
    fn test_aggregate_indices_in_volume() {
        let grid = grid();
        let volume = BoundingBox::new(DVec3::new(1.0, 1.0, 1.0), DVec3::new(30.0, 10.0, 10.0));
        let indices: Vec<_> = grid.aggregate_indices_in(&volume).collect();
        assert_eq!(indices.len(), 2);
        assert_eq!(indices[0].x(), 0);
        assert_eq!(indices[1].x(), 1);
    }

    #[test]
    fn test_tile_indices_in_volume() {
        let grid = grid();
        let volume = BoundingBox::new(DVec3::ZERO, DVec3::new(16.0, 8.0, 8.0));
        // Upper faces are exclusive: 16.0 is the start of tile 2.
        assert_eq!(grid.tile_indices_in(&volume).count(), 2);
    }
}
