//! Discrete cell addresses.

use std::fmt;

use glam::DVec3;

use super::{BoundingBox, Scale};

/// Discrete 3D address of a grid cell at a given [`Scale`].
///
/// Two indices are equal iff their integer coordinates and their scale are
/// equal. The string form (see [`TileIndex::key`]) is stable and is what the
/// cache uses as its map key.
///
/// # Example
///
/// ```
/// use pointlayer::grid::{Scale, TileIndex};
///
/// let index = TileIndex::new(2, -1, 0, Scale::cube(8.0).unwrap());
/// assert_eq!(index.key(), "2_-1_0@8x8x8");
/// assert_eq!(index.origin().x, 16.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileIndex {
    x: i64,
    y: i64,
    z: i64,
    scale: Scale,
}

impl TileIndex {
    pub fn new(x: i64, y: i64, z: i64, scale: Scale) -> Self {
        Self { x, y, z, scale }
    }

    /// The index of the cell containing `point`.
    ///
    /// Each coordinate is floored by the matching scale dimension. A negative
    /// coordinate whose quotient floors to exactly zero (it underflowed to
    /// `-0.0`) is mapped to `-1` so tiny negative values never land in cell 0.
    pub fn from_point(scale: &Scale, point: DVec3) -> Self {
        Self {
            x: axis_index(point.x, scale.x()),
            y: axis_index(point.y, scale.y()),
            z: axis_index(point.z, scale.z()),
            scale: *scale,
        }
    }

    /// Every index at `scale` whose cell intersects `volume`, x-major.
    ///
    /// The volume's upper faces are exclusive, so a volume ending exactly on a
    /// cell boundary does not pull in the next cell. A degenerate volume still
    /// yields the cell containing its minimum corner. Indices are produced
    /// lazily; callers with a budget stop pulling once it is spent.
    pub fn covering(scale: &Scale, volume: &BoundingBox) -> impl Iterator<Item = TileIndex> {
        let scale = *scale;
        let lower = Self::from_point(&scale, volume.min);
        let upper_x = axis_upper(volume.max.x, scale.x()).max(lower.x);
        let upper_y = axis_upper(volume.max.y, scale.y()).max(lower.y);
        let upper_z = axis_upper(volume.max.z, scale.z()).max(lower.z);

        (lower.x..=upper_x).flat_map(move |x| {
            (lower.y..=upper_y).flat_map(move |y| {
                (lower.z..=upper_z).map(move |z| Self::new(x, y, z, scale))
            })
        })
    }

    pub fn x(&self) -> i64 {
        self.x
    }

    pub fn y(&self) -> i64 {
        self.y
    }

    pub fn z(&self) -> i64 {
        self.z
    }

    pub fn scale(&self) -> &Scale {
        &self.scale
    }

    /// World-space minimum corner: `index * scale` component-wise.
    pub fn origin(&self) -> DVec3 {
        DVec3::new(self.x as f64, self.y as f64, self.z as f64) * self.scale.as_dvec3()
    }

    /// World-space center of the cell.
    pub fn center(&self) -> DVec3 {
        self.origin() + self.scale.as_dvec3() * 0.5
    }

    /// World-space cell volume `[origin, origin + scale)`.
    pub fn bounding_box(&self) -> BoundingBox {
        let origin = self.origin();
        BoundingBox {
            min: origin,
            max: origin + self.scale.as_dvec3(),
        }
    }

    /// Stable string key, `"{x}_{y}_{z}@{scale}"`.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}@{}", self.x, self.y, self.z, self.scale)
    }
}

fn axis_index(value: f64, size: f64) -> i64 {
    let cell = (value / size).floor();
    if cell == 0.0 && value < 0.0 {
        -1
    } else {
        cell as i64
    }
}

/// Last cell touched by a half-open upper bound.
fn axis_upper(value: f64, size: f64) -> i64 {
    (value / size).ceil() as i64 - 1
}
