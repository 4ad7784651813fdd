//! Cell dimensions.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use glam::DVec3;
use thiserror::Error;

/// Relative tolerance used when checking integer multiples.
const MULTIPLE_TOLERANCE: f64 = 1e-9;

/// Errors raised while building scales or grids.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    /// A scale component was zero, negative or not finite.
    #[error("Invalid scale component {axis}: {value} (must be positive and finite)")]
    InvalidScale { axis: char, value: f64 },

    /// The coarse scale does not evenly contain the fine scale.
    #[error("Scale {coarse} is not an integer multiple of {fine}")]
    NotAMultiple { coarse: Scale, fine: Scale },

    /// A textual scale was not `size` or `x,y,z`.
    #[error("Cannot parse scale '{0}': expected 'size' or 'x,y,z'")]
    Parse(String),
}

/// Immutable 3D cell dimensions in world units.
///
/// All three components are positive and finite; this is checked once at
/// construction, which is what allows `Scale` to implement `Eq` and `Hash`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    x: f64,
    y: f64,
    z: f64,
}

impl Scale {
    /// Create a scale from its three dimensions.
    pub fn new(x: f64, y: f64, z: f64) -> Result<Self, GridError> {
        for (axis, value) in [('x', x), ('y', y), ('z', z)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(GridError::InvalidScale { axis, value });
            }
        }
        Ok(Self { x, y, z })
    }

    /// Create a scale with the same size on every axis.
    pub fn cube(size: f64) -> Result<Self, GridError> {
        Self::new(size, size, size)
    }

    /// Cube scale for constants. `size` must be positive and finite.
    pub(crate) const fn cube_const(size: f64) -> Self {
        Self {
            x: size,
            y: size,
            z: size,
        }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    /// The dimensions as a vector.
    pub fn as_dvec3(&self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }

    /// Cell volume in cubic world units.
    pub fn volume(&self) -> f64 {
        self.x * self.y * self.z
    }

    /// Whether every dimension of `self` is an integer multiple (≥ 1) of the
    /// corresponding dimension of `fine`.
    pub fn is_multiple_of(&self, fine: &Scale) -> bool {
        [(self.x, fine.x), (self.y, fine.y), (self.z, fine.z)]
            .into_iter()
            .all(|(coarse, fine)| {
                let ratio = coarse / fine;
                let rounded = ratio.round();
                rounded >= 1.0 && (ratio - rounded).abs() <= MULTIPLE_TOLERANCE * rounded
            })
    }
}

impl Eq for Scale {}

impl Hash for Scale {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.x.to_bits().hash(state);
        self.y.to_bits().hash(state);
        self.z.to_bits().hash(state);
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}

impl FromStr for Scale {
    type Err = GridError;

    /// Parses `"8"` as a cube or `"8,8,2.5"` per axis.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| GridError::Parse(s.to_string()))?;
        match parts.as_slice() {
            [size] => Self::cube(*size),
            [x, y, z] => Self::new(*x, *y, *z),
            _ => Err(GridError::Parse(s.to_string())),
        }
    }
}
