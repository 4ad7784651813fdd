//! Session coordinate frame.
//!
//! The tile service delivers positions in a zoned planar projection (UTM):
//! easting, northing, altitude. The renderer works in a local frame whose
//! vertical axis is the second component and whose origin sits near the data,
//! keeping `f32` positions precise. [`CoordinateSystem`] holds the one-time
//! assigned [`CoordinateOrigin`] (zone + offset) that maps between the two.
//!
//! # Sharing
//!
//! One `CoordinateSystem` is shared (behind an `Arc`) by every cache in a
//! session, e.g. a point-cloud cache and an annotation cache. The origin can
//! only be written through [`CoordinateSystem::set_origin`], which is a
//! compare-and-set: the first caller wins and later callers must agree.
//!
//! # Example
//!
//! ```
//! use glam::DVec3;
//! use pointlayer::coord::{CoordinateSystem, Hemisphere, UtmZone};
//!
//! let cs = CoordinateSystem::new();
//! let zone = UtmZone::new(18, Hemisphere::North).unwrap();
//! cs.set_origin(zone, DVec3::new(583_000.0, 4_507_000.0, 10.0)).unwrap();
//!
//! let local = cs.world_to_local(DVec3::new(583_001.0, 4_507_002.0, 13.0)).unwrap();
//! assert_eq!(local, DVec3::new(1.0, 3.0, 2.0));
//! ```

mod utm;

pub use utm::{
    geodetic_to_utm, geodetic_to_utm_in_zone, utm_to_geodetic, zone_number_for, GeodeticPoint,
};

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use glam::DVec3;
use thiserror::Error;
use tracing::{debug, info};

use crate::grid::BoundingBox;

/// Highest valid UTM zone number.
pub const MAX_ZONE_NUMBER: u8 = 60;

/// Hemisphere half of a UTM zone designation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hemisphere {
    North,
    South,
}

/// A UTM zone: number 1-60 plus hemisphere.
///
/// Zone number 0 is the wire format's "default/unset" sentinel, exposed as
/// [`UtmZone::UNSET`]. Data tagged with it predates zone tagging and is
/// treated as compatible with whatever zone the session has assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtmZone {
    number: u8,
    hemisphere: Hemisphere,
}

impl UtmZone {
    /// The default/unset sentinel zone.
    pub const UNSET: UtmZone = UtmZone {
        number: 0,
        hemisphere: Hemisphere::North,
    };

    /// Create a zone, accepting 0 (the sentinel) through 60.
    pub fn new(number: u8, hemisphere: Hemisphere) -> Result<Self, CoordinateError> {
        if number > MAX_ZONE_NUMBER {
            return Err(CoordinateError::InvalidZoneNumber(number));
        }
        Ok(Self { number, hemisphere })
    }

    /// Convenience constructor taking a northern-hemisphere flag.
    pub fn from_parts(number: u8, northern: bool) -> Result<Self, CoordinateError> {
        let hemisphere = if northern {
            Hemisphere::North
        } else {
            Hemisphere::South
        };
        Self::new(number, hemisphere)
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn hemisphere(&self) -> Hemisphere {
        self.hemisphere
    }

    pub fn is_northern(&self) -> bool {
        self.hemisphere == Hemisphere::North
    }

    /// Whether this is a real zone rather than the unset sentinel.
    pub fn is_assigned(&self) -> bool {
        self.number != 0
    }
}

impl fmt::Display for UtmZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_assigned() {
            return write!(f, "unset");
        }
        let letter = match self.hemisphere {
            Hemisphere::North => 'N',
            Hemisphere::South => 'S',
        };
        write!(f, "{}{}", self.number, letter)
    }
}

impl FromStr for UtmZone {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let hemisphere = match s.chars().last().map(|c| c.to_ascii_uppercase()) {
            Some('N') => Hemisphere::North,
            Some('S') => Hemisphere::South,
            _ => return Err(CoordinateError::ZoneParse(s.to_string())),
        };
        let number = s[..s.len() - 1]
            .parse::<u8>()
            .map_err(|_| CoordinateError::ZoneParse(s.to_string()))?;
        if number == 0 {
            return Err(CoordinateError::ZoneParse(s.to_string()));
        }
        Self::new(number, hemisphere)
    }
}

/// The assigned session origin: a zone and a world-space offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateOrigin {
    pub zone: UtmZone,
    pub offset: DVec3,
}

impl fmt::Display for CoordinateOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ ({:.3}, {:.3}, {:.3})",
            self.zone, self.offset.x, self.offset.y, self.offset.z
        )
    }
}

/// Errors from coordinate conversions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    /// A conversion needs the session origin but none is assigned yet.
    #[error("Coordinate system origin has not been assigned")]
    NoOrigin,

    /// Zone numbers run from 1 to 60 (0 is the unset sentinel).
    #[error("Invalid UTM zone number: {0}")]
    InvalidZoneNumber(u8),

    /// The operation needs a real zone but got the sentinel.
    #[error("Zone {0} cannot be used for projection")]
    InvalidZone(UtmZone),

    /// Latitude outside [-90, 90].
    #[error("Invalid latitude: {0}")]
    InvalidLatitude(f64),

    /// A textual zone was not a number followed by `N` or `S`.
    #[error("Cannot parse zone '{0}': expected e.g. '18N' or '56S'")]
    ZoneParse(String),
}

/// Failure to assign the session origin.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OriginError {
    /// Only real zones can become the session origin.
    #[error("Cannot assign origin with zone {0}")]
    InvalidZone(UtmZone),

    /// An origin is already assigned and differs from the requested one.
    #[error("Origin already assigned as {existing}, refused {requested}")]
    Conflict {
        existing: CoordinateOrigin,
        requested: CoordinateOrigin,
    },
}

type OriginListener = Box<dyn Fn(&CoordinateOrigin) + Send + Sync>;

/// One-time-assignable mapping between service world and renderer local
/// coordinates.
pub struct CoordinateSystem {
    origin: OnceLock<CoordinateOrigin>,
    on_assigned: Option<OriginListener>,
}

impl CoordinateSystem {
    /// Create a coordinate system with no origin.
    pub fn new() -> Self {
        Self {
            origin: OnceLock::new(),
            on_assigned: None,
        }
    }

    /// Create a coordinate system that calls `listener` once, when the origin
    /// is first assigned.
    pub fn with_origin_listener<F>(listener: F) -> Self
    where
        F: Fn(&CoordinateOrigin) + Send + Sync + 'static,
    {
        Self {
            origin: OnceLock::new(),
            on_assigned: Some(Box::new(listener)),
        }
    }

    /// True iff a valid zone has been assigned.
    pub fn has_origin(&self) -> bool {
        self.origin.get().is_some()
    }

    pub fn origin(&self) -> Option<&CoordinateOrigin> {
        self.origin.get()
    }

    /// The assigned zone, if any.
    pub fn zone(&self) -> Option<UtmZone> {
        self.origin.get().map(|origin| origin.zone)
    }

    /// Assign the session origin.
    ///
    /// The first successful caller wins and triggers the origin listener
    /// exactly once. Later calls succeed only with an identical zone and
    /// offset; anything else is reported as [`OriginError::Conflict`] and the
    /// existing origin is left untouched.
    pub fn set_origin(&self, zone: UtmZone, offset: DVec3) -> Result<(), OriginError> {
        if !zone.is_assigned() {
            return Err(OriginError::InvalidZone(zone));
        }
        let requested = CoordinateOrigin { zone, offset };

        match self.origin.set(requested) {
            Ok(()) => {
                info!(origin = %requested, "Coordinate system origin assigned");
                if let Some(listener) = &self.on_assigned {
                    listener(&requested);
                }
                Ok(())
            }
            Err(_) => {
                // `set` only fails when a value is already present.
                let existing = *self.origin.get().unwrap_or(&requested);
                if existing == requested {
                    Ok(())
                } else {
                    debug!(%existing, %requested, "Coordinate origin conflict");
                    Err(OriginError::Conflict {
                        existing,
                        requested,
                    })
                }
            }
        }
    }

    /// Whether data tagged with `zone` can share this session's frame.
    ///
    /// The unset sentinel is compatible with any zone. With no origin
    /// assigned yet, every zone is compatible.
    pub fn zone_matches(&self, zone: &UtmZone) -> bool {
        match self.zone() {
            Some(assigned) => !zone.is_assigned() || assigned == *zone,
            None => true,
        }
    }

    fn require_origin(&self) -> Result<&CoordinateOrigin, CoordinateError> {
        self.origin.get().ok_or(CoordinateError::NoOrigin)
    }

    /// World `(easting, northing, altitude)` to local `(x, up, z)`.
    pub fn world_to_local(&self, world: DVec3) -> Result<DVec3, CoordinateError> {
        let origin = self.require_origin()?;
        Ok(world_to_local_with(origin, world))
    }

    /// Local `(x, up, z)` back to world `(easting, northing, altitude)`.
    pub fn local_to_world(&self, local: DVec3) -> Result<DVec3, CoordinateError> {
        let origin = self.require_origin()?;
        Ok(DVec3::new(local.x, local.z, local.y) + origin.offset)
    }

    /// Convert a world-space box into the local frame.
    pub fn world_bounds_to_local(
        &self,
        world: &BoundingBox,
    ) -> Result<BoundingBox, CoordinateError> {
        Ok(BoundingBox::new(
            self.world_to_local(world.min)?,
            self.world_to_local(world.max)?,
        ))
    }

    /// Local position to geodetic longitude/latitude/altitude.
    pub fn local_to_geodetic(&self, local: DVec3) -> Result<GeodeticPoint, CoordinateError> {
        let origin = self.require_origin()?;
        let world = self.local_to_world(local)?;
        let (longitude, latitude) = utm_to_geodetic(&origin.zone, world.x, world.y)?;
        Ok(GeodeticPoint::new(longitude, latitude, world.z))
    }

    /// Geodetic position to local coordinates, projected into the session zone.
    pub fn geodetic_to_local(&self, point: &GeodeticPoint) -> Result<DVec3, CoordinateError> {
        let origin = self.require_origin()?;
        let (easting, northing) =
            geodetic_to_utm_in_zone(&origin.zone, point.longitude, point.latitude)?;
        self.world_to_local(DVec3::new(easting, northing, point.altitude))
    }
}

impl Default for CoordinateSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CoordinateSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinateSystem")
            .field("origin", &self.origin.get())
            .field("has_listener", &self.on_assigned.is_some())
            .finish()
    }
}

/// Swap northing and altitude so the renderer's second axis points up.
fn world_to_local_with(origin: &CoordinateOrigin, world: DVec3) -> DVec3 {
    let relative = world - origin.offset;
    DVec3::new(relative.x, relative.z, relative.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn zone_18n() -> UtmZone {
        UtmZone::new(18, Hemisphere::North).unwrap()
    }

    fn offset() -> DVec3 {
        DVec3::new(583_000.0, 4_507_000.0, 12.0)
    }

    #[test]
    fn test_zone_parse() {
        assert_eq!("18N".parse::<UtmZone>().unwrap(), zone_18n());
        assert_eq!(
            "56s".parse::<UtmZone>().unwrap(),
            UtmZone::new(56, Hemisphere::South).unwrap()
        );
        assert!(matches!("61N".parse::<UtmZone>(), Err(CoordinateError::InvalidZoneNumber(61))));
        assert!(matches!("0N".parse::<UtmZone>(), Err(CoordinateError::ZoneParse(_))));
        assert!(matches!("18".parse::<UtmZone>(), Err(CoordinateError::ZoneParse(_))));
        assert!(matches!("".parse::<UtmZone>(), Err(CoordinateError::ZoneParse(_))));
    }

    #[test]
    fn test_starts_unset() {
        let cs = CoordinateSystem::new();
        assert!(!cs.has_origin());
        assert_eq!(
            cs.world_to_local(DVec3::ZERO),
            Err(CoordinateError::NoOrigin)
        );
    }

    #[test]
    fn test_set_origin_twice_identical_notifies_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cs = CoordinateSystem::with_origin_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(cs.set_origin(zone_18n(), offset()).is_ok());
        assert!(cs.set_origin(zone_18n(), offset()).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cs.has_origin());
    }

    #[test]
    fn test_set_origin_conflicting_zone_keeps_existing() {
        let cs = CoordinateSystem::new();
        cs.set_origin(zone_18n(), offset()).unwrap();

        let other = UtmZone::new(19, Hemisphere::North).unwrap();
        let result = cs.set_origin(other, offset());
        assert!(matches!(result, Err(OriginError::Conflict { .. })));
        assert_eq!(cs.zone(), Some(zone_18n()));
        assert_eq!(cs.origin().unwrap().offset, offset());
    }

    #[test]
    fn test_set_origin_conflicting_offset_and_hemisphere() {
        let cs = CoordinateSystem::new();
        cs.set_origin(zone_18n(), offset()).unwrap();
        assert!(cs.set_origin(zone_18n(), offset() + DVec3::X).is_err());
        let south = UtmZone::new(18, Hemisphere::South).unwrap();
        assert!(cs.set_origin(south, offset()).is_err());
    }

    #[test]
    fn test_set_origin_rejects_sentinel() {
        let cs = CoordinateSystem::new();
        assert_eq!(
            cs.set_origin(UtmZone::UNSET, offset()),
            Err(OriginError::InvalidZone(UtmZone::UNSET))
        );
        assert!(!cs.has_origin());
    }

    #[test]
    fn test_zone_matches_sentinel() {
        let cs = CoordinateSystem::new();
        assert!(cs.zone_matches(&UtmZone::new(5, Hemisphere::South).unwrap()));
        cs.set_origin(zone_18n(), offset()).unwrap();
        assert!(cs.zone_matches(&UtmZone::UNSET));
        assert!(cs.zone_matches(&zone_18n()));
        assert!(!cs.zone_matches(&UtmZone::new(17, Hemisphere::North).unwrap()));
    }

    #[test]
    fn test_axis_permutation() {
        let cs = CoordinateSystem::new();
        cs.set_origin(zone_18n(), offset()).unwrap();
        let local = cs
            .world_to_local(offset() + DVec3::new(1.0, 2.0, 3.0))
            .unwrap();
        assert_eq!(local, DVec3::new(1.0, 3.0, 2.0));
    }

    #[test]
    fn test_world_bounds_to_local() {
        let cs = CoordinateSystem::new();
        cs.set_origin(zone_18n(), DVec3::ZERO).unwrap();
        let world = BoundingBox::new(DVec3::new(0.0, 0.0, 0.0), DVec3::new(10.0, 20.0, 5.0));
        let local = cs.world_bounds_to_local(&world).unwrap();
        assert_eq!(local.min, DVec3::ZERO);
        assert_eq!(local.max, DVec3::new(10.0, 5.0, 20.0));
    }

    #[test]
    fn test_geodetic_round_trip_through_local() {
        let cs = CoordinateSystem::new();
        cs.set_origin(zone_18n(), offset()).unwrap();
        let point = GeodeticPoint::new(-74.006, 40.7128, 30.0);
        let local = cs.geodetic_to_local(&point).unwrap();
        let back = cs.local_to_geodetic(local).unwrap();
        assert!((back.longitude - point.longitude).abs() < 1e-8);
        assert!((back.latitude - point.latitude).abs() < 1e-8);
        assert!((back.altitude - point.altitude).abs() < 1e-9);
    }

    #[test]
    fn test_zone_display() {
        assert_eq!(zone_18n().to_string(), "18N");
        assert_eq!(UtmZone::UNSET.to_string(), "unset");
        assert!(UtmZone::new(61, Hemisphere::North).is_err());
    }

    #[test]
    fn test_concurrent_set_origin_single_winner() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cs = Arc::new(CoordinateSystem::with_origin_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cs = Arc::clone(&cs);
                std::thread::spawn(move || {
                    cs.set_origin(zone_18n(), DVec3::splat(i as f64)).is_ok()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn prop_local_world_round_trip(
            e in 100_000.0f64..900_000.0,
            n in 0.0f64..9_000_000.0,
            a in -500.0f64..9_000.0,
        ) {
            let cs = CoordinateSystem::new();
            cs.set_origin(zone_18n(), offset()).unwrap();
            let world = DVec3::new(e, n, a);
            let back = cs.local_to_world(cs.world_to_local(world).unwrap()).unwrap();
            prop_assert!((back - world).abs().max_element() < 1e-6);
        }
    }
}
