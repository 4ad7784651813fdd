//! UTM ⇄ geodetic conversion on the WGS84 ellipsoid.
//!
//! Implements the transverse Mercator projection with Krüger's series
//! truncated at third order, which keeps round-trip error well under a
//! millimetre inside a zone.

use std::f64::consts::PI;

use super::{CoordinateError, Hemisphere, UtmZone};

/// WGS84 semi-major axis in metres.
const WGS84_A: f64 = 6_378_137.0;

/// WGS84 flattening.
const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// UTM scale factor on the central meridian.
const K0: f64 = 0.9996;

/// False easting applied to every zone.
pub const FALSE_EASTING: f64 = 500_000.0;

/// False northing applied in the southern hemisphere.
pub const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A geodetic position: degrees of longitude/latitude, metres of altitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeodeticPoint {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
}

impl GeodeticPoint {
    pub fn new(longitude: f64, latitude: f64, altitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            altitude,
        }
    }
}

/// Series coefficients derived from the third flattening.
struct Series {
    /// Rectifying radius.
    a: f64,
    alpha: [f64; 3],
    beta: [f64; 3],
    delta: [f64; 3],
    /// `2√n / (1 + n)`, the conformal-latitude eccentricity term.
    e: f64,
}

fn series() -> Series {
    let n = WGS84_F / (2.0 - WGS84_F);
    let n2 = n * n;
    let n3 = n2 * n;
    Series {
        a: WGS84_A / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0),
        alpha: [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
            61.0 * n3 / 240.0,
        ],
        beta: [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0,
            n2 / 48.0 + n3 / 15.0,
            17.0 * n3 / 480.0,
        ],
        delta: [
            2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3,
            7.0 * n2 / 3.0 - 8.0 * n3 / 5.0,
            56.0 * n3 / 15.0,
        ],
        e: 2.0 * n.sqrt() / (1.0 + n),
    }
}

/// Central meridian of a zone in radians.
fn central_meridian(zone: u8) -> f64 {
    (zone as f64 * 6.0 - 183.0).to_radians()
}

/// The standard UTM zone number for a longitude in degrees.
///
/// Ignores the Norway and Svalbard exceptions.
pub fn zone_number_for(longitude: f64) -> u8 {
    let wrapped = (longitude + 180.0).rem_euclid(360.0);
    ((wrapped / 6.0).floor() as u8 + 1).min(60)
}

/// Convert a UTM coordinate in `zone` to geodetic longitude/latitude.
///
/// Returns `(longitude, latitude)` in degrees.
pub fn utm_to_geodetic(
    zone: &UtmZone,
    easting: f64,
    northing: f64,
) -> Result<(f64, f64), CoordinateError> {
    if !zone.is_assigned() {
        return Err(CoordinateError::InvalidZone(*zone));
    }
    let s = series();
    let false_northing = match zone.hemisphere() {
        Hemisphere::North => 0.0,
        Hemisphere::South => FALSE_NORTHING_SOUTH,
    };

    let xi = (northing - false_northing) / (K0 * s.a);
    let eta = (easting - FALSE_EASTING) / (K0 * s.a);

    let mut xi_prime = xi;
    let mut eta_prime = eta;
    for (j, beta) in s.beta.iter().enumerate() {
        let k = 2.0 * (j + 1) as f64;
        xi_prime -= beta * (k * xi).sin() * (k * eta).cosh();
        eta_prime -= beta * (k * xi).cos() * (k * eta).sinh();
    }

    let chi = (xi_prime.sin() / eta_prime.cosh()).asin();
    let mut latitude = chi;
    for (j, delta) in s.delta.iter().enumerate() {
        latitude += delta * (2.0 * (j + 1) as f64 * chi).sin();
    }
    let longitude = central_meridian(zone.number()) + eta_prime.sinh().atan2(xi_prime.cos());

    Ok((normalize_longitude(longitude.to_degrees()), latitude.to_degrees()))
}

/// Project geodetic longitude/latitude (degrees) into a specific zone.
///
/// The zone is forced rather than derived, so points just outside the zone
/// still land in the same planar frame as the rest of the session.
pub fn geodetic_to_utm_in_zone(
    zone: &UtmZone,
    longitude: f64,
    latitude: f64,
) -> Result<(f64, f64), CoordinateError> {
    if !zone.is_assigned() {
        return Err(CoordinateError::InvalidZone(*zone));
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(CoordinateError::InvalidLatitude(latitude));
    }
    let s = series();
    let phi = latitude.to_radians();
    let lambda = longitude.to_radians() - central_meridian(zone.number());
    let lambda = (lambda + PI).rem_euclid(2.0 * PI) - PI;

    let t = (phi.sin().atanh() - s.e * (s.e * phi.sin()).atanh()).sinh();
    let xi_prime = t.atan2(lambda.cos());
    let eta_prime = (lambda.sin() / (1.0 + t * t).sqrt()).atanh();

    let mut xi = xi_prime;
    let mut eta = eta_prime;
    for (j, alpha) in s.alpha.iter().enumerate() {
        let k = 2.0 * (j + 1) as f64;
        xi += alpha * (k * xi_prime).sin() * (k * eta_prime).cosh();
        eta += alpha * (k * xi_prime).cos() * (k * eta_prime).sinh();
    }

    let false_northing = match zone.hemisphere() {
        Hemisphere::North => 0.0,
        Hemisphere::South => FALSE_NORTHING_SOUTH,
    };
    Ok((
        FALSE_EASTING + K0 * s.a * eta,
        false_northing + K0 * s.a * xi,
    ))
}

/// Project geodetic longitude/latitude (degrees) into its natural zone.
///
/// Returns the zone together with `(easting, northing)`.
pub fn geodetic_to_utm(
    longitude: f64,
    latitude: f64,
) -> Result<(UtmZone, f64, f64), CoordinateError> {
    let hemisphere = if latitude >= 0.0 {
        Hemisphere::North
    } else {
        Hemisphere::South
    };
    let zone = UtmZone::new(zone_number_for(longitude), hemisphere)?;
    let (easting, northing) = geodetic_to_utm_in_zone(&zone, longitude, latitude)?;
    Ok((zone, easting, northing))
}

fn normalize_longitude(degrees: f64) -> f64 {
    (degrees + 180.0).rem_euclid(360.0) - 180.0
}
