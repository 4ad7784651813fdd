//! Point-cloud content kind.
//!
//! # Wire format (v1, little-endian)
//!
//! | Field | Type |
//! |-------|------|
//! | magic | `b"PCLD"` |
//! | version | `u8`, always 1 |
//! | flags | `u8`, bit 0 = colors present |
//! | reserved | `u16` |
//! | point_count | `u32` |
//! | positions | `point_count × [i32; 3]` millimetres from the tile origin |
//! | colors | `point_count × [u8; 3]`, only if flagged |

use bytes::{Buf, BufMut, Bytes, BytesMut};
use glam::{DVec3, Vec3};

use super::{ContentKind, DecodeError, TileContext};
use crate::error::CacheError;
use crate::grid::BoundingBox;
use crate::source::ContentType;

const MAGIC: &[u8; 4] = b"PCLD";
const VERSION: u8 = 1;
const FLAG_COLORS: u8 = 0b0000_0001;
const HEADER_LEN: usize = 12;
const POSITION_LEN: usize = 12;
const COLOR_LEN: usize = 3;

/// World units per transmitted position unit (millimetres to metres).
pub const POSITION_SCALE: f64 = 0.001;

/// Normalizes a transmitted 0-255 color channel to 0.0-1.0.
pub const COLOR_SCALE: f32 = 1.0 / 255.0;

/// One decoded point in the local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRecord {
    pub position: Vec3,
    pub color: Vec3,
}

/// Merged points of one aggregate, stored as parallel arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloudContents {
    pub positions: Vec<Vec3>,
    pub colors: Vec<Vec3>,
}

/// Which raw points of a tile are kept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointSampling {
    stride: usize,
    max_density: Option<f64>,
}

impl PointSampling {
    /// Keep every `stride`-th point, then cap each tile at
    /// `ceil(max_density × tile volume)` points.
    pub fn new(stride: usize, max_density: Option<f64>) -> Result<Self, CacheError> {
        if stride == 0 {
            return Err(CacheError::Configuration(
                "point stride must be at least 1".to_string(),
            ));
        }
        if let Some(density) = max_density {
            if !density.is_finite() || density <= 0.0 {
                return Err(CacheError::Configuration(format!(
                    "max point density must be positive and finite, got {}",
                    density
                )));
            }
        }
        Ok(Self {
            stride,
            max_density,
        })
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn max_density(&self) -> Option<f64> {
        self.max_density
    }

    /// Indices of the raw points kept from a tile of `point_count` points.
    pub fn select(&self, point_count: usize, tile_volume: f64) -> Vec<usize> {
        let strided: Vec<usize> = (0..point_count).step_by(self.stride).collect();
        let Some(density) = self.max_density else {
            return strided;
        };

        let cap = (density * tile_volume).ceil() as usize;
        if strided.len() <= cap {
            return strided;
        }
        (0..cap).map(|i| strided[i * strided.len() / cap]).collect()
    }
}

impl Default for PointSampling {
    fn default() -> Self {
        Self {
            stride: 1,
            max_density: None,
        }
    }
}

/// Decodes binary point tiles into sampled, colored local-frame points.
#[derive(Debug, Clone, Default)]
pub struct PointCloudKind {
    sampling: PointSampling,
}

impl PointCloudKind {
    pub fn new(sampling: PointSampling) -> Self {
        Self { sampling }
    }

    pub fn sampling(&self) -> &PointSampling {
        &self.sampling
    }
}

struct Header {
    has_colors: bool,
    point_count: usize,
}

impl Header {
    fn read(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        let mut buf = bytes;
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if &magic != MAGIC {
            return Err(DecodeError::BadMagic);
        }
        let version = buf.get_u8();
        if version != VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let flags = buf.get_u8();
        let _reserved = buf.get_u16_le();
        let point_count = buf.get_u32_le() as usize;

        Ok(Self {
            has_colors: flags & FLAG_COLORS != 0,
            point_count,
        })
    }

    fn colors_offset(&self) -> usize {
        HEADER_LEN + self.point_count * POSITION_LEN
    }

    fn payload_len(&self) -> usize {
        let colors = if self.has_colors {
            self.point_count * COLOR_LEN
        } else {
            0
        };
        self.colors_offset() + colors
    }
}

impl ContentKind for PointCloudKind {
    type Record = PointRecord;
    type Contents = PointCloudContents;

    fn content_type(&self) -> ContentType {
        ContentType::PointCloud
    }

    fn decode(&self, context: &TileContext, bytes: &[u8]) -> Result<Vec<PointRecord>, DecodeError> {
        let header = Header::read(bytes)?;
        let expected = header.payload_len();
        if bytes.len() < expected {
            return Err(DecodeError::Truncated {
                expected,
                actual: bytes.len(),
            });
        }

        let origin = context.index.origin();
        let colors_offset = header.colors_offset();
        let selected = self
            .sampling
            .select(header.point_count, context.index.scale().volume());

        selected
            .into_iter()
            .map(|i| {
                let mut position = &bytes[HEADER_LEN + i * POSITION_LEN..];
                let offset_mm = DVec3::new(
                    f64::from(position.get_i32_le()),
                    f64::from(position.get_i32_le()),
                    f64::from(position.get_i32_le()),
                );
                let world = origin + offset_mm * POSITION_SCALE;
                let local = context.coordinate_system.world_to_local(world)?;

                let color = if header.has_colors {
                    let rgb = &bytes[colors_offset + i * COLOR_LEN..][..COLOR_LEN];
                    Vec3::new(f32::from(rgb[0]), f32::from(rgb[1]), f32::from(rgb[2])) * COLOR_SCALE
                } else {
                    Vec3::ONE
                };

                Ok(PointRecord {
                    position: local.as_vec3(),
                    color,
                })
            })
            .collect()
    }

    fn merge(&self, contents: &mut PointCloudContents, records: &[PointRecord]) {
        contents.positions.reserve(records.len());
        contents.colors.reserve(records.len());
        for record in records {
            contents.positions.push(record.position);
            contents.colors.push(record.color);
        }
    }

    fn object_count(&self, contents: &PointCloudContents) -> usize {
        contents.positions.len()
    }

    fn contents_bounds(&self, contents: &PointCloudContents) -> Option<BoundingBox> {
        BoundingBox::from_points(contents.positions.iter().map(|p| p.as_dvec3()))
    }
}

/// Encode a point tile payload.
///
/// `offsets_mm` are millimetre offsets from the tile origin. When `colors`
/// is given it must hold one entry per point.
pub fn encode_point_tile(
    offsets_mm: &[[i32; 3]],
    colors: Option<&[[u8; 3]]>,
) -> Result<Bytes, DecodeError> {
    if let Some(colors) = colors {
        if colors.len() != offsets_mm.len() {
            return Err(DecodeError::Malformed(format!(
                "{} colors for {} points",
                colors.len(),
                offsets_mm.len()
            )));
        }
    }
    let point_count = u32::try_from(offsets_mm.len())
        .map_err(|_| DecodeError::Malformed("too many points for one tile".to_string()))?;

    let color_len = colors.map_or(0, |c| c.len() * COLOR_LEN);
    let mut buf = BytesMut::with_capacity(HEADER_LEN + offsets_mm.len() * POSITION_LEN + color_len);
    buf.put_slice(MAGIC);
    buf.put_u8(VERSION);
    buf.put_u8(if colors.is_some() { FLAG_COLORS } else { 0 });
    buf.put_u16_le(0);
    buf.put_u32_le(point_count);
    for offset in offsets_mm {
        for component in offset {
            buf.put_i32_le(*component);
        }
    }
    if let Some(colors) = colors {
        for rgb in colors {
            buf.put_slice(rgb);
        }
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{CoordinateSystem, Hemisphere, UtmZone};
    use crate::grid::{Scale, TileIndex};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn context(x: i64) -> TileContext {
        let coordinate_system = CoordinateSystem::new();
        coordinate_system
            .set_origin(UtmZone::new(10, Hemisphere::North).unwrap(), DVec3::ZERO)
            .unwrap();
        TileContext {
            index: TileIndex::new(x, 0, 0, Scale::cube(8.0).unwrap()),
            coordinate_system: Arc::new(coordinate_system),
        }
    }

    fn grid_points(count: usize) -> Vec<[i32; 3]> {
        (0..count).map(|i| [i as i32, 0, 0]).collect()
    }

    #[test]
    fn test_decode_rescales_and_converts() {
        let payload =
            encode_point_tile(&[[1000, 2000, 3000]], Some(&[[255, 0, 51]])).unwrap();
        let kind = PointCloudKind::default();

        let records = kind.decode(&context(1), &payload).unwrap();
        assert_eq!(records.len(), 1);
        // world (9, 2, 3) -> local (east, up, north)
        assert_eq!(records[0].position, Vec3::new(9.0, 3.0, 2.0));
        assert!((records[0].color - Vec3::new(1.0, 0.0, 0.2)).length() < 1e-6);
    }

    #[test]
    fn test_decode_without_colors_is_white() {
        let payload = encode_point_tile(&[[0, 0, 0]], None).unwrap();
        let records = PointCloudKind::default().decode(&context(0), &payload).unwrap();
        assert_eq!(records[0].color, Vec3::ONE);
    }

    #[test]
    fn test_decode_rejects_bad_payloads() {
        let kind = PointCloudKind::default();
        let ctx = context(0);

        assert!(matches!(
            kind.decode(&ctx, b"PCLD"),
            Err(DecodeError::Truncated { expected: 12, actual: 4 })
        ));
        assert_eq!(
            kind.decode(&ctx, b"XXXX\x01\x00\x00\x00\x00\x00\x00\x00"),
            Err(DecodeError::BadMagic)
        );
        assert_eq!(
            kind.decode(&ctx, b"PCLD\x02\x00\x00\x00\x00\x00\x00\x00"),
            Err(DecodeError::UnsupportedVersion(2))
        );

        let payload = encode_point_tile(&grid_points(2), None).unwrap();
        assert!(matches!(
            kind.decode(&ctx, &payload[..payload.len() - 1]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_requires_origin() {
        let payload = encode_point_tile(&grid_points(1), None).unwrap();
        let ctx = TileContext {
            index: TileIndex::new(0, 0, 0, Scale::cube(8.0).unwrap()),
            coordinate_system: Arc::new(CoordinateSystem::new()),
        };
        assert!(matches!(
            PointCloudKind::default().decode(&ctx, &payload),
            Err(DecodeError::Coordinates(_))
        ));
    }

    #[test]
    fn test_encode_rejects_color_mismatch() {
        assert!(encode_point_tile(&grid_points(2), Some(&[[0, 0, 0]])).is_err());
    }

    #[test]
    fn test_stride_one_keeps_every_point() {
        let payload = encode_point_tile(&grid_points(17), None).unwrap();
        let records = PointCloudKind::default().decode(&context(0), &payload).unwrap();
        assert_eq!(records.len(), 17);
    }

    #[test]
    fn test_density_cap_spreads_evenly() {
        // 8^3 = 512 cubic units at 0.01 per unit caps the tile at 6 points.
        let sampling = PointSampling::new(1, Some(0.01)).unwrap();
        let selected = sampling.select(100, 512.0);
        assert_eq!(selected.len(), 6);
        assert_eq!(selected[0], 0);
        assert!(selected.windows(2).all(|w| w[0] < w[1]));
        assert!(*selected.last().unwrap() < 100);

        // under the cap nothing changes
        assert_eq!(sampling.select(4, 512.0), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_sampling_validation() {
        assert!(PointSampling::new(0, None).is_err());
        assert!(PointSampling::new(1, Some(0.0)).is_err());
        assert!(PointSampling::new(1, Some(f64::NAN)).is_err());
        assert!(PointSampling::new(3, Some(2.5)).is_ok());
    }

    #[test]
    fn test_contents_bounds_and_merge() {
        let kind = PointCloudKind::default();
        let mut contents = PointCloudContents::default();
        assert!(kind.contents_bounds(&contents).is_none());

        let record = |x: f32, y: f32| PointRecord {
            position: Vec3::new(x, y, 0.0),
            color: Vec3::ONE,
        };
        kind.merge(&mut contents, &[record(1.0, 2.0)]);
        kind.merge(&mut contents, &[record(-1.0, 5.0), record(0.0, 0.0)]);

        assert_eq!(kind.object_count(&contents), 3);
        let bounds = kind.contents_bounds(&contents).unwrap();
        assert_eq!(bounds.min, DVec3::new(-1.0, 0.0, 0.0));
        assert_eq!(bounds.max, DVec3::new(1.0, 5.0, 0.0));
    }

    proptest! {
        #[test]
        fn prop_stride_keeps_ceil_of_count(count in 0usize..500, stride in 1usize..20) {
            let payload = encode_point_tile(&grid_points(count), None).unwrap();
            let kind = PointCloudKind::new(PointSampling::new(stride, None).unwrap());
            let records = kind.decode(&context(0), &payload).unwrap();
            prop_assert_eq!(records.len(), count.div_ceil(stride));
        }
    }
}
