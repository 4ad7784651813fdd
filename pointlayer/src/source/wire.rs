//! JSON tile listing shared by the HTTP sources.
//!
//! ```text
//! {
//!   "utm_zone": { "number": 18, "northern": true },
//!   "tiles": [
//!     { "x": 72995, "y": 563404, "z": 1, "url": "tiles/72995_563404_1.pct",
//!       "content_type": "point_cloud" }
//!   ]
//! }
//! ```
//!
//! A tile may carry its own `utm_zone`, overriding the envelope's.

use serde::Deserialize;

use super::{ContentType, SourceError, TileMetadata};
use crate::coord::UtmZone;
use crate::grid::{Scale, TileIndex};

#[derive(Debug, Deserialize)]
struct WireListing {
    #[serde(default)]
    utm_zone: Option<WireZone>,
    #[serde(default)]
    tiles: Vec<WireTile>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct WireZone {
    number: u8,
    #[serde(default = "default_northern")]
    northern: bool,
}

#[derive(Debug, Deserialize)]
struct WireTile {
    x: i64,
    y: i64,
    z: i64,
    url: String,
    content_type: String,
    #[serde(default)]
    utm_zone: Option<WireZone>,
}

fn default_northern() -> bool {
    true
}

/// A decoded listing.
#[derive(Debug)]
pub(crate) struct TileListing {
    /// Envelope zone, [`UtmZone::UNSET`] when absent.
    pub zone: UtmZone,
    pub tiles: Vec<TileMetadata>,
}

fn to_zone(wire: Option<WireZone>) -> Result<Option<UtmZone>, SourceError> {
    wire.map(|zone| {
        UtmZone::from_parts(zone.number, zone.northern)
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))
    })
    .transpose()
}

/// Parse a listing body, building indices at `tile_scale` and resolving
/// relative content URLs against `base_url`.
pub(crate) fn parse_listing(
    body: &[u8],
    tile_scale: &Scale,
    base_url: &str,
) -> Result<TileListing, SourceError> {
    let listing: WireListing = serde_json::from_slice(body)
        .map_err(|e| SourceError::InvalidResponse(format!("Malformed tile listing: {}", e)))?;

    let zone = to_zone(listing.utm_zone)?.unwrap_or(UtmZone::UNSET);
    let tiles = listing
        .tiles
        .into_iter()
        .map(|tile| {
            Ok(TileMetadata {
                index: TileIndex::new(tile.x, tile.y, tile.z, *tile_scale),
                url: resolve_url(base_url, &tile.url),
                content_type: tile
                    .content_type
                    .parse()
                    .unwrap_or(ContentType::Other(tile.content_type.clone())),
                zone: to_zone(tile.utm_zone)?.unwrap_or(zone),
            })
        })
        .collect::<Result<Vec<_>, SourceError>>()?;

    Ok(TileListing { zone, tiles })
}

/// Absolute URLs pass through; anything else is joined onto `base_url`.
pub(crate) fn resolve_url(base_url: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Hemisphere;

    fn scale() -> Scale {
        Scale::cube(8.0).unwrap()
    }

    #[test]
    fn test_parse_listing() {
        let body = br#"{
            "utm_zone": {"number": 18, "northern": true},
            "tiles": [
                {"x": 1, "y": 2, "z": 0, "url": "tiles/a.pct", "content_type": "point_cloud"},
                {"x": 1, "y": 3, "z": 0, "url": "https://cdn/b.json", "content_type": "annotation",
                 "utm_zone": {"number": 0}}
            ]
        }"#;
        let listing = parse_listing(body, &scale(), "http://svc/v1/").unwrap();

        assert_eq!(listing.zone, UtmZone::new(18, Hemisphere::North).unwrap());
        assert_eq!(listing.tiles.len(), 2);
        assert_eq!(listing.tiles[0].url, "http://svc/v1/tiles/a.pct");
        assert_eq!(listing.tiles[0].zone, listing.zone);
        assert_eq!(listing.tiles[0].index, TileIndex::new(1, 2, 0, scale()));
        assert_eq!(listing.tiles[1].url, "https://cdn/b.json");
        assert_eq!(listing.tiles[1].content_type, ContentType::Annotation);
        assert_eq!(listing.tiles[1].zone, UtmZone::UNSET);
    }

    #[test]
    fn test_parse_listing_without_zone_or_tiles() {
        let listing = parse_listing(b"{}", &scale(), "http://svc").unwrap();
        assert_eq!(listing.zone, UtmZone::UNSET);
        assert!(listing.tiles.is_empty());
    }

    #[test]
    fn test_parse_listing_rejects_garbage() {
        let result = parse_listing(b"not json", &scale(), "http://svc");
        assert!(matches!(result, Err(SourceError::InvalidResponse(_))));
    }

    #[test]
    fn test_parse_listing_rejects_bad_zone() {
        let body = br#"{"utm_zone": {"number": 75, "northern": false}, "tiles": []}"#;
        assert!(parse_listing(body, &scale(), "http://svc").is_err());
    }
}
