//! Bounding-box tile queries.
//!
//! The service accepts a world-space box and returns every tile intersecting
//! it:
//!
//! `GET {base}/layers/{layer}/tiles?bbox={minx},{miny},{minz},{maxx},{maxy},{maxz}`

use bytes::Bytes;
use tracing::debug;

use super::wire::parse_listing;
use super::{
    AsyncHttpClient, BoxFuture, SearchVolume, SourceError, TileMetadata, TileSource, ZoneProbe,
};
use crate::grid::BoundingBox;

/// Tile source for services that support range queries.
pub struct RangeTileSource<C: AsyncHttpClient> {
    http_client: C,
    base_url: String,
}

impl<C: AsyncHttpClient> RangeTileSource<C> {
    /// Creates a range source rooted at `base_url`.
    pub fn new(http_client: C, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
        }
    }

    /// Builds the metadata query URL for a volume.
    fn search_url(&self, layer_id: &str, bounds: &BoundingBox) -> String {
        format!(
            "{}/layers/{}/tiles?bbox={},{},{},{},{},{}",
            self.base_url.trim_end_matches('/'),
            layer_id,
            bounds.min.x,
            bounds.min.y,
            bounds.min.z,
            bounds.max.x,
            bounds.max.y,
            bounds.max.z
        )
    }

    async fn listing(
        &self,
        layer_id: &str,
        volume: &SearchVolume,
    ) -> Result<super::wire::TileListing, SourceError> {
        let url = self.search_url(layer_id, &volume.bounds);
        debug!(url = %url, "Range tile search");
        let body = self.http_client.get(&url).await?;
        parse_listing(&body, &volume.tile_scale, &self.base_url)
    }
}

impl<C: AsyncHttpClient> TileSource for RangeTileSource<C> {
    fn name(&self) -> &str {
        "range"
    }

    fn search_tiles<'a>(
        &'a self,
        layer_id: &'a str,
        volume: &'a SearchVolume,
    ) -> BoxFuture<'a, Result<Vec<TileMetadata>, SourceError>> {
        Box::pin(async move { Ok(self.listing(layer_id, volume).await?.tiles) })
    }

    fn fetch_tile_content<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, SourceError>> {
        Box::pin(self.http_client.get(url))
    }

    fn probe_zone<'a>(
        &'a self,
        layer_id: &'a str,
        volume: &'a SearchVolume,
    ) -> BoxFuture<'a, Result<ZoneProbe, SourceError>> {
        Box::pin(async move {
            let listing = self.listing(layer_id, volume).await?;
            Ok(ZoneProbe::new(listing.zone, listing.tiles))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{Hemisphere, UtmZone};
    use crate::grid::{Scale, TileIndex};
    use crate::source::MockHttpClient;
    use glam::DVec3;

    const SEARCH_URL: &str = "http://svc/v1/layers/lidar/tiles?bbox=0,0,0,24,24,24";

    fn volume() -> SearchVolume {
        SearchVolume::new(
            BoundingBox::new(DVec3::ZERO, DVec3::splat(24.0)),
            Scale::cube(8.0).unwrap(),
        )
    }

    fn listing_body() -> &'static str {
        r#"{"utm_zone": {"number": 32, "northern": true},
            "tiles": [{"x": 0, "y": 1, "z": 2, "url": "t/0_1_2", "content_type": "point_cloud"}]}"#
    }

    #[test]
    fn test_search_url_construction() {
        let source = RangeTileSource::new(MockHttpClient::default(), "http://svc/v1/");
        assert_eq!(source.search_url("lidar", &volume().bounds), SEARCH_URL);
    }

    #[tokio::test]
    async fn test_search_tiles() {
        let client = MockHttpClient::default().with_response(SEARCH_URL, listing_body());
        let source = RangeTileSource::new(client, "http://svc/v1");

        let tiles = source.search_tiles("lidar", &volume()).await.unwrap();
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].index, TileIndex::new(0, 1, 2, Scale::cube(8.0).unwrap()));
        assert_eq!(tiles[0].url, "http://svc/v1/t/0_1_2");
    }

    #[tokio::test]
    async fn test_probe_zone_from_envelope() {
        let client = MockHttpClient::default().with_response(SEARCH_URL, listing_body());
        let source = RangeTileSource::new(client, "http://svc/v1");

        let probe = source.probe_zone("lidar", &volume()).await.unwrap();
        assert_eq!(probe.zone, UtmZone::new(32, Hemisphere::North).unwrap());
        assert_eq!(probe.tiles.len(), 1);
    }

    #[tokio::test]
    async fn test_search_propagates_network_error() {
        let client = MockHttpClient::default()
            .with_error(SEARCH_URL, SourceError::Http("Connection refused".to_string()));
        let source = RangeTileSource::new(client, "http://svc/v1");

        let result = source.search_tiles("lidar", &volume()).await;
        match result {
            Err(SourceError::Http(msg)) => assert!(msg.contains("Connection refused")),
            other => panic!("Expected HttpError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_tile_content() {
        let client = MockHttpClient::default().with_response("http://svc/v1/t/0_1_2", vec![9u8, 8]);
        let source = RangeTileSource::new(client, "http://svc/v1");

        let bytes = source.fetch_tile_content("http://svc/v1/t/0_1_2").await.unwrap();
        assert_eq!(bytes.as_ref(), &[9, 8]);
    }
}
