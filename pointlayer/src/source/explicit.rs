//! Explicit tile-id queries.
//!
//! For services without range support the source enumerates every tile
//! index covering the volume itself and asks for them by id, in batches:
//!
//! `GET {base}/layers/{layer}/tiles?ids={x}_{y}_{z},{x}_{y}_{z},...`
//!
//! Ids the service does not know are simply absent from the answer.

use bytes::Bytes;
use futures::future::try_join_all;
use tracing::debug;

use super::wire::{parse_listing, TileListing};
use super::{
    AsyncHttpClient, BoxFuture, SearchVolume, SourceError, TileMetadata, TileSource, ZoneProbe,
};
use crate::coord::UtmZone;
use crate::grid::TileIndex;

/// Default number of tile ids sent per metadata request.
pub const DEFAULT_MAX_IDS_PER_REQUEST: usize = 64;

/// Tile source for services that only accept explicit tile id lists.
pub struct TileIdTileSource<C: AsyncHttpClient> {
    http_client: C,
    base_url: String,
    max_ids_per_request: usize,
}

impl<C: AsyncHttpClient> TileIdTileSource<C> {
    pub fn new(http_client: C, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
            max_ids_per_request: DEFAULT_MAX_IDS_PER_REQUEST,
        }
    }

    /// Set the batch size. Values below 1 are treated as 1.
    pub fn with_max_ids_per_request(mut self, max_ids: usize) -> Self {
        self.max_ids_per_request = max_ids.max(1);
        self
    }

    fn ids_url(&self, layer_id: &str, indices: &[TileIndex]) -> String {
        let ids = indices
            .iter()
            .map(|index| format!("{}_{}_{}", index.x(), index.y(), index.z()))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}/layers/{}/tiles?ids={}",
            self.base_url.trim_end_matches('/'),
            layer_id,
            ids
        )
    }

    async fn listings(
        &self,
        layer_id: &str,
        volume: &SearchVolume,
    ) -> Result<Vec<TileListing>, SourceError> {
        let indices: Vec<_> = TileIndex::covering(&volume.tile_scale, &volume.bounds).collect();
        debug!(
            tile_ids = indices.len(),
            batches = indices.len().div_ceil(self.max_ids_per_request),
            "Tile id search"
        );

        let requests = indices.chunks(self.max_ids_per_request).map(|batch| {
            let url = self.ids_url(layer_id, batch);
            async move {
                let body = self.http_client.get(&url).await?;
                parse_listing(&body, &volume.tile_scale, &self.base_url)
            }
        });
        try_join_all(requests).await
    }
}

impl<C: AsyncHttpClient> TileSource for TileIdTileSource<C> {
    fn name(&self) -> &str {
        "tile-id"
    }

    fn search_tiles<'a>(
        &'a self,
        layer_id: &'a str,
        volume: &'a SearchVolume,
    ) -> BoxFuture<'a, Result<Vec<TileMetadata>, SourceError>> {
        Box::pin(async move {
            let listings = self.listings(layer_id, volume).await?;
            Ok(listings
                .into_iter()
                .flat_map(|listing| listing.tiles)
                .collect())
        })
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
            let listings = self.listings(layer_id, volume).await?;
            let envelope = listings
                .iter()
                .map(|listing| listing.zone)
                .find(UtmZone::is_assigned)
                .unwrap_or(UtmZone::UNSET);
            let tiles = listings.into_iter().flat_map(|listing| listing.tiles).collect();
            Ok(ZoneProbe::new(envelope, tiles))
        })
    }
}
