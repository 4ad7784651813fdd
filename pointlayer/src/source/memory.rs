//! In-process tile source.
//!
//! Holds tile metadata and payloads in memory. Useful for offline sessions,
//! fixtures and tests; it also counts requests so callers can verify how
//! often the network would have been hit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;

use super::{BoxFuture, SearchVolume, SourceError, TileMetadata, TileSource};

/// Tile source backed by in-memory tables.
#[derive(Default)]
pub struct MemoryTileSource {
    tiles: RwLock<HashMap<String, Vec<TileMetadata>>>,
    contents: RwLock<HashMap<String, Bytes>>,
    unavailable: AtomicBool,
    searches: AtomicUsize,
    fetches: AtomicUsize,
}

impl MemoryTileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tile of `layer_id` with its payload.
    pub fn insert_tile(&self, layer_id: &str, metadata: TileMetadata, content: impl Into<Bytes>) {
        self.contents
            .write()
            .insert(metadata.url.clone(), content.into());
        self.tiles
            .write()
            .entry(layer_id.to_string())
            .or_default()
            .push(metadata);
    }

    /// Make every subsequent request fail with [`SourceError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of metadata searches served so far.
    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    /// Number of content fetches served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), SourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("memory source offline".to_string()));
        }
        Ok(())
    }
}

impl TileSource for MemoryTileSource {
    fn name(&self) -> &str {
        "memory"
    }

    fn search_tiles<'a>(
        &'a self,
        layer_id: &'a str,
        volume: &'a SearchVolume,
    ) -> BoxFuture<'a, Result<Vec<TileMetadata>, SourceError>> {
        let result = self.check_available().map(|()| {
            self.searches.fetch_add(1, Ordering::SeqCst);
            self.tiles
                .read()
                .get(layer_id)
                .map(|tiles| {
                    tiles
                        .iter()
                        .filter(|tile| tile.index.bounding_box().intersects(&volume.bounds))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        });
        Box::pin(async move { result })
    }

    fn fetch_tile_content<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, SourceError>> {
        let result = self.check_available().and_then(|()| {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.contents
                .read()
                .get(url)
                .cloned()
                .ok_or_else(|| SourceError::NotFound(url.to_string()))
        });
        Box::pin(async move { result })
    }
}
