//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use glam::DVec3;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use pointlayer::cache::CacheEvent;
use pointlayer::coord::UtmZone;
use pointlayer::grid::{BoundingBox, Scale, TileIndex};
use pointlayer::source::{
    BoxFuture, ContentType, MemoryTileSource, SearchVolume, SourceError, TileMetadata, TileSource,
};
use pointlayer::tile::encode_point_tile;

pub const LAYER: &str = "lidar";

/// Aggregate edge length of the default configuration.
pub const AGGREGATE_SIZE: f64 = 24.0;

pub fn zone(number: u8) -> UtmZone {
    UtmZone::from_parts(number, true).unwrap()
}

pub fn tile_index(x: i64) -> TileIndex {
    TileIndex::new(x, 0, 0, Scale::cube(8.0).unwrap())
}

pub fn aggregate_key(x: i64) -> String {
    format!("{}_0_0@24x24x24", x)
}

/// Volume covering exactly aggregate `x` of the default grid.
pub fn aggregate_volume(x: i64) -> BoundingBox {
    let min = DVec3::new(x as f64 * AGGREGATE_SIZE, 0.0, 0.0);
    BoundingBox::new(min, min + DVec3::splat(AGGREGATE_SIZE))
}

pub fn point_payload(points: usize) -> Bytes {
    let offsets: Vec<[i32; 3]> = (0..points)
        .map(|i| [(i % 8000) as i32, 1000, 2000])
        .collect();
    encode_point_tile(&offsets, None).unwrap()
}

pub fn metadata(x: i64, content_type: ContentType, zone: UtmZone) -> TileMetadata {
    let index = tile_index(x);
    TileMetadata {
        index,
        url: format!("mem://{}/{}", content_type, index.key()),
        content_type,
        zone,
    }
}

/// Add a point tile at tile column `x` tagged with `zone`.
pub fn add_point_tile(source: &MemoryTileSource, x: i64, points: usize, zone: UtmZone) {
    source.insert_tile(
        LAYER,
        metadata(x, ContentType::PointCloud, zone),
        point_payload(points),
    );
}

/// Collects every event emitted by a cache.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<CacheEvent>>>);

impl EventLog {
    pub fn sink(&self) -> impl Fn(CacheEvent) + Send + Sync + 'static {
        let events = Arc::clone(&self.0);
        move |event| events.lock().push(event)
    }

    pub fn events(&self) -> Vec<CacheEvent> {
        self.0.lock().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                CacheEvent::AggregateRemoved { key } => Some(key),
                _ => None,
            })
            .collect()
    }
}

/// Memory source whose searches block until released.
pub struct GatedSource {
    pub inner: MemoryTileSource,
    pub entered: Notify,
    gate: Semaphore,
}

impl GatedSource {
    pub fn new(inner: MemoryTileSource) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    /// Let every pending and future search through.
    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

impl TileSource for GatedSource {
    fn name(&self) -> &str {
        "gated"
    }

    fn search_tiles<'a>(
        &'a self,
        layer_id: &'a str,
        volume: &'a SearchVolume,
    ) -> BoxFuture<'a, Result<Vec<TileMetadata>, SourceError>> {
        Box::pin(async move {
            self.entered.notify_one();
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| SourceError::Unavailable("gate closed".to_string()))?;
            self.inner.search_tiles(layer_id, volume).await
        })
    }

    fn fetch_tile_content<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, SourceError>> {
        self.inner.fetch_tile_content(url)
    }
}
