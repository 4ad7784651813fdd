//! Aggregates built from real point payloads.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::DVec3;

use common::*;
use pointlayer::coord::CoordinateSystem;
use pointlayer::grid::{Scale, TileIndex};
use pointlayer::tile::{
    ContentKind, PointCloudKind, PointRecord, Tile, TileAggregate, TileContext, TileError,
};

fn coordinate_system() -> Arc<CoordinateSystem> {
    let cs = CoordinateSystem::new();
    cs.set_origin(zone(32), DVec3::new(100.0, 200.0, 0.0)).unwrap();
    Arc::new(cs)
}

fn point_tile(
    x: i64,
    points: usize,
    kind: &Arc<PointCloudKind>,
    calls: &Arc<AtomicUsize>,
) -> Tile<PointRecord> {
    let context = TileContext {
        index: tile_index(x),
        coordinate_system: coordinate_system(),
    };
    let kind = Arc::clone(kind);
    let calls = Arc::clone(calls);
    let payload = point_payload(points);
    Tile::new(tile_index(x), move || {
        calls.fetch_add(1, Ordering::SeqCst);
        let result = kind.decode(&context, &payload).map_err(TileError::from);
        async move { result }
    })
}

fn aggregate(kind: &Arc<PointCloudKind>) -> TileAggregate<PointCloudKind> {
    TileAggregate::new(
        TileIndex::new(0, 0, 0, Scale::cube(24.0).unwrap()),
        Arc::clone(kind),
    )
}

#[test]
fn test_add_tile_outside_volume_is_rejected() {
    let kind = Arc::new(PointCloudKind::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let agg = aggregate(&kind);

    assert!(!agg.add_tile(point_tile(3, 5, &kind, &calls)));
    assert!(!agg.add_tile(point_tile(-1, 5, &kind, &calls)));
    assert_eq!(agg.tile_count(), 0);
    assert_eq!(agg.object_count(), 0);
}

#[tokio::test]
async fn test_second_load_performs_no_decoding() {
    let kind = Arc::new(PointCloudKind::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let agg = aggregate(&kind);
    assert!(agg.add_tile(point_tile(0, 5, &kind, &calls)));
    assert!(agg.add_tile(point_tile(2, 9, &kind, &calls)));

    agg.load_contents().await.unwrap();
    let first_count = agg.object_count();
    agg.load_contents().await.unwrap();

    assert_eq!(first_count, 14);
    assert_eq!(agg.object_count(), first_count);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_bounds_are_local() {
    let kind = Arc::new(PointCloudKind::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let agg = aggregate(&kind);
    agg.add_tile(point_tile(0, 3, &kind, &calls));

    assert!(agg.contents_bounds().is_none());
    agg.load_contents().await.unwrap();

    // payload points sit at (0..0.002, 1, 2) world; origin offset (100, 200, 0)
    let bounds = agg.contents_bounds().unwrap();
    assert!((bounds.min.x - -100.0).abs() < 1e-3);
    assert!((bounds.min.y - 2.0).abs() < 1e-3);
    assert!((bounds.min.z - -199.0).abs() < 1e-3);
}
