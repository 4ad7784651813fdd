//! Coarse cache unit grouping tiles.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{ContentKind, DecodeFailurePolicy, Tile, TileError};
use crate::grid::{BoundingBox, TileIndex};

struct AggregateInner<K: ContentKind> {
    tiles: Vec<Arc<Tile<K::Record>>>,
    contents: K::Contents,
    loaded: bool,
    object_count: usize,
}

/// A coarse-grid cell owning the tiles whose centers fall inside it.
///
/// Tiles may only be added while the aggregate is unloaded. Loading fetches
/// every tile concurrently and merges their records once; repeated or
/// concurrent loads observe the same outcome without re-fetching.
pub struct TileAggregate<K: ContentKind> {
    index: TileIndex,
    kind: Arc<K>,
    inner: Mutex<AggregateInner<K>>,
    load_lock: tokio::sync::Mutex<()>,
}

impl<K: ContentKind> TileAggregate<K> {
    pub fn new(index: TileIndex, kind: Arc<K>) -> Self {
        Self {
            index,
            kind,
            inner: Mutex::new(AggregateInner {
                tiles: Vec::new(),
                contents: K::Contents::default(),
                loaded: false,
                object_count: 0,
            }),
            load_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn index(&self) -> &TileIndex {
        &self.index
    }

    /// Stable string key of this aggregate's index.
    pub fn key(&self) -> String {
        self.index.key()
    }

    /// Add a tile to this aggregate.
    ///
    /// Returns false and leaves the aggregate unchanged when it is loaded,
    /// when a tile with the same index is already present, or when the
    /// tile's center lies in a different aggregate cell.
    pub fn add_tile(&self, tile: Tile<K::Record>) -> bool {
        let mut inner = self.inner.lock();
        if inner.loaded {
            return false;
        }
        if inner.tiles.iter().any(|t| t.index() == tile.index()) {
            return false;
        }
        if TileIndex::from_point(self.index.scale(), tile.index().center()) != self.index {
            return false;
        }
        inner.tiles.push(Arc::new(tile));
        true
    }

    pub fn tile_count(&self) -> usize {
        self.inner.lock().tiles.len()
    }

    pub fn tile_indices(&self) -> Vec<TileIndex> {
        self.inner.lock().tiles.iter().map(|t| *t.index()).collect()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.lock().loaded
    }

    /// Objects held by the merged contents; 0 while unloaded.
    pub fn object_count(&self) -> usize {
        self.inner.lock().object_count
    }

    /// Local-frame bounds of the loaded contents.
    pub fn contents_bounds(&self) -> Option<BoundingBox> {
        let inner = self.inner.lock();
        if !inner.loaded {
            return None;
        }
        self.kind.contents_bounds(&inner.contents)
    }

    /// Read the merged contents.
    pub fn with_contents<T>(&self, f: impl FnOnce(&K::Contents) -> T) -> T {
        f(&self.inner.lock().contents)
    }

    /// Load every tile and merge the results.
    ///
    /// Decode failures follow the kind's [`DecodeFailurePolicy`]; source
    /// failures always fail the aggregate, which then stays unloaded.
    pub async fn load_contents(&self) -> Result<(), TileError> {
        let _load_guard = self.load_lock.lock().await;

        let tiles = {
            let inner = self.inner.lock();
            if inner.loaded {
                return Ok(());
            }
            inner.tiles.clone()
        };

        let results = join_all(tiles.iter().map(|tile| tile.load())).await;
        let policy = self.kind.decode_failure_policy();

        let mut batches = Vec::with_capacity(results.len());
        for (tile, result) in tiles.iter().zip(results) {
            match result {
                Ok(records) => batches.push(records),
                Err(TileError::Decode(error)) if policy == DecodeFailurePolicy::SkipTile => {
                    warn!(
                        aggregate = %self.index,
                        tile = %tile.index(),
                        error = %error,
                        "Skipping tile that failed to decode"
                    );
                }
                Err(error) => {
                    warn!(aggregate = %self.index, tile = %tile.index(), error = %error, "Aggregate load failed");
                    return Err(error);
                }
            }
        }

        let mut contents = K::Contents::default();
        for records in &batches {
            self.kind.merge(&mut contents, records);
        }
        let object_count = self.kind.object_count(&contents);

        let mut inner = self.inner.lock();
        inner.contents = contents;
        inner.object_count = object_count;
        inner.loaded = true;
        debug!(
            aggregate = %self.index,
            tiles = tiles.len(),
            objects = object_count,
            "Aggregate loaded"
        );
        Ok(())
    }

    /// Release merged contents and every tile's loaded data.
    ///
    /// Tiles stay registered so the aggregate can be reloaded.
    pub fn unload_contents(&self) {
        let mut inner = self.inner.lock();
        for tile in &inner.tiles {
            tile.unload();
        }
        inner.contents = K::Contents::default();
        inner.object_count = 0;
        inner.loaded = false;
    }
}

impl<K: ContentKind> fmt::Debug for TileAggregate<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("TileAggregate")
            .field("index", &self.index)
            .field("tiles", &inner.tiles.len())
            .field("loaded", &inner.loaded)
            .field("object_count", &inner.object_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Scale;
    use crate::source::{ContentType, SourceError};
    use crate::tile::{DecodeError, TileContext};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records are plain numbers; contents are their concatenation.
    struct NumberKind {
        policy: DecodeFailurePolicy,
    }

    impl ContentKind for NumberKind {
        type Record = u32;
        type Contents = Vec<u32>;

        fn content_type(&self) -> ContentType {
            ContentType::Other("numbers".into())
        }

        fn decode(&self, _: &TileContext, bytes: &[u8]) -> Result<Vec<u32>, DecodeError> {
            Ok(bytes.iter().map(|b| u32::from(*b)).collect())
        }

        fn merge(&self, contents: &mut Vec<u32>, records: &[u32]) {
            contents.extend_from_slice(records);
        }

        fn object_count(&self, contents: &Vec<u32>) -> usize {
            contents.len()
        }

        fn contents_bounds(&self, _: &Vec<u32>) -> Option<BoundingBox> {
            None
        }

        fn decode_failure_policy(&self) -> DecodeFailurePolicy {
            self.policy
        }
    }

    fn tile_scale() -> Scale {
        Scale::cube(8.0).unwrap()
    }

    fn aggregate(policy: DecodeFailurePolicy) -> TileAggregate<NumberKind> {
        TileAggregate::new(
            TileIndex::new(0, 0, 0, Scale::cube(24.0).unwrap()),
            Arc::new(NumberKind { policy }),
        )
    }

    fn tile(x: i64, records: Vec<u32>, calls: &Arc<AtomicUsize>) -> Tile<u32> {
        let calls = Arc::clone(calls);
        Tile::new(TileIndex::new(x, 0, 0, tile_scale()), move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let records = records.clone();
            async move { Ok(records) }
        })
    }

    fn failing_tile(x: i64, error: TileError) -> Tile<u32> {
        Tile::new(TileIndex::new(x, 0, 0, tile_scale()), move || {
            let error = error.clone();
            async move { Err(error) }
        })
    }

    #[test]
    fn test_add_tile_rules() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agg = aggregate(DecodeFailurePolicy::SkipTile);

        assert!(agg.add_tile(tile(0, vec![], &calls)));
        assert!(agg.add_tile(tile(2, vec![], &calls)));
        // duplicate index
        assert!(!agg.add_tile(tile(0, vec![], &calls)));
        // center at x = 28 belongs to aggregate x = 1
        assert!(!agg.add_tile(tile(3, vec![], &calls)));
        // center at x = -4 belongs to aggregate x = -1
        assert!(!agg.add_tile(tile(-1, vec![], &calls)));
        assert_eq!(agg.tile_count(), 2);
    }

    #[tokio::test]
    async fn test_load_merges_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agg = aggregate(DecodeFailurePolicy::SkipTile);
        agg.add_tile(tile(0, vec![1, 2], &calls));
        agg.add_tile(tile(1, vec![3], &calls));

        agg.load_contents().await.unwrap();
        agg.load_contents().await.unwrap();

        assert!(agg.is_loaded());
        assert_eq!(agg.object_count(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        agg.with_contents(|c| assert_eq!(c.len(), 3));
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_outcome() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agg = aggregate(DecodeFailurePolicy::SkipTile);
        agg.add_tile(tile(0, vec![1, 2, 3], &calls));

        let (a, b) = tokio::join!(agg.load_contents(), agg.load_contents());
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(agg.object_count(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_loaded_aggregate_rejects_tiles() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agg = aggregate(DecodeFailurePolicy::SkipTile);
        agg.add_tile(tile(0, vec![1], &calls));
        agg.load_contents().await.unwrap();

        assert!(!agg.add_tile(tile(1, vec![1], &calls)));
    }

    #[tokio::test]
    async fn test_empty_aggregate_loads_with_zero_objects() {
        let agg = aggregate(DecodeFailurePolicy::SkipTile);
        agg.load_contents().await.unwrap();
        assert!(agg.is_loaded());
        assert_eq!(agg.object_count(), 0);
    }

    #[tokio::test]
    async fn test_decode_failure_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agg = aggregate(DecodeFailurePolicy::SkipTile);
        agg.add_tile(tile(0, vec![1, 2], &calls));
        agg.add_tile(failing_tile(1, DecodeError::BadMagic.into()));

        agg.load_contents().await.unwrap();
        assert_eq!(agg.object_count(), 2);
    }

    #[tokio::test]
    async fn test_decode_failure_fails_aggregate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agg = aggregate(DecodeFailurePolicy::FailAggregate);
        agg.add_tile(tile(0, vec![1, 2], &calls));
        agg.add_tile(failing_tile(1, DecodeError::BadMagic.into()));

        let result = agg.load_contents().await;
        assert!(matches!(result, Err(TileError::Decode(DecodeError::BadMagic))));
        assert!(!agg.is_loaded());
        assert_eq!(agg.object_count(), 0);
    }

    #[tokio::test]
    async fn test_source_failure_fails_aggregate() {
        let agg = aggregate(DecodeFailurePolicy::SkipTile);
        agg.add_tile(failing_tile(
            0,
            SourceError::Unavailable("down".into()).into(),
        ));

        let result = agg.load_contents().await;
        assert!(matches!(result, Err(TileError::Source(_))));
        assert!(!agg.is_loaded());
    }

    #[tokio::test]
    async fn test_unload_allows_reload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agg = aggregate(DecodeFailurePolicy::SkipTile);
        agg.add_tile(tile(0, vec![5], &calls));

        agg.load_contents().await.unwrap();
        agg.unload_contents();
        assert!(!agg.is_loaded());
        assert_eq!(agg.object_count(), 0);
        assert_eq!(agg.tile_count(), 1);

        agg.load_contents().await.unwrap();
        assert_eq!(agg.object_count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
