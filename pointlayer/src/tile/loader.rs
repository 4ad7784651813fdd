//! The smallest loadable unit.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::Shared;
use futures::FutureExt;
use parking_lot::Mutex;

use super::TileError;
use crate::grid::TileIndex;
use crate::source::BoxFuture;

/// Deferred loader producing one tile's decoded records.
pub type TileLoader<R> = Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<R>, TileError>> + Send + Sync>;

type SharedLoad<R> = Shared<BoxFuture<'static, Result<Arc<Vec<R>>, TileError>>>;

/// Observable lifecycle of a [`Tile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileLoadState {
    Unloaded,
    Loading,
    Loaded,
}

enum TileState<R> {
    Unloaded,
    Loading {
        generation: u64,
        load: SharedLoad<R>,
    },
    Loaded(Arc<Vec<R>>),
}

struct TileSlot<R> {
    state: TileState<R>,
    /// Bumped for every load started, so a load that was overtaken by
    /// `unload()` cannot store a stale result.
    generation: u64,
}

/// An index plus a memoizing deferred loader.
///
/// The loader runs at most once per load cycle: concurrent callers share the
/// in-flight result and later callers receive the stored records. A failed
/// load leaves the tile unloaded so it can be retried.
pub struct Tile<R> {
    index: TileIndex,
    loader: TileLoader<R>,
    slot: Mutex<TileSlot<R>>,
}

impl<R> Tile<R>
where
    R: Send + Sync + 'static,
{
    /// Create an unloaded tile.
    pub fn new<F, Fut>(index: TileIndex, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<R>, TileError>> + Send + 'static,
    {
        let loader: TileLoader<R> = Arc::new(move || loader().boxed());
        Self::with_loader(index, loader)
    }

    /// Create an unloaded tile from an already boxed loader.
    pub fn with_loader(index: TileIndex, loader: TileLoader<R>) -> Self {
        Self {
            index,
            loader,
            slot: Mutex::new(TileSlot {
                state: TileState::Unloaded,
                generation: 0,
            }),
        }
    }

    pub fn index(&self) -> &TileIndex {
        &self.index
    }

    pub fn state(&self) -> TileLoadState {
        match self.slot.lock().state {
            TileState::Unloaded => TileLoadState::Unloaded,
            TileState::Loading { .. } => TileLoadState::Loading,
            TileState::Loaded(_) => TileLoadState::Loaded,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == TileLoadState::Loaded
    }

    /// The stored records, if loaded.
    pub fn records(&self) -> Option<Arc<Vec<R>>> {
        match &self.slot.lock().state {
            TileState::Loaded(records) => Some(Arc::clone(records)),
            _ => None,
        }
    }

    /// Load the tile's records, invoking the loader only if needed.
    pub async fn load(&self) -> Result<Arc<Vec<R>>, TileError> {
        let (generation, load) = {
            let mut slot = self.slot.lock();
            match &slot.state {
                TileState::Loaded(records) => return Ok(Arc::clone(records)),
                TileState::Loading { generation, load } => (*generation, load.clone()),
                TileState::Unloaded => {
                    slot.generation += 1;
                    let generation = slot.generation;
                    let load: SharedLoad<R> = (self.loader)()
                        .map(|result| result.map(Arc::new))
                        .boxed()
                        .shared();
                    slot.state = TileState::Loading {
                        generation,
                        load: load.clone(),
                    };
                    (generation, load)
                }
            }
        };

        let result = load.await;

        let mut slot = self.slot.lock();
        let current = matches!(
            &slot.state,
            TileState::Loading { generation: g, .. } if *g == generation
        );
        if current {
            slot.state = match &result {
                Ok(records) => TileState::Loaded(Arc::clone(records)),
                Err(_) => TileState::Unloaded,
            };
        }
        result
    }

    /// Discard loaded or in-flight content. The index and loader are kept.
    pub fn unload(&self) {
        self.slot.lock().state = TileState::Unloaded;
    }
}

impl<R> fmt::Debug for Tile<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.slot.lock().state {
            TileState::Unloaded => "unloaded",
            TileState::Loading { .. } => "loading",
            TileState::Loaded(_) => "loaded",
        };
        f.debug_struct("Tile")
            .field("index", &self.index)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Scale;
    use crate::tile::DecodeError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn index() -> TileIndex {
        TileIndex::new(0, 0, 0, Scale::cube(8.0).unwrap())
    }

    fn counting_tile(calls: Arc<AtomicUsize>) -> Tile<u32> {
        Tile::new(index(), move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![1, 2, 3])
            }
        })
    }

    #[tokio::test]
    async fn test_load_memoizes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tile = counting_tile(Arc::clone(&calls));
        assert_eq!(tile.state(), TileLoadState::Unloaded);

        let first = tile.load().await.unwrap();
        let second = tile.load().await.unwrap();
        assert_eq!(*first, vec![1, 2, 3]);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(tile.is_loaded());
    }

    #[tokio::test]
    async fn test_unload_is_idempotent_and_allows_reload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tile = counting_tile(Arc::clone(&calls));

        tile.load().await.unwrap();
        tile.unload();
        tile.unload();
        assert_eq!(tile.state(), TileLoadState::Unloaded);
        assert!(tile.records().is_none());
        assert_eq!(tile.index(), &index());

        tile.load().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_invocation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let tile = {
            let calls = Arc::clone(&calls);
            let gate = Arc::clone(&gate);
            Tile::new(index(), move || {
                let calls = Arc::clone(&calls);
                let gate = Arc::clone(&gate);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    gate.notified().await;
                    Ok(vec![7u32])
                }
            })
        };

        let release = async {
            tokio::task::yield_now().await;
            assert_eq!(tile.state(), TileLoadState::Loading);
            gate.notify_one();
        };
        let (a, b, ()) = tokio::join!(tile.load(), tile.load(), release);

        assert_eq!(*a.unwrap(), vec![7]);
        assert_eq!(*b.unwrap(), vec![7]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_returns_to_unloaded() {
        let tile: Tile<u32> = Tile::new(index(), || async {
            Err(TileError::Decode(DecodeError::BadMagic))
        });

        let result = tile.load().await;
        assert!(matches!(result, Err(TileError::Decode(DecodeError::BadMagic))));
        assert_eq!(tile.state(), TileLoadState::Unloaded);
    }
}
