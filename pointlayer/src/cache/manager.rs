//! The tile cache manager.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use glam::DVec3;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{CacheEvent, CacheEventSink, CacheMetrics, CacheStats, NoopSink, RecencyList};
use crate::config::CacheConfig;
use crate::coord::{CoordinateSystem, OriginError, UtmZone};
use crate::error::CacheError;
use crate::grid::{BoundingBox, TileGrid, TileIndex};
use crate::source::{SearchVolume, TileMetadata, TileSource};
use crate::tile::{ContentKind, PointCloudKind, Tile, TileAggregate, TileContext, TileError};

struct ManagerState<K: ContentKind> {
    aggregates: HashMap<String, Arc<TileAggregate<K>>>,
    /// Known keys in registration order.
    order: Vec<String>,
    /// Keys of aggregates holding loaded content.
    recency: RecencyList,
    /// Cached union of loaded bounds; `None` when invalidated.
    bounds: Option<Option<BoundingBox>>,
}

impl<K: ContentKind> ManagerState<K> {
    fn new() -> Self {
        Self {
            aggregates: HashMap::new(),
            order: Vec::new(),
            recency: RecencyList::new(),
            bounds: None,
        }
    }

    fn register(&mut self, aggregate: Arc<TileAggregate<K>>) {
        let key = aggregate.key();
        self.order.push(key.clone());
        self.aggregates.insert(key, aggregate);
    }

    /// Forget `keys`, returning the aggregates that were registered.
    fn remove_keys(&mut self, keys: &[String]) -> Vec<(String, Arc<TileAggregate<K>>)> {
        if keys.is_empty() {
            return Vec::new();
        }
        let doomed: HashSet<&str> = keys.iter().map(String::as_str).collect();
        self.order.retain(|key| !doomed.contains(key.as_str()));
        self.bounds = None;
        keys.iter()
            .filter_map(|key| {
                self.recency.remove(key);
                self.aggregates
                    .remove(key)
                    .map(|aggregate| (key.clone(), aggregate))
            })
            .collect()
    }

    fn loaded_object_count(&self) -> usize {
        self.recency
            .iter()
            .filter_map(|key| self.aggregates.get(key))
            .map(|aggregate| aggregate.object_count())
            .sum()
    }
}

/// Resets the in-flight flag when dropped.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Tile cache for one layer and one content kind.
///
/// Turns volume queries into loaded [`TileAggregate`]s: discovers tiles
/// through a [`TileSource`], groups them into aggregates, loads those
/// concurrently and evicts the least recently loaded aggregates when over
/// budget.
///
/// Only one [`load_from_volumes`](Self::load_from_volumes) call runs at a
/// time; a concurrent call fails with [`CacheError::Busy`]. Several managers
/// may share one [`CoordinateSystem`], in which case the first to load
/// assigns the session origin.
pub struct TileCacheManager<K: ContentKind> {
    config: CacheConfig,
    grid: TileGrid,
    layer_id: String,
    kind: Arc<K>,
    source: Arc<dyn TileSource>,
    coordinate_system: Arc<CoordinateSystem>,
    events: Arc<dyn CacheEventSink>,
    loading: AtomicBool,
    state: Mutex<ManagerState<K>>,
    metrics: CacheMetrics,
}

impl TileCacheManager<PointCloudKind> {
    /// Point-cloud cache sampling points as configured.
    pub fn point_cloud(
        config: CacheConfig,
        layer_id: impl Into<String>,
        source: Arc<dyn TileSource>,
        coordinate_system: Arc<CoordinateSystem>,
    ) -> Result<Self, CacheError> {
        let kind = PointCloudKind::new(config.point_sampling()?);
        Self::new(config, layer_id, kind, source, coordinate_system)
    }
}

impl<K: ContentKind> TileCacheManager<K> {
    /// Create a manager.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Configuration`] if `config` does not validate.
    pub fn new(
        config: CacheConfig,
        layer_id: impl Into<String>,
        kind: K,
        source: Arc<dyn TileSource>,
        coordinate_system: Arc<CoordinateSystem>,
    ) -> Result<Self, CacheError> {
        let grid = config.validate()?;
        Ok(Self {
            config,
            grid,
            layer_id: layer_id.into(),
            kind: Arc::new(kind),
            source,
            coordinate_system,
            events: Arc::new(NoopSink),
            loading: AtomicBool::new(false),
            state: Mutex::new(ManagerState::new()),
            metrics: CacheMetrics::new(),
        })
    }

    /// Deliver notifications to `sink`.
    pub fn with_event_sink(mut self, sink: impl CacheEventSink + 'static) -> Self {
        self.events = Arc::new(sink);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn layer_id(&self) -> &str {
        &self.layer_id
    }

    pub fn coordinate_system(&self) -> &Arc<CoordinateSystem> {
        &self.coordinate_system
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub fn aggregate(&self, key: &str) -> Option<Arc<TileAggregate<K>>> {
        self.state.lock().aggregates.get(key).cloned()
    }

    /// Keys of every registered aggregate, in registration order.
    pub fn known_keys(&self) -> Vec<String> {
        self.state.lock().order.clone()
    }

    /// Keys of loaded aggregates, least recently loaded first.
    pub fn loaded_keys(&self) -> Vec<String> {
        self.state.lock().recency.iter().map(str::to_string).collect()
    }

    /// Objects held by all loaded aggregates.
    pub fn object_count(&self) -> usize {
        self.state.lock().loaded_object_count()
    }

    /// Union of the loaded aggregates' content bounds, in the local frame.
    pub fn bounding_volume(&self) -> Option<BoundingBox> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(cached) = state.bounds {
            return cached;
        }
        let computed = state
            .recency
            .iter()
            .filter_map(|key| state.aggregates.get(key))
            .filter_map(|aggregate| aggregate.contents_bounds())
            .reduce(|a, b| a.union(&b));
        state.bounds = Some(computed);
        computed
    }

    /// Horizontal center of the loaded volume at its lowest point.
    pub fn center_point(&self) -> Option<DVec3> {
        self.bounding_volume().map(|bounds| {
            let center = bounds.center();
            DVec3::new(center.x, bounds.min.y, center.z)
        })
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            known_aggregates: state.aggregates.len(),
            loaded_aggregates: state.recency.len(),
            tiles: state.aggregates.values().map(|a| a.tile_count()).sum(),
            object_count: state.loaded_object_count(),
            ..Default::default()
        }
        .with_metrics(&self.metrics)
    }

    fn begin_load(&self) -> Option<LoadingGuard<'_>> {
        self.loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LoadingGuard(&self.loading))
    }

    /// Load every aggregate intersecting `volumes` that is not known yet.
    ///
    /// Unless `load_all` is set, at most
    /// [`initial_aggregates_per_request`](CacheConfig::initial_aggregates_per_request)
    /// new aggregates are fetched. Returns `true` if any aggregate was newly
    /// registered, `false` if the volumes were already covered.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Busy`] if another load is in flight
    /// - [`CacheError::UnknownCoordinateZone`] / [`CacheError::CoordinateMismatch`]
    ///   if the data cannot share the session frame
    /// - [`CacheError::SourceUnavailable`] if the tile service fails
    /// - [`CacheError::Decode`] if a content kind treats a bad tile as fatal
    pub async fn load_from_volumes(
        &self,
        volumes: &[BoundingBox],
        load_all: bool,
    ) -> Result<bool, CacheError> {
        let Some(_guard) = self.begin_load() else {
            self.metrics.busy_rejected();
            debug!(layer = %self.layer_id, "Load rejected, another load is in flight");
            return Err(CacheError::Busy);
        };

        let result = self.run_load(volumes, load_all).await;
        match &result {
            Ok(_) => self.metrics.load_completed(),
            Err(error) => {
                self.metrics.load_failed();
                warn!(layer = %self.layer_id, error = %error, "Tile load failed");
            }
        }
        if self.config.report_statistics {
            info!(layer = %self.layer_id, stats = %self.stats(), "Cache statistics");
        }
        result
    }

    async fn run_load(&self, volumes: &[BoundingBox], load_all: bool) -> Result<bool, CacheError> {
        if let Some(volume) = volumes.iter().find(|volume| !volume.is_finite()) {
            return Err(CacheError::InvalidVolume(format!(
                "{} .. {}",
                volume.min, volume.max
            )));
        }

        let candidates = self.new_candidates(volumes, load_all);
        if candidates.is_empty() {
            debug!(layer = %self.layer_id, "Requested volumes already covered");
            return Ok(false);
        }

        let probed = if self.coordinate_system.has_origin() {
            HashMap::new()
        } else {
            self.bootstrap_origin(&candidates).await?
        };

        let placeholders = self.register_placeholders(&candidates);
        let metadata = match self.discover(&placeholders, probed).await {
            Ok(metadata) => metadata,
            Err(error) => {
                self.forget(&placeholders);
                return Err(error);
            }
        };

        self.attach_tiles(&placeholders, metadata);

        let to_load: Vec<_> = placeholders
            .iter()
            .filter(|aggregate| aggregate.tile_count() > 0)
            .cloned()
            .collect();
        let results = join_all(to_load.iter().map(|aggregate| aggregate.load_contents())).await;
        let failure = self.commit_loaded(&to_load, results);

        let evicted = self.evict_over_budget();
        self.prune_empty();
        self.events.emit(CacheEvent::RenderRequested);

        info!(
            layer = %self.layer_id,
            registered = placeholders.len(),
            loaded = to_load.len(),
            evicted,
            objects = self.object_count(),
            "Tile load complete"
        );

        match failure {
            Some(error) => Err(error.into()),
            None => Ok(true),
        }
    }

    /// Aggregate indices intersecting `volumes` that are not registered yet.
    ///
    /// Indices are pulled lazily and, unless `load_all` is set, enumeration
    /// stops once the per-request budget of new indices is reached. Loaded
    /// aggregates seen on the way are marked as recently used.
    fn new_candidates(&self, volumes: &[BoundingBox], load_all: bool) -> Vec<TileIndex> {
        let budget = if load_all {
            usize::MAX
        } else {
            self.config.initial_aggregates_per_request
        };
        let requested = volumes
            .iter()
            .flat_map(|volume| self.grid.aggregate_indices_in(volume));

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut state = self.state.lock();
        for index in requested {
            if !seen.insert(index) {
                continue;
            }
            let key = index.key();
            let loaded = state.aggregates.get(&key).map(|a| a.is_loaded());
            match loaded {
                Some(true) => state.recency.touch(&key),
                Some(false) => {}
                None => {
                    candidates.push(index);
                    if candidates.len() >= budget {
                        debug!(budget, "Request reached its aggregate budget");
                        break;
                    }
                }
            }
        }
        candidates
    }

    /// Assign the session origin.
    ///
    /// Candidates are probed in order until one reports a zone; the origin
    /// offset is always the first candidate's. Returns the listings gathered
    /// while probing, keyed by aggregate.
    async fn bootstrap_origin(
        &self,
        candidates: &[TileIndex],
    ) -> Result<HashMap<TileIndex, Vec<TileMetadata>>, CacheError> {
        let tile_scale = *self.grid.tile_scale();
        let mut listings = HashMap::new();
        let mut probed = UtmZone::UNSET;
        for index in candidates {
            let volume = SearchVolume::new(index.bounding_box(), tile_scale);
            let probe = self.source.probe_zone(&self.layer_id, &volume).await?;
            listings.insert(*index, probe.tiles);
            if probe.zone.is_assigned() {
                probed = probe.zone;
                break;
            }
            debug!(aggregate = %index, "No zone reported, probing next aggregate");
        }
        let Some(first) = candidates.first() else {
            return Ok(listings);
        };

        let zone = if probed.is_assigned() {
            probed
        } else if let Some(fallback) = self.config.fallback_zone {
            debug!(zone = %fallback, "Source reported no zone, using fallback");
            fallback
        } else if self.coordinate_system.has_origin() {
            // Assigned meanwhile by another manager; the sentinel matches it.
            return Ok(listings);
        } else {
            return Err(CacheError::UnknownCoordinateZone);
        };

        match self.coordinate_system.set_origin(zone, first.origin()) {
            Ok(()) => Ok(listings),
            Err(OriginError::Conflict { existing, .. })
                if existing.zone == zone || !probed.is_assigned() =>
            {
                debug!(origin = %existing, "Origin already assigned by another cache");
                Ok(listings)
            }
            Err(error) => Err(error.into()),
        }
    }

    fn register_placeholders(&self, indices: &[TileIndex]) -> Vec<Arc<TileAggregate<K>>> {
        let mut state = self.state.lock();
        indices
            .iter()
            .map(|index| {
                let aggregate = Arc::new(TileAggregate::new(*index, Arc::clone(&self.kind)));
                state.register(Arc::clone(&aggregate));
                aggregate
            })
            .collect()
    }

    /// Tile metadata for every placeholder, in the session zone.
    ///
    /// Aggregates already listed while probing for the zone are not searched
    /// again.
    async fn discover(
        &self,
        placeholders: &[Arc<TileAggregate<K>>],
        mut probed: HashMap<TileIndex, Vec<TileMetadata>>,
    ) -> Result<Vec<TileMetadata>, CacheError> {
        let tile_scale = *self.grid.tile_scale();
        let pending: Vec<_> = placeholders
            .iter()
            .filter(|aggregate| !probed.contains_key(aggregate.index()))
            .collect();
        let searches = pending.iter().map(|aggregate| {
            let volume = SearchVolume::new(aggregate.index().bounding_box(), tile_scale);
            async move { self.source.search_tiles(&self.layer_id, &volume).await }
        });
        let listings = try_join_all(searches).await?;

        let reused = placeholders
            .iter()
            .filter_map(|aggregate| probed.remove(aggregate.index()));
        let metadata = dedup_tiles(reused.chain(listings).flatten());

        for tile in &metadata {
            if !self.coordinate_system.zone_matches(&tile.zone) {
                return Err(CacheError::CoordinateMismatch {
                    expected: self.coordinate_system.zone().unwrap_or(UtmZone::UNSET),
                    found: tile.zone,
                });
            }
        }
        Ok(metadata)
    }

    /// Route each tile to the placeholder owning it.
    fn attach_tiles(&self, placeholders: &[Arc<TileAggregate<K>>], metadata: Vec<TileMetadata>) {
        let owners: HashMap<TileIndex, &Arc<TileAggregate<K>>> = placeholders
            .iter()
            .map(|aggregate| (*aggregate.index(), aggregate))
            .collect();
        let expected_type = self.kind.content_type();

        for tile in metadata {
            if tile.content_type != expected_type {
                warn!(
                    tile = %tile.index,
                    content_type = %tile.content_type,
                    expected = %expected_type,
                    "Skipping tile with unexpected content type"
                );
                continue;
            }
            let owner_index = self.grid.aggregate_index_of(&tile.index);
            let Some(owner) = owners.get(&owner_index) else {
                debug!(tile = %tile.index, "Tile belongs to an aggregate outside this request");
                continue;
            };
            let index = tile.index;
            if !owner.add_tile(self.make_tile(tile)) {
                warn!(tile = %index, aggregate = %owner_index, "Tile rejected by aggregate");
            }
        }
    }

    fn make_tile(&self, metadata: TileMetadata) -> Tile<K::Record> {
        let source = Arc::clone(&self.source);
        let kind = Arc::clone(&self.kind);
        let context = TileContext {
            index: metadata.index,
            coordinate_system: Arc::clone(&self.coordinate_system),
        };
        let url = metadata.url;

        Tile::new(metadata.index, move || {
            let source = Arc::clone(&source);
            let kind = Arc::clone(&kind);
            let context = context.clone();
            let url = url.clone();
            async move {
                let bytes = source.fetch_tile_content(&url).await?;
                let records = kind.decode(&context, &bytes)?;
                debug!(tile = %context.index, records = records.len(), "Tile decoded");
                Ok::<_, TileError>(records)
            }
        })
    }

    /// Record successful loads and return the first failure.
    ///
    /// Aggregates that failed are unregistered so a later request for the
    /// same volume searches them again.
    fn commit_loaded(
        &self,
        aggregates: &[Arc<TileAggregate<K>>],
        results: Vec<Result<(), TileError>>,
    ) -> Option<TileError> {
        let mut created = Vec::new();
        let mut failed = Vec::new();
        let mut failure = None;
        let dropped = {
            let mut state = self.state.lock();
            for (aggregate, result) in aggregates.iter().zip(results) {
                match result {
                    Ok(()) => {
                        state.recency.touch(&aggregate.key());
                        state.bounds = None;
                        created.push((aggregate.key(), *aggregate.index()));
                    }
                    Err(error) => {
                        failed.push(aggregate.key());
                        failure.get_or_insert(error);
                    }
                }
            }
            state.remove_keys(&failed)
        };

        for (key, aggregate) in dropped {
            aggregate.unload_contents();
            debug!(aggregate = %key, "Forgot aggregate that failed to load");
        }
        for (key, index) in created {
            self.metrics.aggregate_loaded();
            self.events.emit(CacheEvent::AggregateCreated { key, index });
        }
        failure
    }

    /// Unregister placeholders of a request that failed before loading.
    fn forget(&self, aggregates: &[Arc<TileAggregate<K>>]) {
        let keys: Vec<String> = aggregates.iter().map(|aggregate| aggregate.key()).collect();
        self.state.lock().remove_keys(&keys);
        debug!(layer = %self.layer_id, count = keys.len(), "Forgot unloaded placeholders");
    }

    /// Evict least recently loaded aggregates until within budget, always
    /// keeping at least one. Returns the number evicted.
    fn evict_over_budget(&self) -> usize {
        let removed = {
            let mut state = self.state.lock();
            let mut keys = Vec::new();
            while state.recency.len() > 1
                && (state.recency.len() > self.config.max_loaded_aggregates
                    || state.loaded_object_count() > self.config.max_loaded_objects)
            {
                let Some(key) = state.recency.pop_lru() else {
                    break;
                };
                keys.push(key);
            }
            state.remove_keys(&keys)
        };

        let count = removed.len();
        if count > 0 {
            info!(layer = %self.layer_id, count, "Evicted aggregates");
            self.metrics.aggregates_evicted(count);
        }
        for (key, aggregate) in removed {
            aggregate.unload_contents();
            self.events.emit(CacheEvent::AggregateRemoved { key });
        }
        count
    }

    /// Forget the oldest registered aggregates without tiles beyond
    /// [`max_empty_aggregates`](CacheConfig::max_empty_aggregates).
    fn prune_empty(&self) {
        let mut state = self.state.lock();
        let empty: Vec<String> = state
            .order
            .iter()
            .filter(|key| {
                state
                    .aggregates
                    .get(key.as_str())
                    .is_some_and(|a| !a.is_loaded() && a.tile_count() == 0)
            })
            .cloned()
            .collect();
        let excess = empty.len().saturating_sub(self.config.max_empty_aggregates);
        if excess > 0 {
            state.remove_keys(&empty[..excess]);
            debug!(layer = %self.layer_id, count = excess, "Forgot empty aggregates");
        }
    }

    /// Drop every aggregate, loaded or not.
    ///
    /// Returns false, doing nothing, while a load is in flight.
    pub fn unload_all(&self) -> bool {
        let Some(_guard) = self.begin_load() else {
            return false;
        };

        let removed = {
            let mut state = self.state.lock();
            let keys = state.order.clone();
            state.remove_keys(&keys)
        };

        let mut evicted = 0;
        for (key, aggregate) in removed {
            if aggregate.is_loaded() {
                aggregate.unload_contents();
                self.events.emit(CacheEvent::AggregateRemoved { key });
                evicted += 1;
            }
        }
        self.metrics.aggregates_evicted(evicted);
        info!(layer = %self.layer_id, evicted, "Unloaded all aggregates");
        self.events.emit(CacheEvent::RenderRequested);
        true
    }
}

/// Drop repeated tiles returned by overlapping searches.
fn dedup_tiles(tiles: impl Iterator<Item = TileMetadata>) -> Vec<TileMetadata> {
    let mut seen = HashSet::new();
    tiles.filter(|tile| seen.insert(tile.index)).collect()
}
