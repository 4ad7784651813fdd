//! Spatial tile cache.
//!
//! [`TileCacheManager`] drives the loading pipeline for one layer:
//!
//! ```text
//! volumes ─► aggregate indices ─► origin bootstrap ─► placeholders
//!         ─► tile metadata ─► tiles attached ─► aggregates loaded ─► eviction
//! ```
//!
//! Eviction is least-recently-loaded first, by aggregate, and never leaves
//! the cache empty. Changes are reported through a [`CacheEventSink`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pointlayer::cache::{ChannelSink, TileCacheManager};
//! use pointlayer::config::CacheConfig;
//! use pointlayer::coord::CoordinateSystem;
//!
//! let (sink, mut events) = ChannelSink::channel();
//! let cache = TileCacheManager::point_cloud(
//!     CacheConfig::default(),
//!     "lidar",
//!     source,
//!     Arc::new(CoordinateSystem::new()),
//! )?
//! .with_event_sink(sink);
//!
//! match cache.load_from_volumes(&[volume], false).await {
//!     Ok(_) => println!("{}", cache.stats()),
//!     Err(e) if e.is_busy() => { /* try again next frame */ }
//!     Err(e) => return Err(e.into()),
//! }
//! ```

mod events;
mod manager;
mod recency;
mod stats;

pub use events::{CacheEvent, CacheEventSink, ChannelSink, NoopSink};
pub use manager::TileCacheManager;
pub use recency::RecencyList;
pub use stats::{CacheMetrics, CacheStats};
