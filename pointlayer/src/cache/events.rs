//! Notifications produced for the rendering layer.

use tokio::sync::mpsc;
use tracing::trace;

use crate::grid::TileIndex;

/// Something the renderer may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// An aggregate finished loading and its contents can be displayed.
    AggregateCreated { key: String, index: TileIndex },
    /// An aggregate was evicted; drop anything built from it.
    AggregateRemoved { key: String },
    /// The working set changed.
    RenderRequested,
}

/// Fire-and-forget receiver of [`CacheEvent`]s.
///
/// Called synchronously from the cache, never while internal locks are held.
/// Closures taking a `CacheEvent` implement this trait.
pub trait CacheEventSink: Send + Sync {
    fn emit(&self, event: CacheEvent);
}

impl<F> CacheEventSink for F
where
    F: Fn(CacheEvent) + Send + Sync,
{
    fn emit(&self, event: CacheEvent) {
        self(event)
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl CacheEventSink for NoopSink {
    fn emit(&self, _event: CacheEvent) {}
}

/// Forwards events into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<CacheEvent>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<CacheEvent>) -> Self {
        Self { sender }
    }

    /// Create a sink together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CacheEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl CacheEventSink for ChannelSink {
    fn emit(&self, event: CacheEvent) {
        if let Err(err) = self.sender.send(event) {
            trace!(event = ?err.0, "Event receiver dropped");
        }
    }
}
