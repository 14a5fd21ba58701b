//! Landmark intake and the mask pump.
//!
//! Landmarks and masks both travel over `tokio::sync::watch`: a slow
//! consumer only ever sees the newest value and never blocks the producer.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use lumacast_core::mask::{FaceLandmarks, MaskGenerator, MaskPair};
use lumacast_core::VideoSource;

/// One detector result, tagged with the capture it was computed from.
#[derive(Debug, Clone, Default)]
pub struct LandmarkUpdate {
    pub faces: Vec<FaceLandmarks>,
    pub source_sequence: u64,
}

/// Producer side of the landmark channel.
#[derive(Debug, Clone)]
pub struct LandmarkFeed {
    tx: Arc<watch::Sender<Option<LandmarkUpdate>>>,
}

impl LandmarkFeed {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the pending landmark set. Only face 0 is used downstream.
    pub fn push(&self, faces: Vec<FaceLandmarks>, source_sequence: u64) {
        self.tx.send_replace(Some(LandmarkUpdate {
            faces,
            source_sequence,
        }));
    }

    /// Signal tracking loss; the next masks are cleared.
    pub fn lost(&self, source_sequence: u64) {
        self.push(Vec::new(), source_sequence);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<LandmarkUpdate>> {
        self.tx.subscribe()
    }
}

impl Default for LandmarkFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Latest generated masks, read by the compositor each tick.
#[derive(Debug, Clone)]
pub struct MaskSlot {
    tx: Arc<watch::Sender<Option<Arc<MaskPair>>>>,
}

impl MaskSlot {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn store(&self, masks: MaskPair) {
        self.tx.send_replace(Some(Arc::new(masks)));
    }

    pub fn latest(&self) -> Option<Arc<MaskPair>> {
        self.tx.borrow().clone()
    }

    /// Latest masks unless they are more than `max_age` frames behind
    /// `frame_sequence`.
    pub fn fresh(&self, frame_sequence: u64, max_age: u64) -> Option<Arc<MaskPair>> {
        self.latest()
            .filter(|m| m.source_sequence.saturating_add(max_age) >= frame_sequence)
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<MaskPair>>> {
        self.tx.subscribe()
    }
}

impl Default for MaskSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task turning landmark updates into masks.
pub struct MaskPump {
    task: JoinHandle<()>,
}

impl MaskPump {
    /// Spawn on `handle`. Rasterization runs on the blocking pool.
    pub fn spawn(
        handle: &tokio::runtime::Handle,
        generator: MaskGenerator,
        feed: &LandmarkFeed,
        source: Arc<dyn VideoSource>,
        slot: MaskSlot,
    ) -> Self {
        let mut rx = feed.subscribe();
        let generator = Arc::new(Mutex::new(generator));
        let task = handle.spawn(async move {
            while rx.changed().await.is_ok() {
                let Some(update) = rx.borrow_and_update().clone() else {
                    continue;
                };
                let (width, height) = source.dimensions();
                let generator = Arc::clone(&generator);
                let result = tokio::task::spawn_blocking(move || {
                    let mut generator = generator.lock();
                    let (w, h) = generator.target_size(width, height);
                    generator.update(update.faces.first(), w, h, update.source_sequence)
                })
                .await;
                match result {
                    Ok(masks) => slot.store(masks),
                    Err(e) => tracing::error!("mask generation task failed: {e}"),
                }
            }
            tracing::debug!("landmark feed closed; mask pump exiting");
        });
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for MaskPump {
    fn drop(&mut self) {
        self.task.abort();
    }
}
