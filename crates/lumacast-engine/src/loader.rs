//! Off-tick LUT loading.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use lumacast_core::{LutData, LutError, LutStore};

use crate::faults::{EngineFault, FaultBus};

/// Runs fetch + parse on the blocking pool so the render tick never waits.
///
/// A failed load leaves the previously active LUT bound. When requests
/// overlap, the most recently requested LUT ends up active regardless of
/// which load finishes first.
#[derive(Clone)]
pub struct AsyncLutLoader {
    store: Arc<LutStore>,
    faults: FaultBus,
    handle: Handle,
    /// Generation of the newest request.
    latest: Arc<AtomicU64>,
    /// Serializes the generation check with the swap.
    swap: Arc<Mutex<()>>,
}

impl AsyncLutLoader {
    pub fn new(store: Arc<LutStore>, faults: FaultBus, handle: Handle) -> Self {
        Self {
            store,
            faults,
            handle,
            latest: Arc::new(AtomicU64::new(0)),
            swap: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &Arc<LutStore> {
        &self.store
    }

    /// Load `source` and make it active once parsed.
    ///
    /// Parse errors are also published as [`EngineFault::LutParse`]. A load
    /// overtaken by a newer request resolves to [`LutError::Superseded`]
    /// and leaves the active LUT alone.
    pub fn request(&self, source: impl Into<String>) -> JoinHandle<Result<Arc<LutData>, LutError>> {
        let source = source.into();
        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        let store = Arc::clone(&self.store);
        let latest = Arc::clone(&self.latest);
        let swap = Arc::clone(&self.swap);
        let faults = self.faults.clone();
        self.handle.spawn(async move {
            let key = source.clone();
            let result = tokio::task::spawn_blocking(move || {
                store.load_with_retry(&key)?;
                let _swap = swap.lock();
                if latest.load(Ordering::Acquire) != generation {
                    return Err(LutError::Superseded(key));
                }
                store.activate(&key)
            })
                .await
                .map_err(|e| LutError::Fetch {
                    source_id: source.clone(),
                    message: e.to_string(),
                })?;
            match &result {
                Ok(lut) => tracing::info!("active LUT is now `{}`", lut.name),
                Err(e) if e.is_parse_error() => {
                    tracing::error!("LUT `{source}` rejected: {e}");
                    faults.publish(EngineFault::LutParse {
                        source: source.clone(),
                        message: e.to_string(),
                    });
                }
                Err(LutError::Superseded(_)) => {
                    tracing::debug!("LUT `{source}` superseded before it loaded");
                }
                Err(e) => tracing::warn!("LUT `{source}` not loaded: {e}"),
            }
            result
        })
    }

    /// Clear a source's unavailable mark and try it again.
    pub fn retry(&self, source: impl Into<String>) -> JoinHandle<Result<Arc<LutData>, LutError>> {
        let source = source.into();
        self.store.retrigger(&source);
        self.request(source)
    }
}
