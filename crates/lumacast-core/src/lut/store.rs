//! LUT loading, caching, retry bookkeeping and the active-LUT slot.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::cache::{DEFAULT_CAPACITY, LutCache};
use super::{LutData, generate_identity, generate_teal_orange, parse_cube};
use crate::error::LutError;

/// Default number of fetch attempts before a source is marked unavailable.
pub const DEFAULT_LOAD_ATTEMPTS: u32 = 3;

/// Identifier of the built-in identity table.
pub const BUILTIN_IDENTITY: &str = "builtin:identity";
/// Identifier of the built-in teal & orange look.
pub const BUILTIN_TEAL_ORANGE: &str = "builtin:teal-orange";

/// Built-in tables are generated at this size.
const BUILTIN_SIZE: u32 = 33;

/// Retrieves `.cube` text for a source identifier.
pub trait LutFetcher: Send + Sync {
    fn fetch(&self, source: &str) -> Result<String, LutError>;
}

/// Reads plain filesystem paths and `file://` URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileFetcher;

impl LutFetcher for FileFetcher {
    fn fetch(&self, source: &str) -> Result<String, LutError> {
        let path = match source.split_once("://") {
            Some(("file", rest)) => rest,
            Some(_) => return Err(LutError::UnsupportedSource(source.to_string())),
            None => source,
        };
        std::fs::read_to_string(Path::new(path)).map_err(|e| LutError::Fetch {
            source_id: source.to_string(),
            message: e.to_string(),
        })
    }
}

struct ActiveLut {
    key: String,
    lut: Arc<LutData>,
}

/// Shared LUT service: fetch + parse, LRU cache, pinning of the active LUT.
///
/// Every operation serializes on the cache mutex, so a prefetch path and the
/// compositor can use the store concurrently. Failures never touch the
/// active LUT.
pub struct LutStore {
    cache: Mutex<LutCache>,
    fetcher: Arc<dyn LutFetcher>,
    max_attempts: u32,
    failures: Mutex<HashMap<String, u32>>,
    active: RwLock<Option<ActiveLut>>,
}

impl LutStore {
    pub fn new(capacity: usize, fetcher: Arc<dyn LutFetcher>) -> Self {
        Self {
            cache: Mutex::new(LutCache::new(capacity)),
            fetcher,
            max_attempts: DEFAULT_LOAD_ATTEMPTS,
            failures: Mutex::new(HashMap::new()),
            active: RwLock::new(None),
        }
    }

    /// Store backed by [`FileFetcher`] with the default capacity.
    pub fn with_files() -> Self {
        Self::new(DEFAULT_CAPACITY, Arc::new(FileFetcher))
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Fetch, parse and cache `source`, bypassing any cached copy.
    pub fn load_from_url(&self, source: &str) -> Result<Arc<LutData>, LutError> {
        let lut = Arc::new(self.resolve(source)?);
        self.cache.lock().insert(source, Arc::clone(&lut))?;
        tracing::info!("loaded LUT `{}` ({}³) from {source}", lut.name, lut.size);
        Ok(lut)
    }

    /// Return the cached LUT (promoting it) or load it on a miss.
    pub fn load_cached(&self, source: &str) -> Result<Arc<LutData>, LutError> {
        if let Some(lut) = self.cache.lock().get(source) {
            return Ok(lut);
        }
        self.load_from_url(source)
    }

    /// [`load_cached`](Self::load_cached) with bounded retries.
    ///
    /// Transport failures are retried up to the attempt limit; parse errors
    /// are not, since the same bytes would fail again. After the limit the
    /// source stays unavailable until [`retrigger`](Self::retrigger).
    pub fn load_with_retry(&self, source: &str) -> Result<Arc<LutData>, LutError> {
        if self.is_unavailable(source) {
            return Err(LutError::Unavailable(source.to_string()));
        }

        let mut last_err = None;
        for attempt in 1..=self.max_attempts {
            match self.load_cached(source) {
                Ok(lut) => {
                    self.failures.lock().remove(source);
                    return Ok(lut);
                }
                Err(e) if e.is_parse_error() => return Err(e),
                Err(e) => {
                    tracing::warn!("LUT load attempt {attempt}/{} failed: {e}", self.max_attempts);
                    last_err = Some(e);
                }
            }
        }

        self.failures
            .lock()
            .insert(source.to_string(), self.max_attempts);
        Err(last_err.unwrap_or_else(|| LutError::Unavailable(source.to_string())))
    }

    pub fn is_unavailable(&self, source: &str) -> bool {
        self.failures
            .lock()
            .get(source)
            .is_some_and(|n| *n >= self.max_attempts)
    }

    /// Clear the unavailable mark so the next load tries again.
    pub fn retrigger(&self, source: &str) {
        self.failures.lock().remove(source);
    }

    /// Load `source` and make it the active LUT, pinning it in the cache.
    ///
    /// The previous active LUT is unpinned only after the swap, so there is
    /// always exactly one active table and it is never evictable. Each
    /// activation holds exactly one pin, including re-activating the
    /// current table.
    pub fn activate(&self, source: &str) -> Result<Arc<LutData>, LutError> {
        let lut = self.load_with_retry(source)?;
        {
            let mut cache = self.cache.lock();
            if !cache.pin(source) {
                // Evicted between load and pin; put it back pinned.
                cache.insert(source, Arc::clone(&lut))?;
                cache.pin(source);
            }
        }

        let previous = self.active.write().replace(ActiveLut {
            key: source.to_string(),
            lut: Arc::clone(&lut),
        });
        if let Some(prev) = previous {
            self.cache.lock().unpin(&prev.key);
        }
        Ok(lut)
    }

    /// Drop the active LUT; the compositor then skips the LUT stage.
    pub fn deactivate(&self) {
        if let Some(prev) = self.active.write().take() {
            self.cache.lock().unpin(&prev.key);
        }
    }

    /// The LUT the compositor should bind this tick.
    pub fn active(&self) -> Option<Arc<LutData>> {
        self.active.read().as_ref().map(|a| Arc::clone(&a.lut))
    }

    pub fn active_key(&self) -> Option<String> {
        self.active.read().as_ref().map(|a| a.key.clone())
    }

    pub fn contains(&self, source: &str) -> bool {
        self.cache.lock().contains(source)
    }

    pub fn is_pinned(&self, source: &str) -> bool {
        self.cache.lock().is_pinned(source)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    /// Cached keys from most- to least-recently-used.
    pub fn keys(&self) -> Vec<String> {
        self.cache.lock().keys()
    }

    fn resolve(&self, source: &str) -> Result<LutData, LutError> {
        match source {
            BUILTIN_IDENTITY => Ok(generate_identity(BUILTIN_SIZE)),
            BUILTIN_TEAL_ORANGE => Ok(generate_teal_orange(BUILTIN_SIZE)),
            _ => {
                let text = self.fetcher.fetch(source)?;
                parse_cube(source, &text)
            }
        }
    }
}
