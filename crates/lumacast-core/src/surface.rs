//! Version-stamped output surface shared by preview, recording and broadcast.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbaImage;
use parking_lot::RwLock;

/// A presented frame. Cheap to clone; pixels are shared.
#[derive(Debug, Clone)]
pub struct SurfaceFrame {
    pub image: Arc<RgbaImage>,
    /// Monotonic per surface, starting at 1.
    pub version: u64,
    /// Sequence of the video frame this was made from.
    pub source_sequence: u64,
    /// True when raw video was published during fallback.
    pub passthrough: bool,
}

impl SurfaceFrame {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Holds the latest presented frame.
///
/// Exactly one writer (the render loop); any number of [`SurfaceReader`]s.
#[derive(Debug, Default)]
pub struct OutputSurface {
    latest: RwLock<Option<Arc<SurfaceFrame>>>,
    version: AtomicU64,
}

impl OutputSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publish a new frame and return its version.
    pub fn present(&self, image: Arc<RgbaImage>, source_sequence: u64, passthrough: bool) -> u64 {
        let mut latest = self.latest.write();
        let version = self.version.load(Ordering::Acquire) + 1;
        *latest = Some(Arc::new(SurfaceFrame {
            image,
            version,
            source_sequence,
            passthrough,
        }));
        self.version.store(version, Ordering::Release);
        version
    }

    pub fn latest(&self) -> Option<Arc<SurfaceFrame>> {
        self.latest.read().clone()
    }

    /// Version of the latest frame, `0` before the first present.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn reader(self: &Arc<Self>) -> SurfaceReader {
        SurfaceReader {
            surface: Arc::clone(self),
            last_seen: 0,
        }
    }

    /// Drop the held frame; versions keep counting.
    pub fn clear(&self) {
        *self.latest.write() = None;
    }
}

/// A consumer's handle: shared surface plus the last version it observed.
#[derive(Debug, Clone)]
pub struct SurfaceReader {
    surface: Arc<OutputSurface>,
    last_seen: u64,
}

impl SurfaceReader {
    /// The latest frame if it is newer than the last one returned.
    pub fn poll(&mut self) -> Option<Arc<SurfaceFrame>> {
        if self.surface.version() == self.last_seen {
            return None;
        }
        let frame = self.surface.latest()?;
        if frame.version <= self.last_seen {
            return None;
        }
        self.last_seen = frame.version;
        Some(frame)
    }

    /// The latest frame regardless of whether it was seen.
    pub fn peek(&self) -> Option<Arc<SurfaceFrame>> {
        self.surface.latest()
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    pub fn surface(&self) -> &Arc<OutputSurface> {
        &self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_sees_each_version_once() {
        let surface = OutputSurface::new();
        let mut reader = surface.reader();
        assert!(reader.poll().is_none());

        surface.present(Arc::new(RgbaImage::new(2, 2)), 10, false);
        let frame = reader.poll().unwrap();
        assert_eq!((frame.version, frame.source_sequence), (1, 10));
        assert!(reader.poll().is_none());

        surface.present(Arc::new(RgbaImage::new(2, 2)), 11, true);
        surface.present(Arc::new(RgbaImage::new(2, 2)), 12, true);
        let frame = reader.poll().unwrap();
        assert_eq!(frame.version, 3, "intermediate versions are skipped");
        assert!(frame.passthrough);
    }

    #[test]
    fn test_frames_share_pixels() {
        let surface = OutputSurface::new();
        let image = Arc::new(RgbaImage::new(8, 8));
        surface.present(Arc::clone(&image), 1, false);
        let frame = surface.reader().poll().unwrap();
        assert!(Arc::ptr_eq(&frame.image, &image));
    }
}
