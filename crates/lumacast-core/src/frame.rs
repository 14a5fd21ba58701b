//! Video frames and the source abstraction the compositor pulls from.

use std::sync::Arc;

use image::RgbaImage;
use parking_lot::RwLock;

/// One captured frame. The sequence number is the "new frame" signal.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub image: Arc<RgbaImage>,
    pub sequence: u64,
}

impl VideoFrame {
    pub fn new(image: impl Into<Arc<RgbaImage>>, sequence: u64) -> Self {
        Self {
            image: image.into(),
            sequence,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// A live camera (or anything shaped like one).
pub trait VideoSource: Send + Sync {
    /// Current frame size; `(0, 0)` until the first frame arrives.
    fn dimensions(&self) -> (u32, u32);

    /// The most recent frame, if any.
    fn latest_frame(&self) -> Option<VideoFrame>;
}

/// Latest-frame slot fed by a capture thread.
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: RwLock<Option<VideoFrame>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `image` as the newest frame and return its sequence number.
    pub fn push(&self, image: impl Into<Arc<RgbaImage>>) -> u64 {
        let mut latest = self.latest.write();
        let sequence = latest.as_ref().map_or(1, |f| f.sequence + 1);
        *latest = Some(VideoFrame::new(image, sequence));
        sequence
    }

    pub fn clear(&self) {
        *self.latest.write() = None;
    }
}

impl VideoSource for FrameSlot {
    fn dimensions(&self) -> (u32, u32) {
        self.latest
            .read()
            .as_ref()
            .map_or((0, 0), VideoFrame::dimensions)
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.latest.read().clone()
    }
}
