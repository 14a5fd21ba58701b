//! Virtual-camera / broadcast output.
//!
//! Two transports tap the output surface independently of the render loop:
//! direct capture hands out the surface's own `Arc` frames, and the relay
//! scales and ships frames across a channel from a worker thread, as
//! bitmaps when the sink can take ownership and as JPEG otherwise.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use serde::Serialize;

use lumacast_core::{AspectMode, DistributorConfig, OutputSurface, SurfaceFrame, SurfaceReader};

use crate::faults::{EngineFault, FaultBus};

/// Frames buffered between the relay worker and its sink.
const RELAY_CHANNEL_SIZE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Same-process consumer reading the surface directly.
    DirectCapture,
    /// Consumer in another context, fed over a channel.
    Relay,
}

/// What the host environment can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportCapabilities {
    pub direct_capture: bool,
    pub relay: bool,
    /// Relay sinks may take ownership of bitmaps instead of JPEG bytes.
    pub zero_copy: bool,
}

impl TransportCapabilities {
    pub const fn all() -> Self {
        Self {
            direct_capture: true,
            relay: true,
            zero_copy: true,
        }
    }

    pub fn supports(&self, kind: TransportKind) -> bool {
        match kind {
            TransportKind::DirectCapture => self.direct_capture,
            TransportKind::Relay => self.relay,
        }
    }
}

impl Default for TransportCapabilities {
    fn default() -> Self {
        Self::all()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DistributorError {
    #[error("{0:?} transport is not available on this host")]
    Unsupported(TransportKind),
    #[error("configuration cannot change while a transport is active; stop first")]
    RestartRequired,
    #[error("a transport is already active")]
    AlreadyActive,
    #[error("failed to spawn relay worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// The relay worker has exited and every buffered frame was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("relay channel closed")]
pub struct RelayClosed;

/// One relayed frame.
#[derive(Debug, Clone)]
pub enum RelayFrame {
    /// Pixels handed over without encoding.
    Bitmap(Arc<RgbaImage>),
    Jpeg {
        bytes: Vec<u8>,
        /// Encoder quality, 1..=100.
        quality: u8,
        width: u32,
        height: u32,
    },
}

impl RelayFrame {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Bitmap(image) => image.dimensions(),
            Self::Jpeg { width, height, .. } => (*width, *height),
        }
    }

    /// `data:image/jpeg;base64,...` for JPEG frames.
    pub fn to_data_url(&self) -> Option<String> {
        use base64::{Engine, engine::general_purpose::STANDARD};
        match self {
            Self::Jpeg { bytes, .. } => {
                Some(format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes)))
            }
            Self::Bitmap(_) => None,
        }
    }
}

/// Rate-limited view of the output surface for a same-process consumer.
pub struct CaptureStream {
    reader: SurfaceReader,
    interval: Duration,
    next_due: Option<Instant>,
    stopped: Arc<AtomicBool>,
}

impl CaptureStream {
    /// The newest unseen frame, if one is due at `now`.
    ///
    /// Returns `None` between frames, when nothing new was presented, and
    /// after the distributor stopped.
    pub fn poll(&mut self, now: Instant) -> Option<Arc<SurfaceFrame>> {
        if self.is_closed() || self.next_due.is_some_and(|due| now < due) {
            return None;
        }
        let frame = self.reader.poll()?;
        self.next_due = Some(now + self.interval);
        Some(frame)
    }

    pub fn is_closed(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Sink side of the relay. Disconnects when the worker exits.
pub struct RelayReceiver {
    rx: Receiver<RelayFrame>,
}

impl RelayReceiver {
    pub fn try_recv(&self) -> Option<RelayFrame> {
        self.rx.try_recv().ok()
    }

    /// `Ok(None)` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<RelayFrame>, RelayClosed> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(RelayClosed),
        }
    }
}

enum ActiveTransport {
    Direct,
    Relay { worker: JoinHandle<()> },
}

/// Owns at most one active transport over the output surface.
pub struct FrameDistributor {
    surface: Arc<OutputSurface>,
    config: DistributorConfig,
    capabilities: TransportCapabilities,
    faults: FaultBus,
    active: Option<ActiveTransport>,
    should_stop: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl FrameDistributor {
    pub fn new(
        surface: Arc<OutputSurface>,
        config: DistributorConfig,
        capabilities: TransportCapabilities,
        faults: FaultBus,
    ) -> Self {
        Self {
            surface,
            config,
            capabilities,
            faults,
            active: None,
            should_stop: Arc::new(AtomicBool::new(false)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn capabilities(&self) -> TransportCapabilities {
        self.capabilities
    }

    pub fn supports(&self, kind: TransportKind) -> bool {
        self.capabilities.supports(kind)
    }

    pub fn config(&self) -> &DistributorConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Relay frames discarded because the sink had not drained the channel.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Hand out surface frames directly at the configured rate.
    pub fn start_direct(&mut self) -> Result<CaptureStream, DistributorError> {
        self.check_start(TransportKind::DirectCapture)?;
        self.active = Some(ActiveTransport::Direct);
        tracing::info!("direct capture started at {} fps", self.config.fps);
        Ok(CaptureStream {
            reader: self.surface.reader(),
            interval: self.config.frame_interval(),
            next_due: None,
            stopped: Arc::clone(&self.should_stop),
        })
    }

    /// Start the relay worker. `sink_zero_copy` says whether the consumer
    /// can take bitmaps; JPEG is sent otherwise.
    pub fn start_relay(&mut self, sink_zero_copy: bool) -> Result<RelayReceiver, DistributorError> {
        self.check_start(TransportKind::Relay)?;
        let zero_copy = sink_zero_copy && self.capabilities.zero_copy;
        let (tx, rx) = bounded(RELAY_CHANNEL_SIZE);

        let reader = self.surface.reader();
        let config = self.config.clone();
        let should_stop = Arc::clone(&self.should_stop);
        let dropped = Arc::clone(&self.dropped);
        let worker = thread::Builder::new()
            .name("lumacast-relay".to_string())
            .spawn(move || run_relay(reader, config, zero_copy, tx, should_stop, dropped))?;

        self.active = Some(ActiveTransport::Relay { worker });
        tracing::info!(
            "relay started: {}x{} @ {} fps ({})",
            self.config.width,
            self.config.height,
            self.config.fps,
            if zero_copy { "bitmap" } else { "jpeg" }
        );
        Ok(RelayReceiver { rx })
    }

    /// Replace the configuration. Only allowed while stopped.
    pub fn reconfigure(&mut self, config: DistributorConfig) -> Result<(), DistributorError> {
        if self.is_active() {
            return Err(DistributorError::RestartRequired);
        }
        self.config = config;
        Ok(())
    }

    /// Stop the active transport, join the relay worker and close its
    /// channel. Idempotent.
    pub fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        self.should_stop.store(true, Ordering::Release);
        if let ActiveTransport::Relay { worker } = active {
            if worker.join().is_err() {
                tracing::error!("relay worker panicked");
            }
        }
        // Fresh flag so a later start is not born stopped.
        self.should_stop = Arc::new(AtomicBool::new(false));
        tracing::info!("distribution stopped");
    }

    fn check_start(&self, kind: TransportKind) -> Result<(), DistributorError> {
        if !self.supports(kind) {
            tracing::warn!("{kind:?} transport requested but unsupported");
            self.faults
                .publish(EngineFault::UnsupportedTransport { transport: kind });
            return Err(DistributorError::Unsupported(kind));
        }
        if self.is_active() {
            return Err(DistributorError::AlreadyActive);
        }
        Ok(())
    }
}

impl Drop for FrameDistributor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_relay(
    mut reader: SurfaceReader,
    config: DistributorConfig,
    zero_copy: bool,
    tx: Sender<RelayFrame>,
    should_stop: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
) {
    let interval = config.frame_interval();
    let quality = jpeg_quality(config.clamped_quality());
    let mut next_frame = Instant::now();

    while !should_stop.load(Ordering::Acquire) {
        if let Some(frame) = reader.poll() {
            let scaled = scale_to_target(&frame.image, config.width, config.height, config.aspect);
            let message = if zero_copy {
                Some(RelayFrame::Bitmap(scaled))
            } else {
                encode_jpeg(&scaled, quality)
            };
            if let Some(message) = message {
                match tx.try_send(message) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        tracing::debug!("relay sink gone; worker exiting");
                        break;
                    }
                }
            }
        }

        next_frame += interval;
        let now = Instant::now();
        if next_frame > now {
            thread::sleep(next_frame - now);
        } else {
            next_frame = now;
        }
    }
}

/// Map a 0..1 quality to the encoder's 1..=100 scale.
fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

fn encode_jpeg(image: &RgbaImage, quality: u8) -> Option<RelayFrame> {
    use image::codecs::jpeg::JpegEncoder;

    // JPEG carries no alpha.
    let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut bytes = Cursor::new(Vec::with_capacity(16 * 1024));
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    if let Err(e) = encoder.encode_image(&rgb) {
        tracing::warn!("relay JPEG encode failed: {e}");
        return None;
    }
    Some(RelayFrame::Jpeg {
        bytes: bytes.into_inner(),
        quality,
        width: image.width(),
        height: image.height(),
    })
}

/// Fit `image` into `width`×`height` according to `aspect`.
///
/// Returns the input untouched when it already has the target size.
pub fn scale_to_target(
    image: &Arc<RgbaImage>,
    width: u32,
    height: u32,
    aspect: AspectMode,
) -> Arc<RgbaImage> {
    let (src_w, src_h) = image.dimensions();
    let (width, height) = (width.max(1), height.max(1));
    if (src_w, src_h) == (width, height) || src_w == 0 || src_h == 0 {
        return Arc::clone(image);
    }

    let sx = width as f32 / src_w as f32;
    let sy = height as f32 / src_h as f32;
    let scaled = match aspect {
        AspectMode::Stretch => imageops::resize(image.as_ref(), width, height, FilterType::Triangle),
        AspectMode::Fit => {
            let s = sx.min(sy);
            let w = ((src_w as f32 * s).round() as u32).clamp(1, width);
            let h = ((src_h as f32 * s).round() as u32).clamp(1, height);
            let resized = imageops::resize(image.as_ref(), w, h, FilterType::Triangle);
            let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
            imageops::overlay(
                &mut canvas,
                &resized,
                i64::from((width - w) / 2),
                i64::from((height - h) / 2),
            );
            canvas
        }
        AspectMode::Fill => {
            let s = sx.max(sy);
            let w = ((src_w as f32 * s).round() as u32).max(width);
            let h = ((src_h as f32 * s).round() as u32).max(height);
            let resized = imageops::resize(image.as_ref(), w, h, FilterType::Triangle);
            imageops::crop_imm(&resized, (w - width) / 2, (h - height) / 2, width, height).to_image()
        }
    };
    Arc::new(scaled)
}
