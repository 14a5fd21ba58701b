//! Relay transport over a live output surface.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use image::{Rgba, RgbaImage};

use lumacast_core::{AspectMode, DistributorConfig, OutputSurface};
use lumacast_engine::{FaultBus, FrameDistributor, RelayClosed, RelayFrame, TransportCapabilities};

/// Presents a frame every 5 ms until dropped.
struct Presenter {
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Presenter {
    fn start(surface: Arc<OutputSurface>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let thread = std::thread::spawn(move || {
            let mut sequence = 0;
            while !flag.load(Ordering::Acquire) {
                sequence += 1;
                let image = RgbaImage::from_pixel(160, 90, Rgba([200, 100, 50, 255]));
                surface.present(Arc::new(image), sequence, false);
                std::thread::sleep(Duration::from_millis(5));
            }
        });
        Self {
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for Presenter {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn distributor(surface: &Arc<OutputSurface>, aspect: AspectMode) -> FrameDistributor {
    FrameDistributor::new(
        Arc::clone(surface),
        DistributorConfig {
            width: 64,
            height: 64,
            fps: 50,
            quality: 0.6,
            aspect,
        },
        TransportCapabilities::all(),
        FaultBus::new(),
    )
}

#[test]
fn test_relay_sends_jpeg_without_zero_copy_sink() {
    let surface = OutputSurface::new();
    let _presenter = Presenter::start(Arc::clone(&surface));
    let mut distributor = distributor(&surface, AspectMode::Fit);

    let rx = distributor.start_relay(false).unwrap();
    let frame = rx
        .recv_timeout(Duration::from_secs(2))
        .unwrap()
        .expect("no relayed frame");
    match &frame {
        RelayFrame::Jpeg { quality, width, height, bytes } => {
            assert_eq!(*quality, 60);
            assert_eq!((*width, *height), (64, 64));
            assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        }
        RelayFrame::Bitmap(_) => panic!("expected JPEG"),
    }
    assert!(frame.to_data_url().is_some());

    distributor.stop();
    while let Ok(Some(_)) = rx.recv_timeout(Duration::from_millis(100)) {}
    assert_eq!(rx.recv_timeout(Duration::from_millis(100)).unwrap_err(), RelayClosed);
}

#[test]
fn test_relay_transfers_scaled_bitmaps_to_zero_copy_sink() {
    let surface = OutputSurface::new();
    let _presenter = Presenter::start(Arc::clone(&surface));
    let mut distributor = distributor(&surface, AspectMode::Fill);

    let rx = distributor.start_relay(true).unwrap();
    let frame = rx.recv_timeout(Duration::from_secs(2)).unwrap().expect("no relayed frame");
    let RelayFrame::Bitmap(image) = frame else {
        panic!("expected bitmap");
    };
    assert_eq!(image.dimensions(), (64, 64));
    assert_eq!(image.get_pixel(0, 0).0[0], 200, "fill leaves no bars");
}

#[test]
fn test_restart_after_stop_uses_new_config() {
    let surface = OutputSurface::new();
    let _presenter = Presenter::start(Arc::clone(&surface));
    let mut distributor = distributor(&surface, AspectMode::Stretch);

    let rx = distributor.start_relay(true).unwrap();
    assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap().is_some());
    distributor.stop();

    distributor
        .reconfigure(DistributorConfig {
            width: 32,
            height: 18,
            fps: 50,
            quality: 0.5,
            aspect: AspectMode::Stretch,
        })
        .unwrap();
    let rx = distributor.start_relay(true).unwrap();
    let frame = rx.recv_timeout(Duration::from_secs(2)).unwrap().expect("no relayed frame");
    assert_eq!(frame.dimensions(), (32, 18));
}
