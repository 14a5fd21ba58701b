//! Synthetic camera: a drifting color field with a moving "face".

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use glam::{Vec2, Vec3};
use image::{Rgba, RgbaImage};

use lumacast_core::FrameSlot;
use lumacast_core::mask::{FaceLandmarks, regions};

pub struct SyntheticCamera {
    slot: Arc<FrameSlot>,
    should_stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SyntheticCamera {
    pub fn start(width: u32, height: u32, fps: u32) -> std::io::Result<Self> {
        let slot = Arc::new(FrameSlot::new());
        let should_stop = Arc::new(AtomicBool::new(false));
        let interval = Duration::from_secs_f64(1.0 / fps.max(1) as f64);

        let thread_slot = Arc::clone(&slot);
        let thread_stop = Arc::clone(&should_stop);
        let thread = thread::Builder::new()
            .name("synthetic-camera".to_string())
            .spawn(move || {
                let mut t = 0u32;
                while !thread_stop.load(Ordering::Acquire) {
                    thread_slot.push(frame(width, height, t));
                    t = t.wrapping_add(1);
                    thread::sleep(interval);
                }
            })?;
        tracing::info!("synthetic camera {width}x{height} @ {fps} fps");
        Ok(Self {
            slot,
            should_stop,
            thread: Some(thread),
        })
    }

    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    pub fn stop(&mut self) {
        self.should_stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

fn frame(width: u32, height: u32, t: u32) -> RgbaImage {
    let shift = (t * 2) % 256;
    RgbaImage::from_fn(width, height, |x, y| {
        let r = ((x * 255 / width.max(1) + shift) % 256) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        Rgba([r, g, 150, 255])
    })
}

/// A full landmark set whose face oval circles slowly around the frame.
pub fn orbiting_face(t: f32) -> FaceLandmarks {
    let center = Vec2::new(0.5 + 0.1 * t.cos(), 0.5 + 0.05 * t.sin());
    let radius = 0.2;
    let mut points = vec![Vec3::new(center.x, center.y, 0.0); regions::LANDMARK_COUNT];
    let mut ring = |indices: &[usize], c: Vec2, r: f32| {
        for (n, idx) in indices.iter().enumerate() {
            let a = n as f32 / indices.len() as f32 * std::f32::consts::TAU;
            points[*idx] = Vec3::new(c.x + r * a.cos(), c.y + r * a.sin(), 0.0);
        }
    };
    ring(regions::FACE_OVAL, center, radius);
    ring(regions::LEFT_EYE, center + Vec2::new(0.35, -0.3) * radius, 0.15 * radius);
    ring(regions::RIGHT_EYE, center + Vec2::new(-0.35, -0.3) * radius, 0.15 * radius);
    ring(regions::LIPS, center + Vec2::new(0.0, 0.55) * radius, 0.18 * radius);
    FaceLandmarks::new(points)
}
