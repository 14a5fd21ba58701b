//! Demo run settings.

/// Default run length in seconds.
const DEFAULT_SECONDS: u64 = 10;
/// Default synthetic camera size.
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 360;
/// Default synthetic camera rate.
const DEFAULT_CAMERA_FPS: u32 = 30;

/// How long to run and what the fake camera produces.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub seconds: u64,
    pub width: u32,
    pub height: u32,
    pub camera_fps: u32,
    /// Optional `.cube` file activated after start-up.
    pub lut: Option<String>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            seconds: env_or("LUMACAST_DEMO_SECONDS", DEFAULT_SECONDS),
            width: env_or("LUMACAST_DEMO_WIDTH", DEFAULT_WIDTH),
            height: env_or("LUMACAST_DEMO_HEIGHT", DEFAULT_HEIGHT),
            camera_fps: env_or("LUMACAST_DEMO_FPS", DEFAULT_CAMERA_FPS),
            lut: std::env::var("LUMACAST_DEMO_LUT").ok(),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
