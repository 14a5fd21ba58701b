//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::health::HealthConfig;
use crate::lut::cache::DEFAULT_CAPACITY;
use crate::lut::store::DEFAULT_LOAD_ATTEMPTS;
use crate::mask::MaskConfig;

/// Default display refresh rate driving the render loop.
const DEFAULT_REFRESH_HZ: f32 = 60.0;
/// Masks older than this many video frames are not composited.
const DEFAULT_MASK_STALENESS: u64 = 5;

/// Which render backend to try first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    #[default]
    Gpu,
    Cpu,
}

/// How the distributor fits the output into its target size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectMode {
    /// Letterbox inside the target.
    #[default]
    Fit,
    /// Cover the target, cropping overflow.
    Fill,
    /// Scale each axis independently.
    Stretch,
}

/// Virtual-camera / broadcast output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributorConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// JPEG quality for the relay, clamped to `[0.1, 0.95]`.
    pub quality: f32,
    pub aspect: AspectMode,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            quality: 0.85,
            aspect: AspectMode::Fit,
        }
    }
}

impl DistributorConfig {
    pub fn clamped_quality(&self) -> f32 {
        self.quality.clamp(0.1, 0.95)
    }

    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

/// Runtime configuration for the whole engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub refresh_hz: f32,
    pub lut_cache_capacity: usize,
    pub lut_load_attempts: u32,
    pub mask_staleness_frames: u64,
    pub mask: MaskConfig,
    pub health: HealthConfig,
    pub distributor: DistributorConfig,
    pub backend: BackendPreference,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_hz: DEFAULT_REFRESH_HZ,
            lut_cache_capacity: DEFAULT_CAPACITY,
            lut_load_attempts: DEFAULT_LOAD_ATTEMPTS,
            mask_staleness_frames: DEFAULT_MASK_STALENESS,
            mask: MaskConfig::default(),
            health: HealthConfig::default(),
            distributor: DistributorConfig::default(),
            backend: BackendPreference::default(),
        }
    }
}

impl EngineConfig {
    /// Read a JSON file; missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Defaults with `LUMACAST_REFRESH_HZ` / `LUMACAST_BACKEND` applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (an environment-shaped getter).
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        const REFRESH: &str = "LUMACAST_REFRESH_HZ";
        const BACKEND: &str = "LUMACAST_BACKEND";

        if let Some(value) = lookup(REFRESH) {
            self.refresh_hz = value
                .parse::<f32>()
                .ok()
                .filter(|hz| *hz > 0.0)
                .ok_or(ConfigError::Env { key: REFRESH, value })?;
        }
        if let Some(value) = lookup(BACKEND) {
            self.backend = match value.to_ascii_lowercase().as_str() {
                "gpu" => BackendPreference::Gpu,
                "cpu" => BackendPreference::Cpu,
                _ => return Err(ConfigError::Env { key: BACKEND, value }),
            };
        }
        Ok(())
    }
}
