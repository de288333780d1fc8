use serde::Deserialize;
use tracing::warn;

use crate::cache::{CacheBackendKind, MemoryCacheConfig};

pub const DISK_CACHE_ENV_VAR: &str = "PHOTO_STUDIO_DISK_CACHE";
pub const BACKGROUND_LOAD_ENV_VAR: &str = "PHOTO_STUDIO_BACKGROUND_LOAD";
pub const BACKGROUND_INSTANCE_ENV_VAR: &str = "PHOTO_STUDIO_BACKGROUND_INSTANCE";

const DEFAULT_SIMULATION_TIME_STEP: f32 = 1.0 / 30.0;
const DEFAULT_CAMERA_FOV_DEGREES: f32 = 70.0;
const DEFAULT_STABILIZATION_WARN_INTERVAL: u32 = 300;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// Load scene assets on a worker thread.
    pub use_background_scene_load: bool,
    /// Instantiate loaded scenes on a worker thread.
    pub use_background_scene_instance: bool,
    /// Fixed step handed to simulations while staging, in seconds.
    pub simulation_time_step: f32,
    pub camera_fov_degrees: f32,
    pub cache_backend: CacheBackendKind,
    pub memory_cache: MemoryCacheConfig,
    /// `None` waits for a simulation to settle for as long as it takes.
    pub stabilization_tick_limit: Option<u32>,
    /// Ticks between repeated warnings while a simulation has not settled.
    pub stabilization_warn_interval: u32,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            use_background_scene_load: false,
            use_background_scene_instance: false,
            simulation_time_step: DEFAULT_SIMULATION_TIME_STEP,
            camera_fov_degrees: DEFAULT_CAMERA_FOV_DEGREES,
            cache_backend: CacheBackendKind::Memory,
            memory_cache: MemoryCacheConfig::default(),
            stabilization_tick_limit: None,
            stabilization_warn_interval: DEFAULT_STABILIZATION_WARN_INTERVAL,
        }
    }
}

impl StudioConfig {
    /// Replaces out-of-range values with their defaults.
    pub fn normalized(mut self) -> Self {
        self.simulation_time_step =
            normalize_positive(self.simulation_time_step, DEFAULT_SIMULATION_TIME_STEP);
        self.camera_fov_degrees = if self.camera_fov_degrees.is_finite()
            && self.camera_fov_degrees > 0.0
            && self.camera_fov_degrees < 180.0
        {
            self.camera_fov_degrees
        } else {
            DEFAULT_CAMERA_FOV_DEGREES
        };
        self.stabilization_tick_limit = self.stabilization_tick_limit.filter(|limit| *limit > 0);
        if self.stabilization_warn_interval == 0 {
            self.stabilization_warn_interval = DEFAULT_STABILIZATION_WARN_INTERVAL;
        }
        self
    }

    pub fn with_env_overrides(self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Applies flag overrides read through `lookup`. Unparseable values are
    /// logged and leave the configured value in place.
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(disk) = read_flag(&lookup, DISK_CACHE_ENV_VAR) {
            self.cache_backend = if disk {
                CacheBackendKind::Disk
            } else {
                CacheBackendKind::Memory
            };
        }
        if let Some(enabled) = read_flag(&lookup, BACKGROUND_LOAD_ENV_VAR) {
            self.use_background_scene_load = enabled;
        }
        if let Some(enabled) = read_flag(&lookup, BACKGROUND_INSTANCE_ENV_VAR) {
            self.use_background_scene_instance = enabled;
        }
        self
    }
}

fn normalize_positive(value: f32, fallback: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

fn read_flag(lookup: &impl Fn(&str) -> Option<String>, env_var: &str) -> Option<bool> {
    let raw = lookup(env_var)?;
    let parsed = parse_flag(&raw);
    if parsed.is_none() {
        warn!(
            env_var,
            value = raw.as_str(),
            "invalid flag env var value; falling back to config"
        );
    }
    parsed
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
