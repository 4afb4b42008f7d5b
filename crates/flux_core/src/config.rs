//! Pipeline configuration.
//!
//! Every field has a default, so a JSON file only needs to list the
//! settings it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which spatial index the gather phase queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitIndexKind {
    /// Median-split tree built once from all hits
    #[default]
    Balanced,
    /// Tree grown one hit at a time as hits are drained
    Incremental,
}

/// Render and scheduling settings for the photon pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of worker threads
    pub worker_count: usize,
    /// Total photons emitted across all lights
    pub photon_count: usize,
    /// Slots in the photon ring buffer
    pub photon_queue_capacity: usize,
    /// Slots in the hit ring buffer
    pub hit_queue_capacity: usize,
    /// Photons a worker fetches per transport cycle
    pub fetch_batch: usize,
    /// Photons the emitter writes per claim
    pub emission_batch: usize,
    /// Surface interactions before a photon is absorbed
    pub max_bounces: u32,
    /// Leaf page size of the balanced trees
    pub page_size: usize,
    /// Leaf size at which the incremental tree splits
    pub split_threshold: usize,
    /// Depth below which the incremental tree stops splitting
    pub max_incremental_depth: usize,
    pub hit_index: HitIndexKind,
    /// Sleep when a worker finds no work (milliseconds)
    pub idle_wait_ms: u64,
    /// Radiance scale applied before quantizing pixels
    pub exposure: f32,
    /// Widens each pixel's gather frustum (1.0 = exactly one pixel)
    pub gather_footprint: f32,
    /// Far distance of the gather frustum
    pub gather_distance: f32,
    pub image_width: u32,
    pub image_height: u32,
    /// Base seed for emission and bounce sampling
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            photon_count: 200_000,
            photon_queue_capacity: 65_536,
            hit_queue_capacity: 65_536,
            fetch_batch: 256,
            emission_batch: 4096,
            max_bounces: 4,
            page_size: 8,
            split_threshold: 8,
            max_incremental_depth: 48,
            hit_index: HitIndexKind::Balanced,
            idle_wait_ms: 1,
            exposure: 1.0,
            gather_footprint: 4.0,
            gather_distance: 1000.0,
            image_width: 160,
            image_height: 120,
            seed: 0x5eed,
        }
    }
}

impl PipelineConfig {
    /// Parse a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        log::info!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("worker_count", self.worker_count),
            ("photon_queue_capacity", self.photon_queue_capacity),
            ("hit_queue_capacity", self.hit_queue_capacity),
            ("fetch_batch", self.fetch_batch),
            ("emission_batch", self.emission_batch),
            ("page_size", self.page_size),
            ("image_width", self.image_width as usize),
            ("image_height", self.image_height as usize),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }
        if self.split_threshold < 2 {
            return Err(ConfigError::Invalid(
                "split_threshold must be at least 2".into(),
            ));
        }
        let positive_finite = |v: f32| v > 0.0 && v.is_finite();
        if !positive_finite(self.gather_footprint) || !positive_finite(self.gather_distance) {
            return Err(ConfigError::Invalid(
                "gather_footprint and gather_distance must be positive".into(),
            ));
        }
        Ok(())
    }
}
