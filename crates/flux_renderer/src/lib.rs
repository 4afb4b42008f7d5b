//! Flux Renderer - concurrent photon mapping.
//!
//! Photons are emitted from the scene lights into a shared ring buffer,
//! traced by a pool of worker threads against the scene volumes, and the
//! resulting hits are collected into a spatial index. Each worker then
//! gathers the hits seen by its range of pixel sensors and writes the
//! result into a shared image.
//!
//! # Example
//!
//! ```ignore
//! use flux_core::{PipelineConfig, Scene};
//! use flux_renderer::PhotonPipeline;
//!
//! let scene: Scene = build_scene();
//! let pipeline = PhotonPipeline::new(PipelineConfig::default(), &scene)?;
//! let (image, stats) = pipeline.run()?;
//! image.save_png("out.png")?;
//! ```

mod bounce;
mod framebuffer;
mod gather;
mod incremental;
mod light;
mod pipeline;
mod primitive;
mod queue;
mod sensor;
mod tree;
mod triangle;
mod volume;
mod worker;

pub use bounce::bounce;
pub use framebuffer::{color_to_rgba, ImageBuffer, ImageError, Rgba8};
pub use gather::{build_hit_index, gather_radiance, HitCollector, HitIndex};
pub use incremental::{IncrementalTree, DEFAULT_MAX_DEPTH, DEFAULT_SPLIT_THRESHOLD};
pub use light::Emitter;
pub use pipeline::{PhotonPipeline, PipelineError, RenderStats};
pub use primitive::{cast_range, Bounded, Intersect, RAY_EPSILON};
pub use queue::{Batch, Claim, WorkQueue};
pub use sensor::{PixelSensor, SensorGrid};
pub use tree::{SpatialTree, DEFAULT_PAGE_SIZE};
pub use triangle::Triangle;
pub use volume::{RenderScene, Volume};
pub use worker::{Worker, WorkerError, WorkerSettings, WorkerState};

/// Re-export common math types from flux_math
pub use flux_math::{Aabb, Frustum, Interval, Ray, Vec3};
