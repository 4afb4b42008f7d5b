//! Flux Core - data model for the photon-mapping pipeline.
//!
//! This crate provides:
//!
//! - **Transport records**: `Photon`, `Hit`, `PhotonHit`
//! - **Scene graph**: an arena `Scene` of objects addressed by `ObjectId`,
//!   with meshes, materials, lights and a camera
//! - **Configuration**: `PipelineConfig`, loadable from JSON
//!
//! # Example
//!
//! ```ignore
//! use flux_core::{PipelineConfig, Scene};
//!
//! let config = PipelineConfig::from_json_file("render.json")?;
//! let scene = Scene::new("empty");
//! println!("{} workers, {} objects", config.worker_count, scene.object_count());
//! ```

pub mod config;
pub mod mesh;
pub mod photon;
pub mod scene;

// Re-export commonly used types
pub use config::{ConfigError, HitIndexKind, PipelineConfig};
pub use mesh::Mesh;
pub use photon::{Color, Hit, MaterialId, Photon, PhotonHit};
pub use scene::{
    Camera, Light, LightKind, Material, ObjectId, ObjectKind, Scene, SceneError, SceneObject,
    Transform,
};
