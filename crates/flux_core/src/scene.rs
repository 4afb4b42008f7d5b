//! Scene graph types for Flux.
//!
//! Objects live in an arena and refer to each other by `ObjectId`. Parent
//! and child links are plain indices, so the graph owns every object
//! exactly once and cannot form ownership cycles.

use std::sync::Arc;

use flux_math::{Mat4, Quat, Vec3};
use thiserror::Error;

use crate::mesh::Mesh;
use crate::photon::{Color, MaterialId};

/// Errors raised while assembling a scene.
#[derive(Error, Debug, PartialEq)]
pub enum SceneError {
    #[error("Unknown parent object: {0:?}")]
    UnknownParent(ObjectId),

    #[error("Unknown material: {0:?}")]
    UnknownMaterial(MaterialId),
}

pub type SceneResult<T> = Result<T, SceneError>;

/// Stable index of an object in a `Scene`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub usize);

/// Surface response used by the photon bounce step.
#[derive(Clone, Debug)]
pub struct Material {
    /// Material name
    pub name: String,

    /// Diffuse reflectance per channel (0-1)
    pub albedo: Color,

    /// Fraction of reflected photons that bounce as a mirror instead of
    /// diffusely (0 = fully diffuse)
    pub specular: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            albedo: Color::splat(0.5),
            specular: 0.0,
        }
    }
}

impl Material {
    /// Create a new diffuse material.
    pub fn new(name: impl Into<String>, albedo: Color) -> Self {
        Self {
            name: name.into(),
            albedo,
            ..Default::default()
        }
    }

    /// Set the mirror fraction.
    pub fn with_specular(mut self, specular: f32) -> Self {
        self.specular = specular.clamp(0.0, 1.0);
        self
    }
}

/// Emission shape of a light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    /// Emits uniformly in every direction
    Point,
    /// Emits inside a cone around `direction` (object space)
    Spot { direction: Vec3, cone_angle: f32 },
}

/// A photon source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Color,
    /// Total emitted power, split across the photons the light emits
    pub power: f32,
}

impl Light {
    pub fn point(color: Color, power: f32) -> Self {
        Self {
            kind: LightKind::Point,
            color,
            power,
        }
    }

    pub fn spot(color: Color, power: f32, direction: Vec3, cone_angle: f32) -> Self {
        Self {
            kind: LightKind::Spot {
                direction,
                cone_angle,
            },
            color,
            power,
        }
    }
}

/// Pinhole camera the pixel sensors are generated from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub look_from: Vec3,
    pub look_at: Vec3,
    pub vup: Vec3,
    /// Vertical field of view in degrees
    pub vfov: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            look_from: Vec3::ZERO,
            look_at: Vec3::new(0.0, 0.0, -1.0),
            vup: Vec3::Y,
            vfov: 90.0,
        }
    }
}

impl Camera {
    pub fn new(look_from: Vec3, look_at: Vec3, vup: Vec3, vfov: f32) -> Self {
        Self {
            look_from,
            look_at,
            vup,
            vfov,
        }
    }
}

/// Transform components that can be composed into a matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Create a new transform with only translation.
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Set a uniform or per-axis scale.
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Set the rotation.
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Convert to a 4x4 transformation matrix.
    ///
    /// Order: Scale -> Rotate -> Translate (SRT)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// What an object contributes to rendering.
///
/// Only `Mesh` objects are intersectable; only `Light` objects emit.
#[derive(Clone, Debug)]
pub enum ObjectKind {
    /// Pure transform node for grouping children
    Group,
    Mesh {
        mesh: Arc<Mesh>,
        material: MaterialId,
    },
    Light(Light),
}

/// A node of the scene graph.
#[derive(Clone, Debug)]
pub struct SceneObject {
    pub name: String,
    pub kind: ObjectKind,
    /// Transform relative to the parent (or world, for roots)
    pub transform: Transform,
    pub parent: Option<ObjectId>,
    pub children: Vec<ObjectId>,
}

/// A complete scene: object arena, material table and camera.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    /// Scene name
    pub name: String,

    objects: Vec<SceneObject>,

    materials: Vec<Material>,

    /// Viewpoint for image reconstruction
    pub camera: Option<Camera>,
}

impl Scene {
    /// Create an empty scene.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a material to the scene and return its ID.
    pub fn add_material(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.materials.len());
        self.materials.push(material);
        id
    }

    /// Get a material by ID.
    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    /// All materials, indexed by `MaterialId`.
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    /// Insert an object, optionally under `parent`.
    ///
    /// Mesh objects must reference a material already in the table.
    pub fn add_object(
        &mut self,
        name: impl Into<String>,
        kind: ObjectKind,
        transform: Transform,
        parent: Option<ObjectId>,
    ) -> SceneResult<ObjectId> {
        if let Some(p) = parent {
            if p.0 >= self.objects.len() {
                return Err(SceneError::UnknownParent(p));
            }
        }
        if let ObjectKind::Mesh { material, .. } = &kind {
            if self.material(*material).is_none() {
                return Err(SceneError::UnknownMaterial(*material));
            }
        }

        let id = ObjectId(self.objects.len());
        let name = name.into();
        log::debug!("Adding object {} as {:?} (parent {:?})", name, id, parent);

        self.objects.push(SceneObject {
            name,
            kind,
            transform,
            parent,
            children: Vec::new(),
        });
        if let Some(p) = parent {
            self.objects[p.0].children.push(id);
        }
        Ok(id)
    }

    /// Get an object by ID.
    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(id.0)
    }

    /// Iterate all objects with their IDs.
    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &SceneObject)> {
        self.objects.iter().enumerate().map(|(i, o)| (ObjectId(i), o))
    }

    /// Get object count.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Compose transforms from the root down to `id`.
    ///
    /// Unknown IDs yield the identity.
    pub fn world_matrix(&self, id: ObjectId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = Some(id);
        while let Some(object) = current.and_then(|c| self.objects.get(c.0)) {
            matrix = object.transform.to_matrix() * matrix;
            current = object.parent;
        }
        matrix
    }

    /// Get total triangle count across all mesh objects.
    pub fn total_triangle_count(&self) -> usize {
        self.objects
            .iter()
            .map(|o| match &o.kind {
                ObjectKind::Mesh { mesh, .. } => mesh.triangle_count(),
                _ => 0,
            })
            .sum()
    }

    /// Number of light objects.
    pub fn light_count(&self) -> usize {
        self.objects
            .iter()
            .filter(|o| matches!(o.kind, ObjectKind::Light(_)))
            .count()
    }
}
