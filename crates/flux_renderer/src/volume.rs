//! World-space geometry and emitters extracted from a scene graph.

use flux_core::{Hit, Material, MaterialId, Mesh, ObjectKind, Scene};
use flux_math::{Aabb, Mat4, Ray};
use log::{debug, info};

use crate::light::Emitter;
use crate::primitive::cast_range;
use crate::triangle::Triangle;
use crate::tree::SpatialTree;

/// A mesh object flattened to world-space triangles under its own tree.
pub struct Volume {
    name: String,
    tree: SpatialTree<Triangle>,
}

impl Volume {
    pub fn from_mesh(
        name: impl Into<String>,
        mesh: &Mesh,
        world: &Mat4,
        material: MaterialId,
        page_size: usize,
    ) -> Self {
        let triangles = mesh
            .world_triangles(world)
            .map(|[a, b, c]| Triangle::new(a, b, c, material))
            .collect();

        Self {
            name: name.into(),
            tree: SpatialTree::build(triangles, page_size),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn triangle_count(&self) -> usize {
        self.tree.len()
    }

    pub fn bounds(&self) -> Aabb {
        self.tree.bounds()
    }

    /// Closest hit of `ray` on this volume.
    pub fn cast_ray(&self, ray: &Ray) -> Option<Hit> {
        if !self.tree.bounds().hit(ray, cast_range()) {
            return None;
        }
        self.tree.cast_ray(ray)
    }
}

/// Everything the workers need from the scene, in world space.
pub struct RenderScene {
    volumes: Vec<Volume>,
    emitters: Vec<Emitter>,
    materials: Vec<Material>,
}

impl RenderScene {
    /// Flatten `scene`: one volume per mesh object and one emitter per light.
    pub fn from_scene(scene: &Scene, page_size: usize) -> Self {
        let mut volumes = Vec::new();
        let mut emitters = Vec::new();

        for (id, object) in scene.objects() {
            match &object.kind {
                ObjectKind::Group => {}
                ObjectKind::Mesh { mesh, material } => {
                    let world = scene.world_matrix(id);
                    let volume =
                        Volume::from_mesh(&object.name, mesh, &world, *material, page_size);
                    debug!(
                        "Volume {} with {} triangles",
                        volume.name(),
                        volume.triangle_count()
                    );
                    volumes.push(volume);
                }
                ObjectKind::Light(light) => {
                    emitters.push(Emitter::from_light(light, &scene.world_matrix(id)));
                }
            }
        }

        info!(
            "Scene {}: {} volumes, {} emitters, {} materials",
            scene.name,
            volumes.len(),
            emitters.len(),
            scene.materials().len()
        );

        Self {
            volumes,
            emitters,
            materials: scene.materials().to_vec(),
        }
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    pub fn emitters(&self) -> &[Emitter] {
        &self.emitters
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    /// Sum of all emitter powers.
    pub fn total_power(&self) -> f32 {
        self.emitters.iter().map(Emitter::power).sum()
    }

    /// Closest hit of `ray` across every volume.
    pub fn cast_ray(&self, ray: &Ray) -> Option<Hit> {
        self.volumes
            .iter()
            .filter_map(|volume| volume.cast_ray(ray))
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}
