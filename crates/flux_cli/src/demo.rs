//! Built-in demo scene: a closed box with colored side walls, a point
//! light under the ceiling and two blocks on the floor.

use std::sync::Arc;

use anyhow::Result;
use flux_core::{Camera, Color, Light, Material, MaterialId, Mesh, ObjectKind, Scene, Transform};
use flux_math::{Quat, Vec3};

/// Half-extent of the box interior
const HALF: f32 = 1.0;
/// Wall thickness
const WALL: f32 = 0.05;

pub fn cornell_box(light_power: f32) -> Result<Scene> {
    let mut scene = Scene::new("cornell_box");

    let white = scene.add_material(Material::new("white", Color::splat(0.75)));
    let red = scene.add_material(Material::new("red", Color::new(0.75, 0.1, 0.1)));
    let green = scene.add_material(Material::new("green", Color::new(0.1, 0.75, 0.1)));
    let mirror =
        scene.add_material(Material::new("mirror", Color::splat(0.9)).with_specular(0.9));

    let room = scene.add_object("room", ObjectKind::Group, Transform::default(), None)?;

    let walls: [(&str, Vec3, Vec3, MaterialId); 5] = [
        (
            "floor",
            Vec3::new(-HALF, -HALF - WALL, -HALF),
            Vec3::new(HALF, -HALF, HALF),
            white,
        ),
        (
            "ceiling",
            Vec3::new(-HALF, HALF, -HALF),
            Vec3::new(HALF, HALF + WALL, HALF),
            white,
        ),
        (
            "back",
            Vec3::new(-HALF, -HALF, -HALF - WALL),
            Vec3::new(HALF, HALF, -HALF),
            white,
        ),
        (
            "left",
            Vec3::new(-HALF - WALL, -HALF, -HALF),
            Vec3::new(-HALF, HALF, HALF),
            red,
        ),
        (
            "right",
            Vec3::new(HALF, -HALF, -HALF),
            Vec3::new(HALF + WALL, HALF, HALF),
            green,
        ),
    ];
    for (name, min, max, material) in walls {
        scene.add_object(
            name,
            ObjectKind::Mesh {
                mesh: Arc::new(Mesh::cuboid(min, max)),
                material,
            },
            Transform::default(),
            Some(room),
        )?;
    }

    let block = Arc::new(Mesh::cuboid(Vec3::splat(-0.25), Vec3::splat(0.25)));
    scene.add_object(
        "tall_block",
        ObjectKind::Mesh {
            mesh: Arc::clone(&block),
            material: white,
        },
        Transform::from_translation(Vec3::new(-0.35, -0.5, -0.3))
            .with_scale(Vec3::new(1.0, 2.0, 1.0))
            .with_rotation(Quat::from_rotation_y(0.3)),
        Some(room),
    )?;
    scene.add_object(
        "mirror_block",
        ObjectKind::Mesh {
            mesh: block,
            material: mirror,
        },
        Transform::from_translation(Vec3::new(0.4, -0.75, 0.3))
            .with_rotation(Quat::from_rotation_y(-0.3)),
        Some(room),
    )?;

    scene.add_object(
        "light",
        ObjectKind::Light(Light::point(Color::new(1.0, 0.95, 0.85), light_power)),
        Transform::from_translation(Vec3::new(0.0, HALF - 0.1, 0.0)),
        Some(room),
    )?;

    scene.camera = Some(Camera::new(
        Vec3::new(0.0, 0.0, 3.6),
        Vec3::ZERO,
        Vec3::Y,
        40.0,
    ));

    Ok(scene)
}
