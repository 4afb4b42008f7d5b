//! Transport records: photons in flight and the hits they leave behind.

use flux_math::{Ray, Vec3};

/// Color type alias (linear RGB radiance)
pub type Color = Vec3;

/// Index into a scene's material table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MaterialId(pub usize);

/// A particle of light travelling through the scene.
///
/// Photons only ever live inside a queue slot: emitters write them,
/// workers read them and bounce logic may write a successor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Photon {
    pub ray: Ray,
    /// Radiance carried by this photon
    pub color: Color,
    /// Number of surface interactions so far (0 = fresh from a light)
    pub bounces: u32,
}

impl Photon {
    pub fn new(ray: Ray, color: Color) -> Self {
        Self {
            ray,
            color,
            bounces: 0,
        }
    }
}

/// Geometric result of a ray-primitive intersection.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Hit {
    /// Point of intersection
    pub position: Vec3,
    /// Surface normal (unit length, on the side the ray came from)
    pub normal: Vec3,
    /// Ray parameter t at the intersection
    pub distance: f32,
    pub material: MaterialId,
}

/// The pairing of a photon with the surface it struck.
///
/// Created once by a worker and never modified afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhotonHit {
    pub photon: Photon,
    pub hit: Hit,
}

impl PhotonHit {
    pub fn new(photon: Photon, hit: Hit) -> Self {
        Self { photon, hit }
    }

    /// Where the photon landed.
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.hit.position
    }

    /// Radiance deposited at the hit.
    #[inline]
    pub fn color(&self) -> Color {
        self.photon.color
    }
}
