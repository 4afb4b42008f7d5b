//! Photon emitters built from scene lights.

use std::f32::consts::TAU;

use flux_core::{Color, Light, LightKind, Photon};
use flux_math::{Mat4, Ray, Vec3};
use rand::Rng;

use crate::bounce::{orthonormal_basis, random_unit_vector};
use crate::queue::Claim;

/// Emission pattern in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Pattern {
    Sphere,
    /// Cone around `axis`; `cos_half_angle` bounds the sampled directions
    Cone { axis: Vec3, cos_half_angle: f32 },
}

/// A light placed in world space, ready to emit photons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emitter {
    position: Vec3,
    pattern: Pattern,
    color: Color,
    power: f32,
}

impl Emitter {
    /// Place `light` with its object's world matrix.
    ///
    /// A spot light's `cone_angle` is the half-angle of its cone in degrees.
    pub fn from_light(light: &Light, world: &Mat4) -> Self {
        let pattern = match light.kind {
            LightKind::Point => Pattern::Sphere,
            LightKind::Spot {
                direction,
                cone_angle,
            } => Pattern::Cone {
                axis: world.transform_vector3(direction).normalize_or_zero(),
                cos_half_angle: cone_angle.clamp(0.0, 180.0).to_radians().cos(),
            },
        };

        Self {
            position: world.transform_point3(Vec3::ZERO),
            pattern,
            color: light.color,
            power: light.power,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn power(&self) -> f32 {
        self.power
    }

    /// Fill every slot of `claim` with a fresh photon.
    ///
    /// The light's power is divided evenly over `budget` photons, which is
    /// the total this emitter will produce across all of its claims.
    pub fn emit<R: Rng + ?Sized>(&self, claim: &mut Claim<'_, Photon>, budget: usize, rng: &mut R) {
        let color = self.color * (self.power / budget.max(1) as f32);
        for slot in claim.iter_mut() {
            *slot = Photon::new(Ray::new(self.position, self.sample_direction(rng)), color);
        }
    }

    fn sample_direction<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        match self.pattern {
            Pattern::Sphere => random_unit_vector(rng),
            Pattern::Cone {
                axis,
                cos_half_angle,
            } => {
                if axis == Vec3::ZERO {
                    return random_unit_vector(rng);
                }
                // Uniform over the spherical cap
                let cos_theta = 1.0 - rng.gen::<f32>() * (1.0 - cos_half_angle);
                let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
                let phi = TAU * rng.gen::<f32>();

                let (tangent, bitangent) = orthonormal_basis(axis);
                (tangent * (sin_theta * phi.cos())
                    + bitangent * (sin_theta * phi.sin())
                    + axis * cos_theta)
                    .normalize()
            }
        }
    }
}
