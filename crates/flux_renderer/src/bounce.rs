//! Surface interaction for photons that keep travelling after a hit.

use std::f32::consts::TAU;

use flux_core::{Hit, Material, Photon};
use flux_math::{Ray, Vec3};
use rand::Rng;

/// Reflect a vector about a normal.
#[inline]
pub(crate) fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    v - 2.0 * v.dot(n) * n
}

/// Generate a random unit vector on the unit sphere.
pub(crate) fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    let z = 1.0 - 2.0 * rng.gen::<f32>();
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = TAU * rng.gen::<f32>();
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

/// Two unit vectors perpendicular to `n` and to each other.
pub(crate) fn orthonormal_basis(n: Vec3) -> (Vec3, Vec3) {
    let helper = if n.x.abs() > 0.9 { Vec3::Y } else { Vec3::X };
    let tangent = n.cross(helper).normalize();
    (tangent, n.cross(tangent))
}

/// Continue `photon` after it struck `hit`, or absorb it.
///
/// Survival is decided by Russian roulette on the brightest albedo
/// channel, and survivors are reweighted so the expected carried color
/// equals `color * albedo`. A surviving photon reflects as a mirror with
/// probability `specular`, otherwise diffusely with a cosine-weighted
/// direction. Photons that already bounced `max_bounces` times are absorbed.
pub fn bounce<R: Rng + ?Sized>(
    photon: &Photon,
    hit: &Hit,
    material: &Material,
    max_bounces: u32,
    rng: &mut R,
) -> Option<Photon> {
    if photon.bounces >= max_bounces {
        return None;
    }

    let survival = material.albedo.max_element().clamp(0.0, 1.0);
    if survival <= 0.0 || rng.gen::<f32>() >= survival {
        return None;
    }

    let direction = if rng.gen::<f32>() < material.specular {
        reflect(photon.ray.direction.normalize(), hit.normal)
    } else {
        let scatter = hit.normal + random_unit_vector(rng);
        // Catch degenerate scatter direction
        if scatter.length_squared() < 1e-8 {
            hit.normal
        } else {
            scatter.normalize()
        }
    };

    Some(Photon {
        ray: Ray::offset_from(hit.position, hit.normal, direction),
        color: photon.color * material.albedo / survival,
        bounces: photon.bounces + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_core::Color;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn incoming() -> (Photon, Hit) {
        let photon = Photon::new(
            Ray::new(Vec3::new(-1.0, 1.0, 0.0), Vec3::new(1.0, -1.0, 0.0).normalize()),
            Color::ONE,
        );
        let hit = Hit {
            position: Vec3::ZERO,
            normal: Vec3::Y,
            distance: 2f32.sqrt(),
            ..Default::default()
        };
        (photon, hit)
    }

    #[test]
    fn test_black_material_absorbs() {
        let (photon, hit) = incoming();
        let material = Material::new("black", Color::ZERO);
        let mut rng = StdRng::seed_from_u64(1);

        assert!((0..100).all(|_| bounce(&photon, &hit, &material, 4, &mut rng).is_none()));
    }

    #[test]
    fn test_bounce_limit() {
        let (mut photon, hit) = incoming();
        let material = Material::new("white", Color::ONE);
        let mut rng = StdRng::seed_from_u64(2);

        photon.bounces = 3;
        let next = bounce(&photon, &hit, &material, 4, &mut rng).unwrap();
        assert_eq!(next.bounces, 4);
        assert!(bounce(&next, &hit, &material, 4, &mut rng).is_none());
        assert!(bounce(&photon, &hit, &material, 0, &mut rng).is_none());
    }

    #[test]
    fn test_mirror_reflects() {
        let (photon, hit) = incoming();
        let material = Material::new("mirror", Color::ONE).with_specular(1.0);
        let mut rng = StdRng::seed_from_u64(3);

        let next = bounce(&photon, &hit, &material, 4, &mut rng).unwrap();
        let expected = Vec3::new(1.0, 1.0, 0.0).normalize();
        assert!((next.ray.direction - expected).length() < 1e-5);
        assert!(next.ray.origin.y > 0.0);
        assert_eq!(next.color, Color::ONE);
    }

    #[test]
    fn test_diffuse_stays_above_surface_and_is_reweighted() {
        let (photon, hit) = incoming();
        let material = Material::new("grey", Color::new(0.5, 0.25, 0.5));
        let mut rng = StdRng::seed_from_u64(4);

        let survivors: Vec<_> = (0..1000)
            .filter_map(|_| bounce(&photon, &hit, &material, 4, &mut rng))
            .collect();

        // Survival probability is 0.5
        assert!((400..600).contains(&survivors.len()));
        for next in &survivors {
            assert!(next.ray.direction.dot(hit.normal) >= 0.0);
            assert!((next.color - Color::new(1.0, 0.5, 1.0)).length() < 1e-5);
        }
    }

    #[test]
    fn test_orthonormal_basis() {
        for n in [Vec3::X, Vec3::Y, Vec3::new(1.0, 2.0, 3.0).normalize()] {
            let (t, b) = orthonormal_basis(n);
            assert!(t.dot(n).abs() < 1e-5);
            assert!(b.dot(n).abs() < 1e-5);
            assert!(t.dot(b).abs() < 1e-5);
            assert!((b.length() - 1.0).abs() < 1e-5);
        }
    }
}
