//! Built-in scenes and per-scene precomputation.

use glam::{Quat, Vec3};
use rayon::prelude::*;

use crate::constants::SH_FLOATS;
use crate::types::{Cov3d, Splat};

/// 3D covariances for every splat, scaled by `modifier`.
pub fn covariances(splats: &[Splat], modifier: f32) -> Vec<Cov3d> {
    splats
        .par_iter()
        .map(|s| Cov3d::from_scale_rotation(s.scale(), s.rotation(), modifier))
        .collect()
}

/// Axis-aligned bounds of splat centers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl SceneBounds {
    pub fn of(splats: &[Splat]) -> Option<Self> {
        let first = splats.first()?.position();
        Some(splats.iter().fold(
            Self {
                min: first,
                max: first,
            },
            |b, s| Self {
                min: b.min.min(s.position()),
                max: b.max.max(s.position()),
            },
        ))
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn radius(&self) -> f32 {
        (self.max - self.min).length() * 0.5
    }
}

/// Small fixed scene: a ring of colored splats around the origin plus a
/// view-dependent one in the middle.
pub fn test_scene() -> Vec<Splat> {
    let mut splats: Vec<Splat> = (0..12)
        .map(|i| {
            let angle = i as f32 / 12.0 * std::f32::consts::TAU;
            let color = Vec3::new(angle.cos() * 0.5 + 0.5, angle.sin() * 0.5 + 0.5, 0.6);
            Splat::new(
                Vec3::new(angle.cos() * 1.5, angle.sin() * 1.5, 0.0),
                Vec3::new(0.25, 0.1, 0.1),
                Quat::from_rotation_z(angle),
                0.9,
                color,
            )
        })
        .collect();

    let mut sh = [0.0; SH_FLOATS];
    // DC gray with a red band along the first degree-1 basis
    sh[0] = 0.5;
    sh[1] = 0.5;
    sh[2] = 0.5;
    sh[3] = 1.0;
    let mut center = Splat::new(Vec3::ZERO, Vec3::splat(0.4), Quat::IDENTITY, 0.8, Vec3::ONE);
    center.sh = sh;
    splats.push(center);
    splats
}

/// Deterministic pseudo-random scene inside a cube of half-size `extent`.
pub fn random_scene(count: usize, seed: u64, extent: f32) -> Vec<Splat> {
    (0..count)
        .into_par_iter()
        .map(|i| {
            let mut rng = SplitMix64::new(seed ^ (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
            let position = Vec3::new(rng.signed(), rng.signed(), rng.signed()) * extent;
            let scale = Vec3::new(rng.unit(), rng.unit(), rng.unit()) * 0.05 + Vec3::splat(0.005);
            let axis = Vec3::new(rng.signed(), rng.signed(), rng.signed()).normalize_or(Vec3::Z);
            let rotation = Quat::from_axis_angle(axis, rng.unit() * std::f32::consts::TAU);
            let color = Vec3::new(rng.unit(), rng.unit(), rng.unit());
            Splat::new(position, scale, rotation, 0.2 + rng.unit() * 0.8, color)
        })
        .collect()
}

struct SplitMix64(u64);

impl SplitMix64 {
    const fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in `[0, 1)`.
    fn unit(&mut self) -> f32 {
        (self.next() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Uniform in `[-1, 1)`.
    fn signed(&mut self) -> f32 {
        self.unit() * 2.0 - 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_scene_is_reproducible() {
        let a = random_scene(64, 42, 2.0);
        let b = random_scene(64, 42, 2.0);
        let c = random_scene(64, 43, 2.0);
        assert_eq!(bytemuck::cast_slice::<_, u8>(&a), bytemuck::cast_slice::<_, u8>(&b));
        assert_ne!(bytemuck::cast_slice::<_, u8>(&a), bytemuck::cast_slice::<_, u8>(&c));
    }

    #[test]
    fn random_scene_stays_in_bounds() {
        let splats = random_scene(500, 1, 2.0);
        let bounds = SceneBounds::of(&splats).unwrap();
        assert!(bounds.min.cmpge(Vec3::splat(-2.0)).all());
        assert!(bounds.max.cmple(Vec3::splat(2.0)).all());
        assert!(splats.iter().all(|s| (0.2..=1.0).contains(&s.opacity())));
    }

    #[test]
    fn covariances_follow_splat_order() {
        let splats = test_scene();
        let covs = covariances(&splats, 1.0);
        assert_eq!(covs.len(), splats.len());
        let last = covs.last().unwrap();
        assert!((last.0[0] - 0.16).abs() < 1e-6);
    }

    #[test]
    fn empty_scene_has_no_bounds() {
        assert!(SceneBounds::of(&[]).is_none());
    }
}
