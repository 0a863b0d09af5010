//! GPU-shared data layouts.
//!
//! Every struct here is `#[repr(C)]` and mirrors a std430 declaration in the
//! compute shaders, so field order and padding must not change independently.

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec2, Vec3, Vec4};

use crate::constants::{SH_COEFFS, SH_FLOATS};
use crate::error::{Error, Result};
use crate::sh::SH_C0;

/// One Gaussian splat as uploaded by the scene.
///
/// Scale and opacity are stored activated (linear scale, opacity in `[0, 1]`).
/// Rotation is a unit quaternion in `(x, y, z, w)` order. Spherical harmonic
/// coefficients are interleaved per coefficient: `sh[k * 3 + channel]`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Splat {
    /// World position, `w` is unused (1.0).
    pub position: [f32; 4],
    /// Scale in `xyz`, opacity in `w`.
    pub scale_opacity: [f32; 4],
    /// Rotation quaternion `(x, y, z, w)`.
    pub rotation: [f32; 4],
    /// Degree-3 spherical harmonic coefficients.
    pub sh: [f32; SH_FLOATS],
}

impl Splat {
    /// Create a view-independent splat with a flat base color.
    pub fn new(position: Vec3, scale: Vec3, rotation: Quat, opacity: f32, color: Vec3) -> Self {
        let mut sh = [0.0; SH_FLOATS];
        let dc = (color - Vec3::splat(0.5)) / SH_C0;
        sh[0] = dc.x;
        sh[1] = dc.y;
        sh[2] = dc.z;

        Self {
            position: [position.x, position.y, position.z, 1.0],
            scale_opacity: [scale.x, scale.y, scale.z, opacity],
            rotation: rotation.to_array(),
            sh,
        }
    }

    /// Replace the spherical harmonic coefficients.
    ///
    /// `coefficients` must hold exactly 48 floats in interleaved order.
    pub fn with_sh(mut self, coefficients: &[f32]) -> Result<Self> {
        if coefficients.len() != SH_FLOATS {
            return Err(Error::InvalidScene(format!(
                "expected {SH_FLOATS} SH coefficients ({SH_COEFFS} per channel), got {}",
                coefficients.len()
            )));
        }
        self.sh.copy_from_slice(coefficients);
        Ok(self)
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec4::from_array(self.position).truncate()
    }

    #[inline]
    pub fn scale(&self) -> Vec3 {
        Vec4::from_array(self.scale_opacity).truncate()
    }

    #[inline]
    pub fn opacity(&self) -> f32 {
        self.scale_opacity[3]
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        Quat::from_array(self.rotation)
    }
}

/// Upper triangle of a symmetric 3D covariance: `xx, xy, xz, yy, yz, zz`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Cov3d(pub [f32; 6]);

/// Per-splat, per-frame output of the preprocess stage.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VertexAttribute {
    /// Inverse 2D covariance `(a, b, c)` and opacity.
    pub conic_opacity: [f32; 4],
    /// Evaluated RGB color and pixel radius.
    pub color_radius: [f32; 4],
    /// Overlapped tile rectangle `(min_x, min_y, max_x, max_y)`, max exclusive.
    pub aabb: [u32; 4],
    /// Projected center in pixels.
    pub center: [f32; 2],
    /// View-space depth.
    pub depth: f32,
    pub _pad: u32,
}

impl VertexAttribute {
    #[inline]
    pub fn center(&self) -> Vec2 {
        Vec2::from_array(self.center)
    }

    #[inline]
    pub fn color(&self) -> Vec3 {
        Vec4::from_array(self.color_radius).truncate()
    }

    #[inline]
    pub fn opacity(&self) -> f32 {
        self.conic_opacity[3]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn layouts_match_shader_strides() {
        assert_eq!(std::mem::size_of::<Splat>(), 240);
        assert_eq!(std::mem::size_of::<Cov3d>(), 24);
        assert_eq!(std::mem::size_of::<VertexAttribute>(), 64);
    }

    #[test]
    fn flat_color_round_trips_through_dc_term() {
        let splat = Splat::new(
            Vec3::ZERO,
            Vec3::ONE,
            Quat::IDENTITY,
            0.5,
            Vec3::new(1.0, 0.25, 0.0),
        );
        let color = Vec3::new(splat.sh[0], splat.sh[1], splat.sh[2]) * SH_C0 + Vec3::splat(0.5);
        assert_relative_eq!(color.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(color.y, 0.25, epsilon = 1e-6);
        assert_relative_eq!(color.z, 0.0, epsilon = 1e-6);
        assert!(splat.sh[3..].iter().all(|&c| c == 0.0));
    }

    #[test]
    fn with_sh_rejects_wrong_length() {
        let splat = Splat::new(Vec3::ZERO, Vec3::ONE, Quat::IDENTITY, 1.0, Vec3::ONE);
        assert!(splat.with_sh(&[0.0; 45]).is_err());
        assert!(splat.with_sh(&[0.0; 48]).is_ok());
    }
}
