//! 3D covariance construction and screen-space projection.

use glam::{Mat3, Mat4, Quat, Vec2, Vec3};

use crate::camera::FrameUniforms;
use crate::constants::COVARIANCE_DILATION;
use crate::types::Cov3d;

impl Cov3d {
    /// `Σ = R S Sᵀ Rᵀ` for a splat, with `modifier` scaling all axes.
    pub fn from_scale_rotation(scale: Vec3, rotation: Quat, modifier: f32) -> Self {
        let r = Mat3::from_quat(rotation.normalize());
        let s = scale * modifier;
        let m = Mat3::from_cols(r.col(0) * s.x, r.col(1) * s.y, r.col(2) * s.z);
        let sigma = m * m.transpose();
        Self([
            sigma.x_axis.x,
            sigma.y_axis.x,
            sigma.z_axis.x,
            sigma.y_axis.y,
            sigma.z_axis.y,
            sigma.z_axis.z,
        ])
    }

    /// Expand to a full symmetric matrix.
    pub fn to_mat3(self) -> Mat3 {
        let [xx, xy, xz, yy, yz, zz] = self.0;
        Mat3::from_cols(
            Vec3::new(xx, xy, xz),
            Vec3::new(xy, yy, yz),
            Vec3::new(xz, yz, zz),
        )
    }
}

/// Symmetric 2x2 screen-space covariance `[[a, b], [b, c]]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cov2d {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

impl Cov2d {
    #[inline]
    pub fn determinant(&self) -> f32 {
        self.a * self.c - self.b * self.b
    }

    /// Inverse covariance `(a, b, c)`, or `None` when degenerate.
    pub fn conic(&self) -> Option<Vec3> {
        let det = self.determinant();
        if det <= 0.0 || !det.is_finite() {
            return None;
        }
        let inv = 1.0 / det;
        Some(Vec3::new(self.c * inv, -self.b * inv, self.a * inv))
    }

    /// Pixel radius covering three standard deviations of the major axis.
    pub fn radius(&self) -> f32 {
        let det = self.determinant();
        let mid = 0.5 * (self.a + self.c);
        let lambda = mid + (mid * mid - det).max(0.1).sqrt();
        (3.0 * lambda.sqrt()).ceil()
    }
}

/// Project a 3D covariance around `view_pos` (flipped view space, `+Z` forward)
/// to pixel space using the local affine approximation of the perspective map.
pub fn project(cov: Cov3d, view_pos: Vec3, uniforms: &FrameUniforms) -> Cov2d {
    let focal = uniforms.focal();
    let limit = Vec2::new(uniforms.tan_fovx, uniforms.tan_fovy) * 1.3;
    let z = view_pos.z;
    let tx = (view_pos.x / z).clamp(-limit.x, limit.x) * z;
    let ty = (view_pos.y / z).clamp(-limit.y, limit.y) * z;

    let w = Mat3::from_mat4(uniforms.view());
    let row0 = w.row(0) * (focal.x / z) + w.row(2) * (-focal.x * tx / (z * z));
    let row1 = w.row(1) * (focal.y / z) + w.row(2) * (-focal.y * ty / (z * z));

    let sigma = cov.to_mat3();
    let s0 = sigma * row0;
    let s1 = sigma * row1;

    Cov2d {
        a: row0.dot(s0) + COVARIANCE_DILATION,
        b: row0.dot(s1),
        c: row1.dot(s1) + COVARIANCE_DILATION,
    }
}

/// Map a clip-space point to pixel coordinates.
pub fn ndc_to_pixel(ndc: Vec2, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        ((ndc.x + 1.0) * width as f32 - 1.0) * 0.5,
        ((ndc.y + 1.0) * height as f32 - 1.0) * 0.5,
    )
}

/// Project a world position to pixels through the stored projection.
pub fn project_point(position: Vec3, proj: &Mat4, width: u32, height: u32) -> Vec2 {
    let clip = *proj * position.extend(1.0);
    let inv_w = 1.0 / (clip.w + 1e-7);
    ndc_to_pixel(Vec2::new(clip.x, clip.y) * inv_w, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use approx::assert_relative_eq;

    #[test]
    fn isotropic_covariance_ignores_rotation() {
        let a = Cov3d::from_scale_rotation(Vec3::splat(2.0), Quat::IDENTITY, 1.0);
        let b = Cov3d::from_scale_rotation(Vec3::splat(2.0), Quat::from_rotation_y(1.1), 1.0);
        for (x, y) in a.0.iter().zip(b.0.iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-5);
        }
        assert_relative_eq!(a.0[0], 4.0);
        assert_relative_eq!(a.0[1], 0.0);
    }

    #[test]
    fn modifier_scales_variance_quadratically() {
        let a = Cov3d::from_scale_rotation(Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY, 2.0);
        assert_relative_eq!(a.0[0], 4.0);
        assert_relative_eq!(a.0[3], 16.0);
        assert_relative_eq!(a.0[5], 36.0);
    }

    #[test]
    fn conic_inverts_covariance() {
        let cov = Cov2d {
            a: 4.0,
            b: 1.0,
            c: 3.0,
        };
        let conic = cov.conic().unwrap();
        // [[4,1],[1,3]] * [[c0,c1],[c1,c2]] = I
        assert_relative_eq!(4.0 * conic.x + conic.y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(4.0 * conic.y + conic.z, 0.0, epsilon = 1e-6);
        assert_relative_eq!(conic.y + 3.0 * conic.z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn degenerate_covariance_has_no_conic() {
        let cov = Cov2d {
            a: 1.0,
            b: 1.0,
            c: 1.0,
        };
        assert!(cov.conic().is_none());
    }

    #[test]
    fn centered_point_projects_to_screen_center() {
        let camera = Camera::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        let uniforms = FrameUniforms::from_camera(&camera, 800, 600);
        let pixel = project_point(Vec3::ZERO, &uniforms.proj(), 800, 600);
        assert_relative_eq!(pixel.x, 399.5, epsilon = 1e-3);
        assert_relative_eq!(pixel.y, 299.5, epsilon = 1e-3);
    }

    #[test]
    fn projected_sigma_matches_focal_over_depth() {
        let camera = Camera::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        let uniforms = FrameUniforms::from_camera(&camera, 800, 600);
        let cov = Cov3d::from_scale_rotation(Vec3::splat(0.1), Quat::IDENTITY, 1.0);
        let view_pos = uniforms.view().transform_point3(Vec3::ZERO);
        let cov2d = project(cov, view_pos, &uniforms);
        let sigma = uniforms.focal().x * 0.1 / 5.0;
        assert_relative_eq!(cov2d.a, sigma * sigma + COVARIANCE_DILATION, epsilon = 1e-2);
        assert_relative_eq!(cov2d.b, 0.0, epsilon = 1e-4);
    }
}
