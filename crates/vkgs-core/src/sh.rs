//! Spherical harmonic color evaluation (degree 3).

use glam::Vec3;

use crate::constants::SH_FLOATS;

pub const SH_C0: f32 = 0.282_094_8;
pub const SH_C1: f32 = 0.488_602_52;
pub const SH_C2: [f32; 5] = [
    1.092_548_5,
    -1.092_548_5,
    0.315_391_57,
    -1.092_548_5,
    0.546_274_24,
];
pub const SH_C3: [f32; 7] = [
    -0.590_043_6,
    2.890_611_4,
    -0.457_045_8,
    0.373_176_33,
    -0.457_045_8,
    1.445_305_7,
    -0.590_043_6,
];

#[inline]
fn coeff(sh: &[f32; SH_FLOATS], k: usize) -> Vec3 {
    Vec3::new(sh[k * 3], sh[k * 3 + 1], sh[k * 3 + 2])
}

/// Evaluate the color seen along `dir` (unit vector from camera to splat).
///
/// Includes the +0.5 offset and clamps negative channels to zero.
pub fn eval(sh: &[f32; SH_FLOATS], dir: Vec3) -> Vec3 {
    let (x, y, z) = (dir.x, dir.y, dir.z);
    let mut result = SH_C0 * coeff(sh, 0);

    result += -SH_C1 * y * coeff(sh, 1) + SH_C1 * z * coeff(sh, 2) - SH_C1 * x * coeff(sh, 3);

    let (xx, yy, zz) = (x * x, y * y, z * z);
    let (xy, yz, xz) = (x * y, y * z, x * z);
    result += SH_C2[0] * xy * coeff(sh, 4)
        + SH_C2[1] * yz * coeff(sh, 5)
        + SH_C2[2] * (2.0 * zz - xx - yy) * coeff(sh, 6)
        + SH_C2[3] * xz * coeff(sh, 7)
        + SH_C2[4] * (xx - yy) * coeff(sh, 8);

    result += SH_C3[0] * y * (3.0 * xx - yy) * coeff(sh, 9)
        + SH_C3[1] * xy * z * coeff(sh, 10)
        + SH_C3[2] * y * (4.0 * zz - xx - yy) * coeff(sh, 11)
        + SH_C3[3] * z * (2.0 * zz - 3.0 * xx - 3.0 * yy) * coeff(sh, 12)
        + SH_C3[4] * x * (4.0 * zz - xx - yy) * coeff(sh, 13)
        + SH_C3[5] * z * (xx - yy) * coeff(sh, 14)
        + SH_C3[6] * x * (xx - 3.0 * yy) * coeff(sh, 15);

    (result + Vec3::splat(0.5)).max(Vec3::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn dc_only_is_view_independent() {
        let mut sh = [0.0; SH_FLOATS];
        sh[0] = 1.0;
        let a = eval(&sh, Vec3::X);
        let b = eval(&sh, Vec3::new(0.0, 0.6, 0.8));
        assert_relative_eq!(a.x, b.x);
        assert_relative_eq!(a.x, SH_C0 + 0.5, epsilon = 1e-6);
    }

    #[test]
    fn negative_result_clamps_to_zero() {
        let mut sh = [0.0; SH_FLOATS];
        sh[0] = -10.0;
        assert_eq!(eval(&sh, Vec3::Z).x, 0.0);
    }

    #[test]
    fn first_band_depends_on_direction() {
        let mut sh = [0.0; SH_FLOATS];
        // coefficient 2 (z term), red channel
        sh[6] = 1.0;
        let forward = eval(&sh, Vec3::Z);
        let backward = eval(&sh, Vec3::NEG_Z);
        assert!(forward.x > backward.x);
    }
}
