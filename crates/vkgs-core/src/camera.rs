//! Camera state and per-frame uniform data.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Free camera described by a position and an orientation.
///
/// In camera-local space the camera looks down `-Z` with `+Y` up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    /// Horizontal field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov_degrees: 45.0,
            near: 0.2,
            far: 1000.0,
        }
    }
}

impl Camera {
    /// Create a camera at `position` looking towards `target`.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let mut camera = Self {
            position,
            ..Self::default()
        };
        camera.look_at(target);
        camera
    }

    /// Orient the camera towards `target`, keeping world `+Y` up.
    pub fn look_at(&mut self, target: Vec3) {
        let forward = (target - self.position).normalize_or_zero();
        if forward == Vec3::ZERO {
            return;
        }
        let up = if forward.cross(Vec3::Y).length_squared() < 1e-8 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let right = forward.cross(up).normalize();
        let up = right.cross(forward);
        self.rotation = Quat::from_mat3(&Mat3::from_cols(right, up, -forward)).normalize();
    }

    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    #[inline]
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    #[inline]
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Move by `delta` expressed in camera-local axes (x right, y up, z back).
    pub fn translate_local(&mut self, delta: Vec3) {
        self.position += self.rotation * delta;
    }

    /// Apply yaw around world `+Y` and pitch around the local right axis.
    pub fn rotate(&mut self, yaw: f32, pitch: f32) {
        let yaw = Quat::from_axis_angle(Vec3::Y, yaw);
        let pitch = Quat::from_axis_angle(Vec3::X, pitch);
        self.rotation = (yaw * self.rotation * pitch).normalize();
    }

    /// World-to-camera matrix (OpenGL convention, before axis flips).
    pub fn view_matrix(&self) -> Mat4 {
        (Mat4::from_translation(self.position) * Mat4::from_quat(self.rotation)).inverse()
    }
}

/// Per-frame uniform block consumed by the preprocess stage.
///
/// The stored view matrix has its Y and Z rows negated so view space looks
/// down `+Z` with `+Y` pointing down the screen. The stored projection is
/// `perspective * view` with its Y row negated for Vulkan clip space.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub camera_position: [f32; 4],
    pub proj_mat: [[f32; 4]; 4],
    pub view_mat: [[f32; 4]; 4],
    pub width: u32,
    pub height: u32,
    pub tan_fovx: f32,
    pub tan_fovy: f32,
}

impl FrameUniforms {
    /// Build the uniforms for a `width` x `height` framebuffer.
    pub fn from_camera(camera: &Camera, width: u32, height: u32) -> Self {
        let width_f = width.max(1) as f32;
        let height_f = height.max(1) as f32;

        let view = camera.view_matrix();
        let tan_fovx = (camera.fov_degrees.to_radians() * 0.5).tan();
        let tan_fovy = tan_fovx * height_f / width_f;
        let proj = Mat4::perspective_rh_gl(
            tan_fovy.atan() * 2.0,
            width_f / height_f,
            camera.near,
            camera.far,
        ) * view;

        let mut view_mat = view.to_cols_array_2d();
        let mut proj_mat = proj.to_cols_array_2d();
        for col in 0..4 {
            view_mat[col][1] = -view_mat[col][1];
            view_mat[col][2] = -view_mat[col][2];
            proj_mat[col][1] = -proj_mat[col][1];
        }

        Self {
            camera_position: camera.position.extend(1.0).to_array(),
            proj_mat,
            view_mat,
            width,
            height,
            tan_fovx,
            tan_fovy,
        }
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view_mat)
    }

    #[inline]
    pub fn proj(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.proj_mat)
    }

    #[inline]
    pub fn camera_position(&self) -> Vec3 {
        Vec3::new(
            self.camera_position[0],
            self.camera_position[1],
            self.camera_position[2],
        )
    }

    /// Focal lengths in pixels.
    pub fn focal(&self) -> Vec2 {
        Vec2::new(
            self.width as f32 / (2.0 * self.tan_fovx),
            self.height as f32 / (2.0 * self.tan_fovy),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn uniform_block_is_std140_sized() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 160);
    }

    #[test]
    fn point_ahead_has_positive_depth() {
        let camera = Camera::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        let uniforms = FrameUniforms::from_camera(&camera, 800, 600);
        let p = uniforms.view().transform_point3(Vec3::ZERO);
        assert_relative_eq!(p.z, 5.0, epsilon = 1e-4);
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn world_up_maps_to_screen_top() {
        let camera = Camera::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        let uniforms = FrameUniforms::from_camera(&camera, 800, 600);
        let clip = uniforms.proj() * Vec3::new(0.0, 1.0, 0.0).extend(1.0);
        // Vulkan NDC: negative y is the top of the screen.
        assert!(clip.y / clip.w < 0.0);
        let view = uniforms.view().transform_point3(Vec3::new(0.0, 1.0, 0.0));
        assert!(view.y < 0.0);
    }

    #[test]
    fn tan_fov_follows_aspect() {
        let camera = Camera::default();
        let uniforms = FrameUniforms::from_camera(&camera, 800, 400);
        assert_relative_eq!(uniforms.tan_fovy, uniforms.tan_fovx * 0.5, epsilon = 1e-6);
        let focal = uniforms.focal();
        assert_relative_eq!(focal.x, focal.y, epsilon = 1e-3);
    }

    #[test]
    fn look_at_faces_target() {
        let camera = Camera::looking_at(Vec3::new(3.0, 2.0, 1.0), Vec3::ZERO);
        let expected = -Vec3::new(3.0, 2.0, 1.0).normalize();
        assert_relative_eq!(camera.forward().dot(expected), 1.0, epsilon = 1e-5);
    }
}
