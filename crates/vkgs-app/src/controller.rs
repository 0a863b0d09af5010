//! Fly camera controller.

use vkgs_core::{Camera, InputState, Key, MouseButton};

/// WASD + mouse-look camera.
///
/// Space and Shift move along the camera's up axis. Mouse-look is active
/// while the right button is held; Escape releases the capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlyCamera {
    /// Units per second.
    pub speed: f32,
    /// Radians per pixel of mouse movement.
    pub sensitivity: f32,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self {
            speed: 2.0,
            sensitivity: 0.003,
        }
    }
}

impl FlyCamera {
    pub const fn new(speed: f32, sensitivity: f32) -> Self {
        Self { speed, sensitivity }
    }

    /// Whether the cursor should be captured given the current buttons.
    pub fn wants_capture(input: &InputState) -> bool {
        input.is_mouse_pressed(MouseButton::Right) && !input.is_pressed(Key::Escape)
    }

    /// Apply one frame of input to `camera`. Returns `true` if it moved.
    pub fn update(&self, camera: &mut Camera, input: &mut InputState, dt: f32) -> bool {
        let mut moved = false;

        let delta = input.take_cursor_delta();
        if input.is_captured() && delta != glam::Vec2::ZERO {
            camera.rotate(-delta.x * self.sensitivity, -delta.y * self.sensitivity);
            moved = true;
        }

        let axis = input.movement_axis();
        if axis != glam::Vec3::ZERO && dt > 0.0 {
            camera.translate_local(axis.normalize() * self.speed * dt);
            moved = true;
        }

        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::{Vec2, Vec3};

    #[test]
    fn forward_moves_along_view_direction() {
        let controller = FlyCamera::new(4.0, 0.01);
        let mut camera = Camera::default();
        let mut input = InputState::new();
        input.set_key(Key::Forward, true);

        assert!(controller.update(&mut camera, &mut input, 0.5));
        assert_relative_eq!(camera.position.z, -2.0);
        assert_relative_eq!(camera.position.x, 0.0);
    }

    #[test]
    fn diagonal_movement_is_normalized() {
        let controller = FlyCamera::new(1.0, 0.01);
        let mut camera = Camera::default();
        let mut input = InputState::new();
        input.set_key(Key::Forward, true);
        input.set_key(Key::Right, true);

        controller.update(&mut camera, &mut input, 1.0);
        assert_relative_eq!(camera.position.length(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn look_requires_capture() {
        let controller = FlyCamera::default();
        let mut camera = Camera::default();
        let mut input = InputState::new();

        input.add_cursor_delta(Vec2::new(100.0, 0.0));
        assert!(!controller.update(&mut camera, &mut input, 0.016));
        assert_eq!(camera.forward(), Vec3::NEG_Z);

        input.set_captured(true);
        input.add_cursor_delta(Vec2::new(100.0, 0.0));
        assert!(controller.update(&mut camera, &mut input, 0.016));
        // Moving the mouse right turns towards +X.
        assert!(camera.forward().x > 0.0);
    }

    #[test]
    fn escape_overrides_right_button() {
        let mut input = InputState::new();
        input.set_mouse_button(MouseButton::Right, true);
        assert!(FlyCamera::wants_capture(&input));
        input.set_key(Key::Escape, true);
        assert!(!FlyCamera::wants_capture(&input));
    }
}
