//! Input state exposed by render targets.

use glam::{Vec2, Vec3};

/// Navigation keys tracked by render targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
    Escape,
}

impl Key {
    pub const ALL: [Self; 7] = [
        Self::Forward,
        Self::Back,
        Self::Left,
        Self::Right,
        Self::Up,
        Self::Down,
        Self::Escape,
    ];

    const fn index(self) -> usize {
        self as usize
    }
}

/// Mouse buttons tracked by render targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Snapshot of keyboard and mouse state.
///
/// Cursor movement accumulates between calls to [`InputState::take_cursor_delta`].
#[derive(Debug, Clone, Default)]
pub struct InputState {
    keys: [bool; Key::ALL.len()],
    mouse: [bool; 3],
    cursor_delta: Vec2,
    captured: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key(&mut self, key: Key, pressed: bool) {
        self.keys[key.index()] = pressed;
    }

    #[must_use]
    pub const fn is_pressed(&self, key: Key) -> bool {
        self.keys[key.index()]
    }

    pub fn set_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        self.mouse[button as usize] = pressed;
    }

    #[must_use]
    pub const fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.mouse[button as usize]
    }

    pub fn add_cursor_delta(&mut self, delta: Vec2) {
        self.cursor_delta += delta;
    }

    /// Return and clear the accumulated cursor movement.
    pub fn take_cursor_delta(&mut self) -> Vec2 {
        std::mem::take(&mut self.cursor_delta)
    }

    pub fn set_captured(&mut self, captured: bool) {
        self.captured = captured;
    }

    /// Whether the cursor is captured for mouse-look.
    #[must_use]
    pub const fn is_captured(&self) -> bool {
        self.captured
    }

    /// Movement direction in camera-local axes (x right, y up, z back).
    ///
    /// Opposing keys cancel; the result is not normalized.
    #[must_use]
    pub fn movement_axis(&self) -> Vec3 {
        let axis = |pos: Key, neg: Key| {
            f32::from(u8::from(self.is_pressed(pos))) - f32::from(u8::from(self.is_pressed(neg)))
        };
        Vec3::new(
            axis(Key::Right, Key::Left),
            axis(Key::Up, Key::Down),
            axis(Key::Back, Key::Forward),
        )
    }

    /// Release everything, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        *self = Self {
            captured: self.captured,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposing_keys_cancel() {
        let mut input = InputState::new();
        input.set_key(Key::Forward, true);
        assert_eq!(input.movement_axis(), Vec3::new(0.0, 0.0, -1.0));
        input.set_key(Key::Back, true);
        assert_eq!(input.movement_axis(), Vec3::ZERO);
    }

    #[test]
    fn cursor_delta_is_drained() {
        let mut input = InputState::new();
        input.add_cursor_delta(Vec2::new(2.0, 1.0));
        input.add_cursor_delta(Vec2::new(1.0, 1.0));
        assert_eq!(input.take_cursor_delta(), Vec2::new(3.0, 2.0));
        assert_eq!(input.take_cursor_delta(), Vec2::ZERO);
    }

    #[test]
    fn clear_keeps_capture() {
        let mut input = InputState::new();
        input.set_captured(true);
        input.set_key(Key::Up, true);
        input.set_mouse_button(MouseButton::Right, true);
        input.clear();
        assert!(input.is_captured());
        assert!(!input.is_pressed(Key::Up));
        assert!(!input.is_mouse_pressed(MouseButton::Right));
    }
}
