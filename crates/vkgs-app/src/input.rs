//! winit event translation.

use glam::Vec2;
use vkgs_core::{InputState, Key, MouseButton};
use winit::event::{DeviceEvent, ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Navigation key bound to a physical key, if any.
pub const fn key_for_code(code: KeyCode) -> Option<Key> {
    match code {
        KeyCode::KeyW | KeyCode::ArrowUp => Some(Key::Forward),
        KeyCode::KeyS | KeyCode::ArrowDown => Some(Key::Back),
        KeyCode::KeyA | KeyCode::ArrowLeft => Some(Key::Left),
        KeyCode::KeyD | KeyCode::ArrowRight => Some(Key::Right),
        KeyCode::Space => Some(Key::Up),
        KeyCode::ShiftLeft | KeyCode::ShiftRight => Some(Key::Down),
        KeyCode::Escape => Some(Key::Escape),
        _ => None,
    }
}

pub const fn mouse_button(button: winit::event::MouseButton) -> Option<MouseButton> {
    match button {
        winit::event::MouseButton::Left => Some(MouseButton::Left),
        winit::event::MouseButton::Right => Some(MouseButton::Right),
        winit::event::MouseButton::Middle => Some(MouseButton::Middle),
        _ => None,
    }
}

/// Fold a window event into `input`. Returns `true` if the event was input.
pub fn apply_window_event(input: &mut InputState, event: &WindowEvent) -> bool {
    match event {
        WindowEvent::KeyboardInput { event, .. } => {
            let PhysicalKey::Code(code) = event.physical_key else {
                return false;
            };
            let Some(key) = key_for_code(code) else {
                return false;
            };
            input.set_key(key, event.state == ElementState::Pressed);
            true
        }
        WindowEvent::MouseInput { state, button, .. } => {
            let Some(button) = mouse_button(*button) else {
                return false;
            };
            input.set_mouse_button(button, *state == ElementState::Pressed);
            true
        }
        WindowEvent::Focused(false) => {
            input.clear();
            true
        }
        _ => false,
    }
}

/// Accumulate raw mouse motion while the cursor is captured.
pub fn apply_device_event(input: &mut InputState, event: &DeviceEvent) {
    if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
        if input.is_captured() {
            input.add_cursor_delta(Vec2::new(*dx as f32, *dy as f32));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wasd_and_arrows_share_bindings() {
        assert_eq!(key_for_code(KeyCode::KeyW), Some(Key::Forward));
        assert_eq!(key_for_code(KeyCode::ArrowUp), Some(Key::Forward));
        assert_eq!(key_for_code(KeyCode::KeyA), Some(Key::Left));
        assert_eq!(key_for_code(KeyCode::ShiftRight), Some(Key::Down));
        assert_eq!(key_for_code(KeyCode::KeyQ), None);
    }

    #[test]
    fn motion_is_ignored_until_captured() {
        let mut input = InputState::new();
        let motion = DeviceEvent::MouseMotion { delta: (4.0, -2.0) };
        apply_device_event(&mut input, &motion);
        assert_eq!(input.take_cursor_delta(), Vec2::ZERO);

        input.set_captured(true);
        apply_device_event(&mut input, &motion);
        assert_eq!(input.take_cursor_delta(), Vec2::new(4.0, -2.0));
    }

    #[test]
    fn losing_focus_releases_keys() {
        let mut input = InputState::new();
        input.set_key(Key::Forward, true);
        assert!(apply_window_event(&mut input, &WindowEvent::Focused(false)));
        assert!(!input.is_pressed(Key::Forward));
    }
}
