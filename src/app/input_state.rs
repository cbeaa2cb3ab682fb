use glam::Vec2;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{Key, NamedKey};

/// Discrete requests raised by key presses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Exit,
    Screenshot,
}

pub fn key_action(key: &Key) -> Option<InputAction> {
    match key.as_ref() {
        Key::Named(NamedKey::Escape) => Some(InputAction::Exit),
        Key::Named(NamedKey::F12) => Some(InputAction::Screenshot),
        _ => None,
    }
}

/// One notch per event, whatever the device reports
pub fn wheel_step(delta: &MouseScrollDelta) -> f32 {
    let y = match delta {
        MouseScrollDelta::LineDelta(_, y) => *y,
        MouseScrollDelta::PixelDelta(position) => position.y as f32,
    };
    if y == 0.0 { 0.0 } else { y.signum() }
}

/// Right-button drag that orbits the camera
#[derive(Debug, Default, Clone, Copy)]
pub struct OrbitDrag {
    pub active: bool,
    pub just_started: bool,
    pub just_ended: bool,
    /// Cursor position when the drag began; the cursor returns here afterwards
    pub anchor: Vec2,
}

/// Mouse and keyboard state accumulated between two redraws
#[derive(Debug, Default)]
pub struct InputState {
    pub cursor: Vec2,
    pub prev_cursor: Vec2,
    pub wheel: f32,
    pub orbit: OrbitDrag,
    pub actions: Vec<InputAction>,
}

impl InputState {
    pub fn process_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Right,
                ..
            } => match state {
                ElementState::Pressed => {
                    self.orbit.active = true;
                    self.orbit.just_started = true;
                    self.orbit.anchor = self.cursor;
                }
                ElementState::Released => {
                    self.orbit.active = false;
                    self.orbit.just_ended = true;
                }
            },
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Vec2::new(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.wheel += wheel_step(delta);
            }
            WindowEvent::KeyboardInput {
                event: KeyEvent {
                    logical_key,
                    state: ElementState::Pressed,
                    repeat: false,
                    ..
                },
                ..
            } => {
                if let Some(action) = key_action(logical_key) {
                    self.actions.push(action);
                }
            }
            _ => {}
        }
    }

    pub fn cursor_delta(&self) -> Vec2 {
        self.cursor - self.prev_cursor
    }

    /// Moves the cursor without producing a delta, after the window warped it
    pub fn warp_cursor(&mut self, position: Vec2) {
        self.cursor = position;
        self.prev_cursor = position;
    }

    pub fn take_actions(&mut self) -> Vec<InputAction> {
        std::mem::take(&mut self.actions)
    }

    pub fn reset_frame(&mut self) {
        self.wheel = 0.0;
        self.prev_cursor = self.cursor;
        self.orbit.just_started = false;
        self.orbit.just_ended = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalPosition;

    #[test]
    fn escape_and_f12_map_to_actions() {
        assert_eq!(key_action(&Key::Named(NamedKey::Escape)), Some(InputAction::Exit));
        assert_eq!(key_action(&Key::Named(NamedKey::F12)), Some(InputAction::Screenshot));
        assert_eq!(key_action(&Key::Character("r".into())), None);
    }

    #[test]
    fn wheel_moves_one_notch_per_event() {
        assert_eq!(wheel_step(&MouseScrollDelta::LineDelta(0.0, 3.0)), 1.0);
        assert_eq!(wheel_step(&MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, -42.0))), -1.0);
        assert_eq!(wheel_step(&MouseScrollDelta::LineDelta(1.0, 0.0)), 0.0);
    }

    #[test]
    fn frame_reset_clears_edges_but_keeps_the_drag() {
        let mut state = InputState {
            cursor: Vec2::new(10.0, 20.0),
            wheel: 2.0,
            orbit: OrbitDrag {
                active: true,
                just_started: true,
                just_ended: false,
                anchor: Vec2::ZERO,
            },
            ..Default::default()
        };
        assert_eq!(state.cursor_delta(), Vec2::new(10.0, 20.0));

        state.reset_frame();
        assert_eq!(state.wheel, 0.0);
        assert_eq!(state.cursor_delta(), Vec2::ZERO);
        assert!(state.orbit.active);
        assert!(!state.orbit.just_started);
    }

    #[test]
    fn actions_are_drained_once() {
        let mut state = InputState::default();
        state.actions.push(InputAction::Screenshot);
        assert_eq!(state.take_actions(), [InputAction::Screenshot]);
        assert!(state.take_actions().is_empty());
    }
}
