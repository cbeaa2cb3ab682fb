use std::f32::consts::PI;
use glam::{FloatExt, Vec2, Vec3};
use winit::dpi::PhysicalPosition;
use winit::window::Window;
use crate::app::input_state::InputState;
use crate::renderer::camera::Camera;
use crate::renderer::util::{calculate_direction, calculate_pitch, calculate_yaw};

const MAX_PITCH_DEG: f32 = 80.0;
const ROTATION_SMOOTHING: f32 = 10.0;
const ZOOM_SMOOTHING: f32 = 4.0;
/// Keeps the eye off the clipping planes
const CLIP_MARGIN: f32 = 0.1;

/// Frame-rate independent interpolation weight
pub fn smoothing_factor(speed: f32, delta_time: f32) -> f32 {
    1.0 - (-speed * delta_time).exp()
}

/// Turns a pivot-to-eye direction by a cursor drag. A full viewport width is one
/// revolution scaled by `sensitivity`; pitch stays within `max_pitch`.
pub fn orbit_direction(direction: Vec3, drag: Vec2, viewport: Vec2, sensitivity: f32, max_pitch: f32) -> Vec3 {
    if drag == Vec2::ZERO || viewport.min_element() <= 0.0 {
        return direction;
    }
    let yaw = calculate_yaw(direction) + drag.x * 2.0 * PI / viewport.x * sensitivity;
    let pitch = calculate_pitch(direction) + drag.y * PI / viewport.y * sensitivity;
    calculate_direction(pitch.clamp(-max_pitch, max_pitch), yaw)
}

/// Each wheel notch moves the eye a `zoom_speed` fraction of the current distance
pub fn zoom_distance(distance: f32, wheel: f32, zoom_speed: f32, near: f32, far: f32) -> f32 {
    (distance * (1.0 - wheel * zoom_speed)).clamp(near + CLIP_MARGIN, far - CLIP_MARGIN)
}

pub fn slerp(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    let a = a.normalize();
    let b = b.normalize();
    let theta = a.dot(b).clamp(-1.0, 1.0).acos();
    if theta.abs() < 1e-6 {
        return a.lerp(b, t).normalize();
    }
    let sin_theta = theta.sin();
    (((1.0 - t) * theta).sin() / sin_theta) * a + ((t * theta).sin() / sin_theta) * b
}

/// Orbits the camera around its pivot with right-drag and zooms with the wheel,
/// easing towards the requested direction and distance.
pub struct CameraController {
    camera: Camera,
    max_pitch: f32,

    desired_direction: Vec3,
    current_direction: Vec3,
    desired_distance: f32,
    current_distance: f32,
}

impl CameraController {
    pub fn new(camera: Camera) -> Self {
        let pivot_to_eye = camera.get_position() - camera.get_pivot();
        let distance = pivot_to_eye.length();
        let direction = pivot_to_eye.normalize_or(Vec3::Z);
        Self {
            camera,
            max_pitch: MAX_PITCH_DEG.to_radians(),

            desired_direction: direction,
            current_direction: direction,
            desired_distance: distance,
            current_distance: distance,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn process_input(&mut self, input: &mut InputState, window: &Window, delta_time: f32) {
        let size = window.inner_size();
        let viewport = Vec2::new(size.width as f32, size.height as f32);

        if input.orbit.just_started {
            window.set_cursor_visible(false);
        }
        if input.orbit.active {
            self.desired_direction = orbit_direction(
                self.desired_direction,
                -input.cursor_delta(),
                viewport,
                self.camera.get_panning_speed() * 5.0,
                self.max_pitch,
            );
        }
        if input.orbit.just_ended {
            window.set_cursor_visible(true);
            let anchor = input.orbit.anchor;
            warp_cursor(window, anchor);
            input.warp_cursor(anchor);
        }

        if input.wheel != 0.0 {
            self.desired_distance = zoom_distance(
                self.current_distance,
                input.wheel,
                self.camera.get_zoom_speed(),
                self.camera.get_near(),
                self.camera.get_far(),
            );
        }

        self.update(delta_time);
    }

    fn update(&mut self, delta_time: f32) {
        let rotation_t = smoothing_factor(ROTATION_SMOOTHING, delta_time);
        let zoom_t = smoothing_factor(ZOOM_SMOOTHING, delta_time);
        self.current_direction = slerp(self.current_direction, self.desired_direction, rotation_t);
        self.current_distance = self.current_distance.lerp(self.desired_distance, zoom_t);
        self.camera
            .set_position(self.camera.get_pivot() + self.current_direction * self.current_distance);
    }
}

fn warp_cursor(window: &Window, position: Vec2) {
    if let Err(err) = window.set_cursor_position(PhysicalPosition::new(position.x as f64, position.y as f64)) {
        log::warn!("Failed to set cursor position: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::scene::default_world;

    #[test]
    fn smoothing_stays_within_unit_range() {
        assert_eq!(smoothing_factor(10.0, 0.0), 0.0);
        let t = smoothing_factor(10.0, 1.0 / 60.0);
        assert!(t > 0.0 && t < 1.0);
        assert!(smoothing_factor(10.0, 100.0) > 0.999);
    }

    #[test]
    fn orbit_clamps_pitch() {
        let max_pitch = MAX_PITCH_DEG.to_radians();
        let viewport = Vec2::new(800.0, 600.0);
        let turned = orbit_direction(Vec3::Z, Vec2::new(0.0, 10_000.0), viewport, 1.0, max_pitch);
        assert!((calculate_pitch(turned) - max_pitch).abs() < 1e-4);
        assert!((turned.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn horizontal_drag_keeps_pitch() {
        let viewport = Vec2::new(800.0, 600.0);
        let turned = orbit_direction(Vec3::Z, Vec2::new(200.0, 0.0), viewport, 1.0, 1.0);
        assert!(calculate_pitch(turned).abs() < 1e-5);
        assert!(!turned.abs_diff_eq(Vec3::Z, 1e-3));
        assert_eq!(orbit_direction(Vec3::Z, Vec2::ZERO, viewport, 1.0, 1.0), Vec3::Z);
    }

    #[test]
    fn zoom_stays_between_clip_planes() {
        assert!((zoom_distance(80.0, 1.0, 0.2, 0.25, 800.0) - 64.0).abs() < 1e-4);
        assert!((zoom_distance(80.0, -1.0, 0.2, 0.25, 800.0) - 96.0).abs() < 1e-4);
        assert!((zoom_distance(1.0, 10.0, 0.2, 0.25, 800.0) - 0.35).abs() < 1e-5);
        assert!((zoom_distance(700.0, -5.0, 0.2, 0.25, 800.0) - 799.9).abs() < 1e-3);
    }

    #[test]
    fn slerp_reaches_both_ends() {
        assert!(slerp(Vec3::X, Vec3::Y, 0.0).abs_diff_eq(Vec3::X, 1e-5));
        assert!(slerp(Vec3::X, Vec3::Y, 1.0).abs_diff_eq(Vec3::Y, 1e-5));
        let half = slerp(Vec3::X, Vec3::Y, 0.5);
        assert!((half.length() - 1.0).abs() < 1e-5);
        assert!((half.x - half.y).abs() < 1e-5);
    }

    #[test]
    fn controller_starts_at_the_camera_distance() {
        let mut controller = CameraController::new(Camera::new(&default_world()));
        controller.update(1.0 / 60.0);
        let position = controller.camera().get_position();
        assert!(position.abs_diff_eq(Vec3::new(0.0, 0.0, 80.0), 1e-3));
    }
}
