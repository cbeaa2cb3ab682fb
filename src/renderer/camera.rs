use crate::config::WorldSettings;
use crate::renderer::util;
use glam::{Mat4, Vec3};

pub struct Camera {
    position: Vec3,
    forward: Vec3,
    up: Vec3,
    right: Vec3,
    world_up: Vec3,
    fov_y_deg: f32,
    near: f32,
    far: f32,
    pivot: Vec3,
    zoom_speed: f32,
    panning_speed: f32,
}

impl Camera {
    pub fn new(settings: &WorldSettings) -> Self {
        let mut camera = Self {
            position: settings.camera_position,
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            right: Vec3::X,
            world_up: Vec3::Y,
            fov_y_deg: settings.field_of_view,
            near: settings.near_clipping,
            far: settings.far_clipping,
            pivot: Vec3::ZERO,
            zoom_speed: settings.zoom_speed,
            panning_speed: settings.panning_speed,
        };
        camera.look_at(Vec3::ZERO);
        camera
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.look_at(self.pivot);
    }

    pub fn look_at(&mut self, target: Vec3) {
        if target == self.position {
            return;
        }
        self.pivot = target;
        self.forward = (target - self.position).normalize();
        let right = self.forward.cross(self.world_up);
        // Looking straight along the world up axis
        self.right = if right.length_squared() > f32::EPSILON {
            right.normalize()
        } else {
            Vec3::X
        };
        self.up = self.right.cross(self.forward).normalize();
    }

    pub fn get_view_mat(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward, self.up)
    }

    /// Right-handed perspective with Vulkan's downward clip-space y
    pub fn get_proj_mat(&self, aspect_ratio: f32) -> Mat4 {
        let mut projection = Mat4::perspective_rh(
            self.fov_y_deg.to_radians(),
            aspect_ratio.max(f32::EPSILON),
            self.near,
            self.far,
        );
        projection.y_axis.y *= -1.0;
        projection
    }

    pub fn get_position(&self) -> Vec3 {
        self.position
    }

    pub fn get_forward(&self) -> Vec3 {
        self.forward
    }

    pub fn get_up(&self) -> Vec3 {
        self.up
    }

    pub fn get_right(&self) -> Vec3 {
        self.right
    }

    pub fn get_near(&self) -> f32 {
        self.near
    }

    pub fn get_far(&self) -> f32 {
        self.far
    }

    pub fn get_pivot(&self) -> Vec3 {
        self.pivot
    }

    pub fn get_zoom_speed(&self) -> f32 {
        self.zoom_speed
    }

    pub fn get_panning_speed(&self) -> f32 {
        self.panning_speed
    }

    pub fn get_pitch(&self) -> f32 {
        util::calculate_pitch(self.forward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::scene::default_world;
    use glam::Vec4;

    #[test]
    fn camera_starts_looking_at_origin() {
        let camera = Camera::new(&default_world());
        assert_eq!(camera.get_position(), Vec3::new(0.0, 0.0, 80.0));
        assert!(camera.get_forward().abs_diff_eq(Vec3::NEG_Z, 1e-6));
        let origin = camera.get_view_mat() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((origin.z + 80.0).abs() < 1e-4);
    }

    #[test]
    fn projection_flips_y_for_vulkan() {
        let camera = Camera::new(&default_world());
        let projection = camera.get_proj_mat(16.0 / 9.0);
        let above = projection * Vec4::new(0.0, 1.0, -10.0, 1.0);
        assert!(above.y / above.w < 0.0);
    }
}
