use ash::prelude::VkResult;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use glam::Vec3;

/// Funnels raw Vulkan results into eyre errors tagged with the object type involved.
/// Recoverable codes must be filtered by the caller before reaching this.
pub trait VkResultExt<T> {
    fn check(self, object_type: vk::ObjectType) -> Result<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn check(self, object_type: vk::ObjectType) -> Result<T> {
        self.map_err(|code| eyre!("Vulkan call failed for {:?}: {:?}", object_type, code))
    }
}

pub fn calculate_pitch(forward: Vec3) -> f32 {
    let forward = forward.normalize();
    forward.y.clamp(-1.0, 1.0).asin()
}

pub fn calculate_yaw(forward: Vec3) -> f32 {
    let forward = forward.normalize();
    forward.z.atan2(forward.x)
}

pub fn calculate_direction(pitch: f32, yaw: f32) -> Vec3 {
    Vec3::new(
        yaw.cos() * pitch.cos(),
        pitch.sin(),
        yaw.sin() * pitch.cos(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_tags_errors_with_object_type() {
        let ok: VkResult<u32> = Ok(7);
        assert_eq!(ok.check(vk::ObjectType::FENCE).unwrap(), 7);

        let err: VkResult<()> = Err(vk::Result::ERROR_DEVICE_LOST);
        let message = err.check(vk::ObjectType::SWAPCHAIN_KHR).unwrap_err().to_string();
        assert!(message.contains("SWAPCHAIN_KHR"), "{message}");
        assert!(message.contains("ERROR_DEVICE_LOST"), "{message}");
    }

    #[test]
    fn direction_round_trips_through_pitch_and_yaw() {
        let forward = Vec3::new(0.3, -0.4, 0.8).normalize();
        let direction = calculate_direction(calculate_pitch(forward), calculate_yaw(forward));
        assert!(direction.abs_diff_eq(forward, 1e-5));
    }
}
