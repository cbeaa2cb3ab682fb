use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::frame_ctx::MAX_FRAMES_IN_FLIGHT;
use crate::renderer::contexts::frame_ctx::scheduler::QueueKind;
use crate::renderer::util::VkResultExt;

/// Per-slot semaphores and fences of the frame ring
pub struct SyncObjects {
    // Signaled by acquire, waited on by the graphics submission
    pub image_available: [vk::Semaphore; MAX_FRAMES_IN_FLIGHT],
    // Signaled by the graphics submission, waited on by present
    pub render_finished: [vk::Semaphore; MAX_FRAMES_IN_FLIGHT],
    // Signaled by the compute submission, waited on by the graphics submission
    pub compute_finished: [vk::Semaphore; MAX_FRAMES_IN_FLIGHT],

    pub compute_in_flight: [vk::Fence; MAX_FRAMES_IN_FLIGHT],
    pub graphics_in_flight: [vk::Fence; MAX_FRAMES_IN_FLIGHT],

    device: Arc<ash::Device>,
}

impl SyncObjects {
    /// Fences start signaled so the first wait on every slot returns immediately
    pub fn create(device: Arc<ash::Device>) -> Result<Self> {
        let mut sync = Self {
            image_available: [vk::Semaphore::null(); MAX_FRAMES_IN_FLIGHT],
            render_finished: [vk::Semaphore::null(); MAX_FRAMES_IN_FLIGHT],
            compute_finished: [vk::Semaphore::null(); MAX_FRAMES_IN_FLIGHT],
            compute_in_flight: [vk::Fence::null(); MAX_FRAMES_IN_FLIGHT],
            graphics_in_flight: [vk::Fence::null(); MAX_FRAMES_IN_FLIGHT],
            device,
        };

        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            unsafe {
                sync.image_available[slot] = sync.device.create_semaphore(&semaphore_info, None)
                    .check(vk::ObjectType::SEMAPHORE)?;
                sync.render_finished[slot] = sync.device.create_semaphore(&semaphore_info, None)
                    .check(vk::ObjectType::SEMAPHORE)?;
                sync.compute_finished[slot] = sync.device.create_semaphore(&semaphore_info, None)
                    .check(vk::ObjectType::SEMAPHORE)?;
                sync.compute_in_flight[slot] = sync.device.create_fence(&fence_info, None)
                    .check(vk::ObjectType::FENCE)?;
                sync.graphics_in_flight[slot] = sync.device.create_fence(&fence_info, None)
                    .check(vk::ObjectType::FENCE)?;
            }
        }
        Ok(sync)
    }

    pub fn fence(&self, queue: QueueKind, slot: usize) -> vk::Fence {
        match queue {
            QueueKind::Compute => self.compute_in_flight[slot],
            QueueKind::Graphics => self.graphics_in_flight[slot],
        }
    }

    pub fn wait(&self, queue: QueueKind, slot: usize) -> Result<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence(queue, slot)], true, u64::MAX)
                .check(vk::ObjectType::FENCE)
        }
    }

    pub fn reset(&self, queue: QueueKind, slot: usize) -> Result<()> {
        unsafe {
            self.device
                .reset_fences(&[self.fence(queue, slot)])
                .check(vk::ObjectType::FENCE)
        }
    }

    /// Waits for the device to go idle, then destroys every handle still alive
    pub fn destroy(&mut self) {
        unsafe {
            if let Err(err) = self.device.device_wait_idle() {
                log::error!("Device wait idle failed before destroying sync objects: {err}");
            }
            for semaphore in self
                .image_available
                .iter_mut()
                .chain(self.render_finished.iter_mut())
                .chain(self.compute_finished.iter_mut())
            {
                if *semaphore != vk::Semaphore::null() {
                    self.device.destroy_semaphore(*semaphore, None);
                    *semaphore = vk::Semaphore::null();
                }
            }
            for fence in self
                .compute_in_flight
                .iter_mut()
                .chain(self.graphics_in_flight.iter_mut())
            {
                if *fence != vk::Fence::null() {
                    self.device.destroy_fence(*fence, None);
                    *fence = vk::Fence::null();
                }
            }
        }
    }
}

impl Drop for SyncObjects {
    fn drop(&mut self) {
        self.destroy();
    }
}
