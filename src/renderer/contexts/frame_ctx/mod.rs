pub mod gpu_timer;
pub mod profiler;
pub mod scheduler;
pub mod sync;

use std::sync::Arc;
use std::time::Duration;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::frame_ctx::gpu_timer::GpuTimestamps;
use crate::renderer::contexts::frame_ctx::scheduler::QueueKind;
use crate::renderer::contexts::frame_ctx::sync::SyncObjects;
use crate::renderer::util::VkResultExt;

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Slot the ring restarts from after a present-triggered swapchain rebuild.
/// When the presented slot was already 1, the next frame runs slot 1 again and the
/// cell pair does not swap roles for that one frame: the simulation recomputes the
/// same generation. Resetting to 0 instead would hit the same case from slot 0.
pub const RECREATE_RESET_SLOT: usize = 1;

/// Responsibilities:
/// - Own the per-slot compute and graphics command buffers
/// - Own the per-slot semaphores and fences
/// - Own the optional per-slot timestamp queries
/// - Submit recorded work with the right waits and signals
pub struct RenderFrameContext {
    pub sync: SyncObjects,
    pub timestamps: Option<GpuTimestamps>,
    compute_commands: [vk::CommandBuffer; MAX_FRAMES_IN_FLIGHT],
    graphics_commands: [vk::CommandBuffer; MAX_FRAMES_IN_FLIGHT],
    command_pool: vk::CommandPool,
    device: Arc<ash::Device>,
}

impl RenderFrameContext {
    pub fn new(dev: &RenderDevice, gpu_trace: bool) -> Result<Self> {
        let sync = SyncObjects::create(dev.logical.clone())?;
        let timestamps = if gpu_trace { GpuTimestamps::new(dev)? } else { None };

        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(dev.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(2 * MAX_FRAMES_IN_FLIGHT as u32);
        let buffers = unsafe { dev.logical.allocate_command_buffers(&allocate_info) }
            .check(vk::ObjectType::COMMAND_BUFFER)?;
        let mut compute_commands = [vk::CommandBuffer::null(); MAX_FRAMES_IN_FLIGHT];
        let mut graphics_commands = [vk::CommandBuffer::null(); MAX_FRAMES_IN_FLIGHT];
        compute_commands.copy_from_slice(&buffers[..MAX_FRAMES_IN_FLIGHT]);
        graphics_commands.copy_from_slice(&buffers[MAX_FRAMES_IN_FLIGHT..]);

        Ok(Self {
            sync,
            timestamps,
            compute_commands,
            graphics_commands,
            command_pool: dev.command_pool,
            device: dev.logical.clone(),
        })
    }

    pub fn command_buffer(&self, queue: QueueKind, slot: usize) -> vk::CommandBuffer {
        match queue {
            QueueKind::Compute => self.compute_commands[slot],
            QueueKind::Graphics => self.graphics_commands[slot],
        }
    }

    /// GPU time of the slot's last `queue` submission, once its fence has been waited on
    pub fn gpu_time(&mut self, queue: QueueKind, slot: usize) -> Result<Option<Duration>> {
        match self.timestamps.as_mut() {
            Some(timestamps) => timestamps.collect(queue, slot),
            None => Ok(None),
        }
    }

    pub fn reset_commands(&self, queue: QueueKind, slot: usize) -> Result<()> {
        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer(queue, slot), vk::CommandBufferResetFlags::empty())
                .check(vk::ObjectType::COMMAND_BUFFER)
        }
    }

    pub fn begin(&self, queue: QueueKind, slot: usize) -> Result<vk::CommandBuffer> {
        let cmd = self.command_buffer(queue, slot);
        let begin_info = vk::CommandBufferBeginInfo::default();
        unsafe { self.device.begin_command_buffer(cmd, &begin_info) }
            .check(vk::ObjectType::COMMAND_BUFFER)?;
        Ok(cmd)
    }

    pub fn end(&self, queue: QueueKind, slot: usize) -> Result<()> {
        unsafe { self.device.end_command_buffer(self.command_buffer(queue, slot)) }
            .check(vk::ObjectType::COMMAND_BUFFER)
    }

    /// No waits; signals compute-finished and the compute fence
    pub fn submit_compute(&self, queue: vk::Queue, slot: usize) -> Result<()> {
        let command_buffers = [self.compute_commands[slot]];
        let signal = [self.sync.compute_finished[slot]];
        let submit = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal);
        unsafe {
            self.device
                .queue_submit(queue, &[submit], self.sync.compute_in_flight[slot])
                .check(vk::ObjectType::QUEUE)
        }
    }

    /// Instance data is consumed at vertex input, the swapchain image only at color output
    pub fn submit_graphics(&self, queue: vk::Queue, slot: usize) -> Result<()> {
        let command_buffers = [self.graphics_commands[slot]];
        let wait = [self.sync.compute_finished[slot], self.sync.image_available[slot]];
        let wait_stages = [
            vk::PipelineStageFlags::VERTEX_INPUT,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ];
        let signal = [self.sync.render_finished[slot]];
        let submit = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .wait_semaphores(&wait)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal);
        unsafe {
            self.device
                .queue_submit(queue, &[submit], self.sync.graphics_in_flight[slot])
                .check(vk::ObjectType::QUEUE)
        }
    }

    /// Empty submission that unsignals compute-finished after an aborted frame
    pub fn drain_compute_signal(&self, queue: vk::Queue, slot: usize) -> Result<()> {
        let wait = [self.sync.compute_finished[slot]];
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait)
            .wait_dst_stage_mask(&wait_stages);
        unsafe {
            self.device
                .queue_submit(queue, &[submit], vk::Fence::null())
                .check(vk::ObjectType::QUEUE)
        }
    }
}

impl Drop for RenderFrameContext {
    fn drop(&mut self) {
        // Waits for idle before any buffer is freed
        self.sync.destroy();
        unsafe {
            self.device.free_command_buffers(self.command_pool, &self.compute_commands);
            self.device.free_command_buffers(self.command_pool, &self.graphics_commands);
        }
    }
}
