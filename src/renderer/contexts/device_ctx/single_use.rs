use ash::vk;
use color_eyre::Result;
use crate::renderer::util::VkResultExt;

/// One-shot command buffer that is always freed, whether or not it was submitted
pub struct SingleUseCommands<'a> {
    device: &'a ash::Device,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
}

impl<'a> SingleUseCommands<'a> {
    pub fn begin(
        device: &'a ash::Device,
        command_pool: vk::CommandPool,
        queue: vk::Queue,
    ) -> Result<Self> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        let command_buffer = unsafe { device.allocate_command_buffers(&allocate_info) }
            .check(vk::ObjectType::COMMAND_BUFFER)?[0];

        // From here on Drop cleans up whatever has been created
        let mut commands = Self {
            device,
            command_pool,
            queue,
            command_buffer,
            fence: vk::Fence::null(),
        };
        commands.fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None) }
            .check(vk::ObjectType::FENCE)?;

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(command_buffer, &begin_info) }
            .check(vk::ObjectType::COMMAND_BUFFER)?;

        Ok(commands)
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Ends recording, submits and blocks until the queue has executed it
    pub fn submit(self) -> Result<()> {
        unsafe { self.device.end_command_buffer(self.command_buffer) }
            .check(vk::ObjectType::COMMAND_BUFFER)?;

        let command_buffers = [self.command_buffer];
        let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.device
                .queue_submit(self.queue, &[submit], self.fence)
                .check(vk::ObjectType::QUEUE)?;
            self.device
                .wait_for_fences(&[self.fence], true, u64::MAX)
                .check(vk::ObjectType::FENCE)?;
        }
        Ok(())
    }
}

impl Drop for SingleUseCommands<'_> {
    fn drop(&mut self) {
        unsafe {
            if self.fence != vk::Fence::null() {
                self.device.destroy_fence(self.fence, None);
            }
            self.device.free_command_buffers(self.command_pool, &[self.command_buffer]);
        }
    }
}

/// Records with `func` and runs the commands to completion
pub fn immediate_submit<F>(
    device: &ash::Device,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
    func: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
{
    let commands = SingleUseCommands::begin(device, command_pool, queue)?;
    func(commands.command_buffer(), device)?;
    commands.submit()
}
