use ash::vk;
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::frame_ctx::MAX_FRAMES_IN_FLIGHT;
use crate::renderer::contexts::resource_ctx::descriptor::{DescriptorKind, DescriptorTable, DescriptorTarget};
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::shader_data::UniformData;

/// Host-visible uniform buffer per frame slot, rewritten every frame
pub struct UniformBuffers {
    pub my_index: usize,
    buffers: Vec<Buffer>,
}

impl UniformBuffers {
    pub fn new(dev: &RenderDevice, table: &mut DescriptorTable) -> Result<Self> {
        let my_index = table.claim(DescriptorKind::Uniform)?;
        let size = size_of::<UniformData>() as u64;

        let buffers = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|slot| {
                dev.create_buffer(
                    size,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    &format!("Uniform buffer {slot}"),
                    MemoryLocation::CpuToGpu,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        for (slot, buffer) in buffers.iter().enumerate() {
            table.set_target(slot, my_index, Some(DescriptorTarget::Buffer {
                buffer: buffer.buffer,
                range: size,
            }));
        }

        Ok(Self { my_index, buffers })
    }

    /// Coherent memory, visible to the next submission without a flush
    pub fn update(&mut self, slot: usize, data: &UniformData) -> Result<()> {
        self.buffers[slot].write(std::slice::from_ref(data), 0)?;
        Ok(())
    }
}
