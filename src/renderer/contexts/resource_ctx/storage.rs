use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::frame_ctx::MAX_FRAMES_IN_FLIGHT;
use crate::renderer::contexts::resource_ctx::descriptor::{DescriptorKind, DescriptorTable, DescriptorTarget};
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::shader_data::CellData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairBuffer {
    In,
    Out,
}

impl PairBuffer {
    pub fn other(&self) -> Self {
        match self {
            Self::In => Self::Out,
            Self::Out => Self::In,
        }
    }
}

/// Buffers bound to the pair's two bindings in `slot`: (previous generation, next generation).
/// Even slots read `In` and write `Out`, odd slots the reverse.
pub fn ping_pong(slot: usize) -> (PairBuffer, PairBuffer) {
    if slot % 2 == 0 {
        (PairBuffer::In, PairBuffer::Out)
    } else {
        (PairBuffer::Out, PairBuffer::In)
    }
}

/// Buffer the compute pass of `slot` writes, and the cells draw of that slot reads
pub fn current_generation(slot: usize) -> PairBuffer {
    ping_pong(slot).1
}

/// Double-buffered cell state; compute writes one side while reading the other
pub struct StoragePair {
    pub my_index: usize,
    pub buffer_in: Buffer,
    pub buffer_out: Buffer,
    pub cell_count: u32,
}

impl StoragePair {
    pub fn new(dev: &RenderDevice, table: &mut DescriptorTable, cells: &[CellData]) -> Result<Self> {
        let my_index = table.claim(DescriptorKind::StoragePair)?;
        let usage = vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::VERTEX_BUFFER;
        // Both sides start from the same generation
        let buffer_in = dev.create_buffer_with_data(cells, usage, "Cells in")?;
        let buffer_out = dev.create_buffer_with_data(cells, usage, "Cells out")?;

        let pair = Self {
            my_index,
            buffer_in,
            buffer_out,
            cell_count: cells.len() as u32,
        };
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            let (previous, next) = ping_pong(slot);
            table.set_target(slot, my_index, Some(pair.target(previous)));
            table.set_target(slot, my_index + 1, Some(pair.target(next)));
        }
        Ok(pair)
    }

    pub fn buffer(&self, which: PairBuffer) -> &Buffer {
        match which {
            PairBuffer::In => &self.buffer_in,
            PairBuffer::Out => &self.buffer_out,
        }
    }

    /// Instance buffer for the cells draw in `slot`
    pub fn current(&self, slot: usize) -> vk::Buffer {
        self.buffer(current_generation(slot)).buffer
    }

    fn target(&self, which: PairBuffer) -> DescriptorTarget {
        let buffer = self.buffer(which);
        DescriptorTarget::Buffer {
            buffer: buffer.buffer,
            range: buffer.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_swap_every_slot_and_never_alias() {
        for slot in 0..MAX_FRAMES_IN_FLIGHT * 3 {
            let (previous, next) = ping_pong(slot);
            assert_ne!(previous, next);
            assert_eq!(previous.other(), next);
        }
        assert_eq!(ping_pong(0), (PairBuffer::In, PairBuffer::Out));
        assert_eq!(ping_pong(1), (PairBuffer::Out, PairBuffer::In));
    }

    #[test]
    fn each_frame_reads_what_the_previous_frame_wrote() {
        // Slots advance 0, 1, 0, 1, ... so consecutive frames alternate parity
        let mut written_by_previous = None;
        for frame in 0..8 {
            let slot = frame % MAX_FRAMES_IN_FLIGHT;
            let (read, write) = ping_pong(slot);
            if let Some(previous) = written_by_previous {
                assert_eq!(read, previous, "frame {frame} reads a stale generation");
            }
            assert_eq!(current_generation(slot), write);
            written_by_previous = Some(write);
        }
    }
}
