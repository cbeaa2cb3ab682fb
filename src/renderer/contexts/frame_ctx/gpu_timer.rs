use std::sync::Arc;
use std::time::Duration;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::frame_ctx::scheduler::QueueKind;
use crate::renderer::contexts::frame_ctx::MAX_FRAMES_IN_FLIGHT;
use crate::renderer::util::VkResultExt;

/// A begin and an end stamp for each of the two queues
const QUERIES_PER_SLOT: u32 = 4;

fn queue_index(queue: QueueKind) -> usize {
    match queue {
        QueueKind::Compute => 0,
        QueueKind::Graphics => 1,
    }
}

fn first_query(queue: QueueKind) -> u32 {
    queue_index(queue) as u32 * 2
}

/// Time between two raw timestamps. Only the low `valid_bits` of a stamp are
/// meaningful, and the counter may wrap once in between.
pub fn ticks_to_duration(begin: u64, end: u64, valid_bits: u32, period_ns: f32) -> Duration {
    let mask = if valid_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << valid_bits) - 1
    };
    let ticks = (end & mask).wrapping_sub(begin & mask) & mask;
    Duration::from_nanos((ticks as f64 * period_ns as f64) as u64)
}

/// Per-slot timestamp queries around the compute chain and the graphics pass.
///
/// Stamps are written while recording and read back once the slot's fence has been
/// waited on, so a read never blocks on work still in flight.
pub struct GpuTimestamps {
    pools: [vk::QueryPool; MAX_FRAMES_IN_FLIGHT],
    written: [[bool; 2]; MAX_FRAMES_IN_FLIGHT],
    period_ns: f32,
    valid_bits: u32,
    device: Arc<ash::Device>,
}

impl GpuTimestamps {
    /// `None` when the graphics family cannot write timestamps
    pub fn new(dev: &RenderDevice) -> Result<Option<Self>> {
        let Some((period_ns, valid_bits)) = dev.timestamp_support() else {
            log::warn!("{} cannot write timestamps on the graphics family, GPU trace disabled", dev.name);
            return Ok(None);
        };

        let mut timestamps = Self {
            pools: [vk::QueryPool::null(); MAX_FRAMES_IN_FLIGHT],
            written: [[false; 2]; MAX_FRAMES_IN_FLIGHT],
            period_ns,
            valid_bits,
            device: dev.logical.clone(),
        };
        let pool_info = vk::QueryPoolCreateInfo::default()
            .query_type(vk::QueryType::TIMESTAMP)
            .query_count(QUERIES_PER_SLOT);
        for pool in timestamps.pools.iter_mut() {
            *pool = unsafe { dev.logical.create_query_pool(&pool_info, None) }
                .check(vk::ObjectType::QUERY_POOL)?;
        }

        log::info!("GPU trace enabled: {period_ns} ns per tick, {valid_bits} valid bits");
        Ok(Some(timestamps))
    }

    /// Resets the queue's two queries and stamps the start of its work.
    /// Must be recorded outside a render pass.
    pub fn begin(&mut self, cmd: vk::CommandBuffer, queue: QueueKind, slot: usize) {
        let first = first_query(queue);
        unsafe {
            self.device.cmd_reset_query_pool(cmd, self.pools[slot], first, 2);
            self.device
                .cmd_write_timestamp(cmd, vk::PipelineStageFlags::TOP_OF_PIPE, self.pools[slot], first);
        }
    }

    pub fn end(&mut self, cmd: vk::CommandBuffer, queue: QueueKind, slot: usize) {
        unsafe {
            self.device.cmd_write_timestamp(
                cmd,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                self.pools[slot],
                first_query(queue) + 1,
            );
        }
        self.written[slot][queue_index(queue)] = true;
    }

    /// GPU time of the queue's last recorded work in `slot`, read once.
    /// Call only after that slot's fence for `queue` has been waited on.
    pub fn collect(&mut self, queue: QueueKind, slot: usize) -> Result<Option<Duration>> {
        if !std::mem::take(&mut self.written[slot][queue_index(queue)]) {
            return Ok(None);
        }
        let mut stamps = [0u64; 2];
        unsafe {
            self.device.get_query_pool_results(
                self.pools[slot],
                first_query(queue),
                &mut stamps,
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
            )
        }
        .check(vk::ObjectType::QUERY_POOL)?;
        Ok(Some(ticks_to_duration(stamps[0], stamps[1], self.valid_bits, self.period_ns)))
    }
}

impl Drop for GpuTimestamps {
    fn drop(&mut self) {
        for pool in self.pools.iter_mut() {
            if *pool != vk::QueryPool::null() {
                unsafe { self.device.destroy_query_pool(*pool, None) };
                *pool = vk::QueryPool::null();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queues_use_separate_query_pairs() {
        assert_eq!(first_query(QueueKind::Compute), 0);
        assert_eq!(first_query(QueueKind::Graphics), 2);
        assert!(first_query(QueueKind::Graphics) + 2 <= QUERIES_PER_SLOT);
    }

    #[test]
    fn ticks_scale_by_the_period() {
        assert_eq!(ticks_to_duration(1_000, 3_000, 64, 1.0), Duration::from_micros(2));
        assert_eq!(ticks_to_duration(0, 1_000_000, 64, 2.5), Duration::from_micros(2_500));
        assert_eq!(ticks_to_duration(500, 500, 36, 1.0), Duration::ZERO);
    }

    #[test]
    fn counter_wrap_is_measured_within_valid_bits() {
        // A 32-bit counter wrapping from near its top back to 10
        let begin = u32::MAX as u64 - 9;
        assert_eq!(ticks_to_duration(begin, 10, 32, 1.0), Duration::from_nanos(20));
        // Garbage above the valid bits is ignored
        assert_eq!(ticks_to_duration(0xFF00_0000_0000_0064, 0x0000_0000_0000_00C8, 32, 1.0), Duration::from_nanos(100));
    }
}
