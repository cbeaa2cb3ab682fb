use ash::vk;

#[derive(Debug, Clone, Copy)]
pub struct Queue {
    pub family: u32,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(family: u32, handle: vk::Queue) -> Self {
        Self { family, handle }
    }
}

/// Queue placement chosen for one physical device.
/// Graphics and compute always share a family so the per-frame semaphores
/// never need ownership transfers; compute gets its own queue when the family has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
    pub compute_queue_index: u32,
}

impl QueueFamilies {
    pub fn select<F>(properties: &[vk::QueueFamilyProperties], supports_present: F) -> Option<Self>
    where
        F: Fn(u32) -> bool,
    {
        let required = vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE;
        let candidates: Vec<u32> = properties
            .iter()
            .enumerate()
            .filter(|(_, props)| props.queue_flags.contains(required) && props.queue_count > 0)
            .map(|(index, _)| index as u32)
            .collect();

        // Prefer a family that can also present
        let graphics = candidates
            .iter()
            .copied()
            .find(|&index| supports_present(index))
            .or_else(|| candidates.first().copied())?;
        let present = if supports_present(graphics) {
            graphics
        } else {
            (0..properties.len() as u32).find(|&index| supports_present(index))?
        };
        let compute_queue_index = if properties[graphics as usize].queue_count > 1 { 1 } else { 0 };

        Some(Self {
            graphics,
            present,
            compute_queue_index,
        })
    }

    pub fn queues_per_family(&self) -> Vec<(u32, u32)> {
        let mut families = vec![(self.graphics, self.compute_queue_index + 1)];
        if self.present != self.graphics {
            families.push((self.present, 1));
        }
        families
    }

    pub fn present_is_separate(&self) -> bool {
        self.present != self.graphics
    }
}
