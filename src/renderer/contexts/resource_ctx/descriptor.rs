use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::bail;
use color_eyre::Result;
use crate::renderer::contexts::frame_ctx::MAX_FRAMES_IN_FLIGHT;
use crate::renderer::contexts::resource_ctx::descriptor_set_layout_builder::DescriptorSetLayoutBuilder;
use crate::renderer::util::VkResultExt;

/// Capacity of the binding table shared by every pipeline
pub const NUM_DESCRIPTORS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Uniform,
    StoragePair,
    ImageSampler,
    StorageImage,
}

impl DescriptorKind {
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            Self::Uniform => vk::DescriptorType::UNIFORM_BUFFER,
            Self::StoragePair => vk::DescriptorType::STORAGE_BUFFER,
            Self::ImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            Self::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        }
    }

    /// Consecutive bindings claimed by one resource of this kind
    pub fn binding_count(&self) -> usize {
        match self {
            Self::StoragePair => 2,
            _ => 1,
        }
    }

    pub fn stages(&self) -> vk::ShaderStageFlags {
        match self {
            Self::ImageSampler => vk::ShaderStageFlags::FRAGMENT,
            Self::StorageImage => vk::ShaderStageFlags::COMPUTE,
            _ => vk::ShaderStageFlags::ALL_GRAPHICS | vk::ShaderStageFlags::COMPUTE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorTarget {
    Buffer {
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    },
    Image {
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    },
}

/// Binding numbers handed out in construction order, plus what each frame slot's
/// copy of every binding points at
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    write_index: usize,
    types: [Option<DescriptorKind>; NUM_DESCRIPTORS],
    targets: [[Option<DescriptorTarget>; NUM_DESCRIPTORS]; MAX_FRAMES_IN_FLIGHT],
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self {
            write_index: 0,
            types: [None; NUM_DESCRIPTORS],
            targets: [[None; NUM_DESCRIPTORS]; MAX_FRAMES_IN_FLIGHT],
        }
    }
}

impl DescriptorTable {
    /// Returns the first binding claimed by the caller
    pub fn claim(&mut self, kind: DescriptorKind) -> Result<usize> {
        let my_index = self.write_index;
        let end = my_index + kind.binding_count();
        if end > NUM_DESCRIPTORS {
            bail!(
                "{:?} needs bindings {}..{}, table holds {}",
                kind,
                my_index,
                end,
                NUM_DESCRIPTORS,
            );
        }
        for binding in my_index..end {
            self.types[binding] = Some(kind);
        }
        self.write_index = end;
        Ok(my_index)
    }

    pub fn claimed(&self) -> usize {
        self.write_index
    }

    pub fn set_target(&mut self, slot: usize, binding: usize, target: Option<DescriptorTarget>) {
        self.targets[slot][binding] = target;
    }

    pub fn target(&self, slot: usize, binding: usize) -> Option<DescriptorTarget> {
        self.targets[slot][binding]
    }

    pub fn bindings(&self) -> impl Iterator<Item = (u32, DescriptorKind)> + '_ {
        self.types
            .iter()
            .enumerate()
            .filter_map(|(binding, kind)| kind.map(|kind| (binding as u32, kind)))
    }

    /// Per-type descriptor counts for one set per frame slot
    pub fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for (_, kind) in self.bindings() {
            let ty = kind.descriptor_type();
            match sizes.iter_mut().find(|size| size.ty == ty) {
                Some(size) => size.descriptor_count += MAX_FRAMES_IN_FLIGHT as u32,
                None => sizes.push(vk::DescriptorPoolSize {
                    ty,
                    descriptor_count: MAX_FRAMES_IN_FLIGHT as u32,
                }),
            }
        }
        sizes
    }
}

/// Layout, pool and one descriptor set per frame slot, written from a `DescriptorTable`
pub struct DescriptorInterface {
    pub table: DescriptorTable,
    pub layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    sets: [vk::DescriptorSet; MAX_FRAMES_IN_FLIGHT],
    device: Arc<ash::Device>,
}

impl DescriptorInterface {
    pub fn new(device: Arc<ash::Device>) -> Self {
        Self {
            table: DescriptorTable::default(),
            layout: vk::DescriptorSetLayout::null(),
            pool: vk::DescriptorPool::null(),
            sets: [vk::DescriptorSet::null(); MAX_FRAMES_IN_FLIGHT],
            device,
        }
    }

    /// Builds the layout from every claimed binding, then allocates and writes the sets
    pub fn initialize_sets(&mut self) -> Result<()> {
        let layout = self
            .table
            .bindings()
            .fold(DescriptorSetLayoutBuilder::new(), |builder, (binding, kind)| builder.with_kind(binding, kind))
            .build(&self.device)?;
        self.layout = layout;

        let pool_sizes = self.table.pool_sizes();
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(MAX_FRAMES_IN_FLIGHT as u32);
        self.pool = unsafe { self.device.create_descriptor_pool(&pool_info, None) }
            .check(vk::ObjectType::DESCRIPTOR_POOL)?;

        let layouts = [self.layout; MAX_FRAMES_IN_FLIGHT];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        let sets = unsafe { self.device.allocate_descriptor_sets(&allocate_info) }
            .check(vk::ObjectType::DESCRIPTOR_SET)?;
        self.sets.copy_from_slice(&sets);

        self.update_sets();
        Ok(())
    }

    pub fn set(&self, slot: usize) -> vk::DescriptorSet {
        self.sets[slot]
    }

    /// Writes every slot's targets into that slot's set. Bindings without a target are left alone.
    pub fn update_sets(&self) {
        for (slot, set) in self.sets.iter().enumerate() {
            let mut buffer_infos = Vec::with_capacity(NUM_DESCRIPTORS);
            let mut image_infos = Vec::with_capacity(NUM_DESCRIPTORS);
            let mut pending = Vec::with_capacity(NUM_DESCRIPTORS);
            for (binding, kind) in self.table.bindings() {
                match self.table.target(slot, binding as usize) {
                    Some(DescriptorTarget::Buffer { buffer, range }) => {
                        pending.push((binding, kind, false, buffer_infos.len()));
                        buffer_infos.push(vk::DescriptorBufferInfo {
                            buffer,
                            offset: 0,
                            range,
                        });
                    }
                    Some(DescriptorTarget::Image { view, sampler, layout }) => {
                        pending.push((binding, kind, true, image_infos.len()));
                        image_infos.push(vk::DescriptorImageInfo {
                            sampler,
                            image_view: view,
                            image_layout: layout,
                        });
                    }
                    None => {}
                }
            }

            let writes: Vec<vk::WriteDescriptorSet> = pending
                .iter()
                .map(|&(binding, kind, is_image, info)| {
                    let write = vk::WriteDescriptorSet::default()
                        .dst_set(*set)
                        .dst_binding(binding)
                        .descriptor_type(kind.descriptor_type());
                    if is_image {
                        write.image_info(&image_infos[info..info + 1])
                    } else {
                        write.buffer_info(&buffer_infos[info..info + 1])
                    }
                })
                .collect();
            log::trace!("Writing {} descriptors into set {}", writes.len(), slot);
            unsafe {
                self.device.update_descriptor_sets(&writes, &[]);
            }
        }
    }
}

impl Drop for DescriptorInterface {
    fn drop(&mut self) {
        unsafe {
            // Sets are freed with their pool
            if self.pool != vk::DescriptorPool::null() {
                self.device.destroy_descriptor_pool(self.pool, None);
            }
            if self.layout != vk::DescriptorSetLayout::null() {
                self.device.destroy_descriptor_set_layout(self.layout, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn steady_state_resources_fit_the_table() {
        let mut table = DescriptorTable::default();
        let uniform = table.claim(DescriptorKind::Uniform).unwrap();
        let storage = table.claim(DescriptorKind::StoragePair).unwrap();
        let sampler = table.claim(DescriptorKind::ImageSampler).unwrap();
        let image = table.claim(DescriptorKind::StorageImage).unwrap();

        assert_eq!((uniform, storage, sampler, image), (0, 1, 3, 4));
        assert!(table.claimed() <= NUM_DESCRIPTORS);
        assert_eq!(table.claimed(), NUM_DESCRIPTORS);
    }

    #[test]
    fn claims_past_capacity_are_rejected() {
        let mut table = DescriptorTable::default();
        for _ in 0..2 {
            table.claim(DescriptorKind::StoragePair).unwrap();
        }
        assert!(table.claim(DescriptorKind::StoragePair).is_err());
        assert_eq!(table.claimed(), 4);
        table.claim(DescriptorKind::Uniform).unwrap();
        assert!(table.claim(DescriptorKind::Uniform).is_err());
        assert_eq!(table.claimed(), NUM_DESCRIPTORS);
    }

    #[test]
    fn pool_is_sized_per_type_times_frames() {
        let mut table = DescriptorTable::default();
        table.claim(DescriptorKind::Uniform).unwrap();
        table.claim(DescriptorKind::StoragePair).unwrap();
        table.claim(DescriptorKind::ImageSampler).unwrap();

        let sizes = table.pool_sizes();
        let count = |ty| sizes.iter().find(|s| s.ty == ty).map(|s| s.descriptor_count);
        let frames = MAX_FRAMES_IN_FLIGHT as u32;
        assert_eq!(count(vk::DescriptorType::UNIFORM_BUFFER), Some(frames));
        assert_eq!(count(vk::DescriptorType::STORAGE_BUFFER), Some(2 * frames));
        assert_eq!(count(vk::DescriptorType::COMBINED_IMAGE_SAMPLER), Some(frames));
        assert_eq!(count(vk::DescriptorType::STORAGE_IMAGE), None);
    }

    #[test]
    fn targets_are_tracked_per_slot() {
        let mut table = DescriptorTable::default();
        let index = table.claim(DescriptorKind::Uniform).unwrap();
        let target = DescriptorTarget::Buffer {
            buffer: vk::Buffer::from_raw(7),
            range: 240,
        };
        table.set_target(1, index, Some(target));
        assert_eq!(table.target(0, index), None);
        assert_eq!(table.target(1, index), Some(target));
        assert_eq!(table.bindings().collect::<Vec<_>>(), vec![(0, DescriptorKind::Uniform)]);
    }
}
