pub mod descriptor;
pub mod descriptor_set_layout_builder;
pub mod geometry;
pub mod sampler;
pub mod storage;
pub mod storage_image;
pub mod uniform;

use std::path::Path;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::resource_ctx::descriptor::DescriptorInterface;
use crate::renderer::contexts::resource_ctx::geometry::GeometryBuffers;
use crate::renderer::contexts::resource_ctx::sampler::ImageSampler;
use crate::renderer::contexts::resource_ctx::storage::StoragePair;
use crate::renderer::contexts::resource_ctx::storage_image::StorageImage;
use crate::renderer::contexts::resource_ctx::uniform::UniformBuffers;
use crate::world::World;

/// Responsibilities:
/// - Own every buffer and image the pipelines read
/// - Assign binding numbers and keep the per-slot descriptor sets current
pub struct RenderResourceContext {
    pub uniforms: UniformBuffers,
    pub cells: StoragePair,
    pub sampler: ImageSampler,
    pub storage_image: StorageImage,
    pub geometry: GeometryBuffers,
    // Dropped last so no set outlives the resources it names
    pub descriptors: DescriptorInterface,
}

impl RenderResourceContext {
    pub fn new(
        dev: &RenderDevice,
        world: &World,
        asset_dir: &Path,
        swapchain_views: &[vk::ImageView],
    ) -> Result<Self> {
        let mut descriptors = DescriptorInterface::new(dev.logical.clone());

        // Claim order fixes the binding numbers the shaders use
        let uniforms = UniformBuffers::new(dev, &mut descriptors.table)?;
        let cells = StoragePair::new(dev, &mut descriptors.table, &world.grid.cells)?;
        let sampler = ImageSampler::new(dev, &mut descriptors.table, asset_dir)?;
        let mut storage_image = StorageImage::new(&mut descriptors.table)?;
        storage_image.bind(&mut descriptors.table, swapchain_views);

        let geometry = GeometryBuffers::new(dev, world)?;
        descriptors.initialize_sets()?;
        log::debug!("Descriptor table: {} bindings claimed", descriptors.table.claimed());

        Ok(Self {
            uniforms,
            cells,
            sampler,
            storage_image,
            geometry,
            descriptors,
        })
    }

    /// Points the storage-image binding at a rebuilt swapchain and rewrites all sets
    pub fn rebind_swapchain(&mut self, swapchain_views: &[vk::ImageView]) {
        self.storage_image.bind(&mut self.descriptors.table, swapchain_views);
        self.descriptors.update_sets();
    }
}
