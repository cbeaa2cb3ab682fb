use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::util::VkResultExt;

pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

pub struct ImageCreateInfo<'a> {
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub name: &'a str,
}

/// GPU-only image with its view
pub struct Image {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub aspect: vk::ImageAspectFlags,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Image {
    // The returned image has undefined contents; color images are filled by `upload`
    fn new(
        create_info: &ImageCreateInfo,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let image = {
            let info = vk::ImageCreateInfo::default()
                .format(create_info.format)
                .usage(create_info.usage)
                .extent(create_info.extent)
                .image_type(vk::ImageType::TYPE_2D)
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            unsafe { device.create_image(&info, None) }.check(vk::ObjectType::IMAGE)?
        };
        let reqs = unsafe { device.get_image_memory_requirements(image) };
        let allocation = memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name: create_info.name,
                requirements: reqs,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::DedicatedImage(image),
            });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { device.destroy_image(image, None) };
                return Err(eyre!("Failed to allocate memory for image '{}': {}", create_info.name, err));
            }
        };
        unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) }
            .check(vk::ObjectType::IMAGE)?;
        let view = create_image_view(&device, image, create_info.format, create_info.aspect)?;

        Ok(Self {
            image,
            view,
            format: create_info.format,
            extent: create_info.extent,
            aspect: create_info.aspect,

            allocation: Some(allocation),
            memory_allocator,
            device,
        })
    }

    /// Sampled RGBA8 image filled from tightly packed pixels, left in SHADER_READ_ONLY_OPTIMAL
    pub fn new_color_image(
        data: &[u8],
        width: u32,
        height: u32,
        dev: &RenderDevice,
    ) -> Result<Self> {
        let create_info = ImageCreateInfo {
            format: vk::Format::R8G8B8A8_SRGB,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            aspect: vk::ImageAspectFlags::COLOR,
            name: "Color Image",
        };
        let image = Self::new(&create_info, dev.allocator(), dev.logical.clone())?;
        image.upload(data, dev)?;
        Ok(image)
    }

    pub fn new_depth_image(
        width: u32,
        height: u32,
        dev: &RenderDevice,
    ) -> Result<Self> {
        let create_info = ImageCreateInfo {
            format: DEPTH_FORMAT,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH,
            name: "Depth Image",
        };
        Self::new(&create_info, dev.allocator(), dev.logical.clone())
    }

    fn upload(&self, data: &[u8], dev: &RenderDevice) -> Result<()> {
        let mut staging_buffer = dev.create_buffer(
            data.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            "Image staging buffer",
            MemoryLocation::CpuToGpu,
        )?;
        staging_buffer.write(data, 0)?;

        dev.immediate_submit(|cmd, device| {
            transition_image_layout(
                device,
                cmd,
                self.image,
                self.aspect,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );

            let copy_region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: self.aspect,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_extent: self.extent,
                ..Default::default()
            };
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging_buffer.buffer,
                    self.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[copy_region],
                );
            }

            transition_image_layout(
                device,
                cmd,
                self.image,
                self.aspect,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
            Ok(())
        })
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(err) = allocator.free(allocation) {
                        log::error!("Failed to free image memory: {err}");
                    }
                }
                Err(err) => log::error!("Allocator lock poisoned while freeing image: {err}"),
            }
        }
        unsafe {
            self.device.destroy_image(self.image, None);
        }
    }
}

pub fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::default()
        .view_type(vk::ImageViewType::TYPE_2D)
        .image(image)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::R,
            g: vk::ComponentSwizzle::G,
            b: vk::ComponentSwizzle::B,
            a: vk::ComponentSwizzle::A,
        })
        .subresource_range(subresource_range(aspect));
    unsafe { device.create_image_view(&info, None) }.check(vk::ObjectType::IMAGE_VIEW)
}

pub fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Access masks and stages that must finish before an image leaves `layout`
pub fn layout_access(layout: vk::ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match layout {
        vk::ImageLayout::UNDEFINED => (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
            (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER)
        }
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => {
            (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER)
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
            (vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER)
        }
        vk::ImageLayout::GENERAL => (
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
            vk::PipelineStageFlags::COMPUTE_SHADER,
        ),
        vk::ImageLayout::PRESENT_SRC_KHR => (
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        _ => (
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            vk::PipelineStageFlags::ALL_COMMANDS,
        ),
    }
}

/// Access masks and stages that wait for an image entering `layout`. The presentation
/// engine is synchronized by the present semaphore, so nothing in the queue waits on it.
pub fn destination_access(layout: vk::ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match layout {
        vk::ImageLayout::PRESENT_SRC_KHR => {
            (vk::AccessFlags::empty(), vk::PipelineStageFlags::BOTTOM_OF_PIPE)
        }
        _ => layout_access(layout),
    }
}

pub fn transition_image_layout(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    if old_layout == new_layout {
        return;
    }
    let (src_access_mask, src_stage) = layout_access(old_layout);
    let (dst_access_mask, dst_stage) = destination_access(new_layout);
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_access_mask(src_access_mask)
        .dst_access_mask(dst_access_mask)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource_range(aspect));
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_compute_layouts_sync_against_the_right_stages() {
        let (access, stage) = layout_access(vk::ImageLayout::GENERAL);
        assert_eq!(stage, vk::PipelineStageFlags::COMPUTE_SHADER);
        assert!(access.contains(vk::AccessFlags::SHADER_WRITE));

        let (access, stage) = layout_access(vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

        let (_, stage) = layout_access(vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        assert_eq!(stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn returning_to_present_waits_on_nothing() {
        let (access, stage) = destination_access(vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(access, vk::AccessFlags::empty());
        assert_eq!(stage, vk::PipelineStageFlags::BOTTOM_OF_PIPE);

        let (access, stage) = destination_access(vk::ImageLayout::GENERAL);
        assert_eq!(stage, vk::PipelineStageFlags::COMPUTE_SHADER);
        assert!(access.contains(vk::AccessFlags::SHADER_READ));

        let (access, stage) = destination_access(vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        assert_eq!((access, stage), (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER));
    }

    #[test]
    fn subresource_covers_one_level_and_layer() {
        let range = subresource_range(vk::ImageAspectFlags::DEPTH);
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::DEPTH);
        assert_eq!((range.level_count, range.layer_count), (1, 1));
    }
}
