use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::frame_ctx::MAX_FRAMES_IN_FLIGHT;
use crate::renderer::contexts::resource_ctx::descriptor::{DescriptorKind, DescriptorTable, DescriptorTarget};
use crate::renderer::resources::texture::ColorTexture;
use crate::renderer::util::VkResultExt;

/// Texture sampled by the fragment stages, shared by all frame slots
pub struct ImageSampler {
    pub my_index: usize,
    pub texture: ColorTexture,
    pub sampler: vk::Sampler,
    device: Arc<ash::Device>,
}

impl ImageSampler {
    pub fn new(dev: &RenderDevice, table: &mut DescriptorTable, asset_dir: &Path) -> Result<Self> {
        let my_index = table.claim(DescriptorKind::ImageSampler)?;
        let texture = ColorTexture::load(asset_dir, dev)?;

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .compare_op(vk::CompareOp::ALWAYS)
            .max_lod(vk::LOD_CLAMP_NONE);
        let sampler = unsafe { dev.logical.create_sampler(&sampler_info, None) }
            .check(vk::ObjectType::SAMPLER)?;

        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            table.set_target(slot, my_index, Some(DescriptorTarget::Image {
                view: texture.image.view,
                sampler,
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }));
        }

        Ok(Self {
            my_index,
            texture,
            sampler,
            device: dev.logical.clone(),
        })
    }
}

impl Drop for ImageSampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}
