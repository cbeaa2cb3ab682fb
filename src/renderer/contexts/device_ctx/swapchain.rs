use ash::vk;
use color_eyre::eyre::{bail, OptionExt};
use color_eyre::Result;
use smallvec::SmallVec;
use std::sync::Arc;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::frame_ctx::scheduler::{AcquireOutcome, PresentStatus};
use crate::renderer::contexts::frame_ctx::MAX_FRAMES_IN_FLIGHT;
use crate::renderer::resources::image::{create_image_view, transition_image_layout, Image};
use crate::renderer::util::VkResultExt;

/// Surface capabilities, formats and present modes of one physical device
#[derive(Debug, Clone)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .check(vk::ObjectType::SURFACE_KHR)?,
                formats: surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .check(vk::ObjectType::SURFACE_KHR)?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .check(vk::ObjectType::SURFACE_KHR)?,
            })
        }
    }
}

/// 8-bit sRGB BGRA or RGBA when offered, anywhere in the list, else the first format
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|format| {
            matches!(format.format, vk::Format::B8G8R8A8_SRGB | vk::Format::R8G8B8A8_SRGB)
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// Mailbox, then immediate; FIFO is always available
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|preferred| modes.contains(preferred))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: (u32, u32),
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    let (width, height) = framebuffer_size;
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by frames in flight and by the surface maximum
pub fn requested_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = (capabilities.min_image_count + 1)
        .min(MAX_FRAMES_IN_FLIGHT as u32)
        .max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count = count.min(capabilities.max_image_count);
    }
    count
}

/// Storage usage is only requested when both the surface and the format allow it
pub fn image_usage(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    format_supports_storage: bool,
) -> vk::ImageUsageFlags {
    let mut usage = vk::ImageUsageFlags::COLOR_ATTACHMENT;
    for optional in [vk::ImageUsageFlags::TRANSFER_SRC, vk::ImageUsageFlags::STORAGE] {
        if !capabilities.supported_usage_flags.contains(optional) {
            continue;
        }
        if optional == vk::ImageUsageFlags::STORAGE && !format_supports_storage {
            continue;
        }
        usage |= optional;
    }
    usage
}

/// Presentable image with the layout its last recorded transition left it in
pub struct SwapchainImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    layout: vk::ImageLayout,
}

impl SwapchainImage {
    pub fn new(image: vk::Image, view: vk::ImageView) -> Self {
        Self {
            image,
            view,
            layout: vk::ImageLayout::UNDEFINED,
        }
    }

    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    /// Records the layout a render pass leaves the image in
    pub fn assume_layout(&mut self, layout: vk::ImageLayout) {
        self.layout = layout;
    }

    pub fn expect_layout(&self, expected: vk::ImageLayout) -> Result<()> {
        if self.layout != expected {
            bail!(
                "Swapchain image is in {:?}, expected {:?}",
                self.layout,
                expected,
            );
        }
        Ok(())
    }

    pub fn transition(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    ) -> Result<()> {
        self.expect_layout(from)?;
        transition_image_layout(device, cmd, self.image, vk::ImageAspectFlags::COLOR, from, to);
        self.layout = to;
        Ok(())
    }
}

/// Swapchain with its image views, depth buffer and framebuffers
pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub images: Vec<SwapchainImage>,
    pub framebuffers: Vec<vk::Framebuffer>,

    image_count: u32,
    depth: Option<Image>,
    loader: ash::khr::swapchain::Device,
    device: Arc<ash::Device>,
}

impl Swapchain {
    pub fn new(
        instance: &ash::Instance,
        dev: &RenderDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        framebuffer_size: (u32, u32),
        render_pass: vk::RenderPass,
    ) -> Result<Self> {
        let support = SwapchainSupport::query(dev.physical, surface, surface_loader)?;
        let format = choose_surface_format(&support.formats)
            .ok_or_eyre("Surface reports no formats")?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, framebuffer_size);
        let min_image_count = requested_image_count(&support.capabilities);
        let usage = image_usage(
            &support.capabilities,
            dev.format_supports(format.format, vk::FormatFeatureFlags::STORAGE_IMAGE),
        );

        let pre_transform = if support
            .capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            support.capabilities.current_transform
        };

        let queue_families = [dev.families.graphics, dev.families.present];
        let mut swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(min_image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_usage(usage)
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .image_array_layers(1);
        swapchain_info = if dev.families.present_is_separate() {
            swapchain_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_families)
        } else {
            swapchain_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let loader = ash::khr::swapchain::Device::new(instance, &dev.logical);
        let handle = unsafe { loader.create_swapchain(&swapchain_info, None) }
            .check(vk::ObjectType::SWAPCHAIN_KHR)?;

        // Everything created from here on is released by `destroy` on failure
        let mut swapchain = Self {
            handle,
            format,
            present_mode,
            extent,
            usage,
            images: Vec::new(),
            framebuffers: Vec::new(),
            image_count: 0,
            depth: None,
            loader,
            device: dev.logical.clone(),
        };

        let raw_images = unsafe { swapchain.loader.get_swapchain_images(handle) }
            .check(vk::ObjectType::SWAPCHAIN_KHR)?;
        for image in raw_images {
            let view = create_image_view(&dev.logical, image, format.format, vk::ImageAspectFlags::COLOR)?;
            swapchain.images.push(SwapchainImage::new(image, view));
        }
        swapchain.image_count = (swapchain.images.len() as u32).min(MAX_FRAMES_IN_FLIGHT as u32);

        let depth = Image::new_depth_image(extent.width, extent.height, dev)?;
        for image in &swapchain.images {
            let attachments = [image.view, depth.view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe { dev.logical.create_framebuffer(&framebuffer_info, None) }
                .check(vk::ObjectType::FRAMEBUFFER)?;
            swapchain.framebuffers.push(framebuffer);
        }
        swapchain.depth = Some(depth);

        log::info!(
            "Swapchain {}x{}, {:?} {:?}, {:?}, images requested {} / created {} / used {}",
            extent.width,
            extent.height,
            format.format,
            format.color_space,
            present_mode,
            min_image_count,
            swapchain.images.len(),
            swapchain.image_count,
        );

        Ok(swapchain)
    }

    /// Images addressed by per-slot descriptors, never more than frames in flight
    pub fn image_count(&self) -> u32 {
        self.image_count
    }

    pub fn supports_storage(&self) -> bool {
        self.usage.contains(vk::ImageUsageFlags::STORAGE)
    }

    pub fn supports_transfer_src(&self) -> bool {
        self.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC)
    }

    pub fn acquire_next_image(&self, signal: vk::Semaphore) -> Result<AcquireOutcome> {
        let result = unsafe {
            self.loader
                .acquire_next_image(self.handle, u64::MAX, signal, vk::Fence::null())
        };
        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(err) => Err(err).check(vk::ObjectType::SWAPCHAIN_KHR),
        }
    }

    pub fn present(
        &self,
        queue: vk::Queue,
        wait: vk::Semaphore,
        image_index: u32,
    ) -> Result<PresentStatus> {
        let wait_semaphores = [wait];
        let swapchains = [self.handle];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(err) => Err(err).check(vk::ObjectType::QUEUE),
        }
    }

    pub fn views(&self) -> SmallVec<[vk::ImageView; MAX_FRAMES_IN_FLIGHT]> {
        self.images
            .iter()
            .take(self.image_count as usize)
            .map(|image| image.view)
            .collect()
    }

    /// Frees framebuffers, views, the depth image and the handle; safe to call twice
    pub fn destroy(&mut self) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                self.device.destroy_framebuffer(framebuffer, None);
            }
            for image in self.images.drain(..) {
                self.device.destroy_image_view(image.view, None);
            }
            self.depth = None;
            if self.handle != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.handle, None);
                self.handle = vk::SwapchainKHR::null();
            }
        }
        self.image_count = 0;
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32, current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 2048 },
            ..Default::default()
        }
    }

    #[test]
    fn srgb_format_is_picked_wherever_it_appears() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::A2B10G10R10_UNORM_PACK32,
                color_space: vk::ColorSpaceKHR::HDR10_ST2084_EXT,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[1]));

        let reversed = [formats[1], formats[0]];
        assert_eq!(choose_surface_format(&reversed), Some(formats[1]));
    }

    #[test]
    fn first_format_when_no_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::R16G16B16A16_SFLOAT,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn immediate_preferred_over_fifo_without_mailbox() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::IMMEDIATE);
        let with_mailbox = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(choose_present_mode(&with_mailbox), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&[vk::PresentModeKHR::FIFO]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_uses_current_or_clamps_framebuffer() {
        let fixed = capabilities(2, 3, (800, 600));
        assert_eq!(choose_extent(&fixed, (1024, 768)), vk::Extent2D { width: 800, height: 600 });

        let free = capabilities(2, 3, (u32::MAX, u32::MAX));
        assert_eq!(choose_extent(&free, (1024, 768)), vk::Extent2D { width: 1024, height: 768 });
        assert_eq!(choose_extent(&free, (8000, 0)), vk::Extent2D { width: 4096, height: 1 });
    }

    #[test]
    fn image_count_is_coupled_to_frames_in_flight() {
        assert_eq!(requested_image_count(&capabilities(1, 0, (1, 1))), 2);
        assert_eq!(requested_image_count(&capabilities(2, 8, (1, 1))), 2);
        // A surface minimum above the frame count wins
        assert_eq!(requested_image_count(&capabilities(3, 8, (1, 1))), 3);
        assert_eq!(requested_image_count(&capabilities(1, 1, (1, 1))), 1);
    }

    #[test]
    fn storage_usage_needs_surface_and_format_support() {
        let mut caps = capabilities(2, 3, (1, 1));
        caps.supported_usage_flags = vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::STORAGE;
        assert!(image_usage(&caps, true).contains(vk::ImageUsageFlags::STORAGE));
        assert!(!image_usage(&caps, false).contains(vk::ImageUsageFlags::STORAGE));
        assert!(image_usage(&caps, false).contains(vk::ImageUsageFlags::TRANSFER_SRC));

        caps.supported_usage_flags = vk::ImageUsageFlags::COLOR_ATTACHMENT;
        assert_eq!(image_usage(&caps, true), vk::ImageUsageFlags::COLOR_ATTACHMENT);
    }

    #[test]
    fn layout_tag_rejects_unexpected_prior_layout() {
        use ash::vk::Handle;
        let mut image = SwapchainImage::new(vk::Image::from_raw(1), vk::ImageView::from_raw(2));
        assert_eq!(image.layout(), vk::ImageLayout::UNDEFINED);
        assert!(image.expect_layout(vk::ImageLayout::PRESENT_SRC_KHR).is_err());
        image.assume_layout(vk::ImageLayout::PRESENT_SRC_KHR);
        assert!(image.expect_layout(vk::ImageLayout::PRESENT_SRC_KHR).is_ok());
    }
}
