use std::path::{Path, PathBuf};
use ash::vk;
use chrono::{DateTime, Local};
use color_eyre::eyre::{bail, OptionExt, WrapErr};
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::swapchain::SwapchainImage;

/// `screenshot_YYYYMMDD_HHMMSS_mmm.png`
pub fn screenshot_file_name(time: &DateTime<Local>) -> String {
    format!("screenshot_{}.png", time.format("%Y%m%d_%H%M%S_%3f"))
}

/// Whether pixels read back in `format` need red and blue swapped to become RGBA.
/// `None` for formats that are not 8-bit with four channels.
pub fn needs_red_blue_swap(format: vk::Format) -> Option<bool> {
    match format {
        vk::Format::B8G8R8A8_SRGB | vk::Format::B8G8R8A8_UNORM => Some(true),
        vk::Format::R8G8B8A8_SRGB | vk::Format::R8G8B8A8_UNORM => Some(false),
        _ => None,
    }
}

pub fn swap_red_blue(pixels: &mut [u8]) {
    for pixel in pixels.chunks_exact_mut(4) {
        pixel.swap(0, 2);
    }
}

/// Copies a presented swapchain image into host memory and writes it as PNG.
/// The image must be idle and in PRESENT_SRC_KHR; it is left there.
pub fn capture(
    dev: &RenderDevice,
    image: &mut SwapchainImage,
    format: vk::Format,
    extent: vk::Extent2D,
    directory: &Path,
) -> Result<PathBuf> {
    let Some(swap) = needs_red_blue_swap(format) else {
        bail!("Screenshots of {:?} swapchains are not supported", format);
    };
    let size = extent.width as u64 * extent.height as u64 * 4;
    let staging = dev.create_buffer(
        size,
        vk::BufferUsageFlags::TRANSFER_DST,
        "Screenshot staging",
        MemoryLocation::GpuToCpu,
    )?;

    dev.immediate_submit(|cmd, device| {
        image.transition(
            device,
            cmd,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )?;
        let region = vk::BufferImageCopy::default()
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });
        unsafe {
            device.cmd_copy_image_to_buffer(
                cmd,
                image.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                staging.buffer,
                &[region],
            );
        }
        image.transition(
            device,
            cmd,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )
    })?;

    let mut pixels = staging
        .mapped_bytes()
        .ok_or_eyre("Screenshot staging buffer is not host visible")?
        .get(..size as usize)
        .ok_or_eyre("Screenshot staging buffer is too small")?
        .to_vec();
    if swap {
        swap_red_blue(&mut pixels);
    }

    std::fs::create_dir_all(directory)
        .wrap_err_with(|| format!("Cannot create screenshot directory {}", directory.display()))?;
    let path = directory.join(screenshot_file_name(&Local::now()));
    image::RgbaImage::from_raw(extent.width, extent.height, pixels)
        .ok_or_eyre("Screenshot pixel buffer does not match the extent")?
        .save(&path)
        .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
    log::info!("Saved screenshot {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_name_carries_millisecond_timestamp() {
        let time = Local
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 2)
            .unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(screenshot_file_name(&time), "screenshot_20240309_070502_042.png");
    }

    #[test]
    fn bgra_formats_are_swapped() {
        assert_eq!(needs_red_blue_swap(vk::Format::B8G8R8A8_SRGB), Some(true));
        assert_eq!(needs_red_blue_swap(vk::Format::R8G8B8A8_UNORM), Some(false));
        assert_eq!(needs_red_blue_swap(vk::Format::A2B10G10R10_UNORM_PACK32), None);

        let mut pixels = vec![1, 2, 3, 4, 10, 20, 30, 40];
        swap_red_blue(&mut pixels);
        assert_eq!(pixels, [3, 2, 1, 4, 30, 20, 10, 40]);
    }
}
