use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::swapchain::{choose_surface_format, Swapchain, SwapchainSupport};

/// Presentation target of the renderer: the window, its surface and the current swapchain
pub struct RenderTarget {
    pub window: Arc<Window>,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,

    swapchain: Option<Swapchain>,
}

impl RenderTarget {
    pub fn new(
        window: Arc<Window>,
        surface: (vk::SurfaceKHR, ash::khr::surface::Instance),
    ) -> Self {
        let (surface, surface_loader) = surface;
        Self {
            window,
            surface,
            surface_loader,
            swapchain: None,
        }
    }

    pub fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    /// A minimized window reports 0x0, which no swapchain can be built for
    pub fn framebuffer_ready(&self) -> bool {
        let (width, height) = self.framebuffer_size();
        width > 0 && height > 0
    }

    /// Format the next swapchain will be created with
    pub fn surface_format(&self, dev: &RenderDevice) -> Result<vk::SurfaceFormatKHR> {
        let support = SwapchainSupport::query(dev.physical, self.surface, &self.surface_loader)?;
        choose_surface_format(&support.formats).ok_or_eyre("Surface reports no formats")
    }

    pub fn swapchain(&self) -> Result<&Swapchain> {
        self.swapchain.as_ref().ok_or_eyre("Swapchain has not been created")
    }

    pub fn swapchain_mut(&mut self) -> Result<&mut Swapchain> {
        self.swapchain.as_mut().ok_or_eyre("Swapchain has not been created")
    }

    pub fn create_swapchain(
        &mut self,
        instance: &ash::Instance,
        dev: &RenderDevice,
        render_pass: vk::RenderPass,
    ) -> Result<&Swapchain> {
        self.destroy_swapchain();
        let swapchain = Swapchain::new(
            instance,
            dev,
            self.surface,
            &self.surface_loader,
            self.framebuffer_size(),
            render_pass,
        )?;
        Ok(self.swapchain.insert(swapchain))
    }

    pub fn destroy_swapchain(&mut self) {
        if let Some(mut swapchain) = self.swapchain.take() {
            swapchain.destroy();
        }
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        self.destroy_swapchain();
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
