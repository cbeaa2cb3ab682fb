pub mod device;
pub mod instance;
pub mod queue;
pub mod single_use;
pub mod swapchain;
pub mod target;

use std::sync::Arc;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::target::RenderTarget;

/// Responsibilities:
/// - Own the Vulkan instance, the logical device and its queues
/// - Own the window surface and the swapchain built on it
///
/// Fields drop top to bottom: the target needs the device, the device needs the instance.
pub struct RenderDeviceContext {
    pub target: RenderTarget,
    pub device: RenderDevice,
    pub instance: RenderInstance,
}

impl RenderDeviceContext {
    pub fn new(window: Arc<Window>) -> Result<Self> {
        let instance = RenderInstance::new(&window)?;
        let surface = instance.create_surface(&window)?;
        let target = RenderTarget::new(window, surface);
        let device = RenderDevice::new(&instance, target.surface, &target.surface_loader)?;

        Ok(Self {
            target,
            device,
            instance,
        })
    }
}
