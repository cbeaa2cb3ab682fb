pub mod camera;
pub mod shader_data;
pub mod util;

mod backend;
pub(crate) mod contexts;
mod resources;
mod screenshot;

use std::path::PathBuf;
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use winit::window::Window;
use crate::config::{EngineOptions, RuntimeConfig};
use crate::renderer::backend::RenderBackend;
use crate::renderer::camera::Camera;
use crate::renderer::contexts::frame_ctx::scheduler::{FrameOutcome, FrameScheduler, QueueKind};

/// Presented frames to wait for before the startup screenshot is taken
const STARTUP_SCREENSHOT_FRAME: u64 = 3;

pub struct Renderer {
    scheduler: FrameScheduler,
    backend: RenderBackend,

    screenshot_requested: bool,
    startup_screenshot_pending: bool,
    presented_frames: u64,
    screenshot_dir: PathBuf,
}

impl Renderer {
    pub fn new(
        window: Arc<Window>,
        config: &RuntimeConfig,
        options: &EngineOptions,
    ) -> Result<Self> {
        let (backend, swapchain) = RenderBackend::new(window, config, options)?;
        let scheduler = FrameScheduler::new(swapchain, options.frame_profile || options.gpu_trace);

        Ok(Self {
            scheduler,
            backend,

            screenshot_requested: false,
            startup_screenshot_pending: options.startup_screenshot,
            presented_frames: 0,
            screenshot_dir: options.screenshot_dir.clone(),
        })
    }

    pub fn request_resize(&mut self) {
        self.backend.resize_requested = true;
    }

    pub fn request_screenshot(&mut self) {
        self.screenshot_requested = true;
    }

    /// Frames are skipped while the window has no drawable area
    pub fn is_idle(&self) -> bool {
        !self.backend.dev.target.framebuffer_ready()
    }

    pub fn update_camera(&mut self, camera: &Camera) {
        let extent = self.scheduler.swapchain().extent;
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        self.backend.view = camera.get_view_mat();
        self.backend.projection = camera.get_proj_mat(aspect);
    }

    pub fn draw(&mut self) -> Result<()> {
        match self.scheduler.draw_frame(&mut self.backend)? {
            FrameOutcome::Submitted { .. } => {
                self.presented_frames += 1;
            }
            FrameOutcome::Aborted | FrameOutcome::Skipped => return Ok(()),
        }

        if self.startup_screenshot_pending && self.presented_frames >= STARTUP_SCREENSHOT_FRAME {
            self.startup_screenshot_pending = false;
            self.screenshot_requested = true;
        }
        if std::mem::take(&mut self.screenshot_requested) {
            // A failed capture should not take the renderer down with it
            if let Err(err) = self.take_screenshot() {
                log::error!("Screenshot failed: {err:#}");
            }
        }
        Ok(())
    }

    fn take_screenshot(&mut self) -> Result<()> {
        let Some((image_index, slot)) = self.scheduler.last_presented() else {
            log::warn!("No frame has been presented yet, skipping screenshot");
            return Ok(());
        };
        self.backend.frames.sync.wait(QueueKind::Graphics, slot)?;

        let dev = &self.backend.dev.device;
        let swapchain = self.backend.dev.target.swapchain_mut()?;
        if !swapchain.supports_transfer_src() {
            log::warn!("Swapchain images cannot be copied from, skipping screenshot");
            return Ok(());
        }
        let format = swapchain.format.format;
        let extent = swapchain.extent;
        let Some(image) = swapchain.images.get_mut(image_index as usize) else {
            log::warn!("Presented image {} no longer exists, skipping screenshot", image_index);
            return Ok(());
        };
        if image.layout() != vk::ImageLayout::PRESENT_SRC_KHR {
            log::warn!("Presented image {} was not rendered since the swapchain was rebuilt", image_index);
            return Ok(());
        }

        screenshot::capture(dev, image, format, extent, &self.screenshot_dir)?;
        Ok(())
    }
}
