use std::sync::Arc;
use std::time::Duration;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use glam::Mat4;
use winit::window::Window;
use crate::config::strip::StageStrip;
use crate::config::{EngineOptions, RuntimeConfig};
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::frame_ctx::scheduler::{
    AcquireOutcome, FrameBackend, FrameInfo, PresentStatus, QueueKind, SwapchainState,
};
use crate::renderer::contexts::frame_ctx::RenderFrameContext;
use crate::renderer::contexts::graph_ctx::{GraphicsTarget, RenderGraphContext};
use crate::renderer::contexts::pipeline_ctx::RenderPipelineContext;
use crate::renderer::contexts::resource_ctx::RenderResourceContext;
use crate::renderer::shader_data::PushConstants;
use crate::world::World;

/// The contexts a frame touches, driven step by step by the frame scheduler.
///
/// Fields drop top to bottom after `Drop` has waited for the device to go idle;
/// the device context goes last.
pub struct RenderBackend {
    pub graph: RenderGraphContext,
    pub pipelines: RenderPipelineContext,
    pub resources: RenderResourceContext,
    pub frames: RenderFrameContext,
    pub world: World,
    pub view: Mat4,
    pub projection: Mat4,
    pub resize_requested: bool,
    pub dev: RenderDeviceContext,
}

impl RenderBackend {
    pub fn new(
        window: Arc<Window>,
        config: &RuntimeConfig,
        options: &EngineOptions,
    ) -> Result<(Self, SwapchainState)> {
        let mut dev = RenderDeviceContext::new(window)?;
        let world = World::new(&config.terrain, &config.world);
        let surface_format = dev.target.surface_format(&dev.device)?;

        let frames = RenderFrameContext::new(&dev.device, options.gpu_trace)?;
        // Storage-image sets are bound once the swapchain exists
        let mut resources = RenderResourceContext::new(&dev.device, &world, &options.asset_dir, &[])?;

        let strip = StageStrip::new(&options.strip, config);
        let pipelines = RenderPipelineContext::new(
            &dev.device,
            config,
            strip.as_ref(),
            resources.descriptors.layout,
            surface_format.format,
            &options.shader_dir,
        )?;
        let graph = RenderGraphContext::new(dev.device.logical.clone(), config, strip);
        graph.plan.log();

        let swapchain = dev.target.create_swapchain(
            &dev.instance.instance,
            &dev.device,
            pipelines.render_pass.handle,
        )?;
        pipelines.check_color_format(swapchain.format.format)?;
        let state = SwapchainState {
            extent: swapchain.extent,
            image_count: swapchain.image_count(),
        };
        resources.rebind_swapchain(&swapchain.views());

        Ok((
            Self {
                graph,
                pipelines,
                resources,
                frames,
                world,
                view: Mat4::IDENTITY,
                projection: Mat4::IDENTITY,
                resize_requested: false,
                dev,
            },
            state,
        ))
    }

    fn push_constants(&self, frame: &FrameInfo) -> PushConstants {
        PushConstants {
            tick: frame.tick,
            day_fraction: self.world.timer.day_fraction(),
        }
    }
}

impl FrameBackend for RenderBackend {
    fn framebuffer_ready(&self) -> bool {
        self.dev.target.framebuffer_ready()
    }

    fn take_resize_request(&mut self) -> bool {
        std::mem::take(&mut self.resize_requested)
    }

    fn wait_for_fence(&mut self, queue: QueueKind, slot: usize) -> Result<()> {
        self.frames.sync.wait(queue, slot)
    }

    fn gpu_time(&mut self, queue: QueueKind, slot: usize) -> Result<Option<Duration>> {
        self.frames.gpu_time(queue, slot)
    }

    fn reset_fence(&mut self, queue: QueueKind, slot: usize) -> Result<()> {
        self.frames.sync.reset(queue, slot)
    }

    fn reset_commands(&mut self, queue: QueueKind, slot: usize) -> Result<()> {
        self.frames.reset_commands(queue, slot)
    }

    fn update_uniforms(&mut self, slot: usize) -> Result<()> {
        self.world.timer.run();
        let data = self.world.uniform_data(self.view, self.projection);
        self.resources.uniforms.update(slot, &data)
    }

    fn record_compute(&mut self, frame: &FrameInfo) -> Result<()> {
        let constants = self.push_constants(frame);
        let cmd = self.frames.begin(QueueKind::Compute, frame.slot)?;
        self.graph.record_compute(
            cmd,
            frame,
            &self.pipelines,
            &self.resources,
            &constants,
            self.frames.timestamps.as_mut(),
        );
        self.frames.end(QueueKind::Compute, frame.slot)
    }

    fn submit_compute(&mut self, slot: usize) -> Result<()> {
        self.frames
            .submit_compute(self.dev.device.compute_queue.handle, slot)
    }

    fn drain_compute_signal(&mut self, slot: usize) -> Result<()> {
        // Same queue the graphics submission would have waited on
        self.frames
            .drain_compute_signal(self.dev.device.graphics_queue.handle, slot)
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        self.dev
            .target
            .swapchain()?
            .acquire_next_image(self.frames.sync.image_available[slot])
    }

    fn record_graphics(&mut self, frame: &FrameInfo, image_index: u32) -> Result<()> {
        let constants = self.push_constants(frame);
        let cmd = self.frames.begin(QueueKind::Graphics, frame.slot)?;

        let swapchain = self.dev.target.swapchain_mut()?;
        let framebuffer = *swapchain
            .framebuffers
            .get(image_index as usize)
            .ok_or_eyre("Acquired image has no framebuffer")?;
        let extent = swapchain.extent;
        let storage_supported = swapchain.supports_storage();
        let image = swapchain
            .images
            .get_mut(image_index as usize)
            .ok_or_eyre("Acquired image index is out of range")?;
        let target = GraphicsTarget {
            framebuffer,
            extent,
            image_index,
            image,
            storage_supported,
        };
        self.graph.record_graphics(
            cmd,
            frame,
            target,
            &self.pipelines,
            &self.resources,
            &constants,
            self.frames.timestamps.as_mut(),
        )?;
        self.frames.end(QueueKind::Graphics, frame.slot)
    }

    fn submit_graphics(&mut self, slot: usize) -> Result<()> {
        self.frames
            .submit_graphics(self.dev.device.graphics_queue.handle, slot)
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentStatus> {
        self.dev.target.swapchain()?.present(
            self.dev.device.present_queue.handle,
            self.frames.sync.render_finished[slot],
            image_index,
        )
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.dev.device.wait_idle()
    }

    fn destroy_swapchain(&mut self) {
        self.dev.target.destroy_swapchain();
    }

    fn create_swapchain(&mut self) -> Result<SwapchainState> {
        let swapchain = self.dev.target.create_swapchain(
            &self.dev.instance.instance,
            &self.dev.device,
            self.pipelines.render_pass.handle,
        )?;
        self.pipelines.check_color_format(swapchain.format.format)?;
        Ok(SwapchainState {
            extent: swapchain.extent,
            image_count: swapchain.image_count(),
        })
    }

    fn rewrite_descriptors(&mut self) -> Result<()> {
        let views = self.dev.target.swapchain()?.views();
        self.resources.rebind_swapchain(&views);
        Ok(())
    }
}

impl Drop for RenderBackend {
    fn drop(&mut self) {
        if let Err(err) = self.dev.device.wait_idle() {
            log::error!("Failed to wait for device idle on shutdown: {err}");
        }
    }
}
