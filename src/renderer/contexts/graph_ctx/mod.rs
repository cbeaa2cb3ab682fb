pub mod draw;

use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::config::graph::ExecutionPlan;
use crate::config::pipeline::DrawOpId;
use crate::config::strip::StageStrip;
use crate::config::RuntimeConfig;
use crate::renderer::contexts::device_ctx::swapchain::SwapchainImage;
use crate::renderer::contexts::frame_ctx::gpu_timer::GpuTimestamps;
use crate::renderer::contexts::frame_ctx::scheduler::{FrameInfo, QueueKind};
use crate::renderer::contexts::graph_ctx::draw::record_draw;
use crate::renderer::contexts::pipeline_ctx::pipeline::Pipeline;
use crate::renderer::contexts::pipeline_ctx::render_pass::CLEAR_DEPTH;
use crate::renderer::contexts::pipeline_ctx::work_groups::{grid_extent, resolve};
use crate::renderer::contexts::pipeline_ctx::{RenderPipelineContext, SEED_PIPELINE, SKY_PIPELINE};
use crate::renderer::contexts::resource_ctx::RenderResourceContext;
use crate::renderer::shader_data::PushConstants;

/// Pre-compute passes of one frame; the seed pass runs once, ahead of the plan
pub fn compute_passes<'a>(pre_compute: &'a [String], seed_cells: bool, has_seed: bool) -> Vec<&'a str> {
    let seed: Option<&'a str> = (seed_cells && has_seed).then_some(SEED_PIPELINE);
    seed.into_iter()
        .chain(pre_compute.iter().map(String::as_str))
        .collect()
}

/// Pipelines drawn inside one strip tile, the sky behind everything else
pub fn tile_draw_list<'a>(pipelines: &'a [String]) -> Vec<&'a str> {
    let has_sky = pipelines.iter().any(|name| name == SKY_PIPELINE);
    let sky: Option<&'a str> = (!has_sky).then_some(SKY_PIPELINE);
    sky.into_iter()
        .chain(pipelines.iter().map(String::as_str))
        .collect()
}

pub fn full_viewport(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    (viewport, scissor)
}

/// Where the graphics commands of a frame render to
pub struct GraphicsTarget<'a> {
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub image_index: u32,
    pub image: &'a mut SwapchainImage,
    pub storage_supported: bool,
}

/// Responsibilities:
/// - Hold the execution plan and the optional debug strip
/// - Record the compute and graphics command buffers of a frame in plan order
pub struct RenderGraphContext {
    pub plan: ExecutionPlan,
    pub strip: Option<StageStrip>,
    grid_extent: vk::Extent2D,
    device: Arc<ash::Device>,
}

impl RenderGraphContext {
    pub fn new(device: Arc<ash::Device>, config: &RuntimeConfig, strip: Option<StageStrip>) -> Self {
        let plan = config.execution_plan();
        for name in &plan.graphics {
            if config.draw_op(name) == DrawOpId::Unknown {
                log::warn!("Graphics pipeline {} has no draw op and will not draw", name);
            }
        }
        if let Some(strip) = &strip {
            log::info!("Debug strip with {} tiles", strip.tiles.len());
        }

        Self {
            plan,
            strip,
            grid_extent: grid_extent(config.terrain.grid_width, config.terrain.grid_height),
            device,
        }
    }

    pub fn has_post_compute(&self) -> bool {
        !self.plan.post_compute.is_empty()
    }

    /// Binds the slot's set and dispatches the pre-compute chain, with a barrier
    /// between passes so each one sees the previous pass's writes
    pub fn record_compute(
        &self,
        cmd: vk::CommandBuffer,
        frame: &FrameInfo,
        pipelines: &RenderPipelineContext,
        resources: &RenderResourceContext,
        constants: &PushConstants,
        mut timestamps: Option<&mut GpuTimestamps>,
    ) {
        if let Some(timestamps) = timestamps.as_deref_mut() {
            timestamps.begin(cmd, QueueKind::Compute, frame.slot);
        }
        let has_seed = pipelines.get(SEED_PIPELINE).is_some();
        let passes = compute_passes(&self.plan.pre_compute, frame.seed_cells, has_seed);
        let set = resources.descriptors.set(frame.slot);
        self.dispatch_chain(cmd, &passes, pipelines, set, constants, self.grid_extent);
        if let Some(timestamps) = timestamps {
            timestamps.end(cmd, QueueKind::Compute, frame.slot);
        }
    }

    /// Timestamps, when enabled, bracket the render pass and any post-compute
    #[allow(clippy::too_many_arguments)]
    pub fn record_graphics(
        &self,
        cmd: vk::CommandBuffer,
        frame: &FrameInfo,
        mut target: GraphicsTarget<'_>,
        pipelines: &RenderPipelineContext,
        resources: &RenderResourceContext,
        constants: &PushConstants,
        mut timestamps: Option<&mut GpuTimestamps>,
    ) -> Result<()> {
        if let Some(timestamps) = timestamps.as_deref_mut() {
            timestamps.begin(cmd, QueueKind::Graphics, frame.slot);
        }
        let set = resources.descriptors.set(frame.slot);
        pipelines.render_pass.begin(cmd, target.framebuffer, target.extent);

        let (viewport, scissor) = full_viewport(target.extent);
        self.set_viewport(cmd, viewport, scissor);
        for name in &self.plan.graphics {
            self.draw_pipeline(cmd, name, frame.slot, pipelines, resources, set, constants);
        }
        if let Some(strip) = &self.strip {
            self.record_strip(cmd, strip, target.extent, frame.slot, pipelines, resources, set, constants);
        }

        pipelines.render_pass.end(cmd);
        target.image.assume_layout(vk::ImageLayout::PRESENT_SRC_KHR);

        if self.has_post_compute() {
            self.record_post_compute(cmd, &mut target, pipelines, resources, constants)?;
        }
        if let Some(timestamps) = timestamps {
            timestamps.end(cmd, QueueKind::Graphics, frame.slot);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_pipeline(
        &self,
        cmd: vk::CommandBuffer,
        name: &str,
        slot: usize,
        pipelines: &RenderPipelineContext,
        resources: &RenderResourceContext,
        set: vk::DescriptorSet,
        constants: &PushConstants,
    ) {
        let Some(pipeline) = pipelines.get(name).filter(|pipeline| !pipeline.is_compute()) else {
            log::trace!("No graphics pipeline {}", name);
            return;
        };
        if pipeline.draw_op == DrawOpId::Unknown {
            return;
        }
        pipeline.bind(cmd);
        pipeline.bind_descriptor_set(cmd, set);
        pipeline.push_constants(cmd, constants);
        if !record_draw(&self.device, cmd, pipeline.draw_op, &resources.geometry, &resources.cells, slot) {
            log::trace!("Pipeline {} had nothing to draw", name);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_strip(
        &self,
        cmd: vk::CommandBuffer,
        strip: &StageStrip,
        extent: vk::Extent2D,
        slot: usize,
        pipelines: &RenderPipelineContext,
        resources: &RenderResourceContext,
        set: vk::DescriptorSet,
        constants: &PushConstants,
    ) {
        for (index, layout) in strip.layout(extent) {
            self.set_viewport(cmd, layout.viewport, layout.scissor);
            // Depth is cleared per tile
            let clear = [vk::ClearAttachment {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                color_attachment: 0,
                clear_value: vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth: CLEAR_DEPTH, stencil: 0 },
                },
            }];
            let rects = [vk::ClearRect {
                rect: layout.scissor,
                base_array_layer: 0,
                layer_count: 1,
            }];
            unsafe {
                self.device.cmd_clear_attachments(cmd, &clear, &rects);
            }
            for name in tile_draw_list(&strip.tiles[index].pipelines) {
                self.draw_pipeline(cmd, name, slot, pipelines, resources, set, constants);
            }
        }
    }

    /// Runs post-processing on the acquired image through its storage view
    fn record_post_compute(
        &self,
        cmd: vk::CommandBuffer,
        target: &mut GraphicsTarget<'_>,
        pipelines: &RenderPipelineContext,
        resources: &RenderResourceContext,
        constants: &PushConstants,
    ) -> Result<()> {
        if !target.storage_supported || !resources.storage_image.is_bound(target.image_index) {
            log::trace!("Swapchain image {} has no storage view, skipping post-compute", target.image_index);
            return Ok(());
        }

        target.image.transition(
            &self.device,
            cmd,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::GENERAL,
        )?;
        let passes: Vec<&str> = self.plan.post_compute.iter().map(String::as_str).collect();
        let set = resources.descriptors.set(target.image_index as usize);
        self.dispatch_chain(cmd, &passes, pipelines, set, constants, target.extent);
        target.image.transition(
            &self.device,
            cmd,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )
    }

    fn dispatch_chain(
        &self,
        cmd: vk::CommandBuffer,
        passes: &[&str],
        pipelines: &RenderPipelineContext,
        set: vk::DescriptorSet,
        constants: &PushConstants,
        dynamic_extent: vk::Extent2D,
    ) {
        let chain: Vec<&Pipeline> = passes
            .iter()
            .filter_map(|name| pipelines.get(name).filter(|pipeline| pipeline.is_compute()))
            .collect();

        for (index, pipeline) in chain.iter().enumerate() {
            if index > 0 {
                self.compute_barrier(cmd);
            }
            pipeline.bind(cmd);
            pipeline.bind_descriptor_set(cmd, set);
            pipeline.push_constants(cmd, constants);
            pipeline.dispatch(cmd, resolve(pipeline.work_groups, dynamic_extent));
        }
    }

    fn compute_barrier(&self, cmd: vk::CommandBuffer) {
        let barrier = vk::MemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::SHADER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE);
        unsafe {
            self.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::DependencyFlags::empty(),
                &[barrier],
                &[],
                &[],
            );
        }
    }

    fn set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport, scissor: vk::Rect2D) {
        unsafe {
            self.device.cmd_set_viewport(cmd, 0, &[viewport]);
            self.device.cmd_set_scissor(cmd, 0, &[scissor]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn seed_pass_leads_the_first_frame_only() {
        let pre = names(&["Engine"]);
        assert_eq!(compute_passes(&pre, true, true), ["SeedCells", "Engine"]);
        assert_eq!(compute_passes(&pre, false, true), ["Engine"]);
        assert_eq!(compute_passes(&pre, true, false), ["Engine"]);
        assert!(compute_passes(&[], false, true).is_empty());
    }

    #[test]
    fn chain_order_is_kept() {
        let pre = names(&["ComputeInPlace", "ComputeJitter", "ComputeCopy"]);
        assert_eq!(compute_passes(&pre, false, false), ["ComputeInPlace", "ComputeJitter", "ComputeCopy"]);
    }

    #[test]
    fn tiles_draw_the_sky_first_once() {
        assert_eq!(tile_draw_list(&names(&["Landscape"])), ["Sky", "Landscape"]);
        assert_eq!(tile_draw_list(&names(&["Cells", "Sky"])), ["Cells", "Sky"]);
        assert_eq!(tile_draw_list(&names(&["Cells", "CellsFollower"])), ["Sky", "Cells", "CellsFollower"]);
    }

    #[test]
    fn full_viewport_covers_the_extent() {
        let (viewport, scissor) = full_viewport(vk::Extent2D { width: 800, height: 600 });
        assert_eq!((viewport.width, viewport.height), (800.0, 600.0));
        assert_eq!(viewport.max_depth, 1.0);
        assert_eq!(scissor.extent.width, 800);
        assert_eq!(scissor.offset.x, 0);
    }
}
