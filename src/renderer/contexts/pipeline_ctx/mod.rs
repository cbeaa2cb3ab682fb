pub mod pipeline;
pub mod render_pass;
pub mod shader_build;
pub mod vertex;
pub mod work_groups;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::bail;
use color_eyre::Result;
use crate::config::pipeline::{PipelineDefinition, ShaderStage};
use crate::config::strip::StageStrip;
use crate::config::RuntimeConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::pipeline_ctx::pipeline::{
    push_constant_stages, ComputePipelineBuilder, GraphicsPipelineBuilder, Pipeline, PATCH_CONTROL_POINTS,
};
use crate::renderer::contexts::pipeline_ctx::render_pass::RenderPass;
use crate::renderer::contexts::pipeline_ctx::shader_build::ShaderBuilder;
use crate::renderer::contexts::pipeline_ctx::vertex::VertexInputDescription;
use crate::renderer::resources::shader::ShaderModule;
use crate::renderer::shader_data::PushConstants;
use crate::renderer::util::VkResultExt;

/// One-time pre-compute pass prepended on the first frame when configured
pub const SEED_PIPELINE: &str = "SeedCells";
pub const SKY_PIPELINE: &str = "Sky";

/// Names of the pipelines a frame can reach, in first-use order: the execution plan,
/// the strip tiles and the seed pass.
pub fn required_pipelines(config: &RuntimeConfig, strip: Option<&StageStrip>) -> Vec<String> {
    let plan = config.execution_plan();
    let mut names: Vec<String> = Vec::new();
    let mut push = |name: &String| {
        if !names.contains(name) {
            names.push(name.clone());
        }
    };

    if config.pipeline(SEED_PIPELINE).is_some() {
        push(&SEED_PIPELINE.to_string());
    }
    plan.pre_compute.iter().for_each(&mut push);
    plan.graphics.iter().for_each(&mut push);
    if let Some(strip) = strip {
        // Tiles draw the sky behind their pipelines
        if config.pipeline(SKY_PIPELINE).is_some() {
            push(&SKY_PIPELINE.to_string());
        }
        strip.tiles.iter().flat_map(|tile| &tile.pipelines).for_each(&mut push);
    }
    plan.post_compute.iter().for_each(&mut push);
    names
}

/// Responsibilities:
/// - Build shaders and the pipelines the execution plan references
/// - Own the render pass and the pipeline layout every pipeline shares
pub struct RenderPipelineContext {
    pipelines: BTreeMap<String, Pipeline>,
    pub layout: vk::PipelineLayout,
    pub render_pass: RenderPass,
    device: Arc<ash::Device>,
}

impl RenderPipelineContext {
    pub fn new(
        dev: &RenderDevice,
        config: &RuntimeConfig,
        strip: Option<&StageStrip>,
        set_layout: vk::DescriptorSetLayout,
        color_format: vk::Format,
        shader_dir: &Path,
    ) -> Result<Self> {
        let device = dev.logical.clone();
        let render_pass = RenderPass::new(device.clone(), color_format)?;

        let set_layouts = [set_layout];
        let push_constant_ranges = [vk::PushConstantRange::default()
            .stage_flags(push_constant_stages())
            .offset(0)
            .size(size_of::<PushConstants>() as u32)];
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .check(vk::ObjectType::PIPELINE_LAYOUT)?;

        let mut ctx = Self {
            pipelines: BTreeMap::new(),
            layout,
            render_pass,
            device,
        };

        let shader_builder = ShaderBuilder::new(shader_dir);
        for name in required_pipelines(config, strip) {
            let Some(definition) = config.pipeline(&name) else {
                log::warn!("Pipeline {} is referenced but not defined, skipping", name);
                continue;
            };
            shader_builder.build_all(definition.shaders())?;
            let pipeline = ctx.build_pipeline(&name, definition, config, shader_dir)?;
            log::debug!("Built {} pipeline {}", if pipeline.is_compute() { "compute" } else { "graphics" }, name);
            ctx.pipelines.insert(name, pipeline);
        }

        let skipped = config.pipelines.len() - ctx.pipelines.len();
        log::info!("Pipelines: {} built, {} defined but unused", ctx.pipelines.len(), skipped);
        Ok(ctx)
    }

    fn build_pipeline(
        &self,
        name: &str,
        definition: &PipelineDefinition,
        config: &RuntimeConfig,
        shader_dir: &Path,
    ) -> Result<Pipeline> {
        let shaders = definition
            .shader_refs()?
            .iter()
            .map(|shader| ShaderModule::load(shader, shader_dir, self.device.clone()))
            .collect::<Result<Vec<_>>>()?;

        match definition {
            PipelineDefinition::Compute { work_groups, .. } => {
                let mut shaders = shaders.into_iter();
                let (Some(shader), None) = (shaders.next(), shaders.next()) else {
                    bail!("Compute pipeline {} needs exactly one shader", name);
                };
                if shader.stage != ShaderStage::Comp {
                    bail!("Compute pipeline {} has a {:?} shader", name, shader.stage);
                }
                ComputePipelineBuilder::new(self.device.clone())
                    .with_shader(shader)
                    .with_pipeline_layout(self.layout)
                    .with_work_groups(*work_groups)
                    .build(name)
            }
            PipelineDefinition::Graphics { .. } => {
                let draw_op = config.draw_op(name);
                let mut builder = GraphicsPipelineBuilder::new(self.device.clone())
                    .with_shaders(shaders)
                    .with_pipeline_layout(self.layout)
                    .with_render_pass(self.render_pass.handle)
                    .with_vertex_input(VertexInputDescription::for_draw_op(draw_op))
                    .with_depth_test(true, true, None);
                if definition.has_tessellation() {
                    builder = builder.with_tessellation(PATCH_CONTROL_POINTS);
                }
                if name.contains("WireFrame") {
                    builder = builder.with_polygon_mode(vk::PolygonMode::LINE);
                }
                builder.build(name, draw_op)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.get(name)
    }

    /// Framebuffers are built against this pass, so the format may not change later
    pub fn check_color_format(&self, format: vk::Format) -> Result<()> {
        if format != self.render_pass.color_format {
            bail!(
                "Swapchain format changed from {:?} to {:?}",
                self.render_pass.color_format,
                format,
            );
        }
        Ok(())
    }
}

impl Drop for RenderPipelineContext {
    fn drop(&mut self) {
        self.pipelines.clear();
        unsafe {
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::scene::SceneConfig;
    use crate::config::strip::StripOptions;
    use crate::config::{EngineOptions, WorkloadPreset};

    fn options(stage: &str) -> EngineOptions {
        EngineOptions::from_lookup(|key| match key {
            "CE_RENDER_STAGE" => Some(stage.to_string()),
            _ => None,
        })
    }

    #[test]
    fn default_scene_needs_seed_plan_and_nothing_else() {
        let config = SceneConfig::defaults(&options("4"));
        assert_eq!(
            required_pipelines(&config, None),
            ["SeedCells", "Engine", "Sky", "Landscape", "TerrainBox", "Cells", "CellsFollower"],
        );
    }

    #[test]
    fn early_stage_only_needs_its_landscape() {
        let config = SceneConfig::defaults(&options("1"));
        assert_eq!(required_pipelines(&config, None), ["SeedCells", "LandscapeStage1"]);
    }

    #[test]
    fn strip_tiles_add_their_pipelines_once() {
        let config = SceneConfig::defaults(&options("4"));
        let strip_options = StripOptions {
            enabled: true,
            tiles: vec![vec!["LandscapeNormals".to_string()], vec!["Cells".to_string()]],
            ..Default::default()
        };
        let strip = StageStrip::new(&strip_options, &config).unwrap();
        let names = required_pipelines(&config, Some(&strip));
        assert_eq!(names.iter().filter(|name| *name == "Cells").count(), 1);
        assert_eq!(names.last().map(String::as_str), Some("LandscapeNormals"));
    }

    #[test]
    fn strip_pulls_in_the_sky_for_early_stages() {
        let config = SceneConfig::defaults(&options("1"));
        let strip_options = StripOptions {
            enabled: true,
            tiles: vec![vec!["Landscape".to_string()]],
            ..Default::default()
        };
        let strip = StageStrip::new(&strip_options, &config).unwrap();
        assert_eq!(
            required_pipelines(&config, Some(&strip)),
            ["SeedCells", "LandscapeStage1", "Sky", "Landscape"],
        );
    }

    #[test]
    fn compute_chain_preset_lists_the_chain() {
        let mut opts = options("4");
        opts.workload_preset = WorkloadPreset::ComputeChain;
        let config = SceneConfig::defaults(&opts);
        assert_eq!(
            required_pipelines(&config, None),
            ["SeedCells", "ComputeInPlace", "ComputeJitter", "ComputeCopy"],
        );
    }
}
