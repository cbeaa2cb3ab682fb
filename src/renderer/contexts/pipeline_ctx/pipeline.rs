use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::config::pipeline::DrawOpId;
use crate::renderer::contexts::pipeline_ctx::vertex::VertexInputDescription;
use crate::renderer::resources::shader::ShaderModule;
use crate::renderer::shader_data::PushConstants;

pub const PATCH_CONTROL_POINTS: u32 = 3;

/// Stages that see the shared push-constant block
pub fn push_constant_stages() -> vk::ShaderStageFlags {
    vk::ShaderStageFlags::COMPUTE | vk::ShaderStageFlags::ALL_GRAPHICS
}

/// A built graphics or compute pipeline. The layout is shared and owned elsewhere.
pub struct Pipeline {
    pub name: String,
    pub handle: vk::Pipeline,
    pub bind_point: vk::PipelineBindPoint,
    pub draw_op: DrawOpId,
    /// As configured; zeros are resolved at dispatch time
    pub work_groups: [u32; 3],
    layout: vk::PipelineLayout,
    device: Arc<ash::Device>,
}

impl Pipeline {
    pub fn is_compute(&self) -> bool {
        self.bind_point == vk::PipelineBindPoint::COMPUTE
    }

    pub fn bind(&self, cmd: vk::CommandBuffer) {
        unsafe {
            self.device.cmd_bind_pipeline(cmd, self.bind_point, self.handle);
        }
    }

    pub fn bind_descriptor_set(&self, cmd: vk::CommandBuffer, set: vk::DescriptorSet) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                cmd,
                self.bind_point,
                self.layout,
                0,
                &[set],
                &[],
            );
        }
    }

    pub fn push_constants(&self, cmd: vk::CommandBuffer, constants: &PushConstants) {
        unsafe {
            self.device.cmd_push_constants(
                cmd,
                self.layout,
                push_constant_stages(),
                0,
                bytemuck::bytes_of(constants),
            );
        }
    }

    pub fn dispatch(&self, cmd: vk::CommandBuffer, groups: [u32; 3]) {
        unsafe {
            self.device.cmd_dispatch(cmd, groups[0], groups[1], groups[2]);
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.handle, None);
        }
    }
}

pub struct GraphicsPipelineBuilder {
    device: Arc<ash::Device>,

    shaders: Vec<ShaderModule>,
    layout: Option<vk::PipelineLayout>,
    render_pass: Option<vk::RenderPass>,
    vertex_input: VertexInputDescription,
    topology: vk::PrimitiveTopology,
    patch_control_points: Option<u32>,
    polygon_mode: vk::PolygonMode,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    depth_test: bool,
    depth_write: bool,
    depth_compare: vk::CompareOp,
    color_blend_attachment: vk::PipelineColorBlendAttachmentState,
}

impl GraphicsPipelineBuilder {
    pub fn new(device: Arc<ash::Device>) -> Self {
        Self {
            device,
            shaders: Vec::new(),
            layout: None,
            render_pass: None,
            vertex_input: VertexInputDescription::default(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            patch_control_points: None,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
            depth_compare: vk::CompareOp::LESS_OR_EQUAL,
            // No blending
            color_blend_attachment: vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false),
        }
    }

    pub fn with_shaders(mut self, shaders: Vec<ShaderModule>) -> Self {
        self.shaders = shaders;
        self
    }

    pub fn with_pipeline_layout(mut self, layout: vk::PipelineLayout) -> Self {
        let _ = self.layout.replace(layout);
        self
    }

    pub fn with_render_pass(mut self, render_pass: vk::RenderPass) -> Self {
        let _ = self.render_pass.replace(render_pass);
        self
    }

    pub fn with_vertex_input(mut self, description: VertexInputDescription) -> Self {
        self.vertex_input = description;
        self
    }

    /// Switches input assembly to patches for the tessellation stages
    pub fn with_tessellation(mut self, control_points: u32) -> Self {
        self.topology = vk::PrimitiveTopology::PATCH_LIST;
        self.patch_control_points = Some(control_points);
        self
    }

    pub fn with_polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: vk::CullModeFlags, front_face: vk::FrontFace) -> Self {
        self.cull_mode = cull_mode;
        self.front_face = front_face;
        self
    }

    pub fn with_depth_test(mut self, enable: bool, write: bool, compare: Option<vk::CompareOp>) -> Self {
        self.depth_test = enable;
        self.depth_write = enable && write;
        self.depth_compare = if enable {
            compare.unwrap_or(vk::CompareOp::LESS_OR_EQUAL)
        } else {
            vk::CompareOp::ALWAYS
        };
        self
    }

    pub fn build(self, name: &str, draw_op: DrawOpId) -> Result<Pipeline> {
        let layout = self
            .layout
            .ok_or_eyre("No pipeline layout provided for GraphicsPipelineBuilder")?;
        let render_pass = self
            .render_pass
            .ok_or_eyre("No render pass provided for GraphicsPipelineBuilder")?;
        if self.shaders.is_empty() {
            return Err(eyre!("Pipeline {} has no shader stages", name));
        }
        let stages: Vec<vk::PipelineShaderStageCreateInfo> =
            self.shaders.iter().map(ShaderModule::stage_info).collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_input.bindings)
            .vertex_attribute_descriptions(&self.vertex_input.attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology)
            .primitive_restart_enable(false);
        let tessellation = vk::PipelineTessellationStateCreateInfo::default()
            .patch_control_points(self.patch_control_points.unwrap_or(0));
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(false);
        // 1 sample per pixel means no multisampling
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false)
            .min_sample_shading(1.0);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_write)
            .depth_compare_op(self.depth_compare)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);
        let blend_attachments = [self.color_blend_attachment];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&blend_attachments);

        // Viewport and scissor change per strip tile
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_info = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_info)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);
        if self.patch_control_points.is_some() {
            pipeline_info = pipeline_info.tessellation_state(&tessellation);
        }

        let handle = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, code)| eyre!("Failed to create graphics pipeline {}: {:?}", name, code))?[0];

        Ok(Pipeline {
            name: name.to_string(),
            handle,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            draw_op,
            work_groups: [0, 0, 0],
            layout,
            device: self.device,
        })
    }
}

pub struct ComputePipelineBuilder {
    device: Arc<ash::Device>,
    shader: Option<ShaderModule>,
    layout: Option<vk::PipelineLayout>,
    work_groups: [u32; 3],
}

impl ComputePipelineBuilder {
    pub fn new(device: Arc<ash::Device>) -> Self {
        Self {
            device,
            shader: None,
            layout: None,
            work_groups: [0, 0, 0],
        }
    }

    pub fn with_shader(mut self, shader: ShaderModule) -> Self {
        let _ = self.shader.replace(shader);
        self
    }

    pub fn with_pipeline_layout(mut self, layout: vk::PipelineLayout) -> Self {
        let _ = self.layout.replace(layout);
        self
    }

    pub fn with_work_groups(mut self, work_groups: [u32; 3]) -> Self {
        self.work_groups = work_groups;
        self
    }

    pub fn build(self, name: &str) -> Result<Pipeline> {
        let shader = self
            .shader
            .ok_or_eyre("No shader provided for ComputePipelineBuilder")?;
        let layout = self
            .layout
            .ok_or_eyre("No pipeline layout provided for ComputePipelineBuilder")?;

        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(shader.stage_info())
            .layout(layout);
        let handle = unsafe {
            self.device
                .create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, code)| eyre!("Failed to create compute pipeline {}: {:?}", name, code))?[0];

        Ok(Pipeline {
            name: name.to_string(),
            handle,
            bind_point: vk::PipelineBindPoint::COMPUTE,
            draw_op: DrawOpId::Unknown,
            work_groups: self.work_groups,
            layout,
            device: self.device,
        })
    }
}
