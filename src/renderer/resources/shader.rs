use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use crate::config::pipeline::{ShaderRef, ShaderStage};
use crate::renderer::util::VkResultExt;

pub const SHADER_ENTRY: &CStr = c"main";

/// Compiled SPIR-V module, destroyed with its owner
pub struct ShaderModule {
    pub module: vk::ShaderModule,
    pub stage: ShaderStage,
    device: Arc<ash::Device>,
}

impl ShaderModule {
    pub fn load(shader: &ShaderRef, shader_dir: &Path, device: Arc<ash::Device>) -> Result<Self> {
        let path = shader.binary_path(shader_dir);
        let bytes = std::fs::read(&path)
            .wrap_err_with(|| format!("Failed to read shader binary {}", path.display()))?;
        // read_spv copies into u32 words, so the file buffer needs no alignment
        let code = ash::util::read_spv(&mut Cursor::new(bytes))
            .wrap_err_with(|| format!("Invalid SPIR-V in {}", path.display()))?;

        let info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.create_shader_module(&info, None) }
            .check(vk::ObjectType::SHADER_MODULE)?;

        Ok(Self {
            module,
            stage: shader.stage,
            device,
        })
    }

    pub fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.flags())
            .module(self.module)
            .name(SHADER_ENTRY)
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}
