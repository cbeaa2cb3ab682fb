use ash::vk;
use color_eyre::eyre::bail;
use color_eyre::Result;
use crate::renderer::contexts::resource_ctx::descriptor::DescriptorKind;
use crate::renderer::util::VkResultExt;

/// Collects one single-descriptor binding per claimed resource kind
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl DescriptorSetLayoutBuilder<'_> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, binding: u32, kind: DescriptorKind) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(kind.descriptor_type())
                .descriptor_count(1)
                .stage_flags(kind.stages()),
        );
        self
    }

    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'_>] {
        &self.bindings
    }

    pub fn build(self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        if let Some(duplicate) = self
            .bindings
            .iter()
            .enumerate()
            .find(|(i, a)| self.bindings[..*i].iter().any(|b| b.binding == a.binding))
        {
            bail!("Binding {} is declared twice", duplicate.1.binding);
        }
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);
        unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .check(vk::ObjectType::DESCRIPTOR_SET_LAYOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_carry_their_type_and_stages() {
        let builder = DescriptorSetLayoutBuilder::new()
            .with_kind(0, DescriptorKind::Uniform)
            .with_kind(3, DescriptorKind::ImageSampler);
        let bindings = builder.bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[1].binding, 3);
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(bindings[1].descriptor_count, 1);
    }
}
