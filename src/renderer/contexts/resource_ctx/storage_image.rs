use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::frame_ctx::MAX_FRAMES_IN_FLIGHT;
use crate::renderer::contexts::resource_ctx::descriptor::{DescriptorKind, DescriptorTable, DescriptorTarget};

/// Storage view of the swapchain images for post-processing compute passes.
/// Set `i` points at swapchain image `i`, so a pass may only run when the acquired
/// index has a set of its own.
pub struct StorageImage {
    pub my_index: usize,
    bound_images: usize,
}

impl StorageImage {
    pub fn new(table: &mut DescriptorTable) -> Result<Self> {
        let my_index = table.claim(DescriptorKind::StorageImage)?;
        Ok(Self {
            my_index,
            bound_images: 0,
        })
    }

    /// Re-points every set at the current swapchain views; an empty list unbinds
    pub fn bind(&mut self, table: &mut DescriptorTable, views: &[vk::ImageView]) {
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            let target = views.get(slot).map(|&view| DescriptorTarget::Image {
                view,
                sampler: vk::Sampler::null(),
                layout: vk::ImageLayout::GENERAL,
            });
            table.set_target(slot, self.my_index, target);
        }
        self.bound_images = views.len().min(MAX_FRAMES_IN_FLIGHT);
    }

    pub fn is_bound(&self, image_index: u32) -> bool {
        (image_index as usize) < self.bound_images
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn binds_one_view_per_set_and_unbinds() {
        let mut table = DescriptorTable::default();
        table.claim(DescriptorKind::Uniform).unwrap();
        let mut storage_image = StorageImage::new(&mut table).unwrap();
        assert_eq!(storage_image.my_index, 1);
        assert!(!storage_image.is_bound(0));

        let views = [vk::ImageView::from_raw(10), vk::ImageView::from_raw(11)];
        storage_image.bind(&mut table, &views);
        assert!(storage_image.is_bound(1));
        assert!(!storage_image.is_bound(2));
        match table.target(1, storage_image.my_index) {
            Some(DescriptorTarget::Image { view, layout, .. }) => {
                assert_eq!(view, views[1]);
                assert_eq!(layout, vk::ImageLayout::GENERAL);
            }
            other => panic!("unexpected target {other:?}"),
        }

        storage_image.bind(&mut table, &[]);
        assert!(!storage_image.is_bound(0));
        assert_eq!(table.target(0, storage_image.my_index), None);
    }
}
