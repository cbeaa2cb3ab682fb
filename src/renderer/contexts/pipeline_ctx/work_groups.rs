use ash::vk;

/// Invocations per workgroup along x and y in every compute shader
pub const TILE_SIZE: u32 = 16;

/// Dispatch size for a compute pipeline. A zero anywhere in `configured` derives the
/// count from `target` (the grid, or the swapchain extent for post-processing).
pub fn resolve(configured: [u32; 3], target: vk::Extent2D) -> [u32; 3] {
    if configured.iter().all(|&count| count > 0) {
        return configured;
    }
    [
        target.width.div_ceil(TILE_SIZE).max(1),
        target.height.div_ceil(TILE_SIZE).max(1),
        1,
    ]
}

pub fn grid_extent(grid_width: u32, grid_height: u32) -> vk::Extent2D {
    vk::Extent2D {
        width: grid_width,
        height: grid_height,
    }
}
