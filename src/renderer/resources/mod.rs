/// Allocation-backed objects the contexts build on: buffers, images, shader modules
/// and sampled textures. Each one owns its Vulkan handle and frees it on drop.

pub mod buffer;
pub mod image;
pub mod shader;
pub mod texture;
