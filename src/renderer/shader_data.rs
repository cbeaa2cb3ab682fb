use bytemuck::{Pod, Zeroable};
use glam::{IVec2, IVec4, Mat4, Vec2, Vec3, Vec4};

/// Parameters shared by every pass, written once per frame into the uniform buffer
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct UniformData {
    pub light: Vec4,
    pub grid_xy: IVec2,
    pub water_threshold: f32,
    pub cell_size: f32,
    pub water_rules: Vec4,
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

impl UniformData {
    pub const DEFAULT_WATER_RULES: Vec4 = Vec4::new(2.4, 1.2, 0.08, 0.0);
}

/// One simulation cell, stored in the ping-pong storage buffers and read per instance
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct CellData {
    /// xyz position on the grid, w is the rendered cell size (0 when dead)
    pub instance_position: Vec4,
    pub vertex_position: Vec4,
    pub normal: Vec4,
    pub color: Vec4,
    /// x is 1 for alive, -1 for dead
    pub states: IVec4,
}

/// Vertex used by the grid, the cube, the rectangle and the sky dome
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ShapeVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: Vec3,
    pub texcoord: Vec2,
}

/// Pushed to both compute and graphics stages
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    pub tick: u32,
    pub day_fraction: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_match_shader_side() {
        assert_eq!(size_of::<UniformData>(), 240);
        assert_eq!(std::mem::offset_of!(UniformData, water_rules), 32);
        assert_eq!(std::mem::offset_of!(UniformData, model), 48);
        assert_eq!(size_of::<CellData>(), 80);
        assert_eq!(std::mem::offset_of!(CellData, states), 64);
        assert_eq!(size_of::<ShapeVertex>(), 44);
        assert_eq!(size_of::<PushConstants>(), 8);
    }
}
