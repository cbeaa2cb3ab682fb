use std::mem::offset_of;
use ash::vk;
use crate::config::pipeline::DrawOpId;
use crate::renderer::shader_data::{CellData, ShapeVertex};

#[derive(Debug, Clone, Default)]
pub struct VertexInputDescription {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexInputDescription {
    /// Layout matching the buffers the draw strategy binds
    pub fn for_draw_op(draw_op: DrawOpId) -> Self {
        match draw_op {
            DrawOpId::InstancedCells => Self::cells(),
            DrawOpId::IndexedGrid | DrawOpId::IndexedGridBox => Self::grid(),
            _ => Self::shape(),
        }
    }

    /// Binding 0: one `CellData` per instance. Binding 1: cube vertices.
    pub fn cells() -> Self {
        Self {
            bindings: vec![
                binding::<CellData>(0, vk::VertexInputRate::INSTANCE),
                binding::<ShapeVertex>(1, vk::VertexInputRate::VERTEX),
            ],
            attributes: vec![
                attribute(0, 0, vk::Format::R32G32B32A32_SFLOAT, offset_of!(CellData, instance_position)),
                attribute(0, 1, vk::Format::R32G32B32A32_SFLOAT, offset_of!(CellData, color)),
                attribute(0, 2, vk::Format::R32G32B32A32_SINT, offset_of!(CellData, states)),
                attribute(1, 3, vk::Format::R32G32B32_SFLOAT, offset_of!(ShapeVertex, position)),
                attribute(1, 4, vk::Format::R32G32B32_SFLOAT, offset_of!(ShapeVertex, normal)),
            ],
        }
    }

    /// Terrain only needs positions and texture coordinates
    pub fn grid() -> Self {
        Self {
            bindings: vec![binding::<ShapeVertex>(0, vk::VertexInputRate::VERTEX)],
            attributes: vec![
                attribute(0, 0, vk::Format::R32G32B32_SFLOAT, offset_of!(ShapeVertex, position)),
                attribute(0, 1, vk::Format::R32G32_SFLOAT, offset_of!(ShapeVertex, texcoord)),
            ],
        }
    }

    pub fn shape() -> Self {
        Self {
            bindings: vec![binding::<ShapeVertex>(0, vk::VertexInputRate::VERTEX)],
            attributes: vec![
                attribute(0, 0, vk::Format::R32G32B32_SFLOAT, offset_of!(ShapeVertex, position)),
                attribute(0, 1, vk::Format::R32G32B32_SFLOAT, offset_of!(ShapeVertex, normal)),
                attribute(0, 2, vk::Format::R32G32B32_SFLOAT, offset_of!(ShapeVertex, color)),
                attribute(0, 3, vk::Format::R32G32_SFLOAT, offset_of!(ShapeVertex, texcoord)),
            ],
        }
    }
}

fn binding<T>(binding: u32, input_rate: vk::VertexInputRate) -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding,
        stride: size_of::<T>() as u32,
        input_rate,
    }
}

fn attribute(
    binding: u32,
    location: u32,
    format: vk::Format,
    offset: usize,
) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription {
        location,
        binding,
        format,
        offset: offset as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn assert_consistent(description: &VertexInputDescription) {
        let locations: HashSet<u32> = description.attributes.iter().map(|a| a.location).collect();
        assert_eq!(locations.len(), description.attributes.len(), "duplicate location");
        for attribute in &description.attributes {
            let binding = description
                .bindings
                .iter()
                .find(|b| b.binding == attribute.binding)
                .expect("attribute refers to a missing binding");
            assert!(attribute.offset < binding.stride);
        }
    }

    #[test]
    fn cells_layout_is_instanced_over_cell_data() {
        let cells = VertexInputDescription::for_draw_op(DrawOpId::InstancedCells);
        assert_consistent(&cells);
        assert_eq!(cells.bindings[0].input_rate, vk::VertexInputRate::INSTANCE);
        assert_eq!(cells.bindings[0].stride, 80);
        assert_eq!(cells.bindings[1].input_rate, vk::VertexInputRate::VERTEX);
        assert_eq!(cells.bindings[1].stride, 44);
        assert_eq!(cells.attributes[1].offset, 48);
        assert_eq!(cells.attributes[2].offset, 64);
    }

    #[test]
    fn grid_and_shape_layouts() {
        let grid = VertexInputDescription::for_draw_op(DrawOpId::IndexedGridBox);
        assert_consistent(&grid);
        assert_eq!(grid.attributes.len(), 2);
        assert_eq!(grid.attributes[1].offset, 36);

        for op in [DrawOpId::SkyDome, DrawOpId::IndexedCube, DrawOpId::IndexedRectangle, DrawOpId::Unknown] {
            let shape = VertexInputDescription::for_draw_op(op);
            assert_consistent(&shape);
            assert_eq!(shape.attributes.len(), 4);
        }
    }
}
