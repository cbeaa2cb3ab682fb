use ash::vk;
use crate::config::pipeline::DrawOpId;
use crate::renderer::contexts::resource_ctx::geometry::{GeometryBuffers, MeshKind};
use crate::renderer::contexts::resource_ctx::storage::StoragePair;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawCall {
    Indexed { index_count: u32, instance_count: u32 },
    Vertices { vertex_count: u32, instance_count: u32 },
}

/// Indexed when the mesh has indices; the cells draw makes one instance per grid cell
pub fn draw_call(draw_op: DrawOpId, vertex_count: u32, index_count: u32, cell_count: u32) -> Option<DrawCall> {
    let instance_count = match draw_op {
        DrawOpId::Unknown => return None,
        DrawOpId::InstancedCells => cell_count,
        _ => 1,
    };
    if instance_count == 0 {
        return None;
    }
    if index_count > 0 {
        Some(DrawCall::Indexed {
            index_count,
            instance_count,
        })
    } else if vertex_count > 0 {
        Some(DrawCall::Vertices {
            vertex_count,
            instance_count,
        })
    } else {
        None
    }
}

/// Binds the buffers of `draw_op` and records its draw; false when there is nothing to draw
pub fn record_draw(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    draw_op: DrawOpId,
    geometry: &GeometryBuffers,
    cells: &StoragePair,
    slot: usize,
) -> bool {
    let Some(kind) = MeshKind::for_draw_op(draw_op) else {
        return false;
    };
    let mesh = geometry.mesh(kind);
    let Some(call) = draw_call(draw_op, mesh.vertex_count, mesh.index_count, cells.cell_count) else {
        return false;
    };

    unsafe {
        if draw_op == DrawOpId::InstancedCells {
            // Binding 0 is per instance, binding 1 the cube
            device.cmd_bind_vertex_buffers(cmd, 0, &[cells.current(slot), mesh.vertices.buffer], &[0, 0]);
        } else {
            device.cmd_bind_vertex_buffers(cmd, 0, &[mesh.vertices.buffer], &[0]);
        }
        match (call, &mesh.indices) {
            (DrawCall::Indexed { index_count, instance_count }, Some(indices)) => {
                device.cmd_bind_index_buffer(cmd, indices.buffer, 0, vk::IndexType::UINT32);
                device.cmd_draw_indexed(cmd, index_count, instance_count, 0, 0, 0);
            }
            (DrawCall::Vertices { vertex_count, instance_count }, _) => {
                device.cmd_draw(cmd, vertex_count, instance_count, 0, 0);
            }
            (DrawCall::Indexed { .. }, None) => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_known_op_has_a_mesh() {
        assert_eq!(MeshKind::for_draw_op(DrawOpId::InstancedCells), Some(MeshKind::Cube));
        assert_eq!(MeshKind::for_draw_op(DrawOpId::IndexedGrid), Some(MeshKind::Grid));
        assert_eq!(MeshKind::for_draw_op(DrawOpId::IndexedGridBox), Some(MeshKind::GridBox));
        assert_eq!(MeshKind::for_draw_op(DrawOpId::IndexedRectangle), Some(MeshKind::Rectangle));
        assert_eq!(MeshKind::for_draw_op(DrawOpId::SkyDome), Some(MeshKind::SkyDome));
        assert_eq!(MeshKind::for_draw_op(DrawOpId::Unknown), None);
    }

    #[test]
    fn cells_are_instanced_per_grid_cell() {
        assert_eq!(
            draw_call(DrawOpId::InstancedCells, 24, 36, 10_000),
            Some(DrawCall::Indexed { index_count: 36, instance_count: 10_000 }),
        );
        assert_eq!(draw_call(DrawOpId::InstancedCells, 24, 36, 0), None);
    }

    #[test]
    fn unindexed_meshes_fall_back_to_plain_draws() {
        assert_eq!(
            draw_call(DrawOpId::SkyDome, 512, 0, 100),
            Some(DrawCall::Vertices { vertex_count: 512, instance_count: 1 }),
        );
        assert_eq!(
            draw_call(DrawOpId::IndexedGrid, 121, 600, 100),
            Some(DrawCall::Indexed { index_count: 600, instance_count: 1 }),
        );
        assert_eq!(draw_call(DrawOpId::IndexedCube, 0, 0, 100), None);
        assert_eq!(draw_call(DrawOpId::Unknown, 3, 3, 1), None);
    }
}
