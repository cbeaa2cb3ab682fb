use ash::vk;
use color_eyre::Result;
use crate::config::pipeline::DrawOpId;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::resources::buffer::Buffer;
use crate::world::geometry::Mesh;
use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshKind {
    Grid,
    GridBox,
    Rectangle,
    Cube,
    SkyDome,
}

impl MeshKind {
    /// Mesh a draw op renders; the cells draw instances the cube
    pub fn for_draw_op(draw_op: DrawOpId) -> Option<Self> {
        match draw_op {
            DrawOpId::InstancedCells | DrawOpId::IndexedCube => Some(Self::Cube),
            DrawOpId::IndexedGrid => Some(Self::Grid),
            DrawOpId::IndexedGridBox => Some(Self::GridBox),
            DrawOpId::IndexedRectangle => Some(Self::Rectangle),
            DrawOpId::SkyDome => Some(Self::SkyDome),
            DrawOpId::Unknown => None,
        }
    }
}

/// Device-local vertex buffer and optional u32 index buffer of one mesh
pub struct MeshBuffers {
    pub vertices: Buffer,
    pub indices: Option<Buffer>,
    pub vertex_count: u32,
    pub index_count: u32,
}

impl MeshBuffers {
    pub fn upload(dev: &RenderDevice, mesh: &Mesh, name: &str) -> Result<Self> {
        let vertices = dev.create_buffer_with_data(
            &mesh.vertices,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &format!("{name} vertices"),
        )?;
        let indices = if mesh.is_indexed() {
            Some(dev.create_buffer_with_data(
                &mesh.indices,
                vk::BufferUsageFlags::INDEX_BUFFER,
                &format!("{name} indices"),
            )?)
        } else {
            None
        };

        Ok(Self {
            vertices,
            indices,
            vertex_count: mesh.vertices.len() as u32,
            index_count: mesh.indices.len() as u32,
        })
    }
}

/// Static meshes of the scene, uploaded once through staging copies
pub struct GeometryBuffers {
    pub grid: MeshBuffers,
    pub grid_box: MeshBuffers,
    pub rectangle: MeshBuffers,
    pub cube: MeshBuffers,
    pub sky_dome: MeshBuffers,
}

impl GeometryBuffers {
    pub fn new(dev: &RenderDevice, world: &World) -> Result<Self> {
        Ok(Self {
            grid: MeshBuffers::upload(dev, &world.grid.mesh, "Grid")?,
            grid_box: MeshBuffers::upload(dev, &world.grid.box_mesh, "Grid box")?,
            rectangle: MeshBuffers::upload(dev, &world.rectangle, "Rectangle")?,
            cube: MeshBuffers::upload(dev, &world.cube, "Cube")?,
            sky_dome: MeshBuffers::upload(dev, &world.sky_dome, "Sky dome")?,
        })
    }
}

impl GeometryBuffers {
    pub fn mesh(&self, kind: MeshKind) -> &MeshBuffers {
        match kind {
            MeshKind::Grid => &self.grid,
            MeshKind::GridBox => &self.grid_box,
            MeshKind::Rectangle => &self.rectangle,
            MeshKind::Cube => &self.cube,
            MeshKind::SkyDome => &self.sky_dome,
        }
    }
}
