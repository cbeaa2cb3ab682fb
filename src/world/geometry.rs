use std::f32::consts::{PI, TAU};
use glam::{Vec2, Vec3};
use crate::renderer::shader_data::ShapeVertex;

const WHITE: Vec3 = Vec3::ONE;

/// CPU-side vertex and index data, uploaded once at startup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<ShapeVertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }

    fn push_vertex(&mut self, position: Vec3, normal: Vec3, texcoord: Vec2) -> u32 {
        let index = self.vertices.len() as u32;
        self.vertices.push(ShapeVertex {
            position,
            normal,
            color: WHITE,
            texcoord,
        });
        index
    }

    fn push_quad(&mut self, a: u32, b: u32, c: u32, d: u32) {
        self.indices.extend_from_slice(&[a, b, c, a, c, d]);
    }
}

/// Grid point coordinates, centred on the origin, one unit apart
pub fn grid_coordinates(width: u32, height: u32) -> Vec<Vec3> {
    let start_x = (width as f32 - 1.0) / -2.0;
    let start_y = (height as f32 - 1.0) / -2.0;
    (0..width * height)
        .map(|i| Vec3::new(start_x + (i % width) as f32, start_y + (i / width) as f32, 0.0))
        .collect()
}

/// Two triangles per grid quad over row-major point ids
pub fn grid_polygons(width: u32, height: u32) -> Vec<u32> {
    if width < 2 || height < 2 {
        return Vec::new();
    }
    let mut indices = Vec::with_capacity(((width - 1) * (height - 1) * 6) as usize);
    for row in 0..height - 1 {
        for col in 0..width - 1 {
            let top_left = row * width + col;
            let top_right = top_left + 1;
            let bottom_left = (row + 1) * width + col;
            let bottom_right = bottom_left + 1;
            indices.extend_from_slice(&[
                top_left, top_right, bottom_left,
                top_right, bottom_right, bottom_left,
            ]);
        }
    }
    indices
}

pub fn grid(width: u32, height: u32) -> Mesh {
    let mut mesh = Mesh::default();
    for position in grid_coordinates(width, height) {
        let texcoord = Vec2::new(
            (position.x / width.max(1) as f32) + 0.5,
            (position.y / height.max(1) as f32) + 0.5,
        );
        mesh.push_vertex(position, Vec3::Z, texcoord);
    }
    mesh.indices = grid_polygons(width, height);
    mesh
}

/// Side walls and floor hanging `depth` units below the grid border
pub fn grid_box(width: u32, height: u32, depth: f32) -> Mesh {
    let mut mesh = Mesh::default();
    if width < 2 || height < 2 {
        return mesh;
    }
    let half_x = (width as f32 - 1.0) / 2.0;
    let half_y = (height as f32 - 1.0) / 2.0;
    let corners = [
        Vec3::new(-half_x, -half_y, 0.0),
        Vec3::new(half_x, -half_y, 0.0),
        Vec3::new(half_x, half_y, 0.0),
        Vec3::new(-half_x, half_y, 0.0),
    ];
    let down = Vec3::new(0.0, 0.0, -depth);

    for side in 0..corners.len() {
        let start = corners[side];
        let end = corners[(side + 1) % corners.len()];
        let normal = (end - start).cross(Vec3::Z).normalize();
        let a = mesh.push_vertex(start, normal, Vec2::new(0.0, 0.0));
        let b = mesh.push_vertex(end, normal, Vec2::new(1.0, 0.0));
        let c = mesh.push_vertex(end + down, normal, Vec2::new(1.0, 1.0));
        let d = mesh.push_vertex(start + down, normal, Vec2::new(0.0, 1.0));
        mesh.push_quad(a, b, c, d);
    }

    let floor: Vec<u32> = corners
        .iter()
        .rev()
        .map(|corner| mesh.push_vertex(*corner + down, Vec3::NEG_Z, Vec2::ZERO))
        .collect();
    mesh.push_quad(floor[0], floor[1], floor[2], floor[3]);
    mesh
}

/// Unit quad in the xy plane
pub fn rectangle() -> Mesh {
    let mut mesh = Mesh::default();
    let corners = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];
    for (x, y) in corners {
        mesh.push_vertex(Vec3::new(x, y, 0.0), Vec3::Z, Vec2::new(x + 0.5, y + 0.5));
    }
    mesh.indices = vec![0, 2, 1, 0, 3, 2];
    mesh
}

/// Unit cube with flat per-face normals
pub fn cube() -> Mesh {
    let mut mesh = Mesh::default();
    for normal in [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z] {
        let tangent = if normal.x.abs() > 0.5 { Vec3::Y } else { Vec3::X };
        let bitangent = normal.cross(tangent);
        let center = normal * 0.5;
        let corners = [
            center - tangent * 0.5 - bitangent * 0.5,
            center + tangent * 0.5 - bitangent * 0.5,
            center + tangent * 0.5 + bitangent * 0.5,
            center - tangent * 0.5 + bitangent * 0.5,
        ];
        let uvs = [Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y];
        let ids: Vec<u32> = corners
            .iter()
            .zip(uvs)
            .map(|(corner, uv)| mesh.push_vertex(*corner, normal, uv))
            .collect();
        mesh.push_quad(ids[0], ids[1], ids[2], ids[3]);
    }
    mesh
}

/// UV sphere seen from the inside
pub fn sky_dome(stacks: u32, slices: u32, radius: f32) -> Mesh {
    let mut mesh = Mesh::default();
    for stack in 0..=stacks {
        let v = stack as f32 / stacks as f32;
        let phi = v * PI;
        for slice in 0..=slices {
            let u = slice as f32 / slices as f32;
            let theta = u * TAU;
            let direction = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
            mesh.push_vertex(direction * radius, -direction, Vec2::new(u, 1.0 - v));
        }
    }

    let ring = slices + 1;
    for stack in 0..stacks {
        for slice in 0..slices {
            let first = stack * ring + slice;
            let second = first + ring;
            mesh.indices.extend_from_slice(&[
                first, second, first + 1,
                first + 1, second, second + 1,
            ]);
        }
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices_in_bounds(mesh: &Mesh) -> bool {
        mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len())
    }

    #[test]
    fn grid_is_centred_with_two_triangles_per_quad() {
        let mesh = grid(4, 3);
        assert_eq!(mesh.vertices.len(), 12);
        assert_eq!(mesh.indices.len(), 3 * 2 * 6);
        assert_eq!(mesh.vertices[0].position, Vec3::new(-1.5, -1.0, 0.0));
        assert_eq!(mesh.vertices[11].position, Vec3::new(1.5, 1.0, 0.0));
        assert_eq!(&mesh.indices[..6], &[0, 1, 4, 1, 5, 4]);
        assert!(indices_in_bounds(&mesh));
    }

    #[test]
    fn degenerate_grid_has_no_polygons() {
        assert!(grid_polygons(1, 10).is_empty());
        assert!(grid_box(1, 1, 2.0).vertices.is_empty());
    }

    #[test]
    fn grid_box_walls_reach_box_depth() {
        let mesh = grid_box(5, 5, 14.0);
        assert_eq!(mesh.indices.len(), 5 * 6);
        assert!(indices_in_bounds(&mesh));
        let lowest = mesh.vertices.iter().map(|v| v.position.z).fold(f32::MAX, f32::min);
        assert_eq!(lowest, -14.0);
    }

    #[test]
    fn cube_has_outward_normals() {
        let mesh = cube();
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        for vertex in &mesh.vertices {
            assert!(vertex.position.dot(vertex.normal) > 0.0);
            assert!(vertex.position.abs().max_element() <= 0.5 + f32::EPSILON);
        }
    }

    #[test]
    fn sky_dome_vertices_sit_on_radius() {
        let mesh = sky_dome(8, 16, 300.0);
        assert_eq!(mesh.vertices.len(), 9 * 17);
        assert_eq!(mesh.indices.len(), 8 * 16 * 6);
        assert!(indices_in_bounds(&mesh));
        for vertex in &mesh.vertices {
            assert!((vertex.position.length() - 300.0).abs() < 1e-2);
        }
    }

    #[test]
    fn rectangle_is_indexed_quad() {
        let mesh = rectangle();
        assert!(mesh.is_indexed());
        assert_eq!(mesh.vertices.len(), 4);
    }
}
