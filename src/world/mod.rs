pub mod geometry;
pub mod timer;

use glam::{IVec2, IVec4, Mat4, Vec4};
use rand::Rng;
use crate::config::{TerrainSettings, WorldSettings};
use crate::renderer::shader_data::{CellData, UniformData};
use crate::world::geometry::Mesh;
use crate::world::timer::Timer;

const ALIVE_COLOR: Vec4 = Vec4::new(0.0, 0.0, 1.0, 1.0);
const DEAD_COLOR: Vec4 = Vec4::new(1.0, 0.0, 0.0, 1.0);
const ALIVE: IVec4 = IVec4::new(1, 0, 0, 0);
const DEAD: IVec4 = IVec4::new(-1, 0, 0, 0);

const SKY_DOME_STACKS: u32 = 16;
const SKY_DOME_SLICES: u32 = 32;

/// Picks `count` distinct cell ids out of `point_count`, sorted ascending
pub fn alive_cell_ids<R: Rng + ?Sized>(rng: &mut R, point_count: u32, count: u32) -> Vec<u32> {
    let amount = count.min(point_count) as usize;
    let mut ids: Vec<u32> = rand::seq::index::sample(rng, point_count as usize, amount)
        .into_vec()
        .into_iter()
        .map(|id| id as u32)
        .collect();
    ids.sort_unstable();
    ids
}

/// Simulation grid and its initial cell state
pub struct Grid {
    pub width: u32,
    pub height: u32,
    pub cells: Vec<CellData>,
    pub mesh: Mesh,
    pub box_mesh: Mesh,
}

impl Grid {
    pub fn new<R: Rng + ?Sized>(terrain: &TerrainSettings, rng: &mut R) -> Self {
        let point_count = terrain.cell_count();
        let mut alive = vec![false; point_count as usize];
        for id in alive_cell_ids(rng, point_count, terrain.alive_cells) {
            alive[id as usize] = true;
        }

        let coordinates = geometry::grid_coordinates(terrain.grid_width, terrain.grid_height);
        let cells = coordinates
            .iter()
            .zip(&alive)
            .map(|(position, &is_alive)| CellData {
                instance_position: position.extend(if is_alive { terrain.cell_size } else { 0.0 }),
                color: if is_alive { ALIVE_COLOR } else { DEAD_COLOR },
                states: if is_alive { ALIVE } else { DEAD },
                ..Default::default()
            })
            .collect();

        Self {
            width: terrain.grid_width,
            height: terrain.grid_height,
            cells,
            mesh: geometry::grid(terrain.grid_width, terrain.grid_height),
            box_mesh: geometry::grid_box(terrain.grid_width, terrain.grid_height, terrain.box_depth),
        }
    }

    pub fn cell_count(&self) -> u32 {
        self.cells.len() as u32
    }

    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.states == ALIVE).count()
    }
}

/// Everything the passes read that is not a GPU resource
pub struct World {
    pub grid: Grid,
    pub rectangle: Mesh,
    pub cube: Mesh,
    pub sky_dome: Mesh,
    pub timer: Timer,
    light: Vec4,
    water_threshold: f32,
    cell_size: f32,
}

impl World {
    pub fn new(terrain: &TerrainSettings, settings: &WorldSettings) -> Self {
        let grid = Grid::new(terrain, &mut rand::thread_rng());
        log::info!(
            "World grid {}x{} with {} alive cells",
            grid.width,
            grid.height,
            grid.alive_count(),
        );
        Self {
            grid,
            rectangle: geometry::rectangle(),
            cube: geometry::cube(),
            sky_dome: geometry::sky_dome(SKY_DOME_STACKS, SKY_DOME_SLICES, settings.far_clipping * 0.5),
            timer: Timer::new(settings.timer_speed),
            light: settings.light_pos,
            water_threshold: settings.water_threshold,
            cell_size: terrain.cell_size,
        }
    }

    pub fn uniform_data(&self, view: Mat4, projection: Mat4) -> UniformData {
        UniformData {
            light: self.light,
            grid_xy: IVec2::new(self.grid.width as i32, self.grid.height as i32),
            water_threshold: self.water_threshold,
            cell_size: self.cell_size,
            water_rules: UniformData::DEFAULT_WATER_RULES,
            model: Mat4::IDENTITY,
            view,
            projection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use crate::config::scene::{default_terrain, default_world};

    #[test]
    fn alive_ids_are_distinct_sorted_and_capped() {
        let mut rng = StdRng::seed_from_u64(7);
        let ids = alive_cell_ids(&mut rng, 100, 40);
        assert_eq!(ids.len(), 40);
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(ids.iter().all(|&id| id < 100));

        assert_eq!(alive_cell_ids(&mut rng, 10, 50), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn grid_marks_exactly_the_requested_alive_cells() {
        let terrain = TerrainSettings {
            grid_width: 10,
            grid_height: 8,
            alive_cells: 25,
            ..default_terrain()
        };
        let grid = Grid::new(&terrain, &mut StdRng::seed_from_u64(1));
        assert_eq!(grid.cell_count(), 80);
        assert_eq!(grid.alive_count(), 25);
        for cell in &grid.cells {
            let alive = cell.states == ALIVE;
            assert_eq!(cell.instance_position.w, if alive { terrain.cell_size } else { 0.0 });
        }
        assert_eq!(grid.mesh.vertices.len(), 80);
    }

    #[test]
    fn uniform_carries_world_settings() {
        let world = World::new(&default_terrain(), &default_world());
        let data = world.uniform_data(Mat4::IDENTITY, Mat4::IDENTITY);
        assert_eq!(data.grid_xy, IVec2::new(100, 100));
        assert_eq!(data.light, Vec4::new(0.0, 20.0, 20.0, 0.0));
        assert_eq!(data.cell_size, 0.5);
    }
}
