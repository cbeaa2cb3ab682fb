use std::collections::BTreeMap;
use glam::{Vec3, Vec4};
use crate::config::graph::{RenderGraph, RenderStage};
use crate::config::pipeline::PipelineDefinition;
use crate::config::{EngineOptions, RuntimeConfig, TerrainSettings, WorldSettings};

const DEFAULT_COMPUTE_CHAIN: [&str; 3] = ["ComputeInPlace", "ComputeJitter", "ComputeCopy"];

const STAGE0_GRAPHICS: &[&str] = &["LandscapeDebug"];
const STAGE1_GRAPHICS: &[&str] = &["LandscapeStage1"];
const STAGE2_GRAPHICS: &[&str] = &["LandscapeStage2"];
const STAGE3_GRAPHICS: &[&str] = &["Sky", "Landscape", "TerrainBox"];
const STAGE4_GRAPHICS: &[&str] = &["Sky", "Landscape", "TerrainBox", "Cells", "CellsFollower"];
const STAGE4_PRE_COMPUTE: &[&str] = &["Engine"];

pub fn default_terrain() -> TerrainSettings {
    TerrainSettings {
        grid_width: 100,
        grid_height: 100,
        alive_cells: 2000,
        cell_size: 0.5,
        box_depth: 14.0,
    }
}

pub fn default_world() -> WorldSettings {
    WorldSettings {
        timer_speed: 25.0,
        water_threshold: 0.1,
        light_pos: Vec4::new(0.0, 20.0, 20.0, 0.0),
        zoom_speed: 0.2,
        panning_speed: 0.4,
        field_of_view: 35.0,
        near_clipping: 0.25,
        far_clipping: 800.0,
        camera_position: Vec3::new(0.0, 0.0, 80.0),
    }
}

pub fn default_pipelines() -> BTreeMap<String, PipelineDefinition> {
    [
        ("Cells", PipelineDefinition::graphics(&["CellsVert", "CellsFrag"])),
        ("CellsFollower", PipelineDefinition::graphics(&["CellsFollowerVert", "CellsFrag"])),
        ("Engine", PipelineDefinition::compute(&["EngineComp"])),
        ("Landscape", PipelineDefinition::graphics(&["LandscapeVert", "LandscapeFrag"])),
        ("LandscapeStatic", PipelineDefinition::graphics(&["LandscapeStaticVert", "LandscapeFrag"])),
        ("LandscapeDebug", PipelineDefinition::graphics(&["LandscapeVert", "LandscapeDebugFrag"])),
        ("LandscapeStage1", PipelineDefinition::graphics(&["LandscapeVert", "LandscapeStage1Frag"])),
        ("LandscapeStage2", PipelineDefinition::graphics(&["LandscapeVert", "LandscapeStage2Frag"])),
        ("LandscapeNormals", PipelineDefinition::graphics(&["LandscapeVert", "LandscapeNormalsFrag"])),
        ("TerrainBox", PipelineDefinition::graphics(&["TerrainBoxSeamVert", "TerrainBoxFrag"])),
        ("Sky", PipelineDefinition::graphics(&["SkyVert", "SkyFrag"])),
        ("PostFX", PipelineDefinition::compute(&["PostFXComp"])),
        ("ComputeInPlace", PipelineDefinition::compute(&["ComputeInPlaceComp"])),
        ("ComputeJitter", PipelineDefinition::compute(&["ComputeJitterComp"])),
        ("ComputeCopy", PipelineDefinition::compute(&["ComputeCopyComp"])),
        ("SeedCells", PipelineDefinition::compute(&["SeedCellsComp"])),
    ]
        .into_iter()
        .map(|(name, definition)| (name.to_string(), definition))
        .collect()
}

pub fn default_draw_ops() -> BTreeMap<String, String> {
    [
        ("Cells", "instanced:cells"),
        ("CellsFollower", "instanced:cells"),
        ("Landscape", "indexed:grid"),
        ("LandscapeStatic", "indexed:grid"),
        ("LandscapeDebug", "indexed:grid"),
        ("LandscapeStage1", "indexed:grid"),
        ("LandscapeStage2", "indexed:grid"),
        ("LandscapeNormals", "indexed:grid"),
        ("TerrainBox", "indexed:grid_box"),
        ("Sky", "sky_dome"),
    ]
        .into_iter()
        .map(|(name, op)| (name.to_string(), op.to_string()))
        .collect()
}

fn graphics_for_stage(render_stage: u32) -> &'static [&'static str] {
    match render_stage {
        0 => STAGE0_GRAPHICS,
        1 => STAGE1_GRAPHICS,
        2 => STAGE2_GRAPHICS,
        3 => STAGE3_GRAPHICS,
        _ => STAGE4_GRAPHICS,
    }
}

fn pre_compute_for_stage(render_stage: u32) -> &'static [&'static str] {
    if render_stage >= 4 {
        STAGE4_PRE_COMPUTE
    } else {
        &[]
    }
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// Built-in scene used when no script graph is installed.
pub struct SceneConfig;

impl SceneConfig {
    pub fn defaults(options: &EngineOptions) -> RuntimeConfig {
        let draw_ops = default_draw_ops();
        let mut render_graph = RenderGraph::default();

        if options.workload_preset.is_compute_only() {
            let chain = if options.compute_chain.is_empty() {
                owned(&DEFAULT_COMPUTE_CHAIN)
            } else {
                options.compute_chain.clone()
            };
            render_graph.push_compute(RenderStage::PreCompute, &chain);
        } else {
            render_graph.push_compute(
                RenderStage::PreCompute,
                &owned(pre_compute_for_stage(options.render_stage)),
            );
            render_graph.push_graphics(&owned(graphics_for_stage(options.render_stage)), &draw_ops);
        }

        RuntimeConfig {
            terrain: default_terrain(),
            world: default_world(),
            pipelines: default_pipelines(),
            render_graph,
            draw_ops,
        }
    }
}
