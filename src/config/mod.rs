pub mod graph;
pub mod pipeline;
pub mod scene;
pub mod script;
pub mod strip;

use std::collections::BTreeMap;
use std::path::PathBuf;
use glam::{Vec3, Vec4};
use crate::config::graph::{ExecutionPlan, RenderGraph};
use crate::config::pipeline::{DrawOpId, PipelineDefinition};
use crate::config::strip::StripOptions;

pub const DEFAULT_RENDER_STAGE: u32 = 4;
pub const MAX_RENDER_STAGE: u32 = 5;

const DEFAULT_SHADER_DIR: &str = "shaders";
const DEFAULT_ASSET_DIR: &str = "assets";
const DEFAULT_SCREENSHOT_DIR: &str = "screenshot";

/// Accepts `1`, `true` and `on`, case-insensitively.
pub fn env_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "on")
}

/// Splits on `delimiter`, trims every token and drops empty ones.
pub fn split_trimmed(raw: &str, delimiter: char) -> Vec<String> {
    raw.split(delimiter)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadPreset {
    Default,
    ComputeOnly,
    ComputeChain,
}

impl WorkloadPreset {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compute_only" => Self::ComputeOnly,
            "compute_chain" => Self::ComputeChain,
            _ => Self::Default,
        }
    }

    pub fn is_compute_only(&self) -> bool {
        matches!(self, Self::ComputeOnly | Self::ComputeChain)
    }
}

/// Process-level switches, read once at startup.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub render_stage: u32,
    pub workload_preset: WorkloadPreset,
    pub compute_chain: Vec<String>,
    pub frame_profile: bool,
    /// GPU timestamps around the compute and graphics passes; implies the frame profile report
    pub gpu_trace: bool,
    pub startup_screenshot: bool,
    pub strip: StripOptions,
    pub graph_script: Option<PathBuf>,
    pub graph_script_run: bool,
    pub shader_dir: PathBuf,
    pub asset_dir: PathBuf,
    pub screenshot_dir: PathBuf,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            render_stage: DEFAULT_RENDER_STAGE,
            workload_preset: WorkloadPreset::Default,
            compute_chain: Vec::new(),
            frame_profile: false,
            gpu_trace: false,
            startup_screenshot: false,
            strip: StripOptions::default(),
            graph_script: None,
            graph_script_run: false,
            shader_dir: PathBuf::from(DEFAULT_SHADER_DIR),
            asset_dir: PathBuf::from(DEFAULT_ASSET_DIR),
            screenshot_dir: PathBuf::from(DEFAULT_SCREENSHOT_DIR),
        }
    }
}

impl EngineOptions {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).is_some_and(|value| env_truthy(&value));
        let dir = |key: &str, fallback: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(fallback))
        };

        Self {
            render_stage: parse_render_stage(lookup("CE_RENDER_STAGE").as_deref()),
            workload_preset: lookup("CE_WORKLOAD_PRESET")
                .map_or(WorkloadPreset::Default, |raw| WorkloadPreset::parse(&raw)),
            compute_chain: lookup("CE_COMPUTE_CHAIN")
                .map_or_else(Vec::new, |raw| split_trimmed(&raw, ',')),
            frame_profile: flag("CE_FRAME_PROFILE"),
            gpu_trace: flag("CE_GPU_TRACE"),
            startup_screenshot: flag("CE_STARTUP_SCREENSHOT"),
            strip: StripOptions::from_lookup(&lookup),
            graph_script: lookup("CE_GRAPH_SCRIPT")
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
            graph_script_run: flag("CE_GRAPH_SCRIPT_RUN"),
            shader_dir: dir("CE_SHADER_DIR", DEFAULT_SHADER_DIR),
            asset_dir: dir("CE_ASSET_DIR", DEFAULT_ASSET_DIR),
            screenshot_dir: dir("CE_SCREENSHOT_DIR", DEFAULT_SCREENSHOT_DIR),
        }
    }
}

fn parse_render_stage(raw: Option<&str>) -> u32 {
    match raw.map(|raw| raw.trim().parse::<i64>()) {
        Some(Ok(stage)) if stage < 0 => DEFAULT_RENDER_STAGE,
        Some(Ok(stage)) => stage.min(MAX_RENDER_STAGE as i64) as u32,
        _ => DEFAULT_RENDER_STAGE,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerrainSettings {
    pub grid_width: u32,
    pub grid_height: u32,
    pub alive_cells: u32,
    pub cell_size: f32,
    pub box_depth: f32,
}

impl TerrainSettings {
    pub fn cell_count(&self) -> u32 {
        self.grid_width * self.grid_height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldSettings {
    pub timer_speed: f32,
    pub water_threshold: f32,
    pub light_pos: Vec4,
    pub zoom_speed: f32,
    pub panning_speed: f32,
    pub field_of_view: f32,
    pub near_clipping: f32,
    pub far_clipping: f32,
    pub camera_position: Vec3,
}

/// Settings table installed once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub terrain: TerrainSettings,
    pub world: WorldSettings,
    pub pipelines: BTreeMap<String, PipelineDefinition>,
    pub render_graph: RenderGraph,
    pub draw_ops: BTreeMap<String, String>,
}

impl RuntimeConfig {
    pub fn pipeline(&self, name: &str) -> Option<&PipelineDefinition> {
        self.pipelines.get(name)
    }

    /// Draw strategy bound to a graphics pipeline, `Unknown` when none is bound.
    pub fn draw_op(&self, pipeline_name: &str) -> DrawOpId {
        self.draw_ops
            .get(pipeline_name)
            .map_or(DrawOpId::Unknown, |draw_op| DrawOpId::parse(draw_op))
    }

    pub fn execution_plan(&self) -> ExecutionPlan {
        self.render_graph.execution_plan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn options_from(vars: &[(&str, &str)]) -> EngineOptions {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineOptions::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn truthy_values() {
        assert!(env_truthy("1"));
        assert!(env_truthy("TRUE"));
        assert!(env_truthy("On"));
        assert!(!env_truthy("yes"));
        assert!(!env_truthy("0"));
        assert!(!env_truthy(""));
    }

    #[test]
    fn split_drops_blank_tokens() {
        assert_eq!(
            split_trimmed(" ComputeJitter, ,ComputeCopy ,", ','),
            vec!["ComputeJitter".to_string(), "ComputeCopy".to_string()],
        );
        assert!(split_trimmed("", ',').is_empty());
    }

    #[test]
    fn render_stage_parsing() {
        assert_eq!(options_from(&[]).render_stage, 4);
        assert_eq!(options_from(&[("CE_RENDER_STAGE", "2")]).render_stage, 2);
        assert_eq!(options_from(&[("CE_RENDER_STAGE", "9")]).render_stage, 5);
        assert_eq!(options_from(&[("CE_RENDER_STAGE", "-1")]).render_stage, 4);
        assert_eq!(options_from(&[("CE_RENDER_STAGE", "abc")]).render_stage, 4);
    }

    #[test]
    fn presets_and_flags() {
        let options = options_from(&[
            ("CE_WORKLOAD_PRESET", " Compute_Chain "),
            ("CE_COMPUTE_CHAIN", "ComputeCopy,ComputeJitter"),
            ("CE_FRAME_PROFILE", "on"),
            ("CE_GRAPH_SCRIPT", "graph.txt"),
        ]);
        assert_eq!(options.workload_preset, WorkloadPreset::ComputeChain);
        assert!(options.workload_preset.is_compute_only());
        assert_eq!(options.compute_chain, vec!["ComputeCopy", "ComputeJitter"]);
        assert!(options.frame_profile);
        assert!(!options.gpu_trace);
        assert!(!options.startup_screenshot);
        assert_eq!(options.graph_script, Some(PathBuf::from("graph.txt")));
        assert_eq!(options.shader_dir, PathBuf::from("shaders"));
    }

    #[test]
    fn gpu_trace_flag() {
        assert!(options_from(&[("CE_GPU_TRACE", "TRUE")]).gpu_trace);
        assert!(!options_from(&[("CE_GPU_TRACE", "0")]).gpu_trace);
        assert!(!options_from(&[]).gpu_trace);
    }

    #[test]
    fn unknown_preset_falls_back_to_default() {
        let options = options_from(&[("CE_WORKLOAD_PRESET", "turbo")]);
        assert_eq!(options.workload_preset, WorkloadPreset::Default);
    }
}
