use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::process::Command;
use glam::{Vec3, Vec4};
use color_eyre::eyre::{bail, eyre, WrapErr};
use color_eyre::Result;
use crate::config::graph::{ExecutionPlan, RenderGraph};
use crate::config::pipeline::{PipelineDefinition, ShaderStage};
use crate::config::RuntimeConfig;

const WIREFRAME_SUFFIX: &str = "WireFrame";
const ENGINE_PIPELINE: &str = "Engine";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderNode {
    pub id: String,
    pub shader_name: String,
    pub stage: ShaderStage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEndpoint {
    pub node_id: String,
    pub resource: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawBinding {
    pub pipeline: String,
    pub draw_op: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPipeline {
    pub name: String,
    pub is_compute: bool,
    pub shader_ids: Vec<String>,
    pub work_groups: [u32; 3],
}

/// Shader graph emitted by a graph script: nodes are shader stages, steps are shader names.
#[derive(Debug, Clone, Default)]
pub struct ShaderGraph {
    nodes: Vec<ShaderNode>,
    edges: Vec<GraphEdge>,
    draw_bindings: Vec<DrawBinding>,
    pipelines: Vec<ScriptPipeline>,
    settings: BTreeMap<String, String>,
    input: Option<GraphEndpoint>,
    output: Option<GraphEndpoint>,
    node_index: HashMap<String, usize>,
}

impl ShaderGraph {
    /// Runs `python3 <path> --emit-graph` for `.py` scripts, otherwise reads the file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = if path.extension().is_some_and(|ext| ext == "py") {
            let output = Command::new("python3")
                .arg(path)
                .arg("--emit-graph")
                .output()
                .wrap_err_with(|| format!("Failed to start python3 for {}", path.display()))?;
            if !output.status.success() {
                bail!("Graph script failed with {}: {}", output.status, path.display());
            }
            String::from_utf8(output.stdout).wrap_err("Graph script output is not UTF-8")?
        } else {
            fs::read_to_string(path)
                .wrap_err_with(|| format!("Failed to read graph file {}", path.display()))?
        };

        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut graph = Self::default();

        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            graph
                .parse_record(trimmed)
                .wrap_err_with(|| format!("Invalid graph record at line {}", line_number))?;
        }

        graph.validate().wrap_err("Graph validation failed")?;
        Ok(graph)
    }

    fn parse_record(&mut self, line: &str) -> Result<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let expect_len = |len: usize| {
            if tokens.len() == len {
                Ok(())
            } else {
                Err(eyre!("{} record takes {} fields, got {}", tokens[0], len - 1, tokens.len() - 1))
            }
        };

        match tokens[0] {
            "NODE" => {
                expect_len(4)?;
                let stage = ShaderStage::from_extension(tokens[3])
                    .ok_or_else(|| eyre!("Shader stage '{}' is unknown for node {}", tokens[3], tokens[1]))?;
                self.add_node(ShaderNode {
                    id: tokens[1].to_owned(),
                    shader_name: tokens[2].to_owned(),
                    stage,
                })
            }
            "EDGE" => {
                expect_len(3)?;
                self.add_edge(GraphEdge {
                    from: tokens[1].to_owned(),
                    to: tokens[2].to_owned(),
                })
            }
            "INPUT" => {
                expect_len(3)?;
                self.input = Some(GraphEndpoint {
                    node_id: tokens[1].to_owned(),
                    resource: tokens[2].to_owned(),
                });
                Ok(())
            }
            "OUTPUT" => {
                expect_len(3)?;
                self.output = Some(GraphEndpoint {
                    node_id: tokens[1].to_owned(),
                    resource: tokens[2].to_owned(),
                });
                Ok(())
            }
            "DRAW" => {
                expect_len(3)?;
                self.add_draw_binding(DrawBinding {
                    pipeline: tokens[1].to_owned(),
                    draw_op: tokens[2].to_owned(),
                })
            }
            "SETTING" => {
                expect_len(3)?;
                self.add_setting(tokens[1], tokens[2])
            }
            "PIPELINE" => {
                if !(4..=5).contains(&tokens.len()) {
                    bail!("PIPELINE record takes 3 or 4 fields, got {}", tokens.len() - 1);
                }
                let is_compute = match tokens[2] {
                    "compute" => true,
                    "graphics" => false,
                    other => bail!("Pipeline kind '{}' is neither graphics nor compute", other),
                };
                let work_groups = match tokens.get(4) {
                    Some(raw) => parse_work_groups(raw)?,
                    None => [0, 0, 0],
                };
                self.add_pipeline(ScriptPipeline {
                    name: tokens[1].to_owned(),
                    is_compute,
                    shader_ids: tokens[3]
                        .split(',')
                        .filter(|id| !id.is_empty())
                        .map(str::to_owned)
                        .collect(),
                    work_groups,
                })
            }
            other => bail!("Unknown record type: {}", other),
        }
    }

    pub fn add_node(&mut self, node: ShaderNode) -> Result<()> {
        if node.id.is_empty() {
            bail!("Node id cannot be blank");
        }
        if node.shader_name.is_empty() {
            bail!("Shader name cannot be blank for node {}", node.id);
        }
        if self.node_index.contains_key(&node.id) {
            bail!("Duplicate node id: {}", node.id);
        }

        self.node_index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    pub fn add_edge(&mut self, edge: GraphEdge) -> Result<()> {
        if !self.node_index.contains_key(&edge.from) {
            bail!("Edge source node does not exist: {}", edge.from);
        }
        if !self.node_index.contains_key(&edge.to) {
            bail!("Edge target node does not exist: {}", edge.to);
        }
        self.edges.push(edge);
        Ok(())
    }

    pub fn add_draw_binding(&mut self, binding: DrawBinding) -> Result<()> {
        if self.draw_bindings.iter().any(|b| b.pipeline == binding.pipeline) {
            bail!("Duplicate draw binding for pipeline {}", binding.pipeline);
        }
        self.draw_bindings.push(binding);
        Ok(())
    }

    pub fn add_pipeline(&mut self, pipeline: ScriptPipeline) -> Result<()> {
        if self.pipelines.iter().any(|p| p.name == pipeline.name) {
            bail!("Duplicate pipeline definition: {}", pipeline.name);
        }
        if pipeline.shader_ids.is_empty() {
            bail!("Pipeline definition has no shaders: {}", pipeline.name);
        }
        self.pipelines.push(pipeline);
        Ok(())
    }

    pub fn add_setting(&mut self, key: &str, value: &str) -> Result<()> {
        if self.settings.contains_key(key) {
            bail!("Duplicate setting key: {}", key);
        }
        self.settings.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn node(&self, id: &str) -> Option<&ShaderNode> {
        self.node_index.get(id).map(|&index| &self.nodes[index])
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            bail!("Graph has no nodes");
        }
        let input = self.input.as_ref().ok_or_else(|| eyre!("Graph is missing an INPUT endpoint"))?;
        let output = self.output.as_ref().ok_or_else(|| eyre!("Graph is missing an OUTPUT endpoint"))?;
        if self.node(&input.node_id).is_none() {
            bail!("Input endpoint node does not exist: {}", input.node_id);
        }
        if self.node(&output.node_id).is_none() {
            bail!("Output endpoint node does not exist: {}", output.node_id);
        }

        for pipeline in &self.pipelines {
            let mut has_compute = false;
            let mut has_graphics = false;
            for id in &pipeline.shader_ids {
                let node = self
                    .node(id)
                    .ok_or_else(|| eyre!("Pipeline {} references unknown shader node {}", pipeline.name, id))?;
                if node.stage == ShaderStage::Comp {
                    has_compute = true;
                } else {
                    has_graphics = true;
                }
            }
            if pipeline.is_compute && !has_compute {
                bail!("Compute pipeline {} has no compute shader", pipeline.name);
            }
            if !pipeline.is_compute && !has_graphics {
                bail!("Graphics pipeline {} has no graphics shaders", pipeline.name);
            }
        }

        for binding in &self.draw_bindings {
            let known = self
                .pipelines
                .iter()
                .any(|p| p.name == binding.pipeline && !p.is_compute)
                || self
                    .nodes
                    .iter()
                    .any(|n| n.shader_name == binding.pipeline && n.stage != ShaderStage::Comp);
            if !known {
                bail!("Draw binding references unknown graphics pipeline {}", binding.pipeline);
            }
        }

        Ok(())
    }

    /// Orders shader-name steps topologically and splits them around the graphics steps.
    pub fn execution_plan(&self) -> ExecutionPlan {
        let mut discovered: Vec<&str> = Vec::new();
        let mut has_graphics: HashSet<&str> = HashSet::new();
        for node in &self.nodes {
            let step = node.shader_name.as_str();
            if !discovered.contains(&step) {
                discovered.push(step);
            }
            if node.stage != ShaderStage::Comp {
                has_graphics.insert(step);
            }
        }

        let step_edges: Vec<(&str, &str)> = self
            .edges
            .iter()
            .filter_map(|edge| {
                Some((
                    self.node(&edge.from)?.shader_name.as_str(),
                    self.node(&edge.to)?.shader_name.as_str(),
                ))
            })
            .collect();

        let ordered = topo_sort(&discovered, &step_edges);
        let first_graphics = ordered
            .iter()
            .position(|step| has_graphics.contains(step))
            .unwrap_or(ordered.len());

        let mut plan = ExecutionPlan::default();
        for (index, step) in ordered.iter().enumerate() {
            let target = if has_graphics.contains(step) {
                &mut plan.graphics
            } else if index < first_graphics {
                &mut plan.pre_compute
            } else {
                &mut plan.post_compute
            };
            target.push((*step).to_owned());
        }
        plan
    }

    /// Applies settings, pipelines, draw ops and the derived plan on top of `base`.
    pub fn install(&self, base: RuntimeConfig) -> Result<RuntimeConfig> {
        let mut config = base;
        self.apply_settings(&mut config)?;

        config.pipelines = if self.pipelines.is_empty() {
            self.derived_pipelines()?
        } else {
            self.declared_pipelines()
        };

        config.draw_ops = self
            .draw_bindings
            .iter()
            .map(|binding| (binding.pipeline.clone(), binding.draw_op.clone()))
            .collect();

        let mut plan = self.execution_plan();
        for steps in [&mut plan.pre_compute, &mut plan.graphics, &mut plan.post_compute] {
            steps.retain(|step| {
                let known = config.pipelines.contains_key(step);
                if !known {
                    log::warn!("Graph step {} has no pipeline definition, skipping", step);
                }
                known
            });
        }
        config.render_graph = RenderGraph::from_plan(&plan, &config.draw_ops);

        Ok(config)
    }

    fn apply_settings(&self, config: &mut RuntimeConfig) -> Result<()> {
        let terrain = &mut config.terrain;
        terrain.grid_width = self.setting("terrain.grid_width", terrain.grid_width)?;
        terrain.grid_height = self.setting("terrain.grid_height", terrain.grid_height)?;
        terrain.alive_cells = self.setting("terrain.alive_cells", terrain.alive_cells)?;
        terrain.cell_size = self.setting("terrain.cell_size", terrain.cell_size)?;
        terrain.box_depth = self.setting("terrain.box_depth", terrain.box_depth)?;

        let world = &mut config.world;
        world.timer_speed = self.setting("world.timer_speed", world.timer_speed)?;
        world.water_threshold = self.setting("world.water_threshold", world.water_threshold)?;
        if let Some(light) = self.float_list::<4>("world.light_pos")? {
            world.light_pos = Vec4::from_array(light);
        }
        world.zoom_speed = self.setting("camera.zoom_speed", world.zoom_speed)?;
        world.panning_speed = self.setting("camera.panning_speed", world.panning_speed)?;
        world.field_of_view = self.setting("camera.field_of_view", world.field_of_view)?;
        world.near_clipping = self.setting("camera.near_clipping", world.near_clipping)?;
        world.far_clipping = self.setting("camera.far_clipping", world.far_clipping)?;
        if let Some(position) = self.float_list::<3>("camera.position")? {
            world.camera_position = Vec3::from_array(position);
        }

        Ok(())
    }

    fn setting<T>(&self, key: &str, fallback: T) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.settings.get(key) {
            Some(raw) => raw
                .parse()
                .wrap_err_with(|| format!("Setting {} has invalid value '{}'", key, raw)),
            None => Ok(fallback),
        }
    }

    /// Comma separated floats; a malformed count keeps the current value.
    fn float_list<const N: usize>(&self, key: &str) -> Result<Option<[f32; N]>> {
        let Some(raw) = self.settings.get(key) else {
            return Ok(None);
        };
        let values = raw
            .split(',')
            .map(|token| token.trim().parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .wrap_err_with(|| format!("Setting {} has invalid value '{}'", key, raw))?;
        Ok(values.try_into().ok())
    }

    /// The simulation pass is sized from the grid at dispatch time
    fn fallback_work_groups(name: &str) -> [u32; 3] {
        if name == ENGINE_PIPELINE {
            [0, 0, 0]
        } else {
            [1, 1, 1]
        }
    }

    fn declared_pipelines(&self) -> BTreeMap<String, PipelineDefinition> {
        self.pipelines
            .iter()
            .map(|pipeline| {
                let definition = if pipeline.is_compute {
                    let work_groups = if pipeline.work_groups.contains(&0) {
                        Self::fallback_work_groups(&pipeline.name)
                    } else {
                        pipeline.work_groups
                    };
                    PipelineDefinition::Compute {
                        shaders: pipeline.shader_ids.clone(),
                        work_groups,
                    }
                } else {
                    PipelineDefinition::Graphics {
                        shaders: pipeline.shader_ids.clone(),
                    }
                };
                (pipeline.name.clone(), definition)
            })
            .collect()
    }

    /// Groups nodes by shader name; `*WireFrame` groups borrow the base group's vert/frag.
    fn derived_pipelines(&self) -> Result<BTreeMap<String, PipelineDefinition>> {
        let mut groups: BTreeMap<&str, Vec<&ShaderNode>> = BTreeMap::new();
        for node in &self.nodes {
            groups.entry(node.shader_name.as_str()).or_default().push(node);
        }

        let mut pipelines = BTreeMap::new();
        for (name, nodes) in &groups {
            let mut members = nodes.clone();
            let is_compute = members.iter().any(|node| node.stage == ShaderStage::Comp);

            if !is_compute {
                if let Some(base) = name
                    .strip_suffix(WIREFRAME_SUFFIX)
                    .and_then(|base| groups.get(base))
                {
                    for stage in [ShaderStage::Vert, ShaderStage::Frag] {
                        if members.iter().all(|node| node.stage != stage) {
                            members.extend(base.iter().copied().find(|node| node.stage == stage));
                        }
                    }
                }
            }

            members.sort_by(|a, b| a.stage.cmp(&b.stage).then_with(|| a.id.cmp(&b.id)));
            members.dedup_by(|a, b| a.id == b.id);
            let shaders = members.iter().map(|node| node.id.clone()).collect();

            let definition = if is_compute {
                let fallback = Self::fallback_work_groups(name);
                let work_groups = match self.settings.get(&format!("workgroups.{}", name)) {
                    Some(raw) => parse_work_groups(raw)
                        .wrap_err_with(|| format!("Setting workgroups.{} is invalid", name))?
                        .map(|count| count.max(1)),
                    None => fallback,
                };
                PipelineDefinition::Compute { shaders, work_groups }
            } else {
                PipelineDefinition::Graphics { shaders }
            };
            pipelines.insert((*name).to_owned(), definition);
        }

        Ok(pipelines)
    }

    pub fn log(&self) {
        log::info!("Graph nodes: {}", self.nodes.len());
        for node in &self.nodes {
            log::info!("  - {} => {}.{}", node.id, node.shader_name, node.stage.extension());
        }
        log::info!("Graph edges: {}", self.edges.len());
        for edge in &self.edges {
            log::info!("  - {} -> {}", edge.from, edge.to);
        }
        if let Some(input) = &self.input {
            log::info!("Input: {} {}", input.node_id, input.resource);
        }
        if let Some(output) = &self.output {
            log::info!("Output: {} {}", output.node_id, output.resource);
        }
    }
}

fn parse_work_groups(raw: &str) -> Result<[u32; 3]> {
    let counts = raw
        .split(',')
        .map(|token| token.trim().parse::<f32>().map(|value| value.max(0.0) as u32))
        .collect::<Result<Vec<_>, _>>()
        .wrap_err_with(|| format!("Invalid work group counts '{}'", raw))?;
    counts
        .try_into()
        .map_err(|_| eyre!("Work group counts need three components: '{}'", raw))
}

/// Kahn's algorithm seeded in discovery order; cycles fall back to discovery order.
fn topo_sort<'a>(steps: &[&'a str], edges: &[(&'a str, &'a str)]) -> Vec<&'a str> {
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = steps.iter().map(|&step| (step, 0)).collect();

    for &(from, to) in edges {
        if from == to || !in_degree.contains_key(from) || !in_degree.contains_key(to) {
            continue;
        }
        let next = successors.entry(from).or_default();
        if !next.contains(&to) {
            next.push(to);
            *in_degree.entry(to).or_default() += 1;
        }
    }

    let mut ready: VecDeque<&str> = steps
        .iter()
        .copied()
        .filter(|step| in_degree[step] == 0)
        .collect();
    let mut ordered = Vec::with_capacity(steps.len());

    while let Some(step) = ready.pop_front() {
        ordered.push(step);
        for &next in successors.get(step).map(Vec::as_slice).unwrap_or_default() {
            let degree = in_degree.entry(next).or_default();
            *degree -= 1;
            if *degree == 0 {
                ready.push_back(next);
            }
        }
    }

    if ordered.len() != steps.len() {
        log::warn!("Shader graph has a cycle, using discovery order");
        return steps.to_vec();
    }
    ordered
}
