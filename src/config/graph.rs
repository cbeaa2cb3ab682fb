use std::collections::BTreeMap;
use crate::config::pipeline::DrawOpId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    PreCompute,
    Graphics,
    PostCompute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderNode {
    pub stage: RenderStage,
    pub pipeline: String,
    pub draw_op: DrawOpId,
}

/// Ordered pipeline names partitioned into the three stages of a frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub pre_compute: Vec<String>,
    pub graphics: Vec<String>,
    pub post_compute: Vec<String>,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.pre_compute.is_empty() && self.graphics.is_empty() && self.post_compute.is_empty()
    }

    pub fn log(&self) {
        log::info!("Execution plan:");
        for (label, pipelines) in [
            ("pre-compute", &self.pre_compute),
            ("graphics", &self.graphics),
            ("post-compute", &self.post_compute),
        ] {
            for pipeline in pipelines {
                log::info!("  - {}: {}", label, pipeline);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderGraph {
    pub nodes: Vec<RenderNode>,
}

impl RenderGraph {
    pub fn from_plan(plan: &ExecutionPlan, draw_ops: &BTreeMap<String, String>) -> Self {
        let mut graph = Self::default();
        graph.push_compute(RenderStage::PreCompute, &plan.pre_compute);
        graph.push_graphics(&plan.graphics, draw_ops);
        graph.push_compute(RenderStage::PostCompute, &plan.post_compute);
        graph
    }

    pub fn push_compute(&mut self, stage: RenderStage, pipelines: &[String]) {
        self.nodes.extend(pipelines.iter().map(|pipeline| RenderNode {
            stage,
            pipeline: pipeline.clone(),
            draw_op: DrawOpId::Unknown,
        }));
    }

    pub fn push_graphics(&mut self, pipelines: &[String], draw_ops: &BTreeMap<String, String>) {
        self.nodes.extend(pipelines.iter().map(|pipeline| RenderNode {
            stage: RenderStage::Graphics,
            pipeline: pipeline.clone(),
            draw_op: draw_ops
                .get(pipeline)
                .map_or(DrawOpId::Unknown, |op| DrawOpId::parse(op)),
        }));
    }

    pub fn stage_nodes(&self, stage: RenderStage) -> impl Iterator<Item = &RenderNode> {
        self.nodes.iter().filter(move |node| node.stage == stage)
    }

    pub fn execution_plan(&self) -> ExecutionPlan {
        let names = |stage| {
            self.stage_nodes(stage)
                .map(|node| node.pipeline.clone())
                .collect()
        };
        ExecutionPlan {
            pre_compute: names(RenderStage::PreCompute),
            graphics: names(RenderStage::Graphics),
            post_compute: names(RenderStage::PostCompute),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_round_trips_through_graph_with_draw_ops() {
        let plan = ExecutionPlan {
            pre_compute: vec!["Engine".into()],
            graphics: vec!["Sky".into(), "Cells".into(), "Water".into()],
            post_compute: vec!["PostFX".into()],
        };
        let draw_ops = BTreeMap::from([
            ("Sky".to_string(), "sky_dome".to_string()),
            ("Cells".to_string(), "cells_instanced".to_string()),
        ]);
        let graph = RenderGraph::from_plan(&plan, &draw_ops);

        assert_eq!(graph.nodes.len(), 5);
        let graphics: Vec<_> = graph.stage_nodes(RenderStage::Graphics).collect();
        assert_eq!(graphics[0].draw_op, DrawOpId::SkyDome);
        assert_eq!(graphics[1].draw_op, DrawOpId::InstancedCells);
        assert_eq!(graphics[2].draw_op, DrawOpId::Unknown);
        assert_eq!(graph.execution_plan(), plan);
    }
}
