use std::fmt;
use std::path::{Path, PathBuf};
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShaderStage {
    Vert,
    Tesc,
    Tese,
    Geom,
    Frag,
    Comp,
}

impl ShaderStage {
    const ALL: [Self; 6] = [
        Self::Vert,
        Self::Tesc,
        Self::Tese,
        Self::Geom,
        Self::Frag,
        Self::Comp,
    ];

    pub fn from_extension(extension: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.extension() == extension)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Vert => "vert",
            Self::Tesc => "tesc",
            Self::Tese => "tese",
            Self::Geom => "geom",
            Self::Frag => "frag",
            Self::Comp => "comp",
        }
    }

    /// Suffix used by shader ids, e.g. the `Vert` in `CellsVert`.
    fn id_suffix(&self) -> &'static str {
        match self {
            Self::Vert => "Vert",
            Self::Tesc => "Tesc",
            Self::Tese => "Tese",
            Self::Geom => "Geom",
            Self::Frag => "Frag",
            Self::Comp => "Comp",
        }
    }

    pub fn flags(&self) -> vk::ShaderStageFlags {
        match self {
            Self::Vert => vk::ShaderStageFlags::VERTEX,
            Self::Tesc => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            Self::Tese => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            Self::Geom => vk::ShaderStageFlags::GEOMETRY,
            Self::Frag => vk::ShaderStageFlags::FRAGMENT,
            Self::Comp => vk::ShaderStageFlags::COMPUTE,
        }
    }
}

/// A shader id resolved to its source name and stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderRef {
    pub id: String,
    pub name: String,
    pub stage: ShaderStage,
}

impl ShaderRef {
    pub fn parse(id: &str) -> Result<Self> {
        ShaderStage::ALL
            .into_iter()
            .find_map(|stage| {
                id.strip_suffix(stage.id_suffix())
                    .filter(|name| !name.is_empty())
                    .map(|name| Self {
                        id: id.to_owned(),
                        name: name.to_owned(),
                        stage,
                    })
            })
            .ok_or_else(|| eyre!("Shader id '{}' has no stage suffix", id))
    }

    /// `Cells.vert` for `CellsVert`.
    pub fn source_file_name(&self) -> String {
        format!("{}.{}", self.name, self.stage.extension())
    }

    pub fn source_path(&self, shader_dir: &Path) -> PathBuf {
        shader_dir.join(self.source_file_name())
    }

    pub fn binary_path(&self, shader_dir: &Path) -> PathBuf {
        shader_dir
            .join("spv")
            .join(format!("{}.spv", self.source_file_name()))
    }
}

/// Declarative pipeline entry, keyed by name in the runtime config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineDefinition {
    Graphics {
        shaders: Vec<String>,
    },
    Compute {
        shaders: Vec<String>,
        /// A zero component means "derive from the current extent or grid".
        work_groups: [u32; 3],
    },
}

impl PipelineDefinition {
    pub fn graphics(shaders: &[&str]) -> Self {
        Self::Graphics {
            shaders: shaders.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn compute(shaders: &[&str]) -> Self {
        Self::Compute {
            shaders: shaders.iter().map(|s| s.to_string()).collect(),
            work_groups: [0, 0, 0],
        }
    }

    pub fn is_compute(&self) -> bool {
        matches!(self, Self::Compute { .. })
    }

    pub fn shaders(&self) -> &[String] {
        match self {
            Self::Graphics { shaders } => shaders,
            Self::Compute { shaders, .. } => shaders,
        }
    }

    pub fn shader_refs(&self) -> Result<Vec<ShaderRef>> {
        self.shaders()
            .iter()
            .map(|id| ShaderRef::parse(id))
            .collect()
    }

    pub fn has_tessellation(&self) -> bool {
        self.shaders()
            .iter()
            .filter_map(|id| ShaderRef::parse(id).ok())
            .any(|shader| shader.stage == ShaderStage::Tesc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawOpId {
    Unknown,
    InstancedCells,
    IndexedGrid,
    IndexedGridBox,
    IndexedRectangle,
    IndexedCube,
    SkyDome,
}

impl DrawOpId {
    pub fn parse(draw_op: &str) -> Self {
        match draw_op {
            "cells_instanced" | "instanced:cells" => Self::InstancedCells,
            "grid_indexed" | "grid_wireframe" | "indexed:grid" => Self::IndexedGrid,
            "indexed:grid_box" => Self::IndexedGridBox,
            "rectangle_indexed" | "indexed:rectangle" => Self::IndexedRectangle,
            "indexed:cube" => Self::IndexedCube,
            "sky_dome" => Self::SkyDome,
            other if other.starts_with("indexed:") => Self::IndexedRectangle,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::InstancedCells => "instanced:cells",
            Self::IndexedGrid => "indexed:grid",
            Self::IndexedGridBox => "indexed:grid_box",
            Self::IndexedRectangle => "indexed:rectangle",
            Self::IndexedCube => "indexed:cube",
            Self::SkyDome => "sky_dome",
        }
    }
}

impl fmt::Display for DrawOpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_ids_resolve_to_files() {
        let shader = ShaderRef::parse("CellsFollowerVert").unwrap();
        assert_eq!(shader.name, "CellsFollower");
        assert_eq!(shader.stage, ShaderStage::Vert);
        assert_eq!(shader.source_file_name(), "CellsFollower.vert");
        assert_eq!(
            shader.binary_path(Path::new("shaders")),
            PathBuf::from("shaders/spv/CellsFollower.vert.spv"),
        );

        let tesc = ShaderRef::parse("LandscapeWireFrameTesc").unwrap();
        assert_eq!(tesc.stage, ShaderStage::Tesc);
        assert_eq!(tesc.source_file_name(), "LandscapeWireFrame.tesc");
    }

    #[test]
    fn shader_id_without_suffix_is_rejected() {
        assert!(ShaderRef::parse("Cells").is_err());
        assert!(ShaderRef::parse("Vert").is_err());
    }

    #[test]
    fn draw_op_aliases() {
        assert_eq!(DrawOpId::parse("cells_instanced"), DrawOpId::InstancedCells);
        assert_eq!(DrawOpId::parse("instanced:cells"), DrawOpId::InstancedCells);
        assert_eq!(DrawOpId::parse("grid_wireframe"), DrawOpId::IndexedGrid);
        assert_eq!(DrawOpId::parse("indexed:grid_box"), DrawOpId::IndexedGridBox);
        assert_eq!(DrawOpId::parse("rectangle_indexed"), DrawOpId::IndexedRectangle);
        assert_eq!(DrawOpId::parse("indexed:cube"), DrawOpId::IndexedCube);
        assert_eq!(DrawOpId::parse("sky_dome"), DrawOpId::SkyDome);
        assert_eq!(DrawOpId::parse("indexed:water"), DrawOpId::IndexedRectangle);
        assert_eq!(DrawOpId::parse("points"), DrawOpId::Unknown);
    }

    #[test]
    fn draw_op_canonical_names_parse_back() {
        for op in [
            DrawOpId::InstancedCells,
            DrawOpId::IndexedGrid,
            DrawOpId::IndexedGridBox,
            DrawOpId::IndexedRectangle,
            DrawOpId::IndexedCube,
            DrawOpId::SkyDome,
        ] {
            assert_eq!(DrawOpId::parse(&op.to_string()), op);
        }
    }

    #[test]
    fn tessellation_detected_from_shader_list() {
        let plain = PipelineDefinition::graphics(&["LandscapeVert", "LandscapeFrag"]);
        assert!(!plain.has_tessellation());
        let tess = PipelineDefinition::graphics(&[
            "LandscapeVert",
            "LandscapeWireFrameTesc",
            "LandscapeWireFrameTese",
            "LandscapeFrag",
        ]);
        assert!(tess.has_tessellation());
        assert!(!tess.is_compute());
    }
}
