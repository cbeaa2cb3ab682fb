use std::collections::BTreeSet;
use ash::vk;
use crate::config::graph::RenderStage;
use crate::config::{env_truthy, split_trimmed, RuntimeConfig};

const MAX_STRIP_ROWS: u32 = 2;
const DEFAULT_STRIP_ROWS: u32 = 2;
const MIN_CUSTOM_HEIGHT: u32 = 32;
const MIN_AUTO_HEIGHT: u32 = 48;
const MAX_PADDING: u32 = 64;
const STRIP_ZOOM: f32 = 4.0;

const LABEL_CELLS_ALL: &str = "CellsAll";
const LABEL_CURRENT: &str = "Current";

const PREFERRED_TILE_ORDER: [&str; 10] = [
    "LandscapeDebug",
    "LandscapeStage1",
    "LandscapeStage2",
    "LandscapeNormals",
    "LandscapeStatic",
    "Sky",
    "Landscape",
    "TerrainBox",
    "Cells",
    "CellsFollower",
];

/// Debug strip switches from `CE_RENDER_STAGE_STRIP*` and `CE_RENDER_STAGE_TILES`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StripOptions {
    pub enabled: bool,
    pub custom_height: Option<u32>,
    pub custom_padding: Option<u32>,
    pub custom_max_rows: Option<u32>,
    /// Each tile is a list of pipeline names or aliases.
    pub tiles: Vec<Vec<String>>,
}

impl StripOptions {
    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &str| lookup(key).and_then(|raw| raw.trim().parse::<i64>().ok());

        Self {
            enabled: lookup("CE_RENDER_STAGE_STRIP").is_some_and(|raw| env_truthy(&raw)),
            custom_height: number("CE_RENDER_STAGE_STRIP_HEIGHT")
                .filter(|height| *height > 0)
                .map(|height| height as u32),
            custom_padding: number("CE_RENDER_STAGE_STRIP_PADDING")
                .filter(|padding| *padding >= 0)
                .map(|padding| padding as u32),
            custom_max_rows: number("CE_RENDER_STAGE_STRIP_MAX_ROWS")
                .filter(|rows| *rows > 0)
                .map(|rows| rows as u32),
            tiles: lookup("CE_RENDER_STAGE_TILES")
                .map(|raw| {
                    split_trimmed(&raw, ',')
                        .iter()
                        .map(|tile| split_trimmed(tile, '+'))
                        .filter(|sources| !sources.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStripTile {
    pub label: String,
    pub pipelines: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct TileLayout {
    pub viewport: vk::Viewport,
    pub scissor: vk::Rect2D,
}

/// Row of inset tiles, each re-rendering a subset of graphics pipelines.
#[derive(Debug, Clone)]
pub struct StageStrip {
    pub tiles: Vec<StageStripTile>,
    custom_height: Option<u32>,
    padding: u32,
    max_rows: u32,
}

impl StageStrip {
    /// `None` when the strip is switched off or no tile resolves.
    pub fn new(options: &StripOptions, config: &RuntimeConfig) -> Option<Self> {
        if !options.enabled {
            return None;
        }

        let current = config.execution_plan().graphics;
        let mut tiles: Vec<StageStripTile> = options
            .tiles
            .iter()
            .map(|sources| StageStripTile {
                label: sources.join("+"),
                pipelines: sources
                    .iter()
                    .flat_map(|source| resolve_alias(source, &current))
                    .collect(),
            })
            .collect();
        if tiles.is_empty() {
            tiles = default_tiles(config);
        }
        let tiles = dedupe_tiles(tiles);
        if tiles.is_empty() {
            return None;
        }

        Some(Self {
            tiles,
            custom_height: options.custom_height,
            padding: options.custom_padding.unwrap_or(0).min(MAX_PADDING),
            max_rows: options
                .custom_max_rows
                .map_or(DEFAULT_STRIP_ROWS, |rows| rows.clamp(1, MAX_STRIP_ROWS)),
        })
    }

    pub fn strip_height(&self, extent: vk::Extent2D) -> u32 {
        let max_reasonable = (extent.height / 2).max(1);
        let height = match self.custom_height {
            Some(custom) => custom.max(MIN_CUSTOM_HEIGHT).min(max_reasonable),
            None => (extent.height / 15).max(MIN_AUTO_HEIGHT).min(max_reasonable),
        };
        (height * 2).min(max_reasonable)
    }

    /// Viewport and scissor for every visible tile, in tile order.
    pub fn layout(&self, extent: vk::Extent2D) -> Vec<(usize, TileLayout)> {
        let tile_height = self.strip_height(extent).max(1);
        if extent.height <= tile_height + 1 {
            return Vec::new();
        }

        let tile_count = self.tiles.len() as u32;
        let rows = self.max_rows.min(tile_count.max(1)).max(1);
        let columns = tile_count.div_ceil(rows);
        let width = extent.width.max(1);

        (0..tile_count)
            .filter_map(|index| {
                let row = index / columns;
                let column = index % columns;
                let tile_x = column * width / columns;
                let tile_x_next = (column + 1) * width / columns;
                let tile_width = (tile_x_next - tile_x).max(1);
                let tile_y = row * tile_height;
                let clamped_width = tile_width.min(extent.width - tile_x.min(extent.width));
                let clamped_height = tile_height.min(extent.height - tile_y.min(extent.height));
                if clamped_width == 0 || clamped_height == 0 {
                    return None;
                }

                let inset = self.padding.min(clamped_width / 4).min(clamped_height / 4);
                let center_x = tile_x as f32 + clamped_width as f32 * 0.5;
                let center_y = tile_y as f32 + clamped_height as f32 * 0.5;
                let zoomed_width = clamped_width as f32 * STRIP_ZOOM;
                let zoomed_height = clamped_height as f32 * STRIP_ZOOM;

                Some((index as usize, TileLayout {
                    viewport: vk::Viewport {
                        x: center_x - zoomed_width * 0.5,
                        y: center_y - zoomed_height * 0.5,
                        width: zoomed_width,
                        height: zoomed_height,
                        min_depth: 0.0,
                        max_depth: 1.0,
                    },
                    scissor: vk::Rect2D {
                        offset: vk::Offset2D {
                            x: (tile_x + inset) as i32,
                            y: (tile_y + inset) as i32,
                        },
                        extent: vk::Extent2D {
                            width: clamped_width - inset * 2,
                            height: clamped_height - inset * 2,
                        },
                    },
                }))
            })
            .collect()
    }
}

fn resolve_alias(source: &str, current: &[String]) -> Vec<String> {
    match source {
        LABEL_CELLS_ALL => vec!["Cells".to_string(), "CellsFollower".to_string()],
        LABEL_CURRENT => current.to_vec(),
        other => vec![other.to_string()],
    }
}

fn unique_preserve_order(values: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    values
        .iter()
        .filter(|value| seen.insert(value.as_str()))
        .cloned()
        .collect()
}

fn dedupe_tiles(tiles: Vec<StageStripTile>) -> Vec<StageStripTile> {
    let mut seen = BTreeSet::new();
    tiles
        .into_iter()
        .map(|tile| StageStripTile {
            pipelines: unique_preserve_order(&tile.pipelines),
            ..tile
        })
        .filter(|tile| !tile.pipelines.is_empty())
        .filter(|tile| seen.insert(tile.pipelines.join("|")))
        .collect()
}

fn default_tiles(config: &RuntimeConfig) -> Vec<StageStripTile> {
    // BTreeMap iteration is already sorted by name
    let drawable: Vec<&String> = config
        .pipelines
        .iter()
        .filter(|(name, definition)| !definition.is_compute() && config.draw_ops.contains_key(*name))
        .map(|(name, _)| name)
        .collect();

    let mut ordered: Vec<String> = PREFERRED_TILE_ORDER
        .iter()
        .copied()
        .filter(|name| drawable.iter().any(|d| d.as_str() == *name))
        .map(str::to_owned)
        .collect();
    for name in drawable {
        if !ordered.contains(name) {
            ordered.push(name.clone());
        }
    }

    let mut tiles: Vec<StageStripTile> = ordered
        .iter()
        .map(|name| StageStripTile {
            label: name.clone(),
            pipelines: vec![name.clone()],
        })
        .collect();

    if ordered.iter().any(|n| n == "Cells") && ordered.iter().any(|n| n == "CellsFollower") {
        tiles.push(StageStripTile {
            label: LABEL_CELLS_ALL.to_string(),
            pipelines: vec!["Cells".to_string(), "CellsFollower".to_string()],
        });
    }

    let current: Vec<String> = config
        .render_graph
        .stage_nodes(RenderStage::Graphics)
        .map(|node| node.pipeline.clone())
        .collect();
    if !current.is_empty() {
        tiles.push(StageStripTile {
            label: LABEL_CURRENT.to_string(),
            pipelines: current,
        });
    }

    tiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineOptions;
    use crate::config::scene::SceneConfig;

    fn enabled(tiles: &[&str]) -> StripOptions {
        StripOptions {
            enabled: true,
            tiles: tiles
                .iter()
                .map(|tile| split_trimmed(tile, '+'))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn options_from_lookup() {
        let options = StripOptions::from_lookup(&|key: &str| match key {
            "CE_RENDER_STAGE_STRIP" => Some("1".to_string()),
            "CE_RENDER_STAGE_STRIP_HEIGHT" => Some("-5".to_string()),
            "CE_RENDER_STAGE_STRIP_MAX_ROWS" => Some("1".to_string()),
            "CE_RENDER_STAGE_TILES" => Some("Sky+Cells, ,Landscape".to_string()),
            _ => None,
        });
        assert!(options.enabled);
        assert_eq!(options.custom_height, None);
        assert_eq!(options.custom_max_rows, Some(1));
        assert_eq!(options.tiles, vec![vec!["Sky".to_string(), "Cells".to_string()], vec!["Landscape".to_string()]]);
    }

    #[test]
    fn disabled_strip_is_none() {
        let config = SceneConfig::defaults(&EngineOptions::default());
        assert!(StageStrip::new(&StripOptions::default(), &config).is_none());
    }

    #[test]
    fn default_tiles_follow_preferred_order() {
        let config = SceneConfig::defaults(&EngineOptions::default());
        let strip = StageStrip::new(&enabled(&[]), &config).unwrap();
        let labels: Vec<_> = strip.tiles.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(&labels[..5], &[
            "LandscapeDebug",
            "LandscapeStage1",
            "LandscapeStage2",
            "LandscapeNormals",
            "LandscapeStatic",
        ]);
        assert!(labels.contains(&"CellsAll"));
        assert_eq!(labels.last(), Some(&"Current"));
    }

    #[test]
    fn custom_tiles_resolve_aliases_and_dedupe() {
        let config = SceneConfig::defaults(&EngineOptions::default());
        let strip = StageStrip::new(&enabled(&["Sky+CellsAll", "Sky+Cells+CellsFollower", "Landscape"]), &config)
            .unwrap();
        assert_eq!(strip.tiles.len(), 2);
        assert_eq!(strip.tiles[0].label, "Sky+CellsAll");
        assert_eq!(strip.tiles[0].pipelines, vec!["Sky", "Cells", "CellsFollower"]);
        assert_eq!(strip.tiles[1].pipelines, vec!["Landscape"]);
    }

    #[test]
    fn auto_height_is_doubled_and_capped() {
        let config = SceneConfig::defaults(&EngineOptions::default());
        let strip = StageStrip::new(&enabled(&["Sky"]), &config).unwrap();
        let extent = vk::Extent2D { width: 1920, height: 1080 };
        // 1080 / 15 = 72, doubled to 144
        assert_eq!(strip.strip_height(extent), 144);
        let tiny = vk::Extent2D { width: 100, height: 60 };
        assert_eq!(strip.strip_height(tiny), 30);
    }

    #[test]
    fn tiles_are_split_into_rows_and_columns() {
        let config = SceneConfig::defaults(&EngineOptions::default());
        let strip = StageStrip::new(&enabled(&["Sky", "Landscape", "TerrainBox"]), &config).unwrap();
        let extent = vk::Extent2D { width: 900, height: 1080 };
        let layout = strip.layout(extent);

        // 3 tiles over 2 rows gives 2 columns
        assert_eq!(layout.len(), 3);
        let (_, first) = layout[0];
        assert_eq!(first.scissor.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(first.scissor.extent, vk::Extent2D { width: 450, height: 144 });
        assert_eq!(first.viewport.width, 450.0 * 4.0);
        assert_eq!(first.viewport.x, 225.0 - 900.0);
        let (index, third) = layout[2];
        assert_eq!(index, 2);
        assert_eq!(third.scissor.offset, vk::Offset2D { x: 0, y: 144 });
    }

    #[test]
    fn strip_hidden_when_window_is_too_short() {
        let config = SceneConfig::defaults(&EngineOptions::default());
        let strip = StageStrip::new(&enabled(&["Sky"]), &config).unwrap();
        assert!(strip.layout(vk::Extent2D { width: 100, height: 1 }).is_empty());
    }
}
