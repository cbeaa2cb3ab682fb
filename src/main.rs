pub mod app;
pub mod config;
pub mod renderer;
pub mod world;

use std::sync::Arc;
use color_eyre::Result;
use app::App;
use config::scene::SceneConfig;
use config::script::ShaderGraph;
use config::EngineOptions;

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let options = EngineOptions::from_env();
    let mut config = SceneConfig::defaults(&options);

    if let Some(path) = &options.graph_script {
        let graph = ShaderGraph::load(path)?;
        graph.log();
        config = graph.install(config)?;
        config.execution_plan().log();
        log::info!("Installed shader graph from {}", path.display());

        if !options.graph_script_run {
            return Ok(());
        }
    }

    App::run(Arc::new(config), options)
}
