use stepframe::{
    resolve_app_paths, AppPaths, AssetError, AssetLoader, LevelDef, LevelError, LoopConfig,
    StartupError, WorldConfig, WorldState,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use super::config::{load_game_config, ConfigError, GameConfig};

const START_LEVEL_FILE: &str = "start.xml";

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) world: WorldState,
}

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to load level: {0}")]
    Level(#[from] LevelError),
}

pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    info!("=== stepframe startup ===");
    let app_paths = resolve_app_paths()?;
    info!(
        root = %app_paths.root.display(),
        assets_dir = %app_paths.assets_dir.display(),
        config_path = %app_paths.config_path.display(),
        "startup"
    );

    let game_config = load_game_config(&app_paths.config_path)?;
    let world = build_world(&app_paths, &game_config)?;

    Ok(AppWiring {
        config: game_config.loop_config,
        world,
    })
}

/// Populates a world from the start level, then loads every sprite it queued.
fn build_world(app_paths: &AppPaths, game_config: &GameConfig) -> Result<WorldState, LevelError> {
    let world_config = WorldConfig {
        viewport: game_config.loop_config.viewport,
        camera: game_config.camera,
        player: game_config.player,
    };
    let mut world = WorldState::new(world_config, AssetLoader::new(&app_paths.assets_dir));

    let level_path = app_paths.levels_dir.join(START_LEVEL_FILE);
    let level = if level_path.is_file() {
        info!(path = %level_path.display(), "level_loading");
        LevelDef::load(&level_path)?
    } else {
        info!(path = %level_path.display(), "level_file_missing_using_builtin");
        LevelDef::builtin_start()
    };
    level.apply(&mut world);

    match world.assets_mut().force_download_all() {
        Ok(summary) => {
            if summary.failures.is_empty() {
                info!(loaded = summary.successes.len(), "assets_ready");
            } else {
                warn!(
                    loaded = summary.successes.len(),
                    failed = summary.failures.len(),
                    "assets_partially_loaded"
                );
            }
        }
        Err(AssetError::EmptyQueue) => debug!("asset_queue_empty"),
        Err(error) => warn!(error = %error, "asset_download_failed"),
    }

    Ok(world)
}
