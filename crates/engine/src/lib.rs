use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod content;

pub use app::{
    run_app, run_app_with_metrics, AppError, Block, BlockOverrides, BlockProperties, Camera,
    CameraConfig, ClockKind, Entity, EntityId, EntityKind, EntityRegistry, FrameScheduler,
    HookError, HookFault, InputTracker, Key, KeyState, LoopConfig, LoopMetricsSnapshot,
    MetricsHandle, PlayerTuning, PointerButton, PumpReport, SchedulerConfig, SimulationAdvance,
    SpawnError, StaticTileSet, Surface, Vec2, Viewport, WorldConfig, WorldState,
};
pub use content::{
    AssetError, AssetLoader, DownloadSummary, LevelDef, LevelError, LevelErrorCode, SpriteImage,
};

pub const ROOT_ENV_VAR: &str = "STEPFRAME_ROOT";
pub const CONFIG_ENV_VAR: &str = "STEPFRAME_CONFIG";
pub const CONFIG_FILE_NAME: &str = "stepframe.json";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub assets_dir: PathBuf,
    pub levels_dir: PathBuf,
    pub config_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("STEPFRAME_ROOT does not point to a project root: {path}")]
    InvalidEnvRoot { path: PathBuf },
    #[error("no project root above {start_dir}; set {env_var}")]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    let config_path = match env::var(CONFIG_ENV_VAR) {
        Ok(value) => PathBuf::from(value),
        Err(env::VarError::NotPresent) => root.join(CONFIG_FILE_NAME),
        Err(source) => {
            return Err(StartupError::EnvVar {
                var: CONFIG_ENV_VAR,
                source,
            })
        }
    };
    Ok(app_paths_for_root(root, config_path))
}

fn app_paths_for_root(root: PathBuf, config_path: PathBuf) -> AppPaths {
    let assets_dir = root.join("assets");
    let levels_dir = assets_dir.join("levels");
    AppPaths {
        root,
        assets_dir,
        levels_dir,
        config_path,
    }
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let raw = PathBuf::from(value);
            let normalized = normalize_path(&raw);
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            find_root_upward(&exe_dir).ok_or_else(|| StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn find_root_upward(start_dir: &Path) -> Option<PathBuf> {
    start_dir
        .ancestors()
        .find(|candidate| is_repo_marker(candidate))
        .map(normalize_path)
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
