mod camera;
mod entity;
mod input;
mod loop_runner;
mod metrics;
mod rendering;
mod scheduler;
mod tiles;
mod world;

pub use camera::{Camera, CameraConfig, CAMERA_OFFSET_DEFAULT, CAMERA_SMOOTHING_DEFAULT};
pub use entity::{
    CreateContext, Dummy, Entity, EntityBehavior, EntityBody, EntityCore, EntityKind,
    EntityRegistry, FaultSource, HookError, HookFault, Player, PlayerTuning, SpawnError,
    ENTITY_COLOR, ENTITY_SIZE_WORLD,
};
pub use input::{InputTracker, Key, KeyState, PointerButton};
pub use loop_runner::{run_app, run_app_with_metrics, AppError, LoopConfig};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use rendering::{
    world_rect_to_screen, PixelSurface, Renderer, Rgba, ScreenRect, Surface, Viewport,
    CLEAR_COLOR,
};
pub use scheduler::{
    tick_period_for_rate, ClockKind, FrameScheduler, PumpReport, SchedulerConfig,
    SimulationAdvance,
};
pub use tiles::{
    Block, BlockOverrides, BlockProperties, StaticTileSet, BLOCK_FALLBACK_COLOR,
    BLOCK_TILES_MAX, BLOCK_TILE_SIZE_DEFAULT,
};
pub use world::{EntityId, Vec2, WorldConfig, WorldState};
