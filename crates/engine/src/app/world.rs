use serde::Deserialize;

use crate::content::AssetLoader;

use super::camera::{Camera, CameraConfig};
use super::entity::{Entity, EntityKind, EntityRegistry, HookFault, PlayerTuning, SpawnError};
use super::input::InputTracker;
use super::rendering::{Surface, Viewport};
use super::tiles::{Block, BlockOverrides, StaticTileSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub u64);

#[derive(Debug, Clone, Copy, Default)]
pub struct WorldConfig {
    pub viewport: Viewport,
    pub camera: CameraConfig,
    pub player: PlayerTuning,
}

/// Everything a running game mutates: handed by reference to the scheduler
/// and to every hook, so independent worlds can coexist.
#[derive(Debug)]
pub struct WorldState {
    entities: EntityRegistry,
    tiles: StaticTileSet,
    camera: Camera,
    input: InputTracker,
    assets: AssetLoader,
}

impl WorldState {
    pub fn new(config: WorldConfig, assets: AssetLoader) -> Self {
        Self {
            entities: EntityRegistry::new(config.player),
            tiles: StaticTileSet::default(),
            camera: Camera::new(config.camera),
            input: InputTracker::new(config.viewport),
            assets,
        }
    }

    pub fn spawn(&mut self, kind: &str, x: f32, y: f32) -> Result<&Entity, SpawnError> {
        self.entities.spawn(kind, x, y, &mut self.camera)
    }

    pub fn spawn_kind(&mut self, kind: EntityKind, x: f32, y: f32) -> &Entity {
        self.entities.spawn_kind(kind, x, y, &mut self.camera)
    }

    pub fn add_block(
        &mut self,
        x: f32,
        y: f32,
        sprite: impl Into<String>,
        overrides: BlockOverrides,
    ) -> &Block {
        self.tiles.add(x, y, sprite, overrides)
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    pub fn tiles(&self) -> &StaticTileSet {
        &self.tiles
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn input(&self) -> &InputTracker {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputTracker {
        &mut self.input
    }

    pub fn assets(&self) -> &AssetLoader {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut AssetLoader {
        &mut self.assets
    }

    pub(crate) fn update_camera(&mut self) {
        let subject_position = self
            .camera
            .subject()
            .and_then(|id| self.entities.get(id))
            .map(Entity::position);
        self.camera.update(subject_position);
    }

    pub(crate) fn step_entities(&mut self) -> Vec<HookFault> {
        self.entities.step_all(&self.input)
    }

    pub(crate) fn consolidate_input(&mut self) {
        self.input.consolidate();
    }

    pub(crate) fn draw_tiles(&self, surface: &mut dyn Surface) -> Vec<HookFault> {
        self.tiles.draw_all(&self.camera, &self.assets, surface)
    }

    pub(crate) fn draw_entities(&self, surface: &mut dyn Surface) -> Vec<HookFault> {
        self.entities.draw_all(&self.camera, surface)
    }
}

#[cfg(test)]
pub(crate) fn test_world() -> WorldState {
    WorldState::new(WorldConfig::default(), AssetLoader::new("assets"))
}
