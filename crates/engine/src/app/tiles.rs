use std::cell::RefCell;
use std::collections::HashSet;

use tracing::warn;

use crate::content::AssetLoader;

use super::camera::Camera;
use super::entity::{guard_hook, FaultSource, HookError, HookFault};
use super::rendering::{world_rect_to_screen, Rgba, Surface};
use super::Vec2;

pub const BLOCK_FALLBACK_COLOR: Rgba = [255, 0, 0, 255];
pub const BLOCK_TILE_SIZE_DEFAULT: f32 = 32.0;
/// Upper bound on `tiles_x` and `tiles_y` for a single block.
pub const BLOCK_TILES_MAX: u32 = 4096;

#[derive(Debug, Clone, PartialEq)]
pub struct BlockProperties {
    pub sprite: String,
    pub tile_width: f32,
    pub tile_height: f32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    // Parsed and kept, but nothing consumes it yet.
    pub collidable: bool,
}

impl BlockProperties {
    fn with_defaults(sprite: String) -> Self {
        Self {
            sprite,
            tile_width: BLOCK_TILE_SIZE_DEFAULT,
            tile_height: BLOCK_TILE_SIZE_DEFAULT,
            tiles_x: 1,
            tiles_y: 1,
            collidable: false,
        }
    }

    fn merged(sprite: String, overrides: &BlockOverrides) -> Self {
        let defaults = Self::with_defaults(sprite);
        Self {
            tile_width: overrides.tile_width.unwrap_or(defaults.tile_width),
            tile_height: overrides.tile_height.unwrap_or(defaults.tile_height),
            tiles_x: overrides.tiles_x.unwrap_or(defaults.tiles_x).min(BLOCK_TILES_MAX),
            tiles_y: overrides.tiles_y.unwrap_or(defaults.tiles_y).min(BLOCK_TILES_MAX),
            collidable: overrides.collidable.unwrap_or(defaults.collidable),
            ..defaults
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlockOverrides {
    pub tile_width: Option<f32>,
    pub tile_height: Option<f32>,
    pub tiles_x: Option<u32>,
    pub tiles_y: Option<u32>,
    pub collidable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    position: Vec2,
    properties: BlockProperties,
}

impl Block {
    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn properties(&self) -> &BlockProperties {
        &self.properties
    }

    fn cell_origin(&self, column: u32, row: u32) -> Vec2 {
        Vec2 {
            x: self.position.x + self.properties.tile_width * column as f32,
            y: self.position.y + self.properties.tile_height * row as f32,
        }
    }

    fn draw(
        &self,
        camera: &Camera,
        assets: &AssetLoader,
        surface: &mut dyn Surface,
    ) -> Result<(), HookError> {
        let cell_size = Vec2::new(self.properties.tile_width, self.properties.tile_height);
        let sprite = if self.properties.sprite.is_empty() {
            None
        } else {
            assets.get(&self.properties.sprite)
        };

        for row in 0..self.properties.tiles_y {
            for column in 0..self.properties.tiles_x {
                let origin = self.cell_origin(column, row);
                let rect = world_rect_to_screen(camera, origin, cell_size).ok_or(
                    HookError::NonFiniteProjection {
                        x: origin.x,
                        y: origin.y,
                    },
                )?;
                match sprite {
                    Some(image) => surface.draw_image(rect, image),
                    None => surface.fill_rect(rect, BLOCK_FALLBACK_COLOR),
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct StaticTileSet {
    blocks: Vec<Block>,
    reported_faults: RefCell<HashSet<usize>>,
}

impl StaticTileSet {
    pub fn add(
        &mut self,
        x: f32,
        y: f32,
        sprite: impl Into<String>,
        overrides: BlockOverrides,
    ) -> &Block {
        let index = self.blocks.len();
        self.blocks.push(Block {
            position: Vec2 { x, y },
            properties: BlockProperties::merged(sprite.into(), &overrides),
        });
        &self.blocks[index]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn draw_all(
        &self,
        camera: &Camera,
        assets: &AssetLoader,
        surface: &mut dyn Surface,
    ) -> Vec<HookFault> {
        let mut faults = Vec::new();
        for (index, block) in self.blocks.iter().enumerate() {
            if let Err(error) = guard_hook(|| block.draw(camera, assets, &mut *surface)) {
                if self.reported_faults.borrow_mut().insert(index) {
                    warn!(block_index = index, error = %error, "block_draw_failed");
                }
                faults.push(HookFault {
                    source: FaultSource::Block { index },
                    error,
                });
            }
        }
        faults
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::rendering::{DrawCall, PanicOnceSurface, RecordingSurface, ScreenRect};

    fn fills(surface: &RecordingSurface) -> Vec<ScreenRect> {
        surface
            .calls()
            .iter()
            .filter_map(|call| match call {
                DrawCall::Fill { rect, .. } => Some(*rect),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn overrides_merge_onto_defaults() {
        let mut tiles = StaticTileSet::default();
        let block = tiles.add(
            64.0,
            64.0,
            "",
            BlockOverrides {
                tiles_x: Some(5),
                ..BlockOverrides::default()
            },
        );

        assert_eq!(
            block.properties(),
            &BlockProperties {
                sprite: String::new(),
                tile_width: 32.0,
                tile_height: 32.0,
                tiles_x: 5,
                tiles_y: 1,
                collidable: false,
            }
        );
    }

    #[test]
    fn tile_counts_are_capped() {
        let mut tiles = StaticTileSet::default();
        let block = tiles.add(
            0.0,
            0.0,
            "",
            BlockOverrides {
                tiles_x: Some(u32::MAX),
                tiles_y: Some(BLOCK_TILES_MAX + 1),
                ..BlockOverrides::default()
            },
        );

        assert_eq!(block.properties().tiles_x, BLOCK_TILES_MAX);
        assert_eq!(block.properties().tiles_y, BLOCK_TILES_MAX);
    }

    #[test]
    fn cells_draw_row_major_within_block() {
        let mut tiles = StaticTileSet::default();
        tiles.add(
            0.0,
            0.0,
            "",
            BlockOverrides {
                tiles_x: Some(2),
                tiles_y: Some(2),
                ..BlockOverrides::default()
            },
        );
        let mut surface = RecordingSurface::new(1280, 720);

        let faults = tiles.draw_all(&Camera::default(), &AssetLoader::new("assets"), &mut surface);

        assert!(faults.is_empty());
        let origins = fills(&surface)
            .into_iter()
            .map(|rect| (rect.x, rect.y))
            .collect::<Vec<_>>();
        assert_eq!(
            origins,
            vec![(624, 344), (656, 344), (624, 376), (656, 376)]
        );
    }

    #[test]
    fn blocks_draw_in_insertion_order() {
        let mut tiles = StaticTileSet::default();
        tiles.add(100.0, 0.0, "", BlockOverrides::default());
        tiles.add(0.0, 0.0, "", BlockOverrides::default());
        let mut surface = RecordingSurface::new(1280, 720);

        tiles.draw_all(&Camera::default(), &AssetLoader::new("assets"), &mut surface);

        let xs = fills(&surface).into_iter().map(|rect| rect.x).collect::<Vec<_>>();
        assert_eq!(xs, vec![724, 624]);
    }

    #[test]
    fn unloaded_sprite_falls_back_to_solid_fill() {
        let mut tiles = StaticTileSet::default();
        tiles.add(0.0, 0.0, "sprites/missing.png", BlockOverrides::default());
        let mut surface = RecordingSurface::new(1280, 720);

        tiles.draw_all(&Camera::default(), &AssetLoader::new("assets"), &mut surface);

        assert_eq!(
            surface.calls(),
            &[DrawCall::Fill {
                rect: ScreenRect {
                    x: 624,
                    y: 344,
                    width: 32,
                    height: 32
                },
                color: BLOCK_FALLBACK_COLOR,
            }]
        );
    }

    #[test]
    fn faulting_block_does_not_stop_later_blocks() {
        let mut tiles = StaticTileSet::default();
        tiles.add(
            0.0,
            0.0,
            "",
            BlockOverrides {
                tile_width: Some(f32::NAN),
                ..BlockOverrides::default()
            },
        );
        tiles.add(0.0, 0.0, "", BlockOverrides::default());
        let mut surface = RecordingSurface::new(1280, 720);

        let faults = tiles.draw_all(&Camera::default(), &AssetLoader::new("assets"), &mut surface);

        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].source, FaultSource::Block { index: 0 });
        assert_eq!(fills(&surface).len(), 1);
    }

    #[test]
    fn panicking_block_draw_does_not_stop_later_blocks() {
        let mut tiles = StaticTileSet::default();
        tiles.add(0.0, 0.0, "", BlockOverrides::default());
        tiles.add(100.0, 0.0, "", BlockOverrides::default());
        let mut surface = PanicOnceSurface::new(1280, 720);

        let faults = tiles.draw_all(&Camera::default(), &AssetLoader::new("assets"), &mut surface);

        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].source, FaultSource::Block { index: 0 });
        assert!(matches!(faults[0].error, HookError::Panicked { .. }));
        assert_eq!(surface.calls().len(), 1);
    }
}
