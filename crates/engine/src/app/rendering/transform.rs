use serde::Deserialize;

use crate::app::{Camera, Vec2};

pub const VIEWPORT_WIDTH_DEFAULT: u32 = 1280;
pub const VIEWPORT_HEIGHT_DEFAULT: u32 = 720;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: VIEWPORT_WIDTH_DEFAULT,
            height: VIEWPORT_HEIGHT_DEFAULT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Projects a world-space rectangle through the camera and snaps it to whole
/// pixels. Both edges are rounded independently so adjacent cells never leave
/// a gap. `None` when the projection is not finite.
pub fn world_rect_to_screen(camera: &Camera, position: Vec2, size: Vec2) -> Option<ScreenRect> {
    let top_left = camera.project_to_screen(position);
    let screen_size = camera.project_size(size.x, size.y);
    let bottom_right = Vec2 {
        x: top_left.x + screen_size.x,
        y: top_left.y + screen_size.y,
    };
    if !top_left.is_finite() || !bottom_right.is_finite() {
        return None;
    }

    let left = round_to_px(top_left.x)?;
    let top = round_to_px(top_left.y)?;
    let right = round_to_px(bottom_right.x)?;
    let bottom = round_to_px(bottom_right.y)?;
    Some(ScreenRect {
        x: left,
        y: top,
        width: right.saturating_sub(left).max(0) as u32,
        height: bottom.saturating_sub(top).max(0) as u32,
    })
}

fn round_to_px(value: f32) -> Option<i32> {
    let rounded = value.round();
    if rounded < i32::MIN as f32 || rounded > i32::MAX as f32 {
        return None;
    }
    Some(rounded as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{CameraConfig, EntityId};

    #[test]
    fn origin_maps_to_centered_subject_box() {
        let rect = world_rect_to_screen(&Camera::default(), Vec2::default(), Vec2::new(32.0, 32.0))
            .expect("rect");
        assert_eq!(
            rect,
            ScreenRect {
                x: 624,
                y: 344,
                width: 32,
                height: 32
            }
        );
    }

    #[test]
    fn camera_position_shifts_screen_position() {
        let mut camera = Camera::new(CameraConfig {
            position_smoothing: 1.0,
            target_zoom: 1.0,
            ..CameraConfig::default()
        });
        camera.set_subject(Some(EntityId(0)));
        camera.update(Some(Vec2::new(10.0, -5.0)));

        let rect =
            world_rect_to_screen(&camera, Vec2::new(12.0, -4.0), Vec2::new(4.0, 4.0)).expect("rect");
        assert_eq!((rect.x, rect.y), (626, 345));
    }

    #[test]
    fn adjacent_cells_share_edges_under_fractional_zoom() {
        let mut camera = Camera::new(CameraConfig {
            zoom_smoothing: 1.0,
            target_zoom: 0.7,
            ..CameraConfig::default()
        });
        camera.set_subject(Some(EntityId(0)));
        camera.update(Some(Vec2::default()));

        let size = Vec2::new(32.0, 32.0);
        let a = world_rect_to_screen(&camera, Vec2::new(0.0, 0.0), size).expect("a");
        let b = world_rect_to_screen(&camera, Vec2::new(32.0, 0.0), size).expect("b");
        assert_eq!(a.x + a.width as i32, b.x);
    }

    #[test]
    fn non_finite_world_position_has_no_rect() {
        assert!(world_rect_to_screen(
            &Camera::default(),
            Vec2::new(f32::NAN, 0.0),
            Vec2::new(32.0, 32.0)
        )
        .is_none());
    }
}
