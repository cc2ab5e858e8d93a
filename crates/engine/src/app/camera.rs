use serde::Deserialize;

use super::{EntityId, Vec2};

pub const CAMERA_SMOOTHING_DEFAULT: f32 = 5.0;
pub const CAMERA_TARGET_ZOOM_DEFAULT: f32 = 0.8;
// Centers a 32px subject inside the fixed 1280x720 viewport.
pub const CAMERA_OFFSET_DEFAULT: Vec2 = Vec2::new(-624.0, -344.0);

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position_smoothing: f32,
    pub zoom_smoothing: f32,
    pub target_zoom: f32,
    pub offset: Vec2,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position_smoothing: CAMERA_SMOOTHING_DEFAULT,
            zoom_smoothing: CAMERA_SMOOTHING_DEFAULT,
            target_zoom: CAMERA_TARGET_ZOOM_DEFAULT,
            offset: CAMERA_OFFSET_DEFAULT,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Camera {
    position: Vec2,
    target: Vec2,
    position_smoothing: f32,
    zoom: f32,
    target_zoom: f32,
    zoom_smoothing: f32,
    offset: Vec2,
    subject: Option<EntityId>,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(CameraConfig::default())
    }
}

impl Camera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            position: Vec2::default(),
            target: Vec2::default(),
            position_smoothing: normalize_smoothing(config.position_smoothing),
            zoom: 1.0,
            target_zoom: normalize_target_zoom(config.target_zoom),
            zoom_smoothing: normalize_smoothing(config.zoom_smoothing),
            offset: if config.offset.is_finite() {
                config.offset
            } else {
                CAMERA_OFFSET_DEFAULT
            },
            subject: None,
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn subject(&self) -> Option<EntityId> {
        self.subject
    }

    pub fn set_subject(&mut self, subject: Option<EntityId>) {
        self.subject = subject;
    }

    /// Moves one smoothing step toward the subject. Returns `false` (and leaves
    /// every field alone) when there is nothing to follow.
    pub fn update(&mut self, subject_position: Option<Vec2>) -> bool {
        let Some(subject_position) = subject_position else {
            return false;
        };
        if self.subject.is_none() {
            return false;
        }

        self.target = subject_position;
        self.position.x = approach(self.position.x, self.target.x, self.position_smoothing);
        self.position.y = approach(self.position.y, self.target.y, self.position_smoothing);
        self.zoom = approach(self.zoom, self.target_zoom.recip(), self.zoom_smoothing);
        true
    }

    pub fn project_to_screen(&self, world: Vec2) -> Vec2 {
        let zoom = self.zoom;
        Vec2 {
            x: (world.x - (self.position.x + self.offset.x / zoom)) * zoom,
            y: (world.y - (self.position.y + self.offset.y / zoom)) * zoom,
        }
    }

    pub fn project_size(&self, width: f32, height: f32) -> Vec2 {
        Vec2 {
            x: width * self.zoom,
            y: height * self.zoom,
        }
    }
}

fn approach(current: f32, target: f32, smoothing: f32) -> f32 {
    current + (target - current) / smoothing
}

fn normalize_smoothing(smoothing: f32) -> f32 {
    if smoothing.is_finite() {
        smoothing.max(1.0)
    } else {
        CAMERA_SMOOTHING_DEFAULT
    }
}

fn normalize_target_zoom(zoom: f32) -> f32 {
    if zoom.is_finite() && zoom > f32::EPSILON {
        zoom
    } else {
        CAMERA_TARGET_ZOOM_DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn following_camera(smoothing: f32) -> Camera {
        let mut camera = Camera::new(CameraConfig {
            position_smoothing: smoothing,
            zoom_smoothing: smoothing,
            ..CameraConfig::default()
        });
        camera.set_subject(Some(EntityId(1)));
        camera
    }

    fn distance(a: Vec2, b: Vec2) -> f32 {
        ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
    }

    #[test]
    fn smoothing_of_one_snaps_in_one_update() {
        let mut camera = following_camera(1.0);
        let target = Vec2::new(120.0, -40.0);

        assert!(camera.update(Some(target)));
        assert_eq!(camera.position(), target);
        assert!((camera.zoom() - 1.25).abs() < 1e-6);
    }

    #[test]
    fn distance_strictly_decreases_toward_fixed_target() {
        let n = 6;
        let mut camera = following_camera(n as f32);
        let target = Vec2::new(300.0, 150.0);
        let mut previous = distance(camera.position(), target);

        for _ in 0..n {
            camera.update(Some(target));
            let current = distance(camera.position(), target);
            assert!(current < previous, "current={current} previous={previous}");
            assert!(current >= 0.0);
            previous = current;
        }
    }

    #[test]
    fn update_without_subject_is_noop() {
        let mut camera = Camera::default();
        assert!(!camera.update(Some(Vec2::new(10.0, 10.0))));
        assert_eq!(camera.position(), Vec2::default());
        assert_eq!(camera.zoom(), 1.0);

        let mut camera = following_camera(5.0);
        assert!(!camera.update(None));
        assert_eq!(camera.zoom(), 1.0);
    }

    #[test]
    fn smoothing_below_one_is_raised_to_snap() {
        let mut camera = following_camera(0.25);
        camera.update(Some(Vec2::new(8.0, 8.0)));
        assert_eq!(camera.position(), Vec2::new(8.0, 8.0));
    }

    #[test]
    fn default_camera_centers_origin_subject() {
        let camera = Camera::default();
        let screen = camera.project_to_screen(Vec2::default());
        assert_eq!(screen, Vec2::new(624.0, 344.0));
        assert_eq!(camera.project_size(32.0, 32.0), Vec2::new(32.0, 32.0));
    }

    #[test]
    fn projection_is_pure() {
        let mut camera = following_camera(2.0);
        camera.update(Some(Vec2::new(40.0, 40.0)));
        let before = (camera.position(), camera.zoom());

        let a = camera.project_to_screen(Vec2::new(5.0, 7.0));
        let b = camera.project_to_screen(Vec2::new(5.0, 7.0));

        assert_eq!(a, b);
        assert_eq!((camera.position(), camera.zoom()), before);
    }

    #[test]
    fn zoom_scales_sizes() {
        let mut camera = following_camera(1.0);
        camera.update(Some(Vec2::default()));
        let size = camera.project_size(32.0, 16.0);
        assert!((size.x - 40.0).abs() < 1e-4);
        assert!((size.y - 20.0).abs() < 1e-4);
    }
}
