use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture, TextureError};
use winit::window::Window;

use crate::app::Vec2;

use super::{PixelSurface, Viewport};

/// Owns the `pixels` buffer. The buffer keeps the fixed viewport size and is
/// scaled onto whatever size the window has.
pub struct Renderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    viewport: Viewport,
}

impl Renderer {
    pub fn new(window: Arc<Window>, viewport: Viewport) -> Result<Self, Error> {
        let size = window.inner_size();
        let surface = SurfaceTexture::new(size.width, size.height, Arc::clone(&window));
        let pixels = Pixels::new(viewport.width, viewport.height, surface)?;
        Ok(Self {
            window,
            pixels,
            viewport,
        })
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn resize_surface(&mut self, width: u32, height: u32) -> Result<(), TextureError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels.resize_surface(width, height)
    }

    /// Maps a physical window position into buffer pixels, clamping positions
    /// that fall outside the scaled buffer onto its edge.
    pub fn window_to_buffer(&self, x: f64, y: f64) -> Vec2 {
        let (px, py) = self
            .pixels
            .window_pos_to_pixel((x as f32, y as f32))
            .unwrap_or_else(|outside| self.pixels.clamp_pixel_pos(outside));
        Vec2 {
            x: px as f32,
            y: py as f32,
        }
    }

    pub fn surface(&mut self) -> PixelSurface<'_> {
        let Viewport { width, height } = self.viewport;
        PixelSurface::new(self.pixels.frame_mut(), width, height)
    }

    pub fn present(&self) -> Result<(), Error> {
        self.pixels.render()
    }
}
