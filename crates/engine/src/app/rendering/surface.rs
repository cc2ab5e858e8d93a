use crate::content::SpriteImage;

use super::ScreenRect;

pub type Rgba = [u8; 4];

pub const CLEAR_COLOR: Rgba = [0, 0, 0, 255];

pub trait Surface {
    fn size(&self) -> (u32, u32);
    fn clear(&mut self, color: Rgba);
    fn fill_rect(&mut self, rect: ScreenRect, color: Rgba);
    fn draw_image(&mut self, rect: ScreenRect, image: &SpriteImage);
}

/// RGBA8 frame buffer view, row-major, four bytes per pixel.
pub struct PixelSurface<'a> {
    frame: &'a mut [u8],
    width: u32,
    height: u32,
}

impl<'a> PixelSurface<'a> {
    pub fn new(frame: &'a mut [u8], width: u32, height: u32) -> Self {
        Self {
            frame,
            width,
            height,
        }
    }

    fn clip(&self, rect: ScreenRect) -> Option<(i32, i32, i32, i32)> {
        let left = rect.x.max(0);
        let top = rect.y.max(0);
        let right = rect
            .x
            .saturating_add(rect.width.min(i32::MAX as u32) as i32)
            .min(self.width as i32);
        let bottom = rect
            .y
            .saturating_add(rect.height.min(i32::MAX as u32) as i32)
            .min(self.height as i32);
        (left < right && top < bottom).then_some((left, top, right, bottom))
    }
}

impl Surface for PixelSurface<'_> {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: Rgba) {
        for chunk in self.frame.chunks_exact_mut(4) {
            chunk.copy_from_slice(&color);
        }
    }

    fn fill_rect(&mut self, rect: ScreenRect, color: Rgba) {
        let Some((left, top, right, bottom)) = self.clip(rect) else {
            return;
        };
        for y in top..bottom {
            for x in left..right {
                write_pixel_rgba_clipped(self.frame, self.width as usize, x, y, color);
            }
        }
    }

    fn draw_image(&mut self, rect: ScreenRect, image: &SpriteImage) {
        if image.width() == 0 || image.height() == 0 || rect.width == 0 || rect.height == 0 {
            return;
        }
        let Some((left, top, right, bottom)) = self.clip(rect) else {
            return;
        };
        let scale_x = image.width() as f32 / rect.width as f32;
        let scale_y = image.height() as f32 / rect.height as f32;

        for out_y in top..bottom {
            let src_y = (((out_y - rect.y) as f32) * scale_y).floor() as u32;
            for out_x in left..right {
                let src_x = (((out_x - rect.x) as f32) * scale_x).floor() as u32;
                let Some(color) = image.pixel(src_x, src_y) else {
                    continue;
                };
                if color[3] == 0 {
                    continue;
                }
                write_pixel_rgba_clipped(self.frame, self.width as usize, out_x, out_y, color);
            }
        }
    }
}

fn write_pixel_rgba_clipped(frame: &mut [u8], width: usize, x: i32, y: i32, color: Rgba) {
    if x < 0 || y < 0 {
        return;
    }
    let x = x as usize;
    let y = y as usize;
    let Some(pixel_offset) = y.checked_mul(width).and_then(|row| row.checked_add(x)) else {
        return;
    };
    let Some(byte_offset) = pixel_offset.checked_mul(4) else {
        return;
    };
    let Some(end) = byte_offset.checked_add(4) else {
        return;
    };
    if end > frame.len() {
        return;
    }
    frame[byte_offset..end].copy_from_slice(&color);
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DrawCall {
    Clear(Rgba),
    Fill { rect: ScreenRect, color: Rgba },
    Image { rect: ScreenRect, width: u32, height: u32 },
}

#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSurface {
    width: u32,
    height: u32,
    calls: Vec<DrawCall>,
}

#[cfg(test)]
impl RecordingSurface {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            calls: Vec::new(),
        }
    }

    pub(crate) fn calls(&self) -> &[DrawCall] {
        &self.calls
    }
}

#[cfg(test)]
impl Surface for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: Rgba) {
        self.calls.push(DrawCall::Clear(color));
    }

    fn fill_rect(&mut self, rect: ScreenRect, color: Rgba) {
        self.calls.push(DrawCall::Fill { rect, color });
    }

    fn draw_image(&mut self, rect: ScreenRect, image: &SpriteImage) {
        self.calls.push(DrawCall::Image {
            rect,
            width: image.width(),
            height: image.height(),
        });
    }
}

/// Records like [`RecordingSurface`] but panics on its first fill.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct PanicOnceSurface {
    inner: RecordingSurface,
    panicked: bool,
}

#[cfg(test)]
impl PanicOnceSurface {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            inner: RecordingSurface::new(width, height),
            panicked: false,
        }
    }

    pub(crate) fn calls(&self) -> &[DrawCall] {
        self.inner.calls()
    }
}

#[cfg(test)]
impl Surface for PanicOnceSurface {
    fn size(&self) -> (u32, u32) {
        self.inner.size()
    }

    fn clear(&mut self, color: Rgba) {
        self.inner.clear(color);
    }

    fn fill_rect(&mut self, rect: ScreenRect, color: Rgba) {
        if !self.panicked {
            self.panicked = true;
            panic!("surface lost");
        }
        self.inner.fill_rect(rect, color);
    }

    fn draw_image(&mut self, rect: ScreenRect, image: &SpriteImage) {
        self.inner.draw_image(rect, image);
    }
}
