mod renderer;
mod surface;
mod transform;

pub use renderer::Renderer;
#[cfg(test)]
pub(crate) use surface::{DrawCall, PanicOnceSurface, RecordingSurface};
pub use surface::{PixelSurface, Rgba, Surface, CLEAR_COLOR};
pub use transform::{world_rect_to_screen, ScreenRect, Viewport};
