use std::sync::Arc;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use super::input::{Key, PointerButton};
use super::scheduler::{tick_period_for_rate, ClockKind, FrameScheduler, SchedulerConfig};
use super::{InputTracker, MetricsHandle, Renderer, Viewport, WorldState};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub window_title: String,
    pub viewport: Viewport,
    pub target_tps: u32,
    pub max_catch_up_ms: u64,
    pub metrics_interval_ms: u64,
    pub max_render_fps: Option<u32>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "stepframe".to_string(),
            viewport: Viewport::default(),
            target_tps: 60,
            max_catch_up_ms: 1000,
            metrics_interval_ms: 1000,
            max_render_fps: None,
        }
    }
}

impl LoopConfig {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_period: tick_period_for_rate(self.target_tps),
            max_catch_up: Duration::from_millis(self.max_catch_up_ms),
            metrics_interval: Duration::from_millis(self.metrics_interval_ms),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

pub fn run_app(config: LoopConfig, world: WorldState) -> Result<(), AppError> {
    run_app_with_metrics(config, world, MetricsHandle::default())
}

pub fn run_app_with_metrics(
    config: LoopConfig,
    mut world: WorldState,
    metrics_handle: MetricsHandle,
) -> Result<(), AppError> {
    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.viewport.width as f64,
                config.viewport.height as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let window_for_loop = Arc::clone(&window);
    let mut renderer = Renderer::new(window, config.viewport).map_err(AppError::CreateRenderer)?;

    let mut scheduler = FrameScheduler::with_metrics_handle(config.scheduler_config(), metrics_handle);
    let scheduler_config = scheduler.config();
    let effective_render_cap = normalize_render_fps_cap(config.max_render_fps);
    let render_frame_target = target_frame_duration(effective_render_cap);

    info!(
        target_tps = config.target_tps.max(1),
        tick_period_us = scheduler_config.tick_period.as_micros() as u64,
        max_catch_up_ms = scheduler_config.max_catch_up.as_millis() as u64,
        metrics_interval_ms = scheduler_config.metrics_interval.as_millis() as u64,
        render_fps_cap = %format_render_cap(effective_render_cap),
        viewport_width = config.viewport.width,
        viewport_height = config.viewport.height,
        "loop_config"
    );
    info!(
        entity_count = world.entities().len(),
        block_count = world.tiles().len(),
        "world_loaded"
    );

    let mut last_present_instant = Instant::now();
    let mut redraw_pending = false;
    scheduler.start(Instant::now());

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window_for_loop.id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        info!(reason = "window_close", "shutdown_requested");
                        window_target.exit();
                    }
                    WindowEvent::Resized(new_size) => {
                        if let Err(error) = renderer.resize_surface(new_size.width, new_size.height)
                        {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::ScaleFactorChanged { .. } => {
                        let size = window_for_loop.inner_size();
                        if let Err(error) = renderer.resize_surface(size.width, size.height) {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        let buffer_pos = renderer.window_to_buffer(position.x, position.y);
                        world.input_mut().on_pointer_move(buffer_pos.x, buffer_pos.y);
                    }
                    WindowEvent::MouseInput { state, button, .. } => {
                        let button = map_mouse_button(button);
                        match state {
                            ElementState::Pressed => world.input_mut().on_pointer_down(button),
                            ElementState::Released => world.input_mut().on_pointer_up(button),
                        }
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        if forward_key(event.physical_key, event.state, world.input_mut()) {
                            info!(reason = "escape_key", "shutdown_requested");
                            window_target.exit();
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        if !scheduler.is_running(ClockKind::Render) {
                            return;
                        }
                        let now = Instant::now();
                        let mut surface = renderer.surface();
                        scheduler.pump(now, &mut world, &mut surface);
                        if let Err(error) = renderer.present() {
                            error!(error = %error, "renderer_present_failed");
                            scheduler.stop(ClockKind::Render);
                        }
                        last_present_instant = Instant::now();
                        redraw_pending = false;
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                // Ticks and metrics follow wall time whether or not frames are presented.
                let now = Instant::now();
                scheduler.run_due(now, &mut world);

                let mut wake_at = scheduler.next_deadline();
                if scheduler.is_running(ClockKind::Render) {
                    let since_present = now.saturating_duration_since(last_present_instant);
                    let cap_wait = compute_cap_sleep(since_present, render_frame_target);
                    if cap_wait.is_zero() {
                        if !redraw_pending {
                            window_for_loop.request_redraw();
                            redraw_pending = true;
                        }
                    } else {
                        let frame_at = now + cap_wait;
                        wake_at = Some(wake_at.map_or(frame_at, |at| at.min(frame_at)));
                    }
                }
                window_target.set_control_flow(match wake_at {
                    Some(at) => ControlFlow::WaitUntil(at),
                    None => ControlFlow::Wait,
                });
            }
            Event::LoopExiting => {
                scheduler.stop_all();
                info!(
                    ticks = scheduler.tick_count(),
                    frames = scheduler.frame_count(),
                    hook_faults = scheduler.hook_fault_count(),
                    simulation_running = scheduler.is_running(ClockKind::Simulation),
                    "shutdown"
                );
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

/// Feeds one physical key transition into the tracker. Returns `true` when the
/// event asks the loop to exit.
///
/// Keys are tracked by physical position so a release always matches its press,
/// whatever modifiers changed in between.
fn forward_key(physical: PhysicalKey, state: ElementState, input: &mut InputTracker) -> bool {
    let Some(key) = map_physical_key(physical) else {
        return false;
    };
    match state {
        ElementState::Pressed => input.on_key_down(key),
        ElementState::Released => input.on_key_up(key),
    }
    key == Key::Escape && state == ElementState::Pressed
}

const CHAR_KEYS: [(KeyCode, char); 36] = [
    (KeyCode::KeyA, 'a'),
    (KeyCode::KeyB, 'b'),
    (KeyCode::KeyC, 'c'),
    (KeyCode::KeyD, 'd'),
    (KeyCode::KeyE, 'e'),
    (KeyCode::KeyF, 'f'),
    (KeyCode::KeyG, 'g'),
    (KeyCode::KeyH, 'h'),
    (KeyCode::KeyI, 'i'),
    (KeyCode::KeyJ, 'j'),
    (KeyCode::KeyK, 'k'),
    (KeyCode::KeyL, 'l'),
    (KeyCode::KeyM, 'm'),
    (KeyCode::KeyN, 'n'),
    (KeyCode::KeyO, 'o'),
    (KeyCode::KeyP, 'p'),
    (KeyCode::KeyQ, 'q'),
    (KeyCode::KeyR, 'r'),
    (KeyCode::KeyS, 's'),
    (KeyCode::KeyT, 't'),
    (KeyCode::KeyU, 'u'),
    (KeyCode::KeyV, 'v'),
    (KeyCode::KeyW, 'w'),
    (KeyCode::KeyX, 'x'),
    (KeyCode::KeyY, 'y'),
    (KeyCode::KeyZ, 'z'),
    (KeyCode::Digit0, '0'),
    (KeyCode::Digit1, '1'),
    (KeyCode::Digit2, '2'),
    (KeyCode::Digit3, '3'),
    (KeyCode::Digit4, '4'),
    (KeyCode::Digit5, '5'),
    (KeyCode::Digit6, '6'),
    (KeyCode::Digit7, '7'),
    (KeyCode::Digit8, '8'),
    (KeyCode::Digit9, '9'),
];

fn map_physical_key(key: PhysicalKey) -> Option<Key> {
    let PhysicalKey::Code(code) = key else {
        return None;
    };
    match code {
        KeyCode::Space => Some(Key::Space),
        KeyCode::Enter | KeyCode::NumpadEnter => Some(Key::Enter),
        KeyCode::Escape => Some(Key::Escape),
        KeyCode::Tab => Some(Key::Tab),
        KeyCode::ShiftLeft | KeyCode::ShiftRight => Some(Key::Shift),
        KeyCode::ControlLeft | KeyCode::ControlRight => Some(Key::Control),
        KeyCode::ArrowUp => Some(Key::ArrowUp),
        KeyCode::ArrowDown => Some(Key::ArrowDown),
        KeyCode::ArrowLeft => Some(Key::ArrowLeft),
        KeyCode::ArrowRight => Some(Key::ArrowRight),
        _ => CHAR_KEYS
            .iter()
            .find(|(candidate, _)| *candidate == code)
            .map(|(_, ch)| Key::Char(*ch)),
    }
}

fn map_mouse_button(button: MouseButton) -> PointerButton {
    match button {
        MouseButton::Left => PointerButton::Left,
        MouseButton::Right => PointerButton::Right,
        MouseButton::Middle => PointerButton::Middle,
        MouseButton::Back => PointerButton::Other(3),
        MouseButton::Forward => PointerButton::Other(4),
        MouseButton::Other(code) => PointerButton::Other(code),
    }
}

fn normalize_render_fps_cap(cap: Option<u32>) -> Option<u32> {
    cap.filter(|value| *value > 0)
}

fn target_frame_duration(max_render_fps: Option<u32>) -> Option<Duration> {
    max_render_fps.map(|fps| Duration::from_secs_f64(1.0 / fps as f64))
}

fn compute_cap_sleep(elapsed: Duration, target: Option<Duration>) -> Duration {
    match target {
        Some(frame_target) if elapsed < frame_target => frame_target - elapsed,
        _ => Duration::ZERO,
    }
}

fn format_render_cap(cap: Option<u32>) -> String {
    match cap {
        Some(value) => value.to_string(),
        None => "off".to_string(),
    }
}
