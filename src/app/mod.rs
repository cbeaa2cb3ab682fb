mod camera_controller;
mod input_state;

use std::sync::Arc;
use std::time::{Duration, Instant};
use color_eyre::{Report, Result};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};
use crate::app::camera_controller::CameraController;
use crate::app::input_state::{InputAction, InputState};
use crate::config::{EngineOptions, RuntimeConfig};
use crate::renderer::camera::Camera;
use crate::renderer::Renderer;

const WINDOW_TITLE: &str = "Generations";
const FPS_INTERVAL: Duration = Duration::from_millis(250);

/// Counts frames and reports the rate once per interval
pub struct FpsCounter {
    interval: Duration,
    window_start: Instant,
    frames: u32,
}

impl FpsCounter {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            window_start: now,
            frames: 0,
        }
    }

    pub fn frame(&mut self, now: Instant) -> Option<f32> {
        self.frames += 1;
        let elapsed = now.duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }
        let fps = self.frames as f32 / elapsed.as_secs_f32();
        self.window_start = now;
        self.frames = 0;
        Some(fps)
    }
}

pub struct App {
    config: Arc<RuntimeConfig>,
    options: EngineOptions,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    camera_controller: CameraController,

    // State
    input_state: InputState,
    fps: FpsCounter,
    prev_frame_time: Instant,
    error: Option<Report>,
}

impl App {
    /// Opens the window and renders until it is closed or a frame fails
    pub fn run(config: Arc<RuntimeConfig>, options: EngineOptions) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut app = Self::new(config, options);
        event_loop.run_app(&mut app)?;

        match app.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn new(config: Arc<RuntimeConfig>, options: EngineOptions) -> Self {
        let camera = Camera::new(&config.world);
        let now = Instant::now();
        Self {
            config,
            options,
            window: None,
            renderer: None,
            camera_controller: CameraController::new(camera),

            input_state: InputState::default(),
            fps: FpsCounter::new(FPS_INTERVAL, now),
            prev_frame_time: now,
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: Report) {
        log::error!("Stopping: {err:#}");
        self.error.get_or_insert(err);
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = Arc::new(event_loop.create_window(attributes)?);
        let renderer = Renderer::new(window.clone(), &self.config, &self.options)?;

        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn handle_actions(&mut self, event_loop: &ActiveEventLoop) {
        for action in self.input_state.take_actions() {
            match action {
                InputAction::Exit => event_loop.exit(),
                InputAction::Screenshot => {
                    if let Some(renderer) = self.renderer.as_mut() {
                        renderer.request_screenshot();
                    }
                }
            }
        }
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return Ok(());
        };

        let now = Instant::now();
        let delta_time_secs = now.duration_since(self.prev_frame_time).as_secs_f32();
        self.prev_frame_time = now;

        self.camera_controller
            .process_input(&mut self.input_state, window, delta_time_secs);
        self.input_state.reset_frame();
        renderer.update_camera(self.camera_controller.camera());
        renderer.draw()?;

        if let Some(fps) = self.fps.frame(now) {
            window.set_title(&format!("{WINDOW_TITLE} - {fps:.0} fps"));
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if self.window.as_ref().is_none_or(|window| window.id() != window_id) {
            return;
        }

        self.input_state.process_window_event(&event);
        self.handle_actions(event_loop);

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.request_resize();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    self.fail(event_loop, err);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_ref()) else {
            return;
        };
        // Nothing to draw while minimized; sleep until the next event
        if renderer.is_idle() {
            event_loop.set_control_flow(ControlFlow::Wait);
        } else {
            event_loop.set_control_flow(ControlFlow::Poll);
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // GPU work must finish before the window goes away
        self.renderer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_is_reported_once_per_interval() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(FPS_INTERVAL, start);
        for frame in 1..15 {
            assert_eq!(counter.frame(start + Duration::from_millis(frame * 16)), None);
        }
        let fps = counter.frame(start + Duration::from_millis(250));
        assert!(fps.is_some_and(|fps| (fps - 60.0).abs() < 0.01));
        assert_eq!(counter.frame(start + Duration::from_millis(260)), None);
    }
}
