//! Viewer runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use glam::Vec3;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use vkgs_core::scene::SceneBounds;
use vkgs_core::{Camera, Splat};
use vkgs_gpu::GpuContextBuilder;
use vkgs_render::{
    FrameOutcome, GpuScene, MetricsCollector, RenderTarget, RendererConfig, SplatRenderer,
};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::controller::FlyCamera;
use crate::input::{apply_device_event, apply_window_event};
use crate::target::WindowTarget;

/// How often the metrics summary is logged.
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Application configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Camera movement in units per second.
    pub camera_speed: f32,
    /// Mouse-look radians per pixel.
    pub mouse_sensitivity: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        let controller = FlyCamera::default();
        Self {
            title: "vkgs".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: true,
            validation: cfg!(debug_assertions),
            camera_speed: controller.speed,
            mouse_sensitivity: controller.sensitivity,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_camera_speed(mut self, speed: f32) -> Self {
        self.camera_speed = speed;
        self
    }

    pub fn with_mouse_sensitivity(mut self, sensitivity: f32) -> Self {
        self.mouse_sensitivity = sensitivity;
        self
    }

    /// Renderer settings implied by this configuration.
    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig::new()
            .with_validation(self.validation)
            .with_immediate_present(!self.vsync)
            .with_size(self.width, self.height)
    }

    pub fn controller(&self) -> FlyCamera {
        FlyCamera::new(self.camera_speed, self.mouse_sensitivity)
    }
}

/// Splats shown by the viewer.
#[derive(Clone, Debug)]
pub struct ViewerScene {
    pub splats: Vec<Splat>,
    /// Multiplier applied to every splat scale.
    pub scale_modifier: f32,
    /// Starting camera. `None` frames the whole scene.
    pub camera: Option<Camera>,
}

impl ViewerScene {
    pub fn new(splats: Vec<Splat>) -> Self {
        Self {
            splats,
            scale_modifier: 1.0,
            camera: None,
        }
    }

    pub fn with_scale_modifier(mut self, modifier: f32) -> Self {
        self.scale_modifier = modifier;
        self
    }

    pub fn with_camera(mut self, camera: Camera) -> Self {
        self.camera = Some(camera);
        self
    }

    /// The configured camera, or one backed off far enough to see every splat.
    fn initial_camera(&self, config: &RendererConfig) -> Camera {
        if let Some(camera) = self.camera {
            return camera;
        }
        let mut camera = config.camera();
        let (center, radius) = SceneBounds::of(&self.splats)
            .map_or((Vec3::ZERO, 1.0), |bounds| {
                (bounds.center(), bounds.radius().max(1.0))
            });
        let half_fov = (config.fov_degrees * 0.5).to_radians();
        camera.position = center + Vec3::new(0.0, 0.0, radius / half_fov.tan() + radius);
        camera.look_at(center);
        camera
    }
}

/// Run the windowed viewer until the window is closed.
///
/// This function initializes logging, creates the window, GPU context and
/// renderer, and runs the event loop.
pub fn run_viewer(config: AppConfig, scene: ViewerScene) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(splats = scene.splats.len(), "{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner {
        config,
        scene,
        state: None,
        failure: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Internal runner that implements winit's `ApplicationHandler`.
struct AppRunner {
    config: AppConfig,
    scene: ViewerScene,
    state: Option<AppState>,
    failure: Option<anyhow::Error>,
}

/// Internal viewer state.
struct AppState {
    window: Arc<Window>,
    renderer: SplatRenderer<WindowTarget>,
    camera: Camera,
    controller: FlyCamera,
    metrics: MetricsCollector,
    target_frame_time: Option<Duration>,
    last_frame_time: Instant,
    last_report: Instant,
    frame_count: u64,
    // FPS tracking
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
}

impl ApplicationHandler for AppRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating viewer state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Viewer ready!");
            }
            Err(e) => {
                error!("Failed to initialize viewer: {e:#}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(state) = &mut self.state {
            let target = state.renderer.target_mut();
            if apply_window_event(target.input_mut(), &event) {
                let capture = FlyCamera::wants_capture(target.input());
                target.set_cursor_captured(capture);
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.render_frame() {
                        error!("Render error: {e:#}");
                        self.failure = Some(e);
                        self.shutdown(event_loop);
                        return;
                    }
                    state.window.request_redraw();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    debug!(width = size.width, height = size.height, "Window resized");
                    state.renderer.request_resize();
                }
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let Some(state) = &mut self.state {
            apply_device_event(state.renderer.target_mut().input_mut(), &event);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}

impl AppRunner {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let renderer_config = self.config.renderer_config().with_env_overrides();
        let extensions = WindowTarget::required_extensions(window.as_ref())?;
        let gpu = Arc::new(
            GpuContextBuilder::new()
                .app_name(&self.config.title)
                .validation(renderer_config.validation)
                .physical_device_index(renderer_config.physical_device_index)
                .instance_extensions(&extensions)
                .presentation(true)
                .build()?,
        );
        info!("GPU: {}", gpu.capabilities().summary());

        let target = unsafe {
            WindowTarget::new(
                Arc::clone(&gpu),
                Arc::clone(&window),
                renderer_config.immediate_present,
            )?
        };
        let scene = GpuScene::upload(&gpu, &self.scene.splats, self.scene.scale_modifier)?;
        let camera = self.scene.initial_camera(&renderer_config);
        let renderer = SplatRenderer::new(gpu, target, Box::new(scene), &renderer_config)?;

        let target_frame_time = self
            .config
            .target_fps
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps.max(1))));

        Ok(AppState {
            window,
            renderer,
            camera,
            controller: self.config.controller(),
            metrics: MetricsCollector::default(),
            target_frame_time,
            last_frame_time: Instant::now(),
            last_report: Instant::now(),
            frame_count: 0,
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
        })
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(state) = self.state.take() {
            if let Err(e) = state.cleanup() {
                error!("Cleanup failed: {e:#}");
                self.failure.get_or_insert(e);
            }
        }
        event_loop.exit();
    }
}

impl AppState {
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let frame_start = Instant::now();

        let dt = frame_start
            .duration_since(self.last_frame_time)
            .as_secs_f32();
        self.last_frame_time = frame_start;

        self.controller.update(
            &mut self.camera,
            self.renderer.target_mut().input_mut(),
            dt,
        );

        match self.renderer.draw_frame(&self.camera, &mut self.metrics)? {
            FrameOutcome::Presented(stats) => {
                if dt > 0.0 {
                    let fps = 1.0 / f64::from(dt);
                    self.min_fps = self.min_fps.min(fps);
                    self.max_fps = self.max_fps.max(fps);
                    self.fps_sum += fps;
                }
                self.frame_count += 1;
                if stats.growths > 0 {
                    debug!(
                        growths = stats.growths,
                        capacity = stats.capacity,
                        "Sort buffers grew during frame"
                    );
                }
            }
            FrameOutcome::Skipped => {}
        }

        if self.last_report.elapsed() >= REPORT_INTERVAL {
            self.last_report = Instant::now();
            info!("Frame metrics:\n{}", self.metrics.summary());
        }

        // Frame pacing
        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    fn cleanup(self) -> anyhow::Result<()> {
        if self.frame_count > 0 {
            let avg_fps = self.fps_sum / self.frame_count as f64;
            info!("FPS Statistics:");
            info!("  Min: {:.1}", self.min_fps);
            info!("  Max: {:.1}", self.max_fps);
            info!("  Avg: {:.1}", avg_fps);
            info!("  Total frames: {}", self.frame_count);
        }

        info!("Starting cleanup...");
        let target = self.renderer.destroy()?;
        unsafe { target.destroy() };
        info!("Cleanup complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn vsync_off_requests_immediate_present() {
        let config = AppConfig::new("test").with_vsync(false).with_size(640, 480);
        let renderer = config.renderer_config();
        assert!(renderer.immediate_present);
        assert_eq!((renderer.width, renderer.height), (640, 480));
        assert!(!AppConfig::default().renderer_config().immediate_present);
    }

    #[test]
    fn controller_follows_config() {
        let controller = AppConfig::default()
            .with_camera_speed(7.5)
            .with_mouse_sensitivity(0.01)
            .controller();
        assert_relative_eq!(controller.speed, 7.5);
        assert_relative_eq!(controller.sensitivity, 0.01);
    }

    #[test]
    fn default_camera_faces_scene_center() {
        let scene = ViewerScene::new(vkgs_core::scene::test_scene());
        let config = RendererConfig::default();
        let camera = scene.initial_camera(&config);
        let center = SceneBounds::of(&scene.splats).map_or(Vec3::ZERO, |b| b.center());
        let to_center = (center - camera.position).normalize();
        assert_relative_eq!(camera.forward().dot(to_center), 1.0, epsilon = 1e-4);
        assert_relative_eq!(camera.fov_degrees, config.fov_degrees);
    }

    #[test]
    fn explicit_camera_is_kept() {
        let camera = Camera::looking_at(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO);
        let scene = ViewerScene::new(Vec::new()).with_camera(camera);
        assert_eq!(scene.initial_camera(&RendererConfig::default()), camera);
    }
}
