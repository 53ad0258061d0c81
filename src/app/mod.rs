use crate::camera3d::{Camera3D, OrbitController};
use crate::config::{ViewerConfig, ViewerConfigOverrides};
use crate::input::PointerInput;
use crate::loader::AssetLoader;
use crate::renderer::Renderer;
use crate::scene::SceneContent;
use crate::session::SceneSession;
use crate::time::FrameClock;

mod panel;

use anyhow::{Context, Result};
use self::panel::ParameterPanel;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};

use egui::Context as EguiCtx;
use egui_wgpu::{Renderer as EguiRenderer, RendererOptions, ScreenDescriptor};
use egui_winit::State as EguiWinit;

pub async fn run() -> Result<()> {
    run_with_overrides(ViewerConfigOverrides::default()).await
}

pub async fn run_with_overrides(overrides: ViewerConfigOverrides) -> Result<()> {
    let mut config = ViewerConfig::load_or_default("config/viewer.json");
    config.apply_overrides(&overrides);
    let event_loop = EventLoop::new().context("Failed to create winit event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("Event loop execution failed")?;
    Ok(())
}

/// Window shell around the session: routes winit events into the
/// controller, ticks the clock, and drives one render per frame.
pub struct App {
    renderer: Renderer,
    scene: SceneContent,
    session: SceneSession,
    loader: Option<AssetLoader>,
    camera: Camera3D,
    orbit: OrbitController,
    input: PointerInput,
    time: FrameClock,
    panel: ParameterPanel,
    should_close: bool,
    startup_requested: bool,

    egui_ctx: EguiCtx,
    egui_winit: Option<EguiWinit>,
    egui_renderer: Option<EguiRenderer>,
    egui_screen: Option<ScreenDescriptor>,
}

impl App {
    pub fn new(config: ViewerConfig) -> Self {
        let session = SceneSession::new(&config);
        let renderer = Renderer::new(&config.window);
        let camera = Camera3D::new(
            glam::Vec3::new(0.0, config.camera.target_height, config.camera.distance),
            glam::Vec3::new(0.0, config.camera.target_height, 0.0),
            config.camera.fov_degrees.to_radians(),
            config.camera.near,
            config.camera.far,
        );
        let orbit = OrbitController::from_config(&config.camera);
        Self {
            renderer,
            scene: SceneContent::default(),
            session,
            loader: AssetLoader::spawn(),
            camera,
            orbit,
            input: PointerInput::new(),
            time: FrameClock::new(),
            panel: ParameterPanel::new(),
            should_close: false,
            startup_requested: false,
            egui_ctx: EguiCtx::default(),
            egui_winit: None,
            egui_renderer: None,
            egui_screen: None,
        }
    }

    fn pixels_per_point(&self) -> f32 {
        self.renderer.window().map(|window| window.scale_factor() as f32).unwrap_or(1.0)
    }

    fn init_egui(&mut self) {
        if self.egui_winit.is_none() {
            if let Some(window) = self.renderer.window() {
                let state = EguiWinit::new(
                    self.egui_ctx.clone(),
                    egui::ViewportId::ROOT,
                    window,
                    Some(self.pixels_per_point()),
                    window.theme(),
                    None,
                );
                self.egui_winit = Some(state);
            }
        }
        if self.egui_renderer.is_none() {
            if let (Some(device), Some(format)) = (self.renderer.device(), self.renderer.surface_format()) {
                self.egui_renderer = Some(EguiRenderer::new(device, format, RendererOptions::default()));
            }
        }
        let size = self.renderer.size();
        self.egui_screen = Some(ScreenDescriptor {
            size_in_pixels: [size.width, size.height],
            pixels_per_point: self.pixels_per_point(),
        });
    }

    fn handle_resize(&mut self, size: winit::dpi::PhysicalSize<u32>) {
        self.renderer.resize(size);
        self.camera.set_viewport(size);
        let pixels_per_point = self.pixels_per_point();
        if let Some(screen) = self.egui_screen.as_mut() {
            screen.size_in_pixels = [size.width, size.height];
            screen.pixels_per_point = pixels_per_point;
        }
    }

    fn frame(&mut self) {
        self.time.tick();
        let dt = self.time.delta_seconds();
        self.panel.push_frame_time(dt);

        if let Some(loader) = self.loader.as_ref() {
            self.session.poll_loads(loader, &mut self.scene);
        }

        if let Some(model) = self.scene.model_mut() {
            model.advance(dt);
        }

        let orbit_delta = self.input.take_orbit_delta();
        if orbit_delta != glam::Vec2::ZERO {
            self.orbit.orbit(orbit_delta);
        }
        let zoom = self.input.take_zoom_factor();
        if zoom != 1.0 {
            self.orbit.zoom(zoom);
        }
        self.orbit.update(dt);
        self.orbit.write_to(&mut self.camera);

        let egui_output = self.run_egui();

        match self.renderer.render_frame(
            &self.scene,
            &self.camera,
            &self.session,
            egui_output.as_ref().and_then(|(jobs, screen)| {
                self.egui_renderer.as_mut().map(|painter| (painter, jobs.as_slice(), screen))
            }),
        ) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = self.renderer.size();
                self.renderer.resize(size);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("surface out of memory; shutting down");
                self.should_close = true;
            }
            Err(err) => log::warn!("surface error: {err:?}"),
        }
    }

    /// Run one egui frame; returns tessellated jobs plus the screen
    /// descriptor, and dispatches the panel's parameter changes.
    fn run_egui(&mut self) -> Option<(Vec<egui::ClippedPrimitive>, ScreenDescriptor)> {
        let window = self.renderer.window()?;
        let raw_input = self.egui_winit.as_mut()?.take_egui_input(window);
        let screen = self.egui_screen.as_ref().map(|s| ScreenDescriptor {
            size_in_pixels: s.size_in_pixels,
            pixels_per_point: s.pixels_per_point,
        })?;

        let panel = &mut self.panel;
        let session = &self.session;
        let mut changes = Vec::new();
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            changes = panel.show(ctx, session);
        });
        if let Some(loader) = self.loader.as_ref() {
            for change in changes {
                log::debug!("parameter change: {change}");
                self.session.apply_change(change, &mut self.scene, loader);
            }
        }

        if let (Some(window), Some(state)) = (self.renderer.window(), self.egui_winit.as_mut()) {
            state.handle_platform_output(window, full_output.platform_output);
        }

        let jobs = self.egui_ctx.tessellate(full_output.shapes, screen.pixels_per_point);
        if let (Some(painter), Some(device), Some(queue)) =
            (self.egui_renderer.as_mut(), self.renderer.device(), self.renderer.queue())
        {
            for (id, delta) in &full_output.textures_delta.set {
                painter.update_texture(device, queue, *id, delta);
            }
            for id in &full_output.textures_delta.free {
                painter.free_texture(id);
            }
        }
        Some((jobs, screen))
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        self.renderer.ensure_window(event_loop);
        self.camera.set_viewport(self.renderer.size());
        self.init_egui();
        if !self.startup_requested {
            if let Some(loader) = self.loader.as_ref() {
                self.session.begin_startup_loads(loader, &mut self.scene);
            } else {
                log::error!("asset loader unavailable; startup assets will not load");
            }
            self.startup_requested = true;
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let mut consumed = false;
        let mut pointer_captured = false;
        if let (Some(window), Some(state)) = (self.renderer.window(), self.egui_winit.as_mut()) {
            if id == window.id() {
                let response = state.on_window_event(window, &event);
                consumed = response.consumed;
                pointer_captured = self.egui_ctx.wants_pointer_input();
            }
        }
        self.input.handle_window_event(&event, pointer_captured || consumed);

        match &event {
            WindowEvent::CloseRequested => self.should_close = true,
            WindowEvent::Resized(size) => self.handle_resize(*size),
            WindowEvent::DroppedFile(path) => {
                if let Some(loader) = self.loader.as_ref() {
                    let action = self.session.handle_dropped_file(loader, path.clone());
                    log::info!("dropped {}: {action:?}", path.display());
                }
            }
            WindowEvent::KeyboardInput { event: KeyEvent { logical_key, state, .. }, .. } => {
                if let Key::Named(NamedKey::Escape) = logical_key {
                    if *state == ElementState::Pressed && !consumed {
                        self.should_close = true;
                    }
                }
            }
            WindowEvent::RedrawRequested => self.frame(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_close {
            event_loop.exit();
            return;
        }
        if let Some(window) = self.renderer.window() {
            window.request_redraw();
        }
    }
}
