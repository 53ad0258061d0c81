use crate::camera3d::Camera3D;
use crate::config::WindowConfig;
use crate::environment::EnvironmentGpu;
use crate::scene::SceneContent;
use crate::session::SceneSession;
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

use egui_wgpu::{Renderer as EguiRenderer, ScreenDescriptor};

mod background_pass;
mod mesh_pass;
pub mod post;

use self::background_pass::BackgroundPass;
use self::mesh_pass::{MeshPass, ModelGpu};
use self::post::Compositor;

struct SceneTargets {
    _color: wgpu::Texture,
    color_view: wgpu::TextureView,
    _depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
}

fn create_scene_targets(device: &wgpu::Device, size: PhysicalSize<u32>) -> SceneTargets {
    let extent = wgpu::Extent3d {
        width: size.width.max(1),
        height: size.height.max(1),
        depth_or_array_layers: 1,
    };
    let color = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Scene HDR Target"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: Compositor::HDR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
    let depth = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Scene Depth Target"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: mesh_pass::DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
    SceneTargets { _color: color, color_view, _depth: depth, depth_view }
}

/// Owns the wgpu surface/device and every render pass. Scene data stays
/// CPU-side in [`SceneContent`]; uploads happen lazily when the scene's
/// revision counters move.
pub struct Renderer {
    surface: Option<wgpu::Surface<'static>>,
    device: Option<wgpu::Device>,
    queue: Option<wgpu::Queue>,
    config: Option<wgpu::SurfaceConfiguration>,
    size: PhysicalSize<u32>,
    window: Option<Arc<Window>>,
    title: String,
    vsync: bool,

    mesh_pass: Option<MeshPass>,
    background_pass: Option<BackgroundPass>,
    compositor: Option<Compositor>,
    targets: Option<SceneTargets>,

    model_gpu: Option<ModelGpu>,
    model_revision: u64,
    environment_gpu: Option<EnvironmentGpu>,
    environment_bg: Option<wgpu::BindGroup>,
    environment_revision: u64,
    environment_sampler: Option<Arc<wgpu::Sampler>>,
}

impl Renderer {
    pub fn new(window: &WindowConfig) -> Self {
        Self {
            surface: None,
            device: None,
            queue: None,
            config: None,
            size: PhysicalSize::new(window.width.max(1), window.height.max(1)),
            window: None,
            title: window.title.clone(),
            vsync: window.vsync,
            mesh_pass: None,
            background_pass: None,
            compositor: None,
            targets: None,
            model_gpu: None,
            model_revision: 0,
            environment_gpu: None,
            environment_bg: None,
            environment_revision: 0,
            environment_sampler: None,
        }
    }

    pub fn ensure_window(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes().with_title(&self.title).with_inner_size(self.size),
                )
                .expect("Failed to create window"),
        );
        pollster::block_on(self.init_wgpu(&window));
        self.window = Some(window);
    }

    fn choose_surface_format(formats: &[wgpu::TextureFormat]) -> wgpu::TextureFormat {
        formats.iter().copied().find(|f| f.is_srgb()).unwrap_or(formats[0])
    }

    async fn init_wgpu(&mut self, window: &Arc<Window>) {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone()).expect("surface");
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .expect("adapter");
        let required_limits = wgpu::Limits::default().using_resolution(adapter.limits());
        let device_desc = wgpu::DeviceDescriptor {
            label: Some("Device"),
            required_features: wgpu::Features::empty(),
            required_limits,
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        };
        let (device, queue) = adapter.request_device(&device_desc).await.expect("device");

        let caps = surface.get_capabilities(&adapter);
        let format = Self::choose_surface_format(&caps.formats);
        let size = window.inner_size();
        let present_mode = if self.vsync { wgpu::PresentMode::Fifo } else { wgpu::PresentMode::AutoNoVsync };
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let mesh_pass = MeshPass::new(&device, &queue);
        let background_pass = BackgroundPass::new(&device, &mesh_pass.environment_bgl);
        let compositor = Compositor::new(&device, format, size.width.max(1), size.height.max(1));
        let targets = create_scene_targets(&device, size);

        self.size = size;
        self.surface = Some(surface);
        self.device = Some(device);
        self.queue = Some(queue);
        self.config = Some(config);
        self.mesh_pass = Some(mesh_pass);
        self.background_pass = Some(background_pass);
        self.compositor = Some(compositor);
        self.targets = Some(targets);
    }

    pub fn device(&self) -> Option<&wgpu::Device> {
        self.device.as_ref()
    }

    pub fn queue(&self) -> Option<&wgpu::Queue> {
        self.queue.as_ref()
    }

    pub fn window(&self) -> Option<&Window> {
        self.window.as_deref()
    }

    pub fn surface_format(&self) -> Option<wgpu::TextureFormat> {
        self.config.as_ref().map(|config| config.format)
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Reconfigure the surface and every size-dependent target. Cheap
    /// and idempotent; called straight from the resize event.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.size = new_size;
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        let (Some(surface), Some(device), Some(config)) =
            (self.surface.as_ref(), self.device.as_ref(), self.config.as_mut())
        else {
            return;
        };
        config.width = new_size.width;
        config.height = new_size.height;
        surface.configure(device, config);
        self.targets = Some(create_scene_targets(device, new_size));
        if let Some(compositor) = self.compositor.as_mut() {
            compositor.resize(device, new_size.width, new_size.height);
        }
    }

    /// Upload whatever the scene swapped since the last frame. Old GPU
    /// resources drop here, which is the entire release story for
    /// replaced assets.
    fn sync_scene(&mut self, scene: &SceneContent) {
        let (Some(device), Some(queue), Some(mesh_pass)) =
            (self.device.as_ref(), self.queue.as_ref(), self.mesh_pass.as_ref())
        else {
            return;
        };
        if scene.model_revision() != self.model_revision {
            self.model_gpu =
                scene.model().map(|model| ModelGpu::new(device, queue, mesh_pass, &model.import));
            self.model_revision = scene.model_revision();
        }
        if scene.environment_revision() != self.environment_revision {
            let sampler = self
                .environment_sampler
                .get_or_insert_with(|| EnvironmentGpu::create_sampler(device))
                .clone();
            self.environment_gpu = scene
                .environment()
                .map(|asset| EnvironmentGpu::new(device, queue, asset, sampler));
            self.environment_bg = self
                .environment_gpu
                .as_ref()
                .map(|gpu| mesh_pass.create_environment_bind_group(device, gpu));
            self.environment_revision = scene.environment_revision();
        }
    }

    /// One frame: scene pass into the HDR target, compositor over it,
    /// egui on top of the surface, present.
    pub fn render_frame(
        &mut self,
        scene: &SceneContent,
        camera: &Camera3D,
        session: &SceneSession,
        egui_painter: Option<(&mut EguiRenderer, &[egui::ClippedPrimitive], &ScreenDescriptor)>,
    ) -> Result<(), wgpu::SurfaceError> {
        if self.surface.is_none() {
            return Ok(());
        }
        self.sync_scene(scene);

        let surface = self.surface.as_ref().expect("surface");
        let device = self.device.as_ref().expect("device");
        let queue = self.queue.as_ref().expect("queue");
        let targets = self.targets.as_ref().expect("scene targets");
        let mesh_pass = self.mesh_pass.as_mut().expect("mesh pass");
        let background_pass = self.background_pass.as_ref().expect("background pass");
        let compositor = self.compositor.as_mut().expect("compositor");

        let view_proj = camera.view_projection();
        let env_mip_count =
            self.environment_gpu.as_ref().map(EnvironmentGpu::mip_count).unwrap_or(1);
        mesh_pass.write_frame(queue, view_proj, camera.position, env_mip_count);
        background_pass.write_frame(
            queue,
            view_proj,
            session.params.background_blur,
            session.params.background_intensity,
            env_mip_count,
        );

        let frame = surface.get_current_texture()?;
        let surface_view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Frame Encoder") });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &targets.color_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &targets.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            if let Some(environment_bg) = self.environment_bg.as_ref() {
                background_pass.draw(&mut pass, environment_bg);
                if let (Some(model), Some(model_gpu)) = (scene.model(), self.model_gpu.as_ref()) {
                    mesh_pass.draw(device, queue, &mut pass, model, model_gpu, environment_bg);
                }
            }
        }

        compositor.composite(
            device,
            queue,
            &mut encoder,
            session.schedule(),
            &session.params,
            &targets.color_view,
            &surface_view,
        );

        if let Some((painter, paint_jobs, screen)) = egui_painter {
            let mut extra_cmd = painter.update_buffers(device, queue, &mut encoder, paint_jobs, screen);
            {
                let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Egui Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &surface_view,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    occlusion_query_set: None,
                    timestamp_writes: None,
                });
                let mut pass = pass.forget_lifetime();
                painter.render(&mut pass, paint_jobs, screen);
            }
            extra_cmd.push(encoder.finish());
            queue.submit(extra_cmd.into_iter());
        } else {
            queue.submit(std::iter::once(encoder.finish()));
        }
        frame.present();
        Ok(())
    }
}
