use crate::params::SceneParameters;

pub const PASS_SCENE: &str = "scene";
pub const PASS_OUTPUT: &str = "output";

/// Ordered pass list of the compositor, kept as plain ids so ordering
/// rules stay checkable without a GPU. Two passes are structural: the
/// scene render comes first and the output (tone-mapping) pass is
/// always last; effects toggle in and out between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSchedule {
    ids: Vec<String>,
}

impl PassSchedule {
    pub fn new() -> Self {
        Self { ids: vec![PASS_SCENE.to_string(), PASS_OUTPUT.to_string()] }
    }

    /// Insert immediately before the output pass. Re-inserting an
    /// already scheduled effect is a no-op.
    pub fn insert_effect(&mut self, effect: &str) {
        if effect == PASS_SCENE || effect == PASS_OUTPUT {
            return;
        }
        if self.ids.iter().any(|id| id == effect) {
            return;
        }
        let output_index = self.ids.len() - 1;
        self.ids.insert(output_index, effect.to_string());
    }

    pub fn remove_effect(&mut self, effect: &str) {
        if effect == PASS_SCENE || effect == PASS_OUTPUT {
            return;
        }
        self.ids.retain(|id| id != effect);
    }

    pub fn contains(&self, effect: &str) -> bool {
        self.ids.iter().any(|id| id == effect)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Effect ids between the scene and output passes, in order.
    pub fn effects(&self) -> impl Iterator<Item = &str> {
        self.ids[1..self.ids.len() - 1].iter().map(String::as_str)
    }

    pub fn has_effects(&self) -> bool {
        self.ids.len() > 2
    }
}

impl Default for PassSchedule {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BloomUniform {
    // threshold, strength, radius, texel aspect
    params: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct OutputUniform {
    // exposure (already raised to the 4th power), pad
    params: [f32; 4],
}

struct BlitTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

fn create_target(device: &wgpu::Device, width: u32, height: u32, label: &str) -> BlitTarget {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: Compositor::HDR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    BlitTarget { _texture: texture, view }
}

/// GPU half of the compositor: executes whatever the schedule lists.
/// Bloom runs threshold → separable blur → additive combine at half
/// resolution; output applies exposure, ACES tone-mapping, and relies
/// on the sRGB surface for the final transfer curve.
pub struct Compositor {
    sampler: wgpu::Sampler,
    input_bgl: wgpu::BindGroupLayout,
    bloom_uniform: wgpu::Buffer,
    bloom_bg: wgpu::BindGroup,
    prefilter_pipeline: wgpu::RenderPipeline,
    blur_h_pipeline: wgpu::RenderPipeline,
    blur_v_pipeline: wgpu::RenderPipeline,
    combine_pipeline: wgpu::RenderPipeline,
    copy_pipeline: wgpu::RenderPipeline,
    output_uniform: wgpu::Buffer,
    output_bg: wgpu::BindGroup,
    output_pipeline: wgpu::RenderPipeline,
    bright: BlitTarget,
    blur_ping: BlitTarget,
    combined: BlitTarget,
    width: u32,
    height: u32,
}

impl Compositor {
    pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Post Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let input_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Post Input BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let uniform_bgl_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bloom_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bloom Uniform"),
            size: std::mem::size_of::<BloomUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bloom_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Uniform BGL"),
            entries: &[uniform_bgl_entry(0)],
        });
        let bloom_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bloom Uniform BG"),
            layout: &bloom_bgl,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: bloom_uniform.as_entire_binding() }],
        });

        let output_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Output Uniform"),
            size: std::mem::size_of::<OutputUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let output_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Output Uniform BGL"),
            entries: &[uniform_bgl_entry(0)],
        });
        let output_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Output Uniform BG"),
            layout: &output_bgl,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: output_uniform.as_entire_binding() }],
        });

        let bloom_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Bloom Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/bloom.wgsl").into()),
        });
        let output_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Output Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/output.wgsl").into()),
        });

        let bloom_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Bloom Layout"),
            bind_group_layouts: &[&input_bgl, &bloom_bgl],
            push_constant_ranges: &[],
        });
        let fullscreen_pipeline = |label: &str,
                                   layout: &wgpu::PipelineLayout,
                                   module: &wgpu::ShaderModule,
                                   entry: &str,
                                   format: wgpu::TextureFormat,
                                   blend: Option<wgpu::BlendState>| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some("vs_fullscreen"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(entry),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let prefilter_pipeline = fullscreen_pipeline(
            "Bloom Prefilter",
            &bloom_layout,
            &bloom_shader,
            "fs_prefilter",
            Self::HDR_FORMAT,
            None,
        );
        let blur_h_pipeline =
            fullscreen_pipeline("Bloom Blur H", &bloom_layout, &bloom_shader, "fs_blur_h", Self::HDR_FORMAT, None);
        let blur_v_pipeline =
            fullscreen_pipeline("Bloom Blur V", &bloom_layout, &bloom_shader, "fs_blur_v", Self::HDR_FORMAT, None);
        // Combine adds the blurred brights on top of the scene target.
        let combine_pipeline = fullscreen_pipeline(
            "Bloom Combine",
            &bloom_layout,
            &bloom_shader,
            "fs_combine",
            Self::HDR_FORMAT,
            Some(wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent::OVER,
            }),
        );

        let copy_pipeline =
            fullscreen_pipeline("Post Copy", &bloom_layout, &bloom_shader, "fs_copy", Self::HDR_FORMAT, None);

        let output_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Output Layout"),
            bind_group_layouts: &[&input_bgl, &output_bgl],
            push_constant_ranges: &[],
        });
        let output_pipeline = fullscreen_pipeline(
            "Output Pass",
            &output_layout,
            &output_shader,
            "fs_output",
            surface_format,
            None,
        );

        let bright = create_target(device, width / 2, height / 2, "Bloom Bright");
        let blur_ping = create_target(device, width / 2, height / 2, "Bloom Blur Ping");
        let combined = create_target(device, width, height, "Post Combined");

        Self {
            sampler,
            input_bgl,
            bloom_uniform,
            bloom_bg,
            prefilter_pipeline,
            blur_h_pipeline,
            blur_v_pipeline,
            combine_pipeline,
            copy_pipeline,
            output_uniform,
            output_bg,
            output_pipeline,
            bright,
            blur_ping,
            combined,
            width,
            height,
        }
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;
        self.bright = create_target(device, width / 2, height / 2, "Bloom Bright");
        self.blur_ping = create_target(device, width / 2, height / 2, "Bloom Blur Ping");
        self.combined = create_target(device, width, height, "Post Combined");
    }

    fn input_bind_group(&self, device: &wgpu::Device, view: &wgpu::TextureView) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Post Input BG"),
            layout: &self.input_bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(&self.sampler) },
            ],
        })
    }

    fn fullscreen_pass(
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        target: &wgpu::TextureView,
        load: wgpu::LoadOp<wgpu::Color>,
        pipeline: &wgpu::RenderPipeline,
        bind_groups: [&wgpu::BindGroup; 2],
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations { load, store: wgpu::StoreOp::Store },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_groups[0], &[]);
        pass.set_bind_group(1, bind_groups[1], &[]);
        pass.draw(0..3, 0..1);
    }

    /// Run the scheduled effect passes over the scene target, then the
    /// output pass onto the surface. With no effects scheduled the
    /// scene target feeds the output pass directly.
    pub fn composite(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        schedule: &PassSchedule,
        params: &SceneParameters,
        scene_view: &wgpu::TextureView,
        surface_view: &wgpu::TextureView,
    ) {
        queue.write_buffer(
            &self.output_uniform,
            0,
            bytemuck::bytes_of(&OutputUniform {
                params: [params.output_exposure(), 0.0, 0.0, 0.0],
            }),
        );

        let mut current = scene_view;
        for effect in schedule.effects() {
            match effect {
                crate::session::EFFECT_BLOOM => {
                    queue.write_buffer(
                        &self.bloom_uniform,
                        0,
                        bytemuck::bytes_of(&BloomUniform {
                            params: [
                                params.bloom_threshold,
                                params.bloom_strength,
                                params.bloom_radius,
                                self.height.max(1) as f32 / self.width.max(1) as f32,
                            ],
                        }),
                    );

                    let scene_bg = self.input_bind_group(device, current);
                    Self::fullscreen_pass(
                        encoder,
                        "Bloom Prefilter Pass",
                        &self.bright.view,
                        wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        &self.prefilter_pipeline,
                        [&scene_bg, &self.bloom_bg],
                    );

                    let bright_bg = self.input_bind_group(device, &self.bright.view);
                    Self::fullscreen_pass(
                        encoder,
                        "Bloom Blur H Pass",
                        &self.blur_ping.view,
                        wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        &self.blur_h_pipeline,
                        [&bright_bg, &self.bloom_bg],
                    );

                    let ping_bg = self.input_bind_group(device, &self.blur_ping.view);
                    Self::fullscreen_pass(
                        encoder,
                        "Bloom Blur V Pass",
                        &self.bright.view,
                        wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        &self.blur_v_pipeline,
                        [&ping_bg, &self.bloom_bg],
                    );

                    // Copy the scene into the combined target, then add
                    // the blurred brights on top.
                    let copy_bg = self.input_bind_group(device, current);
                    Self::fullscreen_pass(
                        encoder,
                        "Bloom Scene Copy Pass",
                        &self.combined.view,
                        wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        &self.copy_pipeline,
                        [&copy_bg, &self.bloom_bg],
                    );
                    let blurred_bg = self.input_bind_group(device, &self.bright.view);
                    Self::fullscreen_pass(
                        encoder,
                        "Bloom Combine Pass",
                        &self.combined.view,
                        wgpu::LoadOp::Load,
                        &self.combine_pipeline,
                        [&blurred_bg, &self.bloom_bg],
                    );
                    current = &self.combined.view;
                }
                other => {
                    log::warn!("unknown post effect '{other}' in schedule; skipping");
                }
            }
        }

        let final_bg = self.input_bind_group(device, current);
        Self::fullscreen_pass(
            encoder,
            "Output Pass",
            surface_view,
            wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            &self.output_pipeline,
            [&final_bg, &self.output_bg],
        );
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_schedule_is_scene_then_output() {
        let schedule = PassSchedule::new();
        assert_eq!(schedule.ids(), ["scene", "output"]);
        assert!(!schedule.has_effects());
    }

    #[test]
    fn effects_insert_before_output_and_toggle_cleanly() {
        let mut schedule = PassSchedule::new();
        let original = schedule.clone();
        schedule.insert_effect("bloom");
        assert_eq!(schedule.ids(), ["scene", "bloom", "output"]);
        assert_eq!(schedule.ids().last().map(String::as_str), Some(PASS_OUTPUT));
        schedule.insert_effect("bloom");
        assert_eq!(schedule.ids().len(), 3, "double insert is a no-op");
        schedule.remove_effect("bloom");
        assert_eq!(schedule, original, "toggle off restores the original order");
    }

    #[test]
    fn structural_passes_cannot_be_touched() {
        let mut schedule = PassSchedule::new();
        schedule.remove_effect(PASS_OUTPUT);
        schedule.remove_effect(PASS_SCENE);
        schedule.insert_effect(PASS_OUTPUT);
        assert_eq!(schedule.ids(), ["scene", "output"]);
    }

    #[test]
    fn output_stays_last_under_many_insertions() {
        let mut schedule = PassSchedule::new();
        for effect in ["bloom", "vignette", "grain"] {
            schedule.insert_effect(effect);
            assert_eq!(schedule.ids().last().map(String::as_str), Some(PASS_OUTPUT));
        }
        assert_eq!(schedule.ids(), ["scene", "bloom", "vignette", "grain", "output"]);
        assert_eq!(schedule.effects().collect::<Vec<_>>(), ["bloom", "vignette", "grain"]);
    }
}
