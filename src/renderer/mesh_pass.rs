use crate::environment::EnvironmentGpu;
use crate::mesh::{MeshMaterial, MeshVertex, ModelImport};
use crate::scene::ModelInstance;
use glam::Mat4;
use wgpu::util::DeviceExt;

pub(super) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const DRAW_STRIDE: u64 = 256;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub(super) struct MeshFrameData {
    pub view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
    // x = environment mip count, y = environment intensity is per-draw,
    // z/w unused
    pub env_params: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct MeshDrawData {
    model: [[f32; 4]; 4],
    base_color: [f32; 4],
    emissive: [f32; 4],
    // metallic, roughness, env intensity, opacity
    material_params: [f32; 4],
    // transmission, thickness, ior, has base color texture
    volume_params: [f32; 4],
}

/// Pipeline variant per material: alpha blending for transmissive or
/// translucent materials, cull mode per double-sidedness.
#[derive(Clone, Copy, PartialEq, Eq)]
struct PipelineVariant {
    blended: bool,
    double_sided: bool,
}

impl PipelineVariant {
    fn for_material(material: &MeshMaterial) -> Self {
        let blended = material.opacity < 1.0 || material.transmission.unwrap_or(0.0) > 0.0;
        Self { blended, double_sided: material.double_sided }
    }

    fn index(self) -> usize {
        usize::from(self.blended) * 2 + usize::from(self.double_sided)
    }
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
}

/// GPU residency for one imported model; rebuilt whenever the scene's
/// model revision changes.
pub(super) struct ModelGpu {
    buffers: Vec<MeshBuffers>,
    material_bind_groups: Vec<wgpu::BindGroup>,
    _textures: Vec<wgpu::Texture>,
}

impl ModelGpu {
    pub(super) fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pass: &MeshPass,
        import: &ModelImport,
    ) -> Self {
        let buffers = import
            .meshes
            .iter()
            .enumerate()
            .map(|(index, mesh)| {
                let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("Mesh VB {index}") as &str),
                    contents: bytemuck::cast_slice(&mesh.vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                });
                let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("Mesh IB {index}") as &str),
                    contents: bytemuck::cast_slice(&mesh.indices),
                    usage: wgpu::BufferUsages::INDEX,
                });
                MeshBuffers { vertex, index: index_buffer }
            })
            .collect();

        let mut textures = Vec::new();
        let mut views = Vec::new();
        for imported in &import.textures {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(imported.label.as_str()),
                size: wgpu::Extent3d {
                    width: imported.width,
                    height: imported.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: if imported.srgb {
                    wgpu::TextureFormat::Rgba8UnormSrgb
                } else {
                    wgpu::TextureFormat::Rgba8Unorm
                },
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &imported.rgba,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(imported.width * 4),
                    rows_per_image: Some(imported.height),
                },
                wgpu::Extent3d {
                    width: imported.width,
                    height: imported.height,
                    depth_or_array_layers: 1,
                },
            );
            views.push(texture.create_view(&wgpu::TextureViewDescriptor::default()));
            textures.push(texture);
        }

        let material_bind_groups = import
            .materials
            .iter()
            .enumerate()
            .map(|(index, material)| {
                let base_view = material
                    .base_color_texture
                    .and_then(|slot| views.get(slot))
                    .unwrap_or(&pass.white_view);
                // Emissive sampling multiplies the factor, so the
                // fallback is white, not black.
                let emissive_view = material
                    .emissive_texture
                    .and_then(|slot| views.get(slot))
                    .unwrap_or(&pass.white_view);
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("Material BG {index}") as &str),
                    layout: &pass.material_bgl,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(base_view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(emissive_view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::Sampler(&pass.material_sampler),
                        },
                    ],
                })
            })
            .collect();

        Self { buffers, material_bind_groups, _textures: textures }
    }
}

/// Forward HDR pass over every mesh subset of the current model. The
/// per-draw uniform rides one buffer with dynamic offsets, rewritten
/// each frame so animation and live material edits land immediately.
pub(super) struct MeshPass {
    pipelines: [wgpu::RenderPipeline; 4],
    frame_buffer: wgpu::Buffer,
    frame_bg: wgpu::BindGroup,
    draw_buffer: wgpu::Buffer,
    draw_bg: wgpu::BindGroup,
    draw_capacity: usize,
    draw_bgl: wgpu::BindGroupLayout,
    pub(super) environment_bgl: wgpu::BindGroupLayout,
    material_bgl: wgpu::BindGroupLayout,
    material_sampler: wgpu::Sampler,
    white_view: wgpu::TextureView,
}

fn solid_texture(device: &wgpu::Device, queue: &wgpu::Queue, rgba: [u8; 4], label: &str) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &rgba,
        wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(4), rows_per_image: Some(1) },
        wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

impl MeshPass {
    pub(super) fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/mesh.wgsl").into()),
        });

        let frame_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mesh Frame BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Mesh Frame Buffer"),
            size: std::mem::size_of::<MeshFrameData>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mesh Frame BG"),
            layout: &frame_bgl,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: frame_buffer.as_entire_binding() }],
        });

        let draw_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mesh Draw BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<MeshDrawData>() as u64),
                },
                count: None,
            }],
        });
        let draw_capacity = 64usize;
        let draw_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Mesh Draw Buffer"),
            size: DRAW_STRIDE * draw_capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let draw_bg = Self::create_draw_bind_group(device, &draw_bgl, &draw_buffer);

        let environment_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mesh Environment BGL"),
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
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let material_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mesh Material BGL"),
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
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&frame_bgl, &draw_bgl, &environment_bgl, &material_bgl],
            push_constant_ranges: &[],
        });

        let make_pipeline = |variant: PipelineVariant| {
            let label = format!(
                "Mesh Pipeline {}{}",
                if variant.blended { "blended" } else { "opaque" },
                if variant.double_sided { " double-sided" } else { "" }
            );
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label.as_str()),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[MeshVertex::layout()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: super::post::Compositor::HDR_FORMAT,
                        blend: if variant.blended { Some(wgpu::BlendState::ALPHA_BLENDING) } else { None },
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: if variant.double_sided { None } else { Some(wgpu::Face::Back) },
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: !variant.blended,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };
        let pipelines = [
            make_pipeline(PipelineVariant { blended: false, double_sided: false }),
            make_pipeline(PipelineVariant { blended: false, double_sided: true }),
            make_pipeline(PipelineVariant { blended: true, double_sided: false }),
            make_pipeline(PipelineVariant { blended: true, double_sided: true }),
        ];

        let material_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Material Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let white_view = solid_texture(device, queue, [255, 255, 255, 255], "Fallback White");

        Self {
            pipelines,
            frame_buffer,
            frame_bg,
            draw_buffer,
            draw_bg,
            draw_capacity,
            draw_bgl,
            environment_bgl,
            material_bgl,
            material_sampler,
            white_view,
        }
    }

    fn create_draw_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        buffer: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mesh Draw BG"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<MeshDrawData>() as u64),
                }),
            }],
        })
    }

    fn ensure_draw_capacity(&mut self, device: &wgpu::Device, count: usize) {
        if self.draw_capacity >= count {
            return;
        }
        let mut new_capacity = self.draw_capacity.max(64);
        while new_capacity < count {
            new_capacity *= 2;
        }
        self.draw_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Mesh Draw Buffer"),
            size: DRAW_STRIDE * new_capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.draw_bg = Self::create_draw_bind_group(device, &self.draw_bgl, &self.draw_buffer);
        self.draw_capacity = new_capacity;
    }

    pub(super) fn write_frame(
        &self,
        queue: &wgpu::Queue,
        view_proj: Mat4,
        camera_pos: glam::Vec3,
        env_mip_count: u32,
    ) {
        let frame = MeshFrameData {
            view_proj: view_proj.to_cols_array_2d(),
            camera_pos: [camera_pos.x, camera_pos.y, camera_pos.z, 1.0],
            env_params: [env_mip_count as f32, 0.0, 0.0, 0.0],
        };
        queue.write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&frame));
    }

    /// Record every subset of the model. Opaque subsets draw first,
    /// blended ones after, so translucency composites over the opaque
    /// scene.
    pub(super) fn draw(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pass: &mut wgpu::RenderPass<'_>,
        instance: &ModelInstance,
        model_gpu: &ModelGpu,
        environment_bg: &wgpu::BindGroup,
    ) {
        struct DrawRecord {
            mesh: usize,
            index_offset: u32,
            index_count: u32,
            material: usize,
            variant: PipelineVariant,
        }

        let mut records = Vec::new();
        let mut uniforms: Vec<MeshDrawData> = Vec::new();
        for (transform, mesh_index) in instance.draws() {
            let mesh = &instance.import.meshes[mesh_index];
            for subset in &mesh.subsets {
                let material_index = subset.material.unwrap_or(0);
                let material = &instance.import.materials[material_index];
                records.push(DrawRecord {
                    mesh: mesh_index,
                    index_offset: subset.index_offset,
                    index_count: subset.index_count,
                    material: material_index,
                    variant: PipelineVariant::for_material(material),
                });
                uniforms.push(MeshDrawData {
                    model: transform.to_cols_array_2d(),
                    base_color: material.base_color_factor,
                    emissive: [
                        material.emissive_factor[0],
                        material.emissive_factor[1],
                        material.emissive_factor[2],
                        0.0,
                    ],
                    material_params: [
                        material.metallic_factor,
                        material.roughness_factor,
                        material.env_map_intensity,
                        material.opacity,
                    ],
                    volume_params: [
                        material.transmission.unwrap_or(0.0),
                        material.thickness.unwrap_or(0.0),
                        material.ior.unwrap_or(1.5),
                        if material.base_color_texture.is_some() { 1.0 } else { 0.0 },
                    ],
                });
            }
        }
        if records.is_empty() {
            return;
        }

        self.ensure_draw_capacity(device, records.len());
        for (index, uniform) in uniforms.iter().enumerate() {
            queue.write_buffer(&self.draw_buffer, index as u64 * DRAW_STRIDE, bytemuck::bytes_of(uniform));
        }

        pass.set_bind_group(0, &self.frame_bg, &[]);
        pass.set_bind_group(2, environment_bg, &[]);
        let mut order: Vec<usize> = (0..records.len()).collect();
        order.sort_by_key(|&i| records[i].variant.blended);
        for i in order {
            let record = &records[i];
            let buffers = &model_gpu.buffers[record.mesh];
            pass.set_pipeline(&self.pipelines[record.variant.index()]);
            pass.set_bind_group(1, &self.draw_bg, &[(i as u64 * DRAW_STRIDE) as u32]);
            pass.set_bind_group(3, &model_gpu.material_bind_groups[record.material], &[]);
            pass.set_vertex_buffer(0, buffers.vertex.slice(..));
            pass.set_index_buffer(buffers.index.slice(..), wgpu::IndexFormat::Uint32);
            let end = record.index_offset + record.index_count;
            pass.draw_indexed(record.index_offset..end, 0, 0..1);
        }
    }

    pub(super) fn create_environment_bind_group(
        &self,
        device: &wgpu::Device,
        environment: &EnvironmentGpu,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mesh Environment BG"),
            layout: &self.environment_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(environment.radiance_view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(environment.irradiance_view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(environment.sampler()),
                },
            ],
        })
    }
}
