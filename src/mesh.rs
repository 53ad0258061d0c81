use crate::animation::AnimationClip;
use anyhow::{anyhow, bail, Context, Result};
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use gltf::mesh::Mode;
use std::collections::HashMap;
use std::path::Path;

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 4],
    pub uv: [f32; 2],
}

impl MeshVertex {
    pub fn new(position: Vec3, normal: Vec3, tangent: Vec4, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            tangent: tangent.to_array(),
            uv: uv.to_array(),
        }
    }

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 24,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: 40,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

#[derive(Clone, Debug)]
pub struct Mesh {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    pub subsets: Vec<MeshSubset>,
    pub bounds: MeshBounds,
}

#[derive(Clone, Debug)]
pub struct MeshSubset {
    pub name: Option<String>,
    pub index_offset: u32,
    pub index_count: u32,
    pub material: Option<usize>,
}

#[derive(Clone, Copy, Debug)]
pub struct MeshBounds {
    pub min: Vec3,
    pub max: Vec3,
    pub center: Vec3,
    pub radius: f32,
}

#[derive(Clone, Debug)]
pub struct ImportedTexture {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    pub srgb: bool,
}

/// Material state carried past import: the session mutates the
/// environment intensity and the tunable optional properties at runtime.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshMaterial {
    pub label: String,
    pub base_color_factor: [f32; 4],
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub emissive_factor: [f32; 3],
    pub double_sided: bool,
    pub opacity: f32,
    pub env_map_intensity: f32,
    pub transmission: Option<f32>,
    pub thickness: Option<f32>,
    pub ior: Option<f32>,
    pub base_color_texture: Option<usize>,
    pub emissive_texture: Option<usize>,
}

impl MeshMaterial {
    pub fn neutral(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            base_color_factor: [1.0, 1.0, 1.0, 1.0],
            metallic_factor: 0.0,
            roughness_factor: 1.0,
            emissive_factor: [0.0, 0.0, 0.0],
            double_sided: false,
            opacity: 1.0,
            env_map_intensity: 1.0,
            transmission: None,
            thickness: None,
            ior: None,
            base_color_texture: None,
            emissive_texture: None,
        }
    }
}

/// One node of the imported hierarchy, rest-pose TRS preserved so the
/// animation mixer can override locals per frame.
#[derive(Clone, Debug)]
pub struct ModelNode {
    pub name: Option<String>,
    pub parent: Option<usize>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub mesh: Option<usize>,
}

impl ModelNode {
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Full decode result of one glTF document: hierarchy, geometry,
/// materials, textures, and animation clips.
#[derive(Clone, Debug)]
pub struct ModelImport {
    pub label: String,
    pub nodes: Vec<ModelNode>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<MeshMaterial>,
    pub textures: Vec<ImportedTexture>,
    pub clips: Vec<AnimationClip>,
}

impl ModelImport {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let (document, buffers, images) = gltf::import(path_ref)
            .with_context(|| format!("Failed to import glTF from {}", path_ref.display()))?;

        let label = path_ref
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| path_ref.display().to_string());

        let mut textures = Vec::new();
        let mut texture_index_map: HashMap<usize, usize> = HashMap::new();

        let mut materials = Vec::new();
        let mut material_index_map: HashMap<usize, usize> = HashMap::new();
        for (mat_index, material) in document.materials().enumerate() {
            let mat_label =
                material.name().map(|s| s.to_string()).unwrap_or_else(|| format!("material_{mat_index}"));
            let pbr = material.pbr_metallic_roughness();
            let base_color_factor = pbr.base_color_factor();

            let base_color_texture = pbr.base_color_texture().map(|info| info.texture());
            let emissive_texture = material.emissive_texture().map(|info| info.texture());
            let base_color_slot = base_color_texture
                .map(|tex| {
                    intern_texture(&mut textures, &mut texture_index_map, &images, &tex, true, &label)
                })
                .transpose()?;
            let emissive_slot = emissive_texture
                .map(|tex| {
                    intern_texture(&mut textures, &mut texture_index_map, &images, &tex, true, &label)
                })
                .transpose()?;

            let slot = materials.len();
            if let Some(actual) = material.index() {
                material_index_map.insert(actual, slot);
            }
            materials.push(MeshMaterial {
                label: mat_label,
                base_color_factor,
                metallic_factor: pbr.metallic_factor(),
                roughness_factor: pbr.roughness_factor(),
                emissive_factor: material.emissive_factor(),
                double_sided: material.double_sided(),
                opacity: base_color_factor[3],
                env_map_intensity: 1.0,
                transmission: material.transmission().map(|t| t.transmission_factor()),
                thickness: material.volume().map(|v| v.thickness_factor()),
                ior: material.ior(),
                base_color_texture: base_color_slot,
                emissive_texture: emissive_slot,
            });
        }
        let needs_default = document
            .meshes()
            .flat_map(|mesh| mesh.primitives())
            .any(|primitive| primitive.material().index().is_none());
        if materials.is_empty() || needs_default {
            materials.push(MeshMaterial::neutral("default"));
        }
        let fallback_material = materials.len() - 1;

        let mut meshes = Vec::new();
        let mut mesh_index_map: HashMap<usize, usize> = HashMap::new();
        for gltf_mesh in document.meshes() {
            let mesh = import_mesh(&gltf_mesh, &buffers, &material_index_map, fallback_material)
                .with_context(|| {
                    format!("Mesh '{}' in {}", gltf_mesh.name().unwrap_or("unnamed"), path_ref.display())
                })?;
            if let Some(mesh) = mesh {
                mesh_index_map.insert(gltf_mesh.index(), meshes.len());
                meshes.push(mesh);
            }
        }
        if meshes.is_empty() {
            bail!("No triangle meshes found in {}", path_ref.display());
        }

        let mut nodes: Vec<ModelNode> = document
            .nodes()
            .map(|node| {
                let (translation, rotation, scale) = node.transform().decomposed();
                ModelNode {
                    name: node.name().map(|s| s.to_string()),
                    parent: None,
                    translation: Vec3::from_array(translation),
                    rotation: Quat::from_array(rotation),
                    scale: Vec3::from_array(scale),
                    mesh: node.mesh().and_then(|m| mesh_index_map.get(&m.index()).copied()),
                }
            })
            .collect();
        for node in document.nodes() {
            for child in node.children() {
                nodes[child.index()].parent = Some(node.index());
            }
        }

        let clips = crate::animation::import_clips(&document, &buffers);

        Ok(Self { label, nodes, meshes, materials, textures, clips })
    }

    /// World matrix per node for a set of local matrices (rest pose or
    /// mixer output). Parents precede children in glTF node order is not
    /// guaranteed, so resolve lazily.
    pub fn world_transforms(&self, locals: &[Mat4]) -> Vec<Mat4> {
        assert_eq!(locals.len(), self.nodes.len());
        let mut world: Vec<Option<Mat4>> = vec![None; self.nodes.len()];
        fn resolve(
            index: usize,
            nodes: &[ModelNode],
            locals: &[Mat4],
            world: &mut Vec<Option<Mat4>>,
        ) -> Mat4 {
            if let Some(m) = world[index] {
                return m;
            }
            let local = locals[index];
            let m = match nodes[index].parent {
                Some(parent) => resolve(parent, nodes, locals, world) * local,
                None => local,
            };
            world[index] = Some(m);
            m
        }
        (0..self.nodes.len()).map(|i| resolve(i, &self.nodes, locals, &mut world)).collect()
    }

    pub fn rest_locals(&self) -> Vec<Mat4> {
        self.nodes.iter().map(ModelNode::local_matrix).collect()
    }

    /// Rest-pose world-space bounds across every mesh-bearing node.
    pub fn bounds(&self) -> MeshBounds {
        let world = self.world_transforms(&self.rest_locals());
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        let mut any = false;
        for (node, transform) in self.nodes.iter().zip(world.iter()) {
            let Some(mesh_index) = node.mesh else { continue };
            let mesh = &self.meshes[mesh_index];
            for vertex in &mesh.vertices {
                let pos = transform.transform_point3(Vec3::from_array(vertex.position));
                min = min.min(pos);
                max = max.max(pos);
                any = true;
            }
        }
        if !any {
            return MeshBounds { min: Vec3::ZERO, max: Vec3::ZERO, center: Vec3::ZERO, radius: 0.0 };
        }
        let center = (min + max) * 0.5;
        MeshBounds { min, max, center, radius: (max - center).length() }
    }
}

fn intern_texture(
    textures: &mut Vec<ImportedTexture>,
    index_map: &mut HashMap<usize, usize>,
    images: &[gltf::image::Data],
    texture: &gltf::Texture<'_>,
    srgb: bool,
    model_label: &str,
) -> Result<usize> {
    if let Some(slot) = index_map.get(&texture.index()) {
        return Ok(*slot);
    }
    let source = texture.source();
    let image = images
        .get(source.index())
        .ok_or_else(|| anyhow!("Image index {} missing in model '{model_label}'", source.index()))?;
    let rgba = expand_to_rgba(image)?;
    let slot = textures.len();
    textures.push(ImportedTexture {
        label: format!("{model_label}::tex{}", texture.index()),
        width: image.width,
        height: image.height,
        rgba,
        srgb,
    });
    index_map.insert(texture.index(), slot);
    Ok(slot)
}

fn import_mesh(
    gltf_mesh: &gltf::Mesh<'_>,
    buffers: &[gltf::buffer::Data],
    material_index_map: &HashMap<usize, usize>,
    fallback_material: usize,
) -> Result<Option<Mesh>> {
    let mut vertices: Vec<MeshVertex> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    let mut subsets: Vec<MeshSubset> = Vec::new();

    for (primitive_index, primitive) in gltf_mesh.primitives().enumerate() {
        if primitive.mode() != Mode::Triangles {
            continue;
        }
        let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
        let positions: Vec<Vec3> = match reader.read_positions() {
            Some(iter) => iter.map(Vec3::from_array).collect(),
            None => bail!("POSITION attribute missing"),
        };
        if positions.is_empty() {
            continue;
        }

        let mut normals: Vec<Vec3> = reader
            .read_normals()
            .map(|it| it.map(Vec3::from_array).collect())
            .unwrap_or_else(|| vec![Vec3::ZERO; positions.len()]);
        let mut tex_coords: Vec<Vec2> = reader
            .read_tex_coords(0)
            .map(|coords| coords.into_f32().map(Vec2::from_array).collect())
            .unwrap_or_else(|| vec![Vec2::ZERO; positions.len()]);

        let local_indices: Vec<u32> = reader
            .read_indices()
            .map(|read| read.into_u32().collect())
            .unwrap_or_else(|| (0..positions.len() as u32).collect());

        if normals.len() != positions.len() || normals.iter().all(|n| n.length_squared() == 0.0) {
            normals = compute_normals(&positions, &local_indices);
        }
        if tex_coords.len() != positions.len() {
            tex_coords.resize(positions.len(), Vec2::ZERO);
        }

        let base_vertex = vertices.len() as u32;
        vertices.extend(positions.iter().enumerate().map(|(i, pos)| {
            let normal = normals.get(i).copied().unwrap_or(Vec3::Y).normalize_or_zero();
            let uv = tex_coords.get(i).copied().unwrap_or(Vec2::ZERO);
            MeshVertex::new(*pos, normal, Vec4::new(1.0, 0.0, 0.0, 1.0), uv)
        }));

        let index_offset = indices.len() as u32;
        indices.extend(local_indices.iter().map(|idx| idx + base_vertex));
        let index_count = indices.len() as u32 - index_offset;
        let material = primitive
            .material()
            .index()
            .and_then(|idx| material_index_map.get(&idx).copied())
            .unwrap_or(fallback_material);
        let name = gltf_mesh
            .name()
            .map(|mesh_name| format!("{mesh_name}::{primitive_index}"))
            .or_else(|| Some(format!("primitive_{primitive_index}")));
        subsets.push(MeshSubset { name, index_offset, index_count, material: Some(material) });
    }

    if subsets.is_empty() {
        return Ok(None);
    }
    compute_tangents(&mut vertices, &indices);
    let bounds = MeshBounds::from_vertices(&vertices);
    Ok(Some(Mesh { vertices, indices, subsets, bounds }))
}

fn expand_to_rgba(image: &gltf::image::Data) -> Result<Vec<u8>> {
    match image.format {
        gltf::image::Format::R8 => {
            let mut out = Vec::with_capacity(image.pixels.len() * 4);
            for &value in &image.pixels {
                out.extend_from_slice(&[value, value, value, 255]);
            }
            Ok(out)
        }
        gltf::image::Format::R8G8 => {
            let mut out = Vec::with_capacity(image.pixels.len() / 2 * 4);
            for chunk in image.pixels.chunks_exact(2) {
                out.extend_from_slice(&[chunk[0], chunk[1], 0, 255]);
            }
            Ok(out)
        }
        gltf::image::Format::R8G8B8 => {
            let mut out = Vec::with_capacity(image.pixels.len() / 3 * 4);
            for chunk in image.pixels.chunks_exact(3) {
                out.extend_from_slice(&[chunk[0], chunk[1], chunk[2], 255]);
            }
            Ok(out)
        }
        gltf::image::Format::R8G8B8A8 => Ok(image.pixels.clone()),
        other => bail!("Unsupported image format {:?}", other),
    }
}

fn compute_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks(3) {
        if tri.len() < 3 {
            continue;
        }
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }
        let normal = (positions[i1] - positions[i0]).cross(positions[i2] - positions[i0]);
        if normal.length_squared() > 0.0 {
            normals[i0] += normal;
            normals[i1] += normal;
            normals[i2] += normal;
        }
    }
    for normal in &mut normals {
        *normal = if normal.length_squared() > 0.0 { normal.normalize() } else { Vec3::Y };
    }
    normals
}

fn compute_tangents(vertices: &mut [MeshVertex], indices: &[u32]) {
    if vertices.is_empty() || indices.is_empty() {
        return;
    }
    let mut tan1 = vec![Vec3::ZERO; vertices.len()];
    let mut tan2 = vec![Vec3::ZERO; vertices.len()];

    for tri in indices.chunks(3) {
        if tri.len() < 3 {
            continue;
        }
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
            continue;
        }

        let v0 = Vec3::from_array(vertices[i0].position);
        let v1 = Vec3::from_array(vertices[i1].position);
        let v2 = Vec3::from_array(vertices[i2].position);
        let uv0 = Vec2::from_array(vertices[i0].uv);
        let uv1 = Vec2::from_array(vertices[i1].uv);
        let uv2 = Vec2::from_array(vertices[i2].uv);

        let delta_pos1 = v1 - v0;
        let delta_pos2 = v2 - v0;
        let delta_uv1 = uv1 - uv0;
        let delta_uv2 = uv2 - uv0;

        let denom = delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x;
        if denom.abs() < 1e-8 {
            continue;
        }
        let r = 1.0 / denom;
        let sdir = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) * r;
        let tdir = (delta_pos2 * delta_uv1.x - delta_pos1 * delta_uv2.x) * r;

        tan1[i0] += sdir;
        tan1[i1] += sdir;
        tan1[i2] += sdir;
        tan2[i0] += tdir;
        tan2[i1] += tdir;
        tan2[i2] += tdir;
    }

    for (i, vertex) in vertices.iter_mut().enumerate() {
        let normal = Vec3::from_array(vertex.normal);
        let t1 = tan1[i];
        if t1.length_squared() > 0.0 {
            let tangent = (t1 - normal * normal.dot(t1)).normalize_or_zero();
            let w = if normal.cross(t1).dot(tan2[i]) < 0.0 { -1.0 } else { 1.0 };
            vertex.tangent = [tangent.x, tangent.y, tangent.z, w];
        } else {
            vertex.tangent = [1.0, 0.0, 0.0, 1.0];
        }
    }
}

impl MeshBounds {
    pub fn from_vertices(vertices: &[MeshVertex]) -> Self {
        if vertices.is_empty() {
            return MeshBounds { min: Vec3::ZERO, max: Vec3::ZERO, center: Vec3::ZERO, radius: 0.0 };
        }
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for vertex in vertices {
            let pos = Vec3::from_array(vertex.position);
            min = min.min(pos);
            max = max.max(pos);
        }
        let center = (min + max) * 0.5;
        let mut radius: f32 = 0.0;
        for vertex in vertices {
            radius = radius.max((Vec3::from_array(vertex.position) - center).length());
        }
        MeshBounds { min, max, center, radius }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_demo_model() {
        let import = ModelImport::load("assets/models/pendant.gltf").expect("demo gltf should load");
        assert_eq!(import.meshes.len(), 1);
        let mesh = &import.meshes[0];
        assert!(!mesh.vertices.is_empty());
        assert_eq!(mesh.indices.len() % 3, 0);
        assert!(import.nodes.iter().any(|n| n.mesh.is_some()));
        for vertex in &mesh.vertices {
            let normal = Vec3::from_array(vertex.normal);
            assert!(normal.length_squared() > 0.5);
        }
    }

    #[test]
    fn world_transforms_compose_parent_chains() {
        let nodes = vec![
            ModelNode {
                name: None,
                parent: None,
                translation: Vec3::new(1.0, 0.0, 0.0),
                rotation: Quat::IDENTITY,
                scale: Vec3::ONE,
                mesh: None,
            },
            ModelNode {
                name: None,
                parent: Some(0),
                translation: Vec3::new(0.0, 2.0, 0.0),
                rotation: Quat::IDENTITY,
                scale: Vec3::ONE,
                mesh: Some(0),
            },
        ];
        let import = ModelImport {
            label: "test".to_string(),
            nodes,
            meshes: vec![Mesh {
                vertices: vec![MeshVertex::new(Vec3::ZERO, Vec3::Y, Vec4::new(1.0, 0.0, 0.0, 1.0), Vec2::ZERO)],
                indices: vec![0],
                subsets: vec![MeshSubset { name: None, index_offset: 0, index_count: 1, material: Some(0) }],
                bounds: MeshBounds::from_vertices(&[]),
            }],
            materials: vec![MeshMaterial::neutral("default")],
            textures: Vec::new(),
            clips: Vec::new(),
        };
        let world = import.world_transforms(&import.rest_locals());
        let leaf = world[1].transform_point3(Vec3::ZERO);
        assert!((leaf - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-6);
        let bounds = import.bounds();
        assert!((bounds.center - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-6);
    }
}
