use crate::animation::AnimationMixer;
use crate::environment::EnvironmentAsset;
use crate::mesh::{MeshMaterial, ModelImport};
use crate::params::{MaterialTuning, SceneParameters};
use glam::{Mat4, Vec3};

/// The one live model of the scene: imported data plus per-frame pose
/// and the recenter offset applied at the root.
pub struct ModelInstance {
    pub import: ModelImport,
    pub root_offset: Vec3,
    pub mixer: Option<AnimationMixer>,
    world: Vec<Mat4>,
}

impl ModelInstance {
    pub fn new(import: ModelImport, recenter: bool) -> Self {
        let root_offset = if recenter { -import.bounds().center } else { Vec3::ZERO };
        // Play the first clip when the document carries one.
        let mixer = if import.clips.is_empty() { None } else { Some(AnimationMixer::new(0)) };
        let world = import.world_transforms(&import.rest_locals());
        Self { import, root_offset, mixer, world }
    }

    /// Advance the mixer and refresh node world transforms. A model
    /// without clips keeps its rest pose.
    pub fn advance(&mut self, dt: f32) {
        let Some(mixer) = self.mixer.as_mut() else { return };
        let clip = &self.import.clips[mixer.clip];
        mixer.advance(dt, clip.duration);
        let locals = clip.sample_locals(&self.import.nodes, mixer.time);
        self.world = self.import.world_transforms(&locals);
    }

    /// Mesh-bearing nodes with their world transforms, recenter offset
    /// folded in.
    pub fn draws(&self) -> impl Iterator<Item = (Mat4, usize)> + '_ {
        let offset = Mat4::from_translation(self.root_offset);
        self.import
            .nodes
            .iter()
            .enumerate()
            .filter_map(move |(index, node)| node.mesh.map(|mesh| (offset * self.world[index], mesh)))
    }

    /// Write session parameters into every material of the subtree. The
    /// importer knows nothing about the session, so this runs after
    /// every model swap and after relevant parameter edits.
    pub fn apply_material_parameters(&mut self, params: &SceneParameters, tuning: &MaterialTuning) {
        for material in self.import.materials.iter_mut() {
            material.env_map_intensity = params.env_map_intensity;
            if let Some(roughness) = tuning.roughness {
                material.roughness_factor = roughness;
            }
            if let Some(opacity) = tuning.opacity {
                material.opacity = opacity;
            }
            if let Some(double_sided) = tuning.double_sided {
                material.double_sided = double_sided;
            }
            // Extension-backed properties are only tuned where the
            // source material carries them.
            if material.transmission.is_some() {
                if let Some(transmission) = tuning.transmission {
                    material.transmission = Some(transmission);
                }
            }
            if material.thickness.is_some() {
                if let Some(thickness) = tuning.thickness {
                    material.thickness = Some(thickness);
                }
            }
            if material.ior.is_some() {
                if let Some(ior) = tuning.ior {
                    material.ior = Some(ior);
                }
            }
        }
    }
}

/// CPU-side scene state consumed by the renderer. Revisions bump on
/// swap so GPU uploads happen once per new asset, not per frame.
#[derive(Default)]
pub struct SceneContent {
    model: Option<ModelInstance>,
    environment: Option<EnvironmentAsset>,
    model_revision: u64,
    environment_revision: u64,
}

impl SceneContent {
    pub fn set_model(&mut self, instance: ModelInstance) {
        // The previous model (and its GPU buffers, via the revision
        // bump) is released here; the scene never holds two.
        self.model = Some(instance);
        self.model_revision = self.model_revision.wrapping_add(1);
    }

    pub fn set_environment(&mut self, asset: EnvironmentAsset) {
        self.environment = Some(asset);
        self.environment_revision = self.environment_revision.wrapping_add(1);
    }

    pub fn model(&self) -> Option<&ModelInstance> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut ModelInstance> {
        self.model.as_mut()
    }

    pub fn environment(&self) -> Option<&EnvironmentAsset> {
        self.environment.as_ref()
    }

    pub fn model_count(&self) -> usize {
        usize::from(self.model.is_some())
    }

    pub fn model_revision(&self) -> u64 {
        self.model_revision
    }

    pub fn environment_revision(&self) -> u64 {
        self.environment_revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Mesh, MeshBounds, MeshSubset, MeshVertex, ModelNode};
    use glam::{Quat, Vec2, Vec4};

    pub(crate) fn single_mesh_import(label: &str, materials: Vec<MeshMaterial>) -> ModelImport {
        let vertices = vec![
            MeshVertex::new(Vec3::new(-1.0, 0.0, 0.0), Vec3::Z, Vec4::new(1.0, 0.0, 0.0, 1.0), Vec2::ZERO),
            MeshVertex::new(Vec3::new(1.0, 0.0, 0.0), Vec3::Z, Vec4::new(1.0, 0.0, 0.0, 1.0), Vec2::X),
            MeshVertex::new(Vec3::new(0.0, 2.0, 0.0), Vec3::Z, Vec4::new(1.0, 0.0, 0.0, 1.0), Vec2::Y),
        ];
        let bounds = MeshBounds::from_vertices(&vertices);
        ModelImport {
            label: label.to_string(),
            nodes: vec![ModelNode {
                name: Some(label.to_string()),
                parent: None,
                translation: Vec3::ZERO,
                rotation: Quat::IDENTITY,
                scale: Vec3::ONE,
                mesh: Some(0),
            }],
            meshes: vec![Mesh {
                vertices,
                indices: vec![0, 1, 2],
                subsets: vec![MeshSubset { name: None, index_offset: 0, index_count: 3, material: Some(0) }],
                bounds,
            }],
            materials,
            textures: Vec::new(),
            clips: Vec::new(),
        }
    }

    #[test]
    fn recenter_offsets_by_bounds_center() {
        let import = single_mesh_import("tri", vec![MeshMaterial::neutral("m")]);
        let center = import.bounds().center;
        let instance = ModelInstance::new(import, true);
        assert!((instance.root_offset + center).length() < 1e-6);
        let (transform, mesh) = instance.draws().next().expect("one draw");
        assert_eq!(mesh, 0);
        let moved = transform.transform_point3(center);
        assert!(moved.length() < 1e-6, "bounds center should land at the origin");
    }

    #[test]
    fn swapping_model_keeps_exactly_one() {
        let mut scene = SceneContent::default();
        assert_eq!(scene.model_count(), 0);
        scene.set_model(ModelInstance::new(
            single_mesh_import("first", vec![MeshMaterial::neutral("m")]),
            false,
        ));
        assert_eq!(scene.model_count(), 1);
        let before = scene.model_revision();
        scene.set_model(ModelInstance::new(
            single_mesh_import("second", vec![MeshMaterial::neutral("m")]),
            false,
        ));
        assert_eq!(scene.model_count(), 1);
        assert_eq!(scene.model().unwrap().import.label, "second");
        assert_ne!(scene.model_revision(), before);
    }

    #[test]
    fn tuning_skips_absent_extension_properties() {
        let mut with_ext = MeshMaterial::neutral("glass");
        with_ext.transmission = Some(0.0);
        with_ext.ior = Some(1.5);
        let plain = MeshMaterial::neutral("plain");
        let import = single_mesh_import("mixed", vec![with_ext, plain]);
        let mut instance = ModelInstance::new(import, false);

        let params = SceneParameters { env_map_intensity: 2.5, ..Default::default() };
        let tuning = MaterialTuning {
            transmission: Some(0.8),
            ior: Some(1.33),
            roughness: Some(0.1),
            ..Default::default()
        };
        instance.apply_material_parameters(&params, &tuning);

        let materials = &instance.import.materials;
        assert_eq!(materials[0].env_map_intensity, 2.5);
        assert_eq!(materials[1].env_map_intensity, 2.5);
        assert_eq!(materials[0].transmission, Some(0.8));
        assert_eq!(materials[0].ior, Some(1.33));
        assert_eq!(materials[1].transmission, None);
        assert_eq!(materials[1].ior, None);
        assert_eq!(materials[0].roughness_factor, 0.1);
        assert_eq!(materials[1].roughness_factor, 0.1);
    }
}
