use glam::Vec3;
use vitrine::mesh::ModelImport;
use vitrine::params::{MaterialTuning, SceneParameters};
use vitrine::scene::ModelInstance;

#[test]
fn pendant_imports_with_materials_and_hierarchy() {
    let import = ModelImport::load("assets/models/pendant.gltf").expect("bundled model");
    assert_eq!(import.label, "pendant");
    assert_eq!(import.meshes.len(), 1);
    assert_eq!(import.materials.len(), 1);
    assert!(import.clips.is_empty());

    let mesh = &import.meshes[0];
    assert_eq!(mesh.vertices.len(), 6);
    assert_eq!(mesh.indices.len(), 24);
    assert_eq!(mesh.subsets.len(), 1);
    assert_eq!(mesh.subsets[0].material, Some(0));

    let material = &import.materials[0];
    assert_eq!(material.label, "brushed_gold");
    assert_eq!(material.metallic_factor, 1.0);
    assert_eq!(material.roughness_factor, 0.25);
    assert!(!material.double_sided);
    assert_eq!(material.transmission, None, "no transmission extension on this asset");

    let mesh_nodes = import.nodes.iter().filter(|node| node.mesh.is_some()).count();
    assert_eq!(mesh_nodes, 1);
}

#[test]
fn generated_normals_are_unit_length() {
    let import = ModelImport::load("assets/models/pendant.gltf").expect("bundled model");
    for vertex in &import.meshes[0].vertices {
        let normal = Vec3::from_array(vertex.normal);
        assert!((normal.length() - 1.0).abs() < 1e-3);
    }
}

#[test]
fn instance_recenter_moves_bounds_to_origin() {
    let import = ModelImport::load("assets/models/pendant.gltf").expect("bundled model");
    let center = import.bounds().center;
    let instance = ModelInstance::new(import, true);
    let (transform, _) = instance.draws().next().expect("one draw");
    let moved_center = transform.transform_point3(center);
    assert!(moved_center.length() < 1e-5);
}

#[test]
fn material_parameters_apply_across_the_subtree() {
    let import = ModelImport::load("assets/models/pendant.gltf").expect("bundled model");
    let mut instance = ModelInstance::new(import, false);
    let params = SceneParameters { env_map_intensity: 2.0, ..Default::default() };
    let tuning = MaterialTuning { opacity: Some(0.75), ..Default::default() };
    instance.apply_material_parameters(&params, &tuning);
    for material in &instance.import.materials {
        assert_eq!(material.env_map_intensity, 2.0);
        assert_eq!(material.opacity, 0.75);
    }
}

#[test]
fn missing_model_is_an_error_not_a_panic() {
    assert!(ModelImport::load("definitely/not/here.glb").is_err());
}
