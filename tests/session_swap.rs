use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use vitrine::config::ViewerConfig;
use vitrine::environment::EnvironmentAsset;
use vitrine::loader::{AssetKind, AssetLoader, DecodedAsset, LoadOutcome, LoadRequest};
use vitrine::params::ParameterChange;
use vitrine::scene::SceneContent;
use vitrine::session::{DropAction, SceneSession, SlotState};

fn write_test_hdr(path: &Path, level: f32) {
    use image::codecs::hdr::HdrEncoder;
    let width = 16u32;
    let height = 8u32;
    let pixels = vec![image::Rgb([level, level * 0.5, level * 0.25]); (width * height) as usize];
    let file = std::fs::File::create(path).expect("create hdr");
    HdrEncoder::new(std::io::BufWriter::new(file))
        .encode(&pixels, width as usize, height as usize)
        .expect("encode hdr");
}

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(20);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for loads");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn session_and_loader() -> (SceneSession, AssetLoader, SceneContent) {
    let config = ViewerConfig::default();
    (SceneSession::new(&config), AssetLoader::spawn().expect("loader"), SceneContent::default())
}

#[test]
fn unsupported_drop_changes_nothing() {
    let (mut session, loader, mut scene) = session_and_loader();
    let params_before = session.params.clone();
    let catalog_before = session.catalog().len();

    let action = session.handle_dropped_file(&loader, PathBuf::from("notes.txt"));
    assert_eq!(action, DropAction::Ignored);

    session.poll_loads(&loader, &mut scene);
    assert_eq!(session.params, params_before);
    assert_eq!(session.catalog().len(), catalog_before);
    assert_eq!(scene.model_count(), 0);
    assert!(scene.environment().is_none());
    assert_eq!(session.environment_slot().state(), SlotState::Idle);
}

#[test]
fn dropped_environment_becomes_active_and_joins_catalog_once() {
    let dir = tempfile::tempdir().expect("temp dir");
    let hdr_path = dir.path().join("env.hdr");
    write_test_hdr(&hdr_path, 1.0);

    let (mut session, loader, mut scene) = session_and_loader();
    let action = session.handle_dropped_file(&loader, hdr_path.clone());
    assert!(matches!(action, DropAction::EnvironmentRequested(_)));
    assert_eq!(session.environment_slot().state(), SlotState::Loading);

    wait_until(|| {
        session.poll_loads(&loader, &mut scene);
        session.environment_slot().state() == SlotState::Applied
    });

    assert_eq!(session.active_environment(), Some("env"));
    assert!(scene.environment().is_some());
    let matches: Vec<_> =
        session.catalog().entries().iter().filter(|entry| entry.label == "env").collect();
    assert_eq!(matches.len(), 1, "catalog gains the label exactly once");
    assert_eq!(matches[0].source, hdr_path);

    // Dropping the same file again replaces the locator, not the entry.
    session.handle_dropped_file(&loader, hdr_path.clone());
    wait_until(|| {
        session.poll_loads(&loader, &mut scene);
        session.environment_slot().state() == SlotState::Applied
    });
    let count = session.catalog().entries().iter().filter(|entry| entry.label == "env").count();
    assert_eq!(count, 1);
}

#[test]
fn dropped_model_replaces_the_single_model() {
    let (mut session, loader, mut scene) = session_and_loader();

    session.handle_dropped_file(&loader, PathBuf::from("assets/models/pendant.gltf"));
    wait_until(|| {
        session.poll_loads(&loader, &mut scene);
        session.model_slot().state() == SlotState::Applied
    });
    assert_eq!(scene.model_count(), 1);
    let first_revision = scene.model_revision();

    session.handle_dropped_file(&loader, PathBuf::from("assets/models/pendant.gltf"));
    wait_until(|| {
        session.poll_loads(&loader, &mut scene);
        scene.model_revision() != first_revision
    });
    assert_eq!(scene.model_count(), 1, "swap keeps exactly one model");
}

#[test]
fn model_decode_failure_keeps_current_model() {
    let (mut session, loader, mut scene) = session_and_loader();

    session.handle_dropped_file(&loader, PathBuf::from("assets/models/pendant.gltf"));
    wait_until(|| {
        session.poll_loads(&loader, &mut scene);
        session.model_slot().state() == SlotState::Applied
    });
    let revision = scene.model_revision();

    session.handle_dropped_file(&loader, PathBuf::from("missing/nowhere.glb"));
    wait_until(|| {
        session.poll_loads(&loader, &mut scene);
        session.model_slot().state() == SlotState::Applied
    });
    assert_eq!(scene.model_revision(), revision, "failed decode leaves the applied model");
    assert_eq!(scene.model_count(), 1);
}

#[test]
fn later_environment_request_wins_even_if_it_resolves_first() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path_a = dir.path().join("first.hdr");
    let path_b = dir.path().join("second.hdr");
    write_test_hdr(&path_a, 0.25);
    write_test_hdr(&path_b, 2.0);

    let (mut session, loader, mut scene) = session_and_loader();
    // Two requests against the same slot: generation 1 then 2. The
    // loader is pointed at missing files so the only outcomes applied
    // are the fabricated ones below, in a chosen order.
    let gen_a = session.request_environment(&loader, PathBuf::from("missing/a.hdr"));
    let gen_b = session.request_environment(&loader, PathBuf::from("missing/b.hdr"));
    assert!(gen_b > gen_a);

    let asset_a = EnvironmentAsset::decode(&path_a).expect("decode a");
    let asset_b = EnvironmentAsset::decode(&path_b).expect("decode b");

    // B (newest generation) resolves first and applies.
    session.absorb(
        LoadOutcome {
            request: LoadRequest { kind: AssetKind::Environment, generation: gen_b, path: path_b.clone() },
            result: Ok(DecodedAsset::Environment(Box::new(asset_b))),
        },
        &mut scene,
        None,
    );
    assert_eq!(session.active_environment(), Some("second"));
    let revision_after_b = scene.environment_revision();

    // A resolves afterwards; its generation is stale and must be dropped.
    session.absorb(
        LoadOutcome {
            request: LoadRequest { kind: AssetKind::Environment, generation: gen_a, path: path_a.clone() },
            result: Ok(DecodedAsset::Environment(Box::new(asset_a))),
        },
        &mut scene,
        None,
    );
    assert_eq!(session.active_environment(), Some("second"), "stale result must not apply");
    assert_eq!(scene.environment_revision(), revision_after_b);
    assert!(session.catalog().entries().iter().all(|entry| entry.label != "first"));
}

#[test]
fn parameter_changes_reach_every_mesh_material() {
    let (mut session, loader, mut scene) = session_and_loader();
    session.handle_dropped_file(&loader, PathBuf::from("assets/models/pendant.gltf"));
    wait_until(|| {
        session.poll_loads(&loader, &mut scene);
        session.model_slot().state() == SlotState::Applied
    });

    session.apply_change(ParameterChange::EnvMapIntensity(3.25), &mut scene, &loader);
    let model = scene.model().expect("model");
    assert!(model.import.materials.iter().all(|m| m.env_map_intensity == 3.25));

    session.apply_change(ParameterChange::Roughness(Some(0.6)), &mut scene, &loader);
    let model = scene.model().expect("model");
    assert!(model.import.materials.iter().all(|m| m.roughness_factor == 0.6));
}

#[test]
fn exposure_reaches_output_as_fourth_power() {
    let (mut session, loader, mut scene) = session_and_loader();
    session.apply_change(ParameterChange::Exposure(2.0), &mut scene, &loader);
    assert_eq!(session.params.output_exposure(), 16.0);
}

#[test]
fn bloom_toggle_restores_pass_order() {
    let (mut session, loader, mut scene) = session_and_loader();
    let original = session.schedule().clone();

    session.apply_change(ParameterChange::BloomEnabled(true), &mut scene, &loader);
    assert!(session.schedule().contains("bloom"));
    assert_eq!(session.schedule().ids().last().map(String::as_str), Some("output"));

    session.apply_change(ParameterChange::BloomEnabled(false), &mut scene, &loader);
    assert_eq!(*session.schedule(), original);
}

#[test]
fn startup_loads_environment_before_model() {
    let (mut session, loader, mut scene) = session_and_loader();
    session.begin_startup_loads(&loader, &mut scene);
    assert_eq!(session.environment_slot().state(), SlotState::Loading);
    // The model request is deferred until the environment resolves.
    assert_eq!(session.model_slot().state(), SlotState::Idle);

    wait_until(|| {
        session.poll_loads(&loader, &mut scene);
        session.environment_slot().state() == SlotState::Applied
            && session.model_slot().state() == SlotState::Applied
    });
    assert_eq!(session.active_environment(), Some("studio"));
    assert_eq!(scene.model_count(), 1);
    let model = scene.model().expect("model");
    assert_eq!(model.import.label, "pendant");
    // Startup material tuning ran against the applied environment.
    assert!(model
        .import
        .materials
        .iter()
        .all(|m| m.env_map_intensity == session.params.env_map_intensity));
}
