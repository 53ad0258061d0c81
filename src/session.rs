use crate::config::{Recenter, ViewerConfig};
use crate::environment::{self, EnvironmentAsset};
use crate::loader::{AssetKind, AssetLoader, DecodedAsset, LoadOutcome, LoadRequest};
use crate::params::{MaterialTuning, ParameterChange, SceneParameters};
use crate::renderer::post::PassSchedule;
use crate::scene::{ModelInstance, SceneContent};
use std::path::{Path, PathBuf};

pub const EFFECT_BLOOM: &str = "bloom";

/// One selectable environment. The catalog only ever grows; re-dropping
/// a label replaces its source instead of duplicating the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub label: String,
    pub source: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct EnvironmentCatalog {
    entries: Vec<CatalogEntry>,
}

impl EnvironmentCatalog {
    pub fn upsert(&mut self, label: String, source: PathBuf) {
        if let Some(existing) = self.entries.iter_mut().find(|entry| entry.label == label) {
            existing.source = source;
        } else {
            self.entries.push(CatalogEntry { label, source });
        }
    }

    pub fn source_for(&self, label: &str) -> Option<&Path> {
        self.entries.iter().find(|entry| entry.label == label).map(|entry| entry.source.as_path())
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lifecycle of an asset slot. `Loading` covers the newest generation
/// only; superseded generations resolve as stale and are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Loading,
    Applied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadDisposition {
    Current,
    Stale,
}

#[derive(Debug)]
pub struct AssetSlot {
    latest_generation: u64,
    state: SlotState,
    has_content: bool,
}

impl AssetSlot {
    fn new() -> Self {
        Self { latest_generation: 0, state: SlotState::Idle, has_content: false }
    }

    fn begin(&mut self) -> u64 {
        self.latest_generation += 1;
        self.state = SlotState::Loading;
        self.latest_generation
    }

    fn disposition(&self, generation: u64) -> LoadDisposition {
        if generation == self.latest_generation {
            LoadDisposition::Current
        } else {
            LoadDisposition::Stale
        }
    }

    fn applied(&mut self) {
        self.state = SlotState::Applied;
        self.has_content = true;
    }

    /// Failure (or an abandoned submit) reverts to whatever was last
    /// applied; a slot that never held content goes back to idle.
    fn revert(&mut self) {
        self.state = if self.has_content { SlotState::Applied } else { SlotState::Idle };
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.latest_generation
    }
}

/// What a drop event turned into. Mostly interesting to tests and the
/// status line; unsupported files answer `Ignored` with no side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropAction {
    EnvironmentRequested(u64),
    ModelRequested(u64),
    Ignored,
}

/// Asset kind by lowercase suffix after the final dot. Anything not
/// listed is silently unsupported.
pub fn asset_kind_for(path: &Path) -> Option<AssetKind> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "hdr" => Some(AssetKind::Environment),
        "glb" | "gltf" => Some(AssetKind::Model),
        _ => None,
    }
}

/// Owns everything a session mutates: parameter values, the environment
/// catalog, the post-pass schedule, and the two asset slots with their
/// generation counters. All mutation happens on the event-loop thread;
/// decodes complete through [`Self::absorb`].
pub struct SceneSession {
    pub params: SceneParameters,
    pub tuning: MaterialTuning,
    catalog: EnvironmentCatalog,
    schedule: PassSchedule,
    available_effects: Vec<String>,
    model_slot: AssetSlot,
    environment_slot: AssetSlot,
    active_environment: Option<String>,
    deferred_model: Option<PathBuf>,
    initial_model: PathBuf,
    recenter: Recenter,
}

impl SceneSession {
    pub fn new(config: &ViewerConfig) -> Self {
        let mut catalog = EnvironmentCatalog::default();
        for source in &config.scene.environments {
            let path = PathBuf::from(source);
            catalog.upsert(environment::label_from_path(&path), path);
        }
        Self {
            params: SceneParameters::default(),
            tuning: MaterialTuning::default(),
            catalog,
            schedule: PassSchedule::new(),
            available_effects: config.effects.stack.clone(),
            model_slot: AssetSlot::new(),
            environment_slot: AssetSlot::new(),
            active_environment: None,
            deferred_model: None,
            initial_model: PathBuf::from(&config.scene.model),
            recenter: config.scene.recenter_model,
        }
    }

    /// Kick off the startup loads: environment first, then the model
    /// once the environment slot resolves, so material tuning sees the
    /// final environment. With no bundled environment the generated
    /// fallback applies immediately and the model loads right away.
    pub fn begin_startup_loads(&mut self, loader: &AssetLoader, scene: &mut SceneContent) {
        self.deferred_model = Some(self.initial_model.clone());
        let first = self.catalog.entries().first().cloned();
        match first {
            Some(entry) => {
                self.request_environment(loader, entry.source);
            }
            None => {
                log::warn!("no bundled environments configured; using generated fallback");
                self.apply_generated_environment(scene);
                self.request_deferred_model(loader);
            }
        }
    }

    /// Drop-event entry point: route by extension, ignore the rest.
    pub fn handle_dropped_file(&mut self, loader: &AssetLoader, path: PathBuf) -> DropAction {
        match asset_kind_for(&path) {
            Some(AssetKind::Environment) => {
                let generation = self.request_environment(loader, path);
                DropAction::EnvironmentRequested(generation)
            }
            Some(AssetKind::Model) => {
                let generation = self.request_model(loader, path);
                DropAction::ModelRequested(generation)
            }
            None => {
                log::debug!("ignoring unsupported drop {}", path.display());
                DropAction::Ignored
            }
        }
    }

    /// One panel edit: fold into the parameter store, then re-apply the
    /// derived state it affects. Values arrive pre-clamped by the panel.
    pub fn apply_change(
        &mut self,
        change: ParameterChange,
        scene: &mut SceneContent,
        loader: &AssetLoader,
    ) {
        match change {
            ParameterChange::EnvMapIntensity(v) => {
                self.params.env_map_intensity = v;
                self.apply_material_parameters(scene);
            }
            ParameterChange::BackgroundBlur(v) => self.params.background_blur = v,
            ParameterChange::BackgroundIntensity(v) => self.params.background_intensity = v,
            ParameterChange::BloomEnabled(v) => {
                self.params.bloom_enabled = v;
                self.toggle_post_effect(EFFECT_BLOOM, v);
            }
            ParameterChange::BloomThreshold(v) => self.params.bloom_threshold = v,
            ParameterChange::BloomStrength(v) => self.params.bloom_strength = v,
            ParameterChange::BloomRadius(v) => self.params.bloom_radius = v,
            ParameterChange::Exposure(v) => self.params.exposure = v,
            ParameterChange::Transmission(v) => {
                self.tuning.transmission = v;
                self.apply_material_parameters(scene);
            }
            ParameterChange::Roughness(v) => {
                self.tuning.roughness = v;
                self.apply_material_parameters(scene);
            }
            ParameterChange::Thickness(v) => {
                self.tuning.thickness = v;
                self.apply_material_parameters(scene);
            }
            ParameterChange::Ior(v) => {
                self.tuning.ior = v;
                self.apply_material_parameters(scene);
            }
            ParameterChange::Opacity(v) => {
                self.tuning.opacity = v;
                self.apply_material_parameters(scene);
            }
            ParameterChange::DoubleSided(v) => {
                self.tuning.double_sided = v;
                self.apply_material_parameters(scene);
            }
            ParameterChange::EnvironmentSelected(label) => {
                match self.catalog.source_for(&label).map(Path::to_path_buf) {
                    Some(source) => {
                        self.request_environment(loader, source);
                    }
                    None => log::warn!("environment '{label}' is not in the catalog"),
                }
            }
        }
    }

    /// Walk the current model and push parameter/tuning values into
    /// every mesh material.
    pub fn apply_material_parameters(&mut self, scene: &mut SceneContent) {
        if let Some(model) = scene.model_mut() {
            model.apply_material_parameters(&self.params, &self.tuning);
        }
    }

    /// Insert or remove a named post pass; the output pass stays last.
    pub fn toggle_post_effect(&mut self, effect: &str, enabled: bool) {
        if !self.available_effects.iter().any(|known| known == effect) {
            log::warn!("effect '{effect}' is not in the configured stack");
            return;
        }
        if enabled {
            self.schedule.insert_effect(effect);
        } else {
            self.schedule.remove_effect(effect);
        }
    }

    /// Drain completed decodes; called once per frame from the render
    /// tick. Completion order is not load order, hence the generation
    /// check inside `absorb`.
    pub fn poll_loads(&mut self, loader: &AssetLoader, scene: &mut SceneContent) {
        for outcome in loader.drain() {
            self.absorb(outcome, scene, Some(loader));
        }
    }

    /// Apply one completed decode, or discard it when superseded.
    pub fn absorb(&mut self, outcome: LoadOutcome, scene: &mut SceneContent, loader: Option<&AssetLoader>) {
        let LoadOutcome { request, result } = outcome;
        match request.kind {
            AssetKind::Environment => {
                if self.environment_slot.disposition(request.generation) == LoadDisposition::Stale {
                    log::debug!(
                        "discarding stale environment decode of {} (generation {})",
                        request.path.display(),
                        request.generation
                    );
                    return;
                }
                match result {
                    Ok(DecodedAsset::Environment(asset)) => {
                        self.catalog.upsert(asset.label.clone(), request.path.clone());
                        self.active_environment = Some(asset.label.clone());
                        scene.set_environment(*asset);
                        self.environment_slot.applied();
                    }
                    Ok(DecodedAsset::Model(_)) => {
                        log::error!("environment slot received a model decode; dropping it");
                        self.environment_slot.revert();
                    }
                    Err(err) => {
                        log::warn!("environment decode failed for {}: {err:?}", request.path.display());
                        self.environment_slot.revert();
                        if !self.environment_slot.has_content {
                            self.apply_generated_environment(scene);
                        }
                    }
                }
                // Startup ordering: the first environment resolution,
                // success or failure, releases the initial model load.
                if let Some(loader) = loader {
                    self.request_deferred_model(loader);
                }
            }
            AssetKind::Model => {
                if self.model_slot.disposition(request.generation) == LoadDisposition::Stale {
                    log::debug!(
                        "discarding stale model decode of {} (generation {})",
                        request.path.display(),
                        request.generation
                    );
                    return;
                }
                match result {
                    Ok(DecodedAsset::Model(import)) => {
                        let mut instance =
                            ModelInstance::new(*import, self.recenter == Recenter::BoundsCenter);
                        instance.apply_material_parameters(&self.params, &self.tuning);
                        scene.set_model(instance);
                        self.model_slot.applied();
                    }
                    Ok(DecodedAsset::Environment(_)) => {
                        log::error!("model slot received an environment decode; dropping it");
                        self.model_slot.revert();
                    }
                    Err(err) => {
                        log::warn!("model decode failed for {}: {err:?}", request.path.display());
                        self.model_slot.revert();
                    }
                }
            }
        }
    }

    pub fn request_environment(&mut self, loader: &AssetLoader, path: PathBuf) -> u64 {
        let generation = self.environment_slot.begin();
        let request = LoadRequest { kind: AssetKind::Environment, generation, path };
        if let Err(request) = loader.submit(request) {
            log::warn!("decode queue full; dropping environment request {}", request.path.display());
            self.environment_slot.revert();
        }
        generation
    }

    pub fn request_model(&mut self, loader: &AssetLoader, path: PathBuf) -> u64 {
        let generation = self.model_slot.begin();
        let request = LoadRequest { kind: AssetKind::Model, generation, path };
        if let Err(request) = loader.submit(request) {
            log::warn!("decode queue full; dropping model request {}", request.path.display());
            self.model_slot.revert();
        }
        generation
    }

    fn request_deferred_model(&mut self, loader: &AssetLoader) {
        if let Some(path) = self.deferred_model.take() {
            self.request_model(loader, path);
        }
    }

    fn apply_generated_environment(&mut self, scene: &mut SceneContent) {
        let asset = EnvironmentAsset::generated_default();
        self.active_environment = Some(asset.label.clone());
        scene.set_environment(asset);
        self.environment_slot.applied();
    }

    pub fn catalog(&self) -> &EnvironmentCatalog {
        &self.catalog
    }

    pub fn schedule(&self) -> &PassSchedule {
        &self.schedule
    }

    pub fn active_environment(&self) -> Option<&str> {
        self.active_environment.as_deref()
    }

    pub fn environment_slot(&self) -> &AssetSlot {
        &self.environment_slot
    }

    pub fn model_slot(&self) -> &AssetSlot {
        &self.model_slot
    }

    pub fn available_effects(&self) -> &[String] {
        &self.available_effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_routing_is_case_insensitive_and_suffix_based() {
        assert_eq!(asset_kind_for(Path::new("env.HDR")), Some(AssetKind::Environment));
        assert_eq!(asset_kind_for(Path::new("model.glb")), Some(AssetKind::Model));
        assert_eq!(asset_kind_for(Path::new("model.GLTF")), Some(AssetKind::Model));
        assert_eq!(asset_kind_for(Path::new("archive.hdr.txt")), None);
        assert_eq!(asset_kind_for(Path::new("notes.txt")), None);
        assert_eq!(asset_kind_for(Path::new("no_extension")), None);
    }

    #[test]
    fn catalog_upsert_never_duplicates_labels() {
        let mut catalog = EnvironmentCatalog::default();
        catalog.upsert("env".to_string(), PathBuf::from("a.hdr"));
        catalog.upsert("other".to_string(), PathBuf::from("b.hdr"));
        catalog.upsert("env".to_string(), PathBuf::from("c.hdr"));
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.source_for("env"), Some(Path::new("c.hdr")));
        assert_eq!(catalog.entries()[0].label, "env");
    }

    #[test]
    fn slot_tracks_generations_and_reverts_on_failure() {
        let mut slot = AssetSlot::new();
        assert_eq!(slot.state(), SlotState::Idle);
        let first = slot.begin();
        assert_eq!(slot.state(), SlotState::Loading);
        let second = slot.begin();
        assert_eq!(slot.disposition(first), LoadDisposition::Stale);
        assert_eq!(slot.disposition(second), LoadDisposition::Current);
        slot.applied();
        assert_eq!(slot.state(), SlotState::Applied);
        let third = slot.begin();
        assert_eq!(slot.disposition(third), LoadDisposition::Current);
        slot.revert();
        assert_eq!(slot.state(), SlotState::Applied, "failure keeps the last applied content");
    }
}
