use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { title: "Vitrine".to_string(), width: 1280, height: 720, vsync: true }
    }
}

/// Camera/orbit defaults. Values match the reference viewer setup: a
/// narrow 35° lens close to the subject, orbit clamped to a tight shell.
#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "CameraConfig::default_fov_degrees")]
    pub fov_degrees: f32,
    #[serde(default = "CameraConfig::default_near")]
    pub near: f32,
    #[serde(default = "CameraConfig::default_far")]
    pub far: f32,
    #[serde(default = "CameraConfig::default_distance")]
    pub distance: f32,
    #[serde(default = "CameraConfig::default_min_distance")]
    pub min_distance: f32,
    #[serde(default = "CameraConfig::default_max_distance")]
    pub max_distance: f32,
    #[serde(default = "CameraConfig::default_target_height")]
    pub target_height: f32,
    #[serde(default = "CameraConfig::default_damping")]
    pub damping: f32,
}

impl CameraConfig {
    const fn default_fov_degrees() -> f32 {
        35.0
    }

    const fn default_near() -> f32 {
        0.1
    }

    const fn default_far() -> f32 {
        200.0
    }

    const fn default_distance() -> f32 {
        3.5
    }

    const fn default_min_distance() -> f32 {
        2.0
    }

    const fn default_max_distance() -> f32 {
        4.0
    }

    const fn default_target_height() -> f32 {
        0.5
    }

    const fn default_damping() -> f32 {
        8.0
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: Self::default_fov_degrees(),
            near: Self::default_near(),
            far: Self::default_far(),
            distance: Self::default_distance(),
            min_distance: Self::default_min_distance(),
            max_distance: Self::default_max_distance(),
            target_height: Self::default_target_height(),
            damping: Self::default_damping(),
        }
    }
}

/// Startup assets. Bundled environments listed here seed the catalog in
/// order; the first entry is the initial selection.
#[derive(Debug, Clone, Deserialize)]
pub struct SceneConfig {
    #[serde(default = "SceneConfig::default_model")]
    pub model: String,
    #[serde(default = "SceneConfig::default_environments")]
    pub environments: Vec<String>,
    #[serde(default)]
    pub recenter_model: Recenter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Recenter {
    #[default]
    BoundsCenter,
    Off,
}

impl SceneConfig {
    fn default_model() -> String {
        "assets/models/pendant.gltf".to_string()
    }

    fn default_environments() -> Vec<String> {
        vec!["assets/environments/studio.hdr".to_string()]
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            model: Self::default_model(),
            environments: Self::default_environments(),
            recenter_model: Recenter::default(),
        }
    }
}

/// Declarative effect profile. Variant effect stacks are data, not code:
/// the compositor only instantiates what is listed here.
#[derive(Debug, Clone, Deserialize)]
pub struct EffectsConfig {
    #[serde(default = "EffectsConfig::default_stack")]
    pub stack: Vec<String>,
}

impl EffectsConfig {
    fn default_stack() -> Vec<String> {
        vec!["bloom".to_string()]
    }
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self { stack: Self::default_stack() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ViewerConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub scene: SceneConfig,
    #[serde(default)]
    pub effects: EffectsConfig,
}

#[derive(Debug, Clone, Default)]
pub struct ViewerConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vsync: Option<bool>,
    pub model: Option<String>,
    pub environment: Option<String>,
}

impl ViewerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("config load error: {err:?}; falling back to defaults");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &ViewerConfigOverrides) {
        if let Some(width) = overrides.width {
            self.window.width = width;
        }
        if let Some(height) = overrides.height {
            self.window.height = height;
        }
        if let Some(vsync) = overrides.vsync {
            self.window.vsync = vsync;
        }
        if let Some(model) = overrides.model.as_ref() {
            self.scene.model = model.clone();
        }
        if let Some(environment) = overrides.environment.as_ref() {
            // An explicit environment becomes the first (initially
            // selected) catalog entry.
            self.scene.environments.retain(|existing| existing != environment);
            self.scene.environments.insert(0, environment.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = ViewerConfig::load_or_default("definitely/not/here.json");
        assert_eq!(cfg.window.width, 1280);
        assert_eq!(cfg.camera.max_distance, 4.0);
        assert_eq!(cfg.effects.stack, vec!["bloom".to_string()]);
    }

    #[test]
    fn partial_config_keeps_defaults_for_missing_sections() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "window": {{ "title": "t", "width": 640, "height": 480, "vsync": false }} }}"#)
            .expect("write config");
        let cfg = ViewerConfig::load(file.path()).expect("load config");
        assert_eq!(cfg.window.width, 640);
        assert!(!cfg.window.vsync);
        assert_eq!(cfg.camera.fov_degrees, 35.0);
        assert_eq!(cfg.scene.recenter_model, Recenter::BoundsCenter);
    }

    #[test]
    fn environment_override_moves_to_front_without_duplicating() {
        let mut cfg = ViewerConfig::default();
        cfg.scene.environments =
            vec!["a.hdr".to_string(), "b.hdr".to_string()];
        let overrides =
            ViewerConfigOverrides { environment: Some("b.hdr".to_string()), ..Default::default() };
        cfg.apply_overrides(&overrides);
        assert_eq!(cfg.scene.environments, vec!["b.hdr".to_string(), "a.hdr".to_string()]);
    }
}
