use std::fmt;

/// Live-tweakable scene settings. Mutated only through
/// [`ParameterChange`] dispatch; read by the apply-to-scene step.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneParameters {
    pub env_map_intensity: f32,
    pub background_blur: f32,
    pub background_intensity: f32,
    pub bloom_enabled: bool,
    pub bloom_threshold: f32,
    pub bloom_strength: f32,
    pub bloom_radius: f32,
    pub exposure: f32,
}

impl Default for SceneParameters {
    fn default() -> Self {
        Self {
            env_map_intensity: 1.0,
            background_blur: 0.5,
            background_intensity: 1.0,
            bloom_enabled: false,
            bloom_threshold: 0.5,
            bloom_strength: 0.5,
            bloom_radius: 0.0,
            exposure: 1.0,
        }
    }
}

impl SceneParameters {
    /// Exposure as the output pass consumes it. The panel slider is
    /// perceptual; the compositor wants the quartic curve.
    pub fn output_exposure(&self) -> f32 {
        self.exposure.powi(4)
    }
}

/// Panel slider ranges. The panel clamps edits to these, which is why
/// the session applies values without re-validating.
pub mod ranges {
    use std::ops::RangeInclusive;

    pub const ENV_MAP_INTENSITY: RangeInclusive<f32> = 0.0..=4.0;
    pub const BACKGROUND_BLUR: RangeInclusive<f32> = 0.0..=1.0;
    pub const BACKGROUND_INTENSITY: RangeInclusive<f32> = 0.0..=5.0;
    pub const BLOOM_THRESHOLD: RangeInclusive<f32> = 0.0..=1.0;
    pub const BLOOM_STRENGTH: RangeInclusive<f32> = 0.0..=3.0;
    pub const BLOOM_RADIUS: RangeInclusive<f32> = 0.0..=3.0;
    pub const EXPOSURE: RangeInclusive<f32> = 0.0..=3.0;
    pub const TRANSMISSION: RangeInclusive<f32> = 0.0..=1.0;
    pub const ROUGHNESS: RangeInclusive<f32> = 0.0..=1.0;
    pub const THICKNESS: RangeInclusive<f32> = 0.0..=5.0;
    pub const IOR: RangeInclusive<f32> = 1.0..=2.333;
    pub const OPACITY: RangeInclusive<f32> = 0.0..=1.0;
}

/// Optional per-session material overrides. `None` leaves the imported
/// material property untouched; `Some` is written to every mesh whose
/// material carries the property.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MaterialTuning {
    pub transmission: Option<f32>,
    pub roughness: Option<f32>,
    pub thickness: Option<f32>,
    pub ior: Option<f32>,
    pub opacity: Option<f32>,
    pub double_sided: Option<bool>,
}

impl MaterialTuning {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One edit coming out of the parameter panel. Every widget emits one of
/// these; the session is the single writer that folds them into
/// [`SceneParameters`] and the scene.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterChange {
    EnvMapIntensity(f32),
    BackgroundBlur(f32),
    BackgroundIntensity(f32),
    BloomEnabled(bool),
    BloomThreshold(f32),
    BloomStrength(f32),
    BloomRadius(f32),
    Exposure(f32),
    Transmission(Option<f32>),
    Roughness(Option<f32>),
    Thickness(Option<f32>),
    Ior(Option<f32>),
    Opacity(Option<f32>),
    DoubleSided(Option<bool>),
    EnvironmentSelected(String),
}

impl fmt::Display for ParameterChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterChange::EnvMapIntensity(v) => write!(f, "envMapIntensity={v:.3}"),
            ParameterChange::BackgroundBlur(v) => write!(f, "backgroundBlur={v:.3}"),
            ParameterChange::BackgroundIntensity(v) => write!(f, "backgroundIntensity={v:.3}"),
            ParameterChange::BloomEnabled(v) => write!(f, "bloom={v}"),
            ParameterChange::BloomThreshold(v) => write!(f, "bloomThreshold={v:.3}"),
            ParameterChange::BloomStrength(v) => write!(f, "bloomStrength={v:.3}"),
            ParameterChange::BloomRadius(v) => write!(f, "bloomRadius={v:.3}"),
            ParameterChange::Exposure(v) => write!(f, "exposure={v:.3}"),
            ParameterChange::Transmission(v) => write!(f, "transmission={v:?}"),
            ParameterChange::Roughness(v) => write!(f, "roughness={v:?}"),
            ParameterChange::Thickness(v) => write!(f, "thickness={v:?}"),
            ParameterChange::Ior(v) => write!(f, "ior={v:?}"),
            ParameterChange::Opacity(v) => write!(f, "opacity={v:?}"),
            ParameterChange::DoubleSided(v) => write!(f, "doubleSided={v:?}"),
            ParameterChange::EnvironmentSelected(label) => write!(f, "environment={label}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_exposure_is_quartic() {
        let mut params = SceneParameters::default();
        params.exposure = 2.0;
        assert_eq!(params.output_exposure(), 16.0);
        params.exposure = 1.0;
        assert_eq!(params.output_exposure(), 1.0);
    }

    #[test]
    fn default_tuning_is_empty() {
        assert!(MaterialTuning::default().is_empty());
        let tuned = MaterialTuning { roughness: Some(0.2), ..Default::default() };
        assert!(!tuned.is_empty());
    }
}
