use crate::params::{ranges, MaterialTuning, ParameterChange, SceneParameters};
use crate::session::{SceneSession, SlotState};
use egui::Context as EguiCtx;
use egui_plot::{Line, Plot, PlotPoints};

const FPS_HISTORY_LEN: usize = 120;

/// The tweak panel. Every widget edits a local copy and emits a
/// [`ParameterChange`]; the session is the only writer of real state.
pub struct ParameterPanel {
    fps_history: Vec<f32>,
}

impl ParameterPanel {
    pub fn new() -> Self {
        Self { fps_history: Vec::with_capacity(FPS_HISTORY_LEN) }
    }

    pub fn push_frame_time(&mut self, dt: f32) {
        if dt > 0.0 {
            if self.fps_history.len() >= FPS_HISTORY_LEN {
                self.fps_history.remove(0);
            }
            self.fps_history.push(1.0 / dt);
        }
    }

    /// Draw the panel and collect this frame's edits.
    pub fn show(&mut self, ctx: &EguiCtx, session: &SceneSession) -> Vec<ParameterChange> {
        let mut changes = Vec::new();
        egui::Window::new("Scene Controls").default_width(290.0).show(ctx, |ui| {
            self.fps_graph(ui);
            ui.separator();
            Self::scene_section(ui, session, &mut changes);
            ui.separator();
            Self::bloom_section(ui, &session.params, &mut changes);
            ui.separator();
            Self::material_section(ui, &session.tuning, &mut changes);
            ui.separator();
            Self::status_section(ui, session);
        });
        changes
    }

    fn fps_graph(&self, ui: &mut egui::Ui) {
        let points: PlotPoints =
            self.fps_history.iter().enumerate().map(|(i, fps)| [i as f64, *fps as f64]).collect();
        Plot::new("fps_graph")
            .height(48.0)
            .show_axes([false, true])
            .allow_drag(false)
            .allow_zoom(false)
            .allow_scroll(false)
            .show(ui, |plot| plot.line(Line::new("fps", points)));
        if let Some(fps) = self.fps_history.last() {
            ui.small(format!("{fps:.0} fps"));
        }
    }

    fn scene_section(ui: &mut egui::Ui, session: &SceneSession, changes: &mut Vec<ParameterChange>) {
        let params = &session.params;
        ui.heading("Scene");

        let mut env_intensity = params.env_map_intensity;
        if ui
            .add(egui::Slider::new(&mut env_intensity, ranges::ENV_MAP_INTENSITY).text("envMapIntensity"))
            .changed()
        {
            changes.push(ParameterChange::EnvMapIntensity(env_intensity));
        }

        let mut blur = params.background_blur;
        if ui.add(egui::Slider::new(&mut blur, ranges::BACKGROUND_BLUR).text("backgroundBlur")).changed() {
            changes.push(ParameterChange::BackgroundBlur(blur));
        }

        let mut bg_intensity = params.background_intensity;
        if ui
            .add(egui::Slider::new(&mut bg_intensity, ranges::BACKGROUND_INTENSITY).text("backgroundIntensity"))
            .changed()
        {
            changes.push(ParameterChange::BackgroundIntensity(bg_intensity));
        }

        let mut exposure = params.exposure;
        if ui.add(egui::Slider::new(&mut exposure, ranges::EXPOSURE).text("exposure")).changed() {
            changes.push(ParameterChange::Exposure(exposure));
        }

        let selected = session.active_environment().unwrap_or("none").to_string();
        egui::ComboBox::from_label("environment").selected_text(&selected).show_ui(ui, |ui| {
            for entry in session.catalog().entries() {
                if ui.selectable_label(entry.label == selected, &entry.label).clicked()
                    && entry.label != selected
                {
                    changes.push(ParameterChange::EnvironmentSelected(entry.label.clone()));
                }
            }
        });
    }

    fn bloom_section(ui: &mut egui::Ui, params: &SceneParameters, changes: &mut Vec<ParameterChange>) {
        ui.heading("Bloom");
        let mut enabled = params.bloom_enabled;
        if ui.checkbox(&mut enabled, "enabled").changed() {
            changes.push(ParameterChange::BloomEnabled(enabled));
        }
        ui.add_enabled_ui(params.bloom_enabled, |ui| {
            let mut threshold = params.bloom_threshold;
            if ui.add(egui::Slider::new(&mut threshold, ranges::BLOOM_THRESHOLD).text("threshold")).changed()
            {
                changes.push(ParameterChange::BloomThreshold(threshold));
            }
            let mut strength = params.bloom_strength;
            if ui.add(egui::Slider::new(&mut strength, ranges::BLOOM_STRENGTH).text("strength")).changed() {
                changes.push(ParameterChange::BloomStrength(strength));
            }
            let mut radius = params.bloom_radius;
            if ui.add(egui::Slider::new(&mut radius, ranges::BLOOM_RADIUS).text("radius")).changed() {
                changes.push(ParameterChange::BloomRadius(radius));
            }
        });
    }

    fn material_section(ui: &mut egui::Ui, tuning: &MaterialTuning, changes: &mut Vec<ParameterChange>) {
        ui.heading("Material Overrides");

        optional_slider(ui, "transmission", tuning.transmission, ranges::TRANSMISSION, 0.5, changes, |v| {
            ParameterChange::Transmission(v)
        });
        optional_slider(ui, "roughness", tuning.roughness, ranges::ROUGHNESS, 0.5, changes, |v| {
            ParameterChange::Roughness(v)
        });
        optional_slider(ui, "thickness", tuning.thickness, ranges::THICKNESS, 1.0, changes, |v| {
            ParameterChange::Thickness(v)
        });
        optional_slider(ui, "ior", tuning.ior, ranges::IOR, 1.5, changes, |v| ParameterChange::Ior(v));
        optional_slider(ui, "opacity", tuning.opacity, ranges::OPACITY, 1.0, changes, |v| {
            ParameterChange::Opacity(v)
        });

        let mut ds_enabled = tuning.double_sided.is_some();
        let mut ds_value = tuning.double_sided.unwrap_or(false);
        ui.horizontal(|ui| {
            if ui.checkbox(&mut ds_enabled, "").changed() {
                changes.push(ParameterChange::DoubleSided(if ds_enabled { Some(ds_value) } else { None }));
            }
            ui.add_enabled_ui(ds_enabled, |ui| {
                if ui.checkbox(&mut ds_value, "double sided").changed() {
                    changes.push(ParameterChange::DoubleSided(Some(ds_value)));
                }
            });
        });
    }

    fn status_section(ui: &mut egui::Ui, session: &SceneSession) {
        let slot_text = |state: SlotState| match state {
            SlotState::Idle => "idle",
            SlotState::Loading => "loading…",
            SlotState::Applied => "ready",
        };
        ui.small(format!(
            "model: {} · environment: {}",
            slot_text(session.model_slot().state()),
            slot_text(session.environment_slot().state()),
        ));
        ui.small("drop a .glb/.gltf model or a .hdr environment onto the window");
    }
}

impl Default for ParameterPanel {
    fn default() -> Self {
        Self::new()
    }
}

fn optional_slider(
    ui: &mut egui::Ui,
    label: &str,
    current: Option<f32>,
    range: std::ops::RangeInclusive<f32>,
    default_value: f32,
    changes: &mut Vec<ParameterChange>,
    make: impl Fn(Option<f32>) -> ParameterChange,
) {
    let mut enabled = current.is_some();
    let mut value = current.unwrap_or(default_value);
    ui.horizontal(|ui| {
        if ui.checkbox(&mut enabled, "").changed() {
            changes.push(make(if enabled { Some(value) } else { None }));
        }
        ui.add_enabled_ui(enabled, |ui| {
            if ui.add(egui::Slider::new(&mut value, range).text(label)).changed() {
                changes.push(make(Some(value)));
            }
        });
    });
}
