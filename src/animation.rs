use glam::{Mat4, Quat, Vec3};
use gltf::animation::util::ReadOutputs;
use gltf::animation::{Interpolation, Property};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackInterpolation {
    Step,
    Linear,
}

#[derive(Clone, Debug)]
pub struct Track<T> {
    pub interpolation: TrackInterpolation,
    pub times: Vec<f32>,
    pub values: Vec<T>,
}

impl<T: Copy> Track<T> {
    fn segment(&self, time: f32) -> (usize, usize, f32) {
        debug_assert!(!self.times.is_empty());
        if time <= self.times[0] {
            return (0, 0, 0.0);
        }
        let last = self.times.len() - 1;
        if time >= self.times[last] {
            return (last, last, 0.0);
        }
        let next = self.times.partition_point(|&t| t <= time);
        let prev = next - 1;
        let span = self.times[next] - self.times[prev];
        let t = if span > 0.0 { (time - self.times[prev]) / span } else { 0.0 };
        (prev, next, t)
    }

    fn duration(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.0)
    }
}

impl Track<Vec3> {
    pub fn sample(&self, time: f32) -> Vec3 {
        let (prev, next, t) = self.segment(time);
        match self.interpolation {
            TrackInterpolation::Step => self.values[prev],
            TrackInterpolation::Linear => self.values[prev].lerp(self.values[next], t),
        }
    }
}

impl Track<Quat> {
    pub fn sample(&self, time: f32) -> Quat {
        let (prev, next, t) = self.segment(time);
        match self.interpolation {
            TrackInterpolation::Step => self.values[prev],
            TrackInterpolation::Linear => self.values[prev].slerp(self.values[next], t),
        }
    }
}

/// Animated TRS curves for one node of the model hierarchy.
#[derive(Clone, Debug, Default)]
pub struct NodeChannel {
    pub node: usize,
    pub translation: Option<Track<Vec3>>,
    pub rotation: Option<Track<Quat>>,
    pub scale: Option<Track<Vec3>>,
}

#[derive(Clone, Debug)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub channels: Vec<NodeChannel>,
}

impl AnimationClip {
    /// Local matrices at `time`, starting from the rest pose and
    /// overriding whichever TRS components the clip animates.
    pub fn sample_locals(&self, rest: &[crate::mesh::ModelNode], time: f32) -> Vec<Mat4> {
        let mut locals: Vec<(Vec3, Quat, Vec3)> =
            rest.iter().map(|n| (n.translation, n.rotation, n.scale)).collect();
        for channel in &self.channels {
            let Some(slot) = locals.get_mut(channel.node) else { continue };
            if let Some(track) = channel.translation.as_ref() {
                slot.0 = track.sample(time);
            }
            if let Some(track) = channel.rotation.as_ref() {
                slot.1 = track.sample(time);
            }
            if let Some(track) = channel.scale.as_ref() {
                slot.2 = track.sample(time);
            }
        }
        locals
            .into_iter()
            .map(|(t, r, s)| Mat4::from_scale_rotation_translation(s, r, t))
            .collect()
    }
}

/// Looping playhead over one clip; advanced once per frame with the
/// frame delta, never self-scheduled.
#[derive(Clone, Debug)]
pub struct AnimationMixer {
    pub clip: usize,
    pub time: f32,
}

impl AnimationMixer {
    pub fn new(clip: usize) -> Self {
        Self { clip, time: 0.0 }
    }

    pub fn advance(&mut self, dt: f32, duration: f32) {
        self.time += dt;
        if duration > 0.0 {
            self.time %= duration;
        } else {
            self.time = 0.0;
        }
    }
}

pub fn import_clips(document: &gltf::Document, buffers: &[gltf::buffer::Data]) -> Vec<AnimationClip> {
    let mut clips = Vec::new();
    for (clip_index, animation) in document.animations().enumerate() {
        let mut channels: Vec<NodeChannel> = Vec::new();
        let mut duration: f32 = 0.0;
        for channel in animation.channels() {
            let node = channel.target().node().index();
            let reader = channel.reader(|buffer| Some(&buffers[buffer.index()]));
            let Some(inputs) = reader.read_inputs() else { continue };
            let times: Vec<f32> = inputs.collect();
            if times.is_empty() {
                continue;
            }
            let Some(outputs) = reader.read_outputs() else { continue };
            let sampler_interpolation = channel.sampler().interpolation();
            let interpolation = match sampler_interpolation {
                Interpolation::Step => TrackInterpolation::Step,
                // Cubic tangents are dropped; the control points are
                // played back linearly.
                Interpolation::Linear | Interpolation::CubicSpline => TrackInterpolation::Linear,
            };
            let cubic = sampler_interpolation == Interpolation::CubicSpline;

            let slot = match channels.iter().position(|c| c.node == node) {
                Some(existing) => existing,
                None => {
                    channels.push(NodeChannel { node, ..Default::default() });
                    channels.len() - 1
                }
            };

            match (channel.target().property(), outputs) {
                (Property::Translation, ReadOutputs::Translations(values)) => {
                    let values = select_keyframe_values(values.map(Vec3::from_array), cubic);
                    if values.len() == times.len() {
                        channels[slot].translation =
                            Some(Track { interpolation, times: times.clone(), values });
                    }
                }
                (Property::Rotation, ReadOutputs::Rotations(values)) => {
                    let values = select_keyframe_values(
                        values.into_f32().map(Quat::from_array),
                        cubic,
                    );
                    if values.len() == times.len() {
                        channels[slot].rotation =
                            Some(Track { interpolation, times: times.clone(), values });
                    }
                }
                (Property::Scale, ReadOutputs::Scales(values)) => {
                    let values = select_keyframe_values(values.map(Vec3::from_array), cubic);
                    if values.len() == times.len() {
                        channels[slot].scale =
                            Some(Track { interpolation, times: times.clone(), values });
                    }
                }
                // Morph targets are not imported.
                _ => continue,
            }
            duration = duration.max(times.last().copied().unwrap_or(0.0));
        }
        if channels.is_empty() {
            continue;
        }
        let name =
            animation.name().map(|s| s.to_string()).unwrap_or_else(|| format!("clip_{clip_index}"));
        clips.push(AnimationClip { name, duration, channels });
    }
    clips
}

/// Cubic-spline samplers store in-tangent / value / out-tangent triples;
/// keep the value element only.
fn select_keyframe_values<T>(values: impl Iterator<Item = T>, cubic: bool) -> Vec<T> {
    if cubic {
        values
            .enumerate()
            .filter_map(|(i, value)| if i % 3 == 1 { Some(value) } else { None })
            .collect()
    } else {
        values.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(times: &[f32], values: &[Vec3], interpolation: TrackInterpolation) -> Track<Vec3> {
        Track { interpolation, times: times.to_vec(), values: values.to_vec() }
    }

    #[test]
    fn linear_track_interpolates_between_keys() {
        let t = track(
            &[0.0, 1.0, 2.0],
            &[Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0), Vec3::new(2.0, 4.0, 0.0)],
            TrackInterpolation::Linear,
        );
        assert_eq!(t.sample(0.5), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(t.sample(1.5), Vec3::new(2.0, 2.0, 0.0));
    }

    #[test]
    fn sampling_clamps_to_track_ends() {
        let t = track(&[1.0, 2.0], &[Vec3::ONE, Vec3::splat(3.0)], TrackInterpolation::Linear);
        assert_eq!(t.sample(-5.0), Vec3::ONE);
        assert_eq!(t.sample(10.0), Vec3::splat(3.0));
    }

    #[test]
    fn step_track_holds_previous_key() {
        let t = track(&[0.0, 1.0], &[Vec3::ZERO, Vec3::ONE], TrackInterpolation::Step);
        assert_eq!(t.sample(0.99), Vec3::ZERO);
        assert_eq!(t.sample(1.0), Vec3::ONE);
    }

    #[test]
    fn mixer_wraps_at_clip_duration() {
        let mut mixer = AnimationMixer::new(0);
        mixer.advance(1.25, 1.0);
        assert!((mixer.time - 0.25).abs() < 1e-6);
        mixer.advance(0.5, 0.0);
        assert_eq!(mixer.time, 0.0);
    }
}
