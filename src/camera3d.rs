use crate::config::CameraConfig;
use glam::{Mat4, Quat, Vec2, Vec3};
use winit::dpi::PhysicalSize;

const DEFAULT_UP: Vec3 = Vec3::Y;
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Perspective camera driven by the orbit controller.
#[derive(Debug, Clone)]
pub struct Camera3D {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera3D {
    pub fn new(position: Vec3, target: Vec3, fov_y_radians: f32, near: f32, far: f32) -> Self {
        Self { position, target, up: DEFAULT_UP, fov_y_radians, aspect: 1.0, near, far }
    }

    pub fn set_viewport(&mut self, viewport: PhysicalSize<u32>) {
        if viewport.height > 0 {
            self.aspect = viewport.width as f32 / viewport.height as f32;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, self.aspect.max(0.0001), self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

/// Damped orbit controller: pointer input moves goal yaw/pitch/radius,
/// `update` eases the visible values toward them each frame.
#[derive(Debug, Clone)]
pub struct OrbitController {
    pub target: Vec3,
    yaw: f32,
    pitch: f32,
    radius: f32,
    goal_yaw: f32,
    goal_pitch: f32,
    goal_radius: f32,
    min_radius: f32,
    max_radius: f32,
    damping: f32,
}

impl OrbitController {
    pub fn from_config(config: &CameraConfig) -> Self {
        let radius = config.distance.clamp(config.min_distance, config.max_distance);
        Self {
            target: Vec3::new(0.0, config.target_height, 0.0),
            yaw: 0.0,
            pitch: 0.0,
            radius,
            goal_yaw: 0.0,
            goal_pitch: 0.0,
            goal_radius: radius,
            min_radius: config.min_distance,
            max_radius: config.max_distance,
            damping: config.damping.max(0.0),
        }
    }

    pub fn orbit(&mut self, delta: Vec2) {
        self.goal_yaw += delta.x;
        self.goal_pitch = (self.goal_pitch + delta.y).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    pub fn zoom(&mut self, factor: f32) {
        self.goal_radius = (self.goal_radius * factor).clamp(self.min_radius, self.max_radius);
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Ease toward the goal values. With zero damping the controller
    /// snaps, matching an undamped orbit.
    pub fn update(&mut self, dt: f32) {
        let t = if self.damping <= 0.0 { 1.0 } else { (self.damping * dt).clamp(0.0, 1.0) };
        self.yaw += (self.goal_yaw - self.yaw) * t;
        self.pitch += (self.goal_pitch - self.pitch) * t;
        self.radius += (self.goal_radius - self.radius) * t;
    }

    pub fn write_to(&self, camera: &mut Camera3D) {
        let rotation = Quat::from_euler(glam::EulerRot::YXZ, self.yaw, self.pitch, 0.0);
        camera.position = self.target + rotation * Vec3::new(0.0, 0.0, self.radius);
        camera.target = self.target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CameraConfig {
        CameraConfig::default()
    }

    #[test]
    fn aspect_follows_viewport() {
        let mut camera = Camera3D::new(Vec3::new(0.0, 0.0, 3.5), Vec3::ZERO, 0.6, 0.1, 200.0);
        camera.set_viewport(PhysicalSize::new(800, 600));
        assert!((camera.aspect - 800.0 / 600.0).abs() < 1e-6);
        // Degenerate sizes leave the last aspect in place.
        camera.set_viewport(PhysicalSize::new(800, 0));
        assert!((camera.aspect - 800.0 / 600.0).abs() < 1e-6);
        let vp = camera.view_projection();
        assert!(!vp.to_cols_array().iter().any(|v| v.is_nan() || v.is_infinite()));
    }

    #[test]
    fn zoom_respects_distance_shell() {
        let mut orbit = OrbitController::from_config(&test_config());
        orbit.zoom(100.0);
        orbit.update(10.0);
        assert!(orbit.radius() <= test_config().max_distance + 1e-5);
        orbit.zoom(0.0001);
        orbit.update(10.0);
        assert!(orbit.radius() >= test_config().min_distance - 1e-5);
    }

    #[test]
    fn damping_converges_to_goal() {
        let mut orbit = OrbitController::from_config(&test_config());
        orbit.orbit(Vec2::new(1.0, 0.4));
        for _ in 0..240 {
            orbit.update(1.0 / 60.0);
        }
        let mut camera = Camera3D::new(Vec3::ZERO, Vec3::ZERO, 0.6, 0.1, 200.0);
        orbit.write_to(&mut camera);
        let offset = camera.position - orbit.target;
        assert!((offset.length() - orbit.radius()).abs() < 1e-3);
        assert!(offset.length() > 1.0);
    }
}
