use glam::Vec2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

const ORBIT_RADIANS_PER_PIXEL: f32 = 0.005;
const ZOOM_STEP: f32 = 0.9;

/// Pointer state for the orbit camera: left-drag accumulates orbit
/// deltas, the wheel accumulates a zoom factor. The app drains both
/// once per frame.
#[derive(Debug, Default)]
pub struct PointerInput {
    dragging: bool,
    last_position: Option<Vec2>,
    pending_orbit: Vec2,
    pending_zoom: f32,
}

impl PointerInput {
    pub fn new() -> Self {
        Self { pending_zoom: 1.0, ..Default::default() }
    }

    /// Feed one window event. `pointer_captured` mutes drags that the
    /// GUI layer already claimed.
    pub fn handle_window_event(&mut self, event: &WindowEvent, pointer_captured: bool) {
        match event {
            WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => {
                self.dragging = *state == ElementState::Pressed && !pointer_captured;
                if !self.dragging {
                    self.last_position = None;
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let position = Vec2::new(position.x as f32, position.y as f32);
                if self.dragging {
                    if let Some(last) = self.last_position {
                        let delta = position - last;
                        self.pending_orbit += Vec2::new(
                            -delta.x * ORBIT_RADIANS_PER_PIXEL,
                            -delta.y * ORBIT_RADIANS_PER_PIXEL,
                        );
                    }
                }
                self.last_position = Some(position);
            }
            WindowEvent::MouseWheel { delta, .. } if !pointer_captured => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 40.0,
                };
                self.pending_zoom *= ZOOM_STEP.powf(lines);
            }
            WindowEvent::CursorLeft { .. } => {
                self.dragging = false;
                self.last_position = None;
            }
            _ => {}
        }
    }

    pub fn take_orbit_delta(&mut self) -> Vec2 {
        std::mem::take(&mut self.pending_orbit)
    }

    pub fn take_zoom_factor(&mut self) -> f32 {
        std::mem::replace(&mut self.pending_zoom, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalPosition;

    fn cursor(x: f64, y: f64) -> WindowEvent {
        WindowEvent::CursorMoved {
            device_id: winit::event::DeviceId::dummy(),
            position: PhysicalPosition::new(x, y),
        }
    }

    fn press() -> WindowEvent {
        WindowEvent::MouseInput {
            device_id: winit::event::DeviceId::dummy(),
            state: ElementState::Pressed,
            button: MouseButton::Left,
        }
    }

    #[test]
    fn drag_accumulates_and_drains() {
        let mut input = PointerInput::new();
        input.handle_window_event(&cursor(10.0, 10.0), false);
        input.handle_window_event(&press(), false);
        input.handle_window_event(&cursor(30.0, 10.0), false);
        let delta = input.take_orbit_delta();
        assert!(delta.x < 0.0, "dragging right orbits left");
        assert_eq!(input.take_orbit_delta(), Vec2::ZERO, "drained");
    }

    #[test]
    fn captured_pointer_ignores_drag_start() {
        let mut input = PointerInput::new();
        input.handle_window_event(&cursor(10.0, 10.0), false);
        input.handle_window_event(&press(), true);
        input.handle_window_event(&cursor(40.0, 40.0), false);
        assert_eq!(input.take_orbit_delta(), Vec2::ZERO);
    }

    #[test]
    fn wheel_zoom_compounds() {
        let mut input = PointerInput::new();
        input.handle_window_event(
            &WindowEvent::MouseWheel {
                device_id: winit::event::DeviceId::dummy(),
                delta: MouseScrollDelta::LineDelta(0.0, 2.0),
                phase: winit::event::TouchPhase::Moved,
            },
            false,
        );
        let factor = input.take_zoom_factor();
        assert!((factor - ZOOM_STEP * ZOOM_STEP).abs() < 1e-5);
        assert_eq!(input.take_zoom_factor(), 1.0);
    }
}
