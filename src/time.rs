use std::time::{Duration, Instant};

/// Upper bound on a single frame delta; a stall (window drag, debugger
/// pause) must not fast-forward the animation mixer.
const MAX_FRAME_DELTA: f32 = 0.25;

pub struct FrameClock {
    start: Instant,
    last: Instant,
    pub delta: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self { start: now, last: now, delta: Duration::ZERO }
    }

    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last;
        self.last = now;
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32().min(MAX_FRAME_DELTA)
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.last.duration_since(self.start).as_secs_f32()
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
