use std::time::{Duration, Instant};

/// Frame clock driven by the render thread.
///
/// Tracks wall-clock frame deltas for diagnostics and an accumulated
/// *unpaused* time in whole milliseconds. The millisecond integer accumulator
/// keeps long sessions from losing precision the way a float sum would.
pub struct FrameClock {
    last_tick: Option<Instant>,
    /// Wall-clock time since the previous tick.
    pub wall_delta: Duration,
    /// Host-reported simulation delta of the current frame, in seconds.
    pub delta_seconds: f32,
    /// Whether the host reported the game as paused this frame.
    pub paused: bool,
    unpaused_millis: u64,
    /// Total number of ticks.
    pub frame_count: u64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_tick: None,
            wall_delta: Duration::ZERO,
            delta_seconds: 0.0,
            paused: false,
            unpaused_millis: 0,
            frame_count: 0,
        }
    }

    /// Advances the clock by the host-reported frame delta.
    ///
    /// Paused frames still count as frames but add nothing to the unpaused
    /// accumulator.
    pub fn tick(&mut self, delta_seconds: f32, paused: bool) {
        let now = Instant::now();
        self.wall_delta = self.last_tick.map_or(Duration::ZERO, |last| now - last);
        self.last_tick = Some(now);
        self.delta_seconds = delta_seconds.max(0.0);
        self.paused = paused;
        if !paused {
            self.unpaused_millis += (f64::from(self.delta_seconds) * 1000.0) as u64;
        }
        self.frame_count += 1;
    }

    /// Accumulated unpaused time in seconds.
    #[must_use]
    pub fn unpaused_seconds(&self) -> f32 {
        self.unpaused_millis as f32 / 1000.0
    }

    #[must_use]
    pub fn unpaused_millis(&self) -> u64 {
        self.unpaused_millis
    }
}
