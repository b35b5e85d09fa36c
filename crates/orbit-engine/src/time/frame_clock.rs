use std::time::{Duration, Instant};

/// Timing of one tick.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Seconds since the previous tick, clamped.
    pub dt: f32,
    pub now: Instant,
    pub frame_index: u64,
}

/// Produces clamped frame deltas for the render loop.
///
/// The lower clamp keeps `dt` positive so the simulation always advances; the
/// upper clamp stops a stall (debugger, minimized window) from turning into one
/// huge integration step.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    pub const DEFAULT_MIN: Duration = Duration::from_micros(100);
    pub const DEFAULT_MAX: Duration = Duration::from_millis(100);

    pub fn new() -> Self {
        Self::with_clamps(Self::DEFAULT_MIN, Self::DEFAULT_MAX)
    }

    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: Instant::now(),
            frame_index: 0,
            dt_min,
            dt_max,
        }
    }

    /// Restarts the delta baseline, e.g. after the window was hidden.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    /// Like [`FrameClock::tick`] with an explicit timestamp.
    pub fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);
        self.last = now;

        let ft = FrameTime {
            dt: dt.as_secs_f32(),
            now,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_are_clamped_and_frames_counted() {
        let start = Instant::now();
        let mut clock = FrameClock::new();
        clock.last = start;

        let a = clock.tick_at(start);
        assert_eq!(a.frame_index, 0);
        assert!((a.dt - 1e-4).abs() < 1e-9);

        let b = clock.tick_at(start + Duration::from_secs(5));
        assert_eq!(b.frame_index, 1);
        assert!((b.dt - 0.1).abs() < 1e-6);

        let c = clock.tick_at(start + Duration::from_secs(5) + Duration::from_millis(16));
        assert!((c.dt - 0.016).abs() < 1e-6);
    }
}
