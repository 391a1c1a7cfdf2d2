use std::time::{Duration, Instant};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameTime {
    /// Seconds since the previous tick, clamped.
    pub dt: f32,
    /// Seconds since the clock started, advanced by the clamped `dt`.
    pub elapsed: f32,
}

impl FrameTime {
    /// Fixed-step time, for driving apps without a wall clock.
    pub fn fixed(frame: u64, dt: f32) -> Self {
        Self {
            dt,
            elapsed: frame as f32 * dt,
        }
    }
}

/// Produces one `FrameTime` per rendered frame.
///
/// Delta time is clamped so a stall (debugger, minimized window) does not
/// turn into one huge animation step.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    elapsed: f32,
    max_dt: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_max_dt(Duration::from_millis(250))
    }

    pub fn with_max_dt(max_dt: Duration) -> Self {
        Self {
            last: Instant::now(),
            elapsed: 0.0,
            max_dt,
        }
    }

    pub fn tick(&mut self) -> FrameTime {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last).min(self.max_dt).as_secs_f32();
        self.last = now;
        self.elapsed += dt;
        FrameTime {
            dt,
            elapsed: self.elapsed,
        }
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
    fn dt_is_clamped() {
        let mut clock = FrameClock::with_max_dt(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        let t = clock.tick();
        assert_eq!(t.dt, 0.0);
        assert_eq!(t.elapsed, 0.0);
    }

    #[test]
    fn elapsed_accumulates() {
        let mut clock = FrameClock::new();
        let a = clock.tick();
        let b = clock.tick();
        assert!(b.elapsed >= a.elapsed);
    }

    #[test]
    fn fixed_time_scales_with_frame() {
        assert_eq!(FrameTime::fixed(3, 0.5).elapsed, 1.5);
    }
}
