/// Timed-task primitives shared by the typewriter and faders.
use std::time::Duration;

/// Progress of a cancellable timed task after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Nothing is scheduled.
    Idle,
    /// Still running; more ticks are needed.
    Running,
    /// Finished during this call. Reported once, then the task is `Idle`.
    Complete,
}

/// A linear interpolation from `from` to `to` over `duration`.
///
/// The interpolation parameter is clamped to `[0, 1]`, so a large tick
/// never overshoots the target.
#[derive(Debug, Clone, PartialEq)]
pub struct Ramp {
    from: f32,
    to: f32,
    duration: Duration,
    elapsed: Duration,
}

impl Ramp {
    pub fn new(from: f32, to: f32, duration: Duration) -> Self {
        Self {
            from,
            to,
            duration,
            elapsed: Duration::ZERO,
        }
    }

    /// Advance by `dt` and return the new value.
    pub fn advance(&mut self, dt: Duration) -> f32 {
        self.elapsed = self.elapsed.saturating_add(dt).min(self.duration);
        self.value()
    }

    pub fn value(&self) -> f32 {
        self.from + (self.to - self.from) * self.progress()
    }

    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration
    }
}

/// Counts down an initial delay, handing back whatever part of a tick
/// spills past the end of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delay {
    remaining: Duration,
}

impl Delay {
    pub fn new(delay: Duration) -> Self {
        Self { remaining: delay }
    }

    /// Consume `dt`; returns the leftover once the delay has elapsed.
    pub fn consume(&mut self, dt: Duration) -> Option<Duration> {
        if self.remaining.is_zero() {
            return Some(dt);
        }
        if dt >= self.remaining {
            let spill = dt - self.remaining;
            self.remaining = Duration::ZERO;
            Some(spill)
        } else {
            self.remaining -= dt;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn ramp_interpolates_linearly() {
        let mut ramp = Ramp::new(0.0, 1.0, ms(1000));
        assert!((ramp.advance(ms(250)) - 0.25).abs() < 1e-4);
        assert!((ramp.advance(ms(250)) - 0.5).abs() < 1e-4);
        assert!(!ramp.is_finished());
    }

    #[test]
    fn ramp_clamps_on_overshoot() {
        let mut ramp = Ramp::new(1.0, 0.0, ms(100));
        assert_eq!(ramp.advance(ms(5000)), 0.0);
        assert!(ramp.is_finished());
        assert_eq!(ramp.progress(), 1.0);
    }

    #[test]
    fn zero_duration_ramp_is_immediately_at_target() {
        let ramp = Ramp::new(0.2, 0.8, Duration::ZERO);
        assert_eq!(ramp.value(), 0.8);
        assert!(ramp.is_finished());
    }

    #[test]
    fn delay_spills_remainder() {
        let mut delay = Delay::new(ms(500));
        assert_eq!(delay.consume(ms(300)), None);
        assert_eq!(delay.consume(ms(300)), Some(ms(100)));
        assert_eq!(delay.consume(ms(40)), Some(ms(40)));
    }
}
