use std::{cell::Cell, rc::Rc, time::Instant};

/// Monotonic clock read by the frame clock and the sprite players.
/// Timestamps are milliseconds on an arbitrary but fixed origin.
pub trait TimeSource {
    fn now_ms(&self) -> f64;
}

/// Wall-clock time backed by [`Instant`]; the origin is the moment of creation.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTimeSource {
    origin: Instant,
}

impl MonotonicTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTimeSource {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-driven time. Clones share the same reading, so a test can keep one
/// handle and give another to the components under test.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now: Rc<Cell<f64>>,
}

impl ManualTimeSource {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn set(&self, now_ms: f64) {
        self.now.set(now_ms);
    }

    /// Moves time forward. Negative steps are ignored so readings stay monotonic.
    pub fn advance(&self, delta_ms: f64) {
        self.now.set(self.now.get() + delta_ms.max(0.0));
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clones_share_one_reading() {
        let time = ManualTimeSource::new(10.0);
        let view = time.clone();

        time.advance(5.0);
        time.advance(-100.0);
        assert_eq!(view.now_ms(), 15.0);

        time.set(2.5);
        assert_eq!(view.now_ms(), 2.5);
    }

    #[test]
    fn monotonic_source_never_goes_backwards() {
        let time = MonotonicTimeSource::new();
        let first = time.now_ms();
        let second = time.now_ms();
        assert!(second >= first);
    }
}
