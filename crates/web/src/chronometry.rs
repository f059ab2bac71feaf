//! Handler duration sampling.

use std::time::{Duration, Instant};

/// Number of samples kept per route.
pub const TIMESLOTS: usize = 100;

/// A ring buffer of the last [`TIMESLOTS`] handler durations, in nanoseconds.
///
/// The average is only reported once the write index has wrapped back to the first
/// slot after a full pass, so the first report needs `TIMESLOTS + 1` samples.
#[derive(Debug, Clone)]
pub struct Chronometry {
    slots: [u64; TIMESLOTS],
    writes: u64,
    ready: bool,
}

impl Chronometry {
    pub fn new() -> Self {
        Self { slots: [0; TIMESLOTS], writes: 0, ready: false }
    }

    pub fn record(&mut self, duration: Duration) {
        // TIMESLOTS fits in a u64 and the remainder fits in a usize
        let index = (self.writes % TIMESLOTS as u64) as usize;
        self.slots[index] = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.writes += 1;

        if self.writes > 1 && index == 0 {
            self.ready = true;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Average of the sampled durations, `None` until enough samples were taken.
    pub fn average(&self) -> Option<Duration> {
        if !self.is_ready() {
            return None;
        }

        let total: u128 = self.slots.iter().map(|&nanos| u128::from(nanos)).sum();
        let average = total / TIMESLOTS as u128;
        Some(Duration::from_nanos(u64::try_from(average).unwrap_or(u64::MAX)))
    }
}

impl Default for Chronometry {
    fn default() -> Self {
        Self::new()
    }
}

/// Measures one handler invocation.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self { started: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
