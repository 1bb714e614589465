// timefn - portable monotonic timer abstraction.
//
// Rust's std::time::Instant is monotonic and MT-safe on all supported
// platforms, replacing the platform-specific clock sources the C tool
// selects between at compile time.

use std::time::Instant;

/// Nanosecond duration type.
pub type DurationNs = u64;

/// Opaque timestamp container. The absolute value is not meaningful;
/// use it only to compute a duration between two measurements.
#[derive(Clone, Copy)]
pub struct TimeT {
    t: Instant,
}

impl TimeT {
    pub fn new() -> Self {
        TimeT { t: Instant::now() }
    }
}

impl Default for TimeT {
    fn default() -> Self {
        TimeT::new()
    }
}

/// Returns the current monotonic timestamp.
pub fn get_time() -> TimeT {
    TimeT::new()
}

/// Returns the nanosecond duration between `clock_start` and `clock_end`.
pub fn span_ns(clock_start: TimeT, clock_end: TimeT) -> DurationNs {
    clock_end.t.duration_since(clock_start.t).as_nanos() as DurationNs
}

/// Measures nanoseconds elapsed since `clock_start`.
pub fn clock_span_ns(clock_start: TimeT) -> DurationNs {
    clock_start.t.elapsed().as_nanos() as DurationNs
}

/// Measures microseconds elapsed since `clock_start`.
pub fn clock_span_micro(clock_start: TimeT) -> u64 {
    clock_start.t.elapsed().as_micros() as u64
}
