//! Monotonic microsecond timestamp source for update-log events.
//!
//! spec.md §4.7 requires ts(i+1) > ts(i) for any two appends even if the
//! wall clock goes backwards between them; `next()` enforces that with a
//! single `AtomicU64` holding "last timestamp handed out".

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Generator of strictly increasing microsecond timestamps.
///
/// One instance is shared by the whole process (the update log is a
/// process-wide singleton per spec.md §9), so every append — regardless of
/// which worker produced it — draws from the same counter.
pub struct MonotonicClock {
    last: AtomicU64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { last: AtomicU64::new(0) }
    }

    /// Returns the next timestamp, guaranteed strictly greater than every
    /// value previously returned by this clock.
    pub fn next(&self) -> u64 {
        let wall = wall_clock_micros();
        let mut prev = self.last.load(Ordering::Acquire);
        loop {
            let candidate = if wall > prev { wall } else { prev + 1 };
            match self.last.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return candidate,
                Err(observed) => prev = observed,
            }
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

fn wall_clock_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// Human-readable UTC rendering of a microsecond-since-epoch timestamp, used
/// by the `stat` handler's textual status block.
pub fn format_timestamp_micros(ts_micros: u64) -> String {
    let secs = (ts_micros / 1_000_000) as i64;
    let micros = (ts_micros % 1_000_000) as u32;
    match chrono::DateTime::from_timestamp(secs, micros * 1_000) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.6f UTC").to_string(),
        None => format!("{ts_micros}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_increasing() {
        let clock = MonotonicClock::new();
        let mut prev = clock.next();
        for _ in 0..1000 {
            let next = clock.next();
            assert!(next > prev);
            prev = next;
        }
    }
}
