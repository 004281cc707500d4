//! Time helpers shared by every service.
//!
//! Store-facing timestamps use wall-clock milliseconds (`chrono`); the
//! auto-block manager additionally needs a monotonic clock so that NTP
//! adjustments can never make a penalty window run backwards.

use std::time::Instant;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Clamp `supplied` (milliseconds) to `min(supplied, now)`, per spec §4.1's
/// `creationDate`/`responseDate` rule: "must be ≤ now at creation time;
/// stored monotonically clamped".
pub fn clamp_to_now(supplied: i64) -> i64 {
    supplied.min(now_millis())
}

/// Monotonic nanosecond clock used only by the auto-block manager (spec
/// §4.4: "all time comparisons use a monotonic nanosecond clock").
#[derive(Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl MonotonicClock {
    pub fn now_nanos(&self) -> i64 {
        self.epoch.elapsed().as_nanos() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_does_not_exceed_now() {
        let future = now_millis() + 1_000_000;
        assert!(clamp_to_now(future) <= now_millis());
    }

    #[test]
    fn clamp_preserves_past() {
        let past = now_millis() - 1_000_000;
        assert_eq!(clamp_to_now(past), past);
    }

    #[test]
    fn monotonic_clock_advances() {
        let clock = MonotonicClock::default();
        let a = clock.now_nanos();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = clock.now_nanos();
        assert!(b > a);
    }
}
