//! Wall-clock source for session timestamps.

use chrono::{DateTime, Utc};

use crate::infrastructure::ports::ClockPort;

/// Real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock that moves forward by `step` on every read, so successive
/// snapshots get distinct `updated_at` values.
#[cfg(test)]
pub struct SteppingClock {
    next: std::sync::Mutex<DateTime<Utc>>,
    step: chrono::Duration,
}

#[cfg(test)]
impl SteppingClock {
    pub fn starting_at(start: DateTime<Utc>, step: chrono::Duration) -> Self {
        Self {
            next: std::sync::Mutex::new(start),
            step,
        }
    }
}

#[cfg(test)]
impl ClockPort for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut next = self.next.lock().unwrap();
        let now = *next;
        *next = now + self.step;
        now
    }
}
