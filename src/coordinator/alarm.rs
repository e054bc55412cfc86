use crate::rates::plan::local_hour_start;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

/// First instant after the next local top of the hour, plus one second
pub fn next_top_of_hour(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    local_hour_start(now, tz) + Duration::hours(1) + Duration::seconds(1)
}

/// Single pending top-of-hour deadline
///
/// Arming always replaces the previous deadline, so at most one alarm is
/// ever outstanding. A live deadline is only advanced by [`arm`](Self::arm)
/// when it fires.
#[derive(Debug, Default, Clone)]
pub struct HourlyAlarm {
    next_deadline: Option<DateTime<Utc>>,
}

impl HourlyAlarm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule the next alarm relative to `now`
    pub fn arm(&mut self, now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        let deadline = next_top_of_hour(now, tz);
        self.next_deadline = Some(deadline);
        deadline
    }

    /// Arm only when nothing is pending or the pending deadline has passed
    pub fn arm_if_idle(&mut self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        match self.next_deadline {
            Some(deadline) if deadline > now => None,
            _ => Some(self.arm(now, tz)),
        }
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.next_deadline
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_deadline.is_some_and(|d| now >= d)
    }

    /// Time left until the deadline, zero when already due
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        self.next_deadline
            .map(|d| (d - now).to_std().unwrap_or(std::time::Duration::ZERO))
    }

    pub fn disarm(&mut self) {
        self.next_deadline = None;
    }
}
