// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! One monotonic duration type, one wall-clock timestamp type. Every
//! other part of the core converts to/from these at its boundary rather
//! than juggling `Duration`, `SystemTime`, and raw integers.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// A monotonic duration expressed as whole seconds plus microseconds,
/// mirroring `struct timeval` without any of its platform baggage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimePair {
    seconds: i64,
    micros: i64,
}

impl TimePair {
    /// Builds a pair from whole seconds and sub-second microseconds.
    pub fn new(seconds: i64, micros: i64) -> Self {
        Self { seconds, micros }
    }

    /// Builds a pair from a whole number of seconds.
    pub fn from_secs(seconds: i64) -> Self {
        Self::new(seconds, 0)
    }

    /// Seconds component.
    pub fn seconds(self) -> i64 {
        self.seconds
    }

    /// Sub-second microseconds component.
    pub fn micros(self) -> i64 {
        self.micros
    }

    /// Total duration as a floating-point number of seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.seconds as f64 + self.micros as f64 / 1_000_000.0
    }
}

impl From<Duration> for TimePair {
    fn from(d: Duration) -> Self {
        Self::new(d.as_secs() as i64, d.subsec_micros() as i64)
    }
}

impl From<TimePair> for Duration {
    fn from(t: TimePair) -> Self {
        Duration::new(t.seconds.max(0) as u64, (t.micros.max(0) as u32) * 1000)
    }
}

/// A wall-clock timestamp in UTC, stored with microsecond precision to
/// match `UserProfile::modified`'s monotonicity requirement.
pub type WallClock = DateTime<Utc>;

/// The current wall-clock time.
pub fn now() -> WallClock {
    Utc::now()
}

/// Humanizes a [`TimePair`] the way a dupe-message "file age" line does:
/// the single largest applicable unit, e.g. `"3 days"`, `"14 hours"`,
/// `"42 seconds"`.
pub fn format_duration(d: TimePair) -> String {
    let secs = d.seconds().max(0);
    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;

    let (value, unit) = if secs >= DAY {
        (secs / DAY, "day")
    } else if secs >= HOUR {
        (secs / HOUR, "hour")
    } else if secs >= MINUTE {
        (secs / MINUTE, "minute")
    } else {
        (secs, "second")
    };

    if value == 1 {
        format!("{value} {unit}")
    } else {
        format!("{value} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_round_trips_through_std() {
        let d = Duration::new(5, 250_000);
        let t: TimePair = d.into();
        assert_eq!(t.seconds(), 5);
        assert_eq!(t.micros(), 250);
        let back: Duration = t.into();
        assert_eq!(back.as_secs(), 5);
    }

    #[test]
    fn format_duration_picks_largest_unit() {
        assert_eq!(format_duration(TimePair::from_secs(45)), "45 seconds");
        assert_eq!(format_duration(TimePair::from_secs(90)), "1 minute");
        assert_eq!(format_duration(TimePair::from_secs(3 * 3600)), "3 hours");
        assert_eq!(format_duration(TimePair::from_secs(2 * 86400)), "2 days");
    }
}
