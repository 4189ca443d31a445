// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Per-connection speed governor (spec.md §4.3 step 9): sleeps to keep
//! the running average under a cap, and raises [`Error::AbortedTransfer`]
//! via [`crate::error::Flow::MinimumSpeed`] when the instantaneous rate
//! stalls below a floor for longer than a grace window.

use std::time::{Duration, Instant};

use crate::error::Flow;

/// Tracks bytes transferred since the transfer started and enforces a
/// speed cap plus a stall floor.
pub struct SpeedGovernor {
    start: Instant,
    total_bytes: u64,
    cap_bytes_per_sec: f64,
    floor_bytes_per_sec: f64,
    grace: Duration,
    below_floor_since: Option<Instant>,
}

impl SpeedGovernor {
    /// `cap_bytes_per_sec == 0.0` means unlimited.
    pub fn new(cap_bytes_per_sec: f64, floor_bytes_per_sec: f64, grace: Duration) -> Self {
        Self {
            start: Instant::now(),
            total_bytes: 0,
            cap_bytes_per_sec,
            floor_bytes_per_sec,
            grace,
            below_floor_since: None,
        }
    }

    /// Records `n` freshly-transferred bytes, sleeping as needed to
    /// respect the cap, and returns an error if the stall floor has
    /// been breached for longer than the grace window.
    pub fn record(&mut self, n: usize) -> Result<(), Flow> {
        self.total_bytes += n as u64;
        let elapsed = self.start.elapsed().as_secs_f64().max(0.000_001);
        let current_rate = self.total_bytes as f64 / elapsed;

        if self.cap_bytes_per_sec > 0.0 {
            let expected_secs = self.total_bytes as f64 / self.cap_bytes_per_sec;
            let ahead = expected_secs - elapsed;
            if ahead > 0.0 {
                std::thread::sleep(Duration::from_secs_f64(ahead));
            }
        }

        if self.floor_bytes_per_sec > 0.0 && current_rate < self.floor_bytes_per_sec {
            let since = *self.below_floor_since.get_or_insert_with(Instant::now);
            if since.elapsed() >= self.grace {
                return Err(Flow::MinimumSpeed { speed: current_rate, limit: self.floor_bytes_per_sec });
            }
        } else {
            self.below_floor_since = None;
        }

        Ok(())
    }

    /// Final average speed in bytes/sec over the whole transfer.
    pub fn final_speed(&self) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64().max(0.000_001);
        self.total_bytes as f64 / elapsed
    }

    pub fn duration(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}
