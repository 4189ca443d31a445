// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Per-user and global upload/download slot counters (spec.md §4.3 step
//! 4, §5 "Slot reservations ... always released"). A [`SlotGuard`]
//! releases its slot on every exit path via `Drop`, matching the
//! scope-guard discipline spec.md §9's GLOSSARY calls out.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicI32, Ordering},
    },
};

use crate::acl::ids::UserID;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

/// Process-wide slot accounting, shared by every session via the
/// listener's [`crate::server::session::SessionServices`].
#[derive(Default)]
pub struct SlotTracker {
    global_up: AtomicI32,
    global_down: AtomicI32,
    per_user_up: Mutex<HashMap<UserID, i32>>,
    per_user_down: Mutex<HashMap<UserID, i32>>,
}

/// The reason a slot reservation was refused, carrying the message a
/// `450` reply quotes verbatim (spec.md §4.3 step 4).
pub enum SlotDenied {
    /// `450 "reached your maximum of N"`.
    PerUser(i32),
    /// `450 "server has reached its maximum"`.
    Global,
}

impl SlotTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves one slot for `uid` in `direction`, checking the
    /// per-user cap (`-1` unlimited, `0` forbidden) then the global cap
    /// (`-1` unlimited). Returns a guard that releases the slot when
    /// dropped.
    pub fn reserve(
        self: &Arc<Self>,
        uid: UserID,
        direction: Direction,
        per_user_max: i32,
        global_max: i32,
    ) -> Result<SlotGuard, SlotDenied> {
        if per_user_max == 0 {
            return Err(SlotDenied::PerUser(0));
        }
        let per_user_map = self.per_user_map(direction);
        {
            let mut map = per_user_map.lock().unwrap_or_else(|e| e.into_inner());
            let current = map.entry(uid).or_insert(0);
            if per_user_max >= 0 && *current >= per_user_max {
                return Err(SlotDenied::PerUser(per_user_max));
            }
            *current += 1;
        }

        let global_counter = self.global_counter(direction);
        let global_now = global_counter.fetch_add(1, Ordering::SeqCst) + 1;
        if global_max >= 0 && global_now > global_max {
            global_counter.fetch_sub(1, Ordering::SeqCst);
            let mut map = per_user_map.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(c) = map.get_mut(&uid) {
                *c -= 1;
            }
            return Err(SlotDenied::Global);
        }

        Ok(SlotGuard { tracker: self.clone(), uid, direction })
    }

    fn per_user_map(&self, direction: Direction) -> &Mutex<HashMap<UserID, i32>> {
        match direction {
            Direction::Upload => &self.per_user_up,
            Direction::Download => &self.per_user_down,
        }
    }

    fn global_counter(&self, direction: Direction) -> &AtomicI32 {
        match direction {
            Direction::Upload => &self.global_up,
            Direction::Download => &self.global_down,
        }
    }

    fn release(&self, uid: UserID, direction: Direction) {
        self.global_counter(direction).fetch_sub(1, Ordering::SeqCst);
        let mut map = self.per_user_map(direction).lock().unwrap_or_else(|e| e.into_inner());
        if let Some(c) = map.get_mut(&uid) {
            *c -= 1;
        }
    }

    /// Current concurrent count per direction, for tests/diagnostics.
    pub fn active(&self, direction: Direction) -> i32 {
        self.global_counter(direction).load(Ordering::SeqCst)
    }
}

/// Releases its slot on drop, regardless of how the transfer exited
/// (spec.md §5: "Slot reservations ... are always released").
pub struct SlotGuard {
    tracker: Arc<SlotTracker>,
    uid: UserID,
    direction: Direction,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.tracker.release(self.uid, self.direction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_user_cap_denies_past_limit() {
        let tracker = Arc::new(SlotTracker::new());
        let _g1 = tracker.reserve(1, Direction::Upload, 1, -1).unwrap();
        assert!(matches!(tracker.reserve(1, Direction::Upload, 1, -1), Err(SlotDenied::PerUser(1))));
    }

    #[test]
    fn zero_forbids_entirely() {
        let tracker = Arc::new(SlotTracker::new());
        assert!(matches!(tracker.reserve(1, Direction::Upload, 0, -1), Err(SlotDenied::PerUser(0))));
    }

    #[test]
    fn global_cap_denies_across_users() {
        let tracker = Arc::new(SlotTracker::new());
        let _g1 = tracker.reserve(1, Direction::Upload, -1, 1).unwrap();
        assert!(matches!(tracker.reserve(2, Direction::Upload, -1, 1), Err(SlotDenied::Global)));
    }

    #[test]
    fn dropping_guard_releases_slot() {
        let tracker = Arc::new(SlotTracker::new());
        {
            let _g = tracker.reserve(1, Direction::Upload, 1, -1).unwrap();
            assert_eq!(tracker.active(Direction::Upload), 1);
        }
        assert_eq!(tracker.active(Direction::Upload), 0);
        assert!(tracker.reserve(1, Direction::Upload, 1, -1).is_ok());
    }

    #[test]
    fn balance_matches_concurrent_reservations() {
        let tracker = Arc::new(SlotTracker::new());
        let g1 = tracker.reserve(1, Direction::Upload, -1, -1).unwrap();
        let g2 = tracker.reserve(2, Direction::Upload, -1, -1).unwrap();
        assert_eq!(tracker.active(Direction::Upload), 2);
        drop(g1);
        assert_eq!(tracker.active(Direction::Upload), 1);
        drop(g2);
        assert_eq!(tracker.active(Direction::Upload), 0);
    }
}
