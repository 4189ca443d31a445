// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Upload-owner tracking (spec.md §4.3 step 6 "include ... the
//! uploader's name"), grounded in the original's `fs::OwnerCache` /
//! `acl::UserCache::UIDToName` pair: a physical-path -> uploader-name
//! map populated at `CreateFile` time and consulted when a later `STOR`
//! collides with an existing path.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

/// Process-global map from physical path to the name of the user who
/// created it.
#[derive(Default)]
pub struct OwnerCache {
    owners: Mutex<HashMap<PathBuf, String>>,
}

impl OwnerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `owner` as the creator of `path` (spec.md §4.3 step 6,
    /// the `CreateFile` branch).
    pub fn record(&self, path: &Path, owner: &str) {
        self.owners.lock().unwrap_or_else(|e| e.into_inner()).insert(path.to_path_buf(), owner.to_string());
    }

    /// The recorded creator of `path`, if any.
    pub fn owner(&self, path: &Path) -> Option<String> {
        self.owners.lock().unwrap_or_else(|e| e.into_inner()).get(path).cloned()
    }

    /// Drops the recorded owner, e.g. when a partial upload is deleted.
    pub fn forget(&self, path: &Path) {
        self.owners.lock().unwrap_or_else(|e| e.into_inner()).remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_looks_up_owner() {
        let cache = OwnerCache::new();
        let path = Path::new("/data/f.txt");
        assert_eq!(cache.owner(path), None);
        cache.record(path, "alice");
        assert_eq!(cache.owner(path), Some("alice".to_string()));
    }

    #[test]
    fn forget_removes_the_record() {
        let cache = OwnerCache::new();
        let path = Path::new("/data/f.txt");
        cache.record(path, "alice");
        cache.forget(path);
        assert_eq!(cache.owner(path), None);
    }
}
