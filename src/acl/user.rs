// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! `UserProfile` (mutable, owned by [`crate::acl::cache::UserCache`]) and
//! its immutable [`UserSnapshot`] (spec.md §3, §9 "publish snapshots
//! only").

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::acl::{flags::FlagSet, ids::GroupID, ipmask::IpMask};

/// A salted password hash. Hashing algorithm is out of this core's
/// scope (external collaborator); this type just stores the salt and
/// digest together the way the original account record does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(with = "hex::serde")]
    pub salt: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub hash: Vec<u8>,
}

impl Credentials {
    /// Hashes `password` under a freshly generated salt.
    pub fn new(password: &str) -> Self {
        let mut salt = vec![0u8; 16];
        rand::rng().fill_bytes(&mut salt);
        let hash = hash_password(&salt, password);
        Self { salt, hash }
    }

    /// True if `password` hashes to this record's digest under its salt.
    pub fn verify(&self, password: &str) -> bool {
        hash_password(&self.salt, password) == self.hash
    }
}

fn hash_password(salt: &[u8], password: &str) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

/// The mutable, cache-owned account record (spec.md §3 `UserProfile`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i32,
    pub name: String,
    pub created: DateTime<Utc>,
    pub creator: i32,

    pub credentials: Credentials,

    pub flags: FlagSet,

    pub primary_gid: GroupID,
    pub secondary_gids: Vec<GroupID>,
    pub gadmin_gids: HashSet<GroupID>,

    pub ip_masks: Vec<IpMask>,

    pub weekly_allotment_kb: i64,
    pub idle_time_secs: i64,
    pub max_down_speed: i64,
    pub max_up_speed: i64,
    pub max_sim_down: i32,
    pub max_sim_up: i32,
    pub num_logins: i32,
    pub expires: Option<DateTime<Utc>>,

    pub logged_in: u32,
    pub last_login: Option<DateTime<Utc>>,
    pub ratio: BTreeMap<String, i32>,
    pub credits: BTreeMap<String, i64>,

    pub comment: String,
    pub tagline: String,
    pub home_dir: String,

    pub deleted: bool,
    pub modified: DateTime<Utc>,
}

impl UserProfile {
    /// Builds a fresh profile with a newly assigned id.
    pub fn new(id: i32, name: impl Into<String>, password: &str, creator: i32) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            created: now,
            creator,
            credentials: Credentials::new(password),
            flags: FlagSet::default(),
            primary_gid: super::ids::NO_ID,
            secondary_gids: Vec::new(),
            gadmin_gids: HashSet::new(),
            ip_masks: Vec::new(),
            weekly_allotment_kb: 0,
            idle_time_secs: 900,
            max_down_speed: 0,
            max_up_speed: 0,
            max_sim_down: -1,
            max_sim_up: -1,
            num_logins: -1,
            expires: None,
            logged_in: 0,
            last_login: None,
            ratio: BTreeMap::new(),
            credits: BTreeMap::new(),
            comment: String::new(),
            tagline: String::new(),
            home_dir: String::new(),
            deleted: false,
            modified: now,
        }
    }

    /// Bumps `modified` to the current time, enforcing monotonicity even
    /// when the wall clock has not advanced since the last write
    /// (spec.md §8 invariant: `modified` never decreases).
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.modified = if now > self.modified { now } else { self.modified + chrono::Duration::microseconds(1) };
    }

    /// Ratio for `section`, falling back to the default (empty-key)
    /// bucket when the section has no override.
    pub fn ratio_for(&self, section: &str) -> i32 {
        self.ratio.get(section).copied().unwrap_or_else(|| self.ratio.get("").copied().unwrap_or(3))
    }

    /// Credit bucket key: `section` when that section has separate
    /// credits, otherwise the default (empty-string) bucket (spec.md
    /// §3 invariant).
    pub fn credit_key<'a>(&self, section: &'a str, section_has_separate_credits: bool) -> &'a str {
        if section_has_separate_credits { section } else { "" }
    }

    /// Credits currently held in `key`'s bucket.
    pub fn credits_in(&self, key: &str) -> i64 {
        self.credits.get(key).copied().unwrap_or(0)
    }

    /// Adds `amount_kb` to `key`'s credit bucket. Uploads only ever add,
    /// so this never needs the force/clamp path.
    pub fn add_credits(&mut self, key: &str, amount_kb: i64) {
        *self.credits.entry(key.to_string()).or_insert(0) += amount_kb;
        self.touch();
    }

    /// Subtracts `amount_kb` from `key`'s bucket, clamped at zero unless
    /// `force` is set (spec.md §3: "may not go negative except via
    /// `...Force`").
    pub fn sub_credits(&mut self, key: &str, amount_kb: i64, force: bool) -> Result<(), crate::error::Error> {
        let entry = self.credits.entry(key.to_string()).or_insert(0);
        if !force && *entry < amount_kb {
            return Err(crate::error::Error::Runtime("insufficient credits".into()));
        }
        *entry -= amount_kb;
        if !force && *entry < 0 {
            *entry = 0;
        }
        self.touch();
        Ok(())
    }

    /// Publishes an immutable value copy for callers outside the cache
    /// (spec.md §9: "publish snapshots only").
    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            id: self.id,
            name: self.name.clone(),
            created: self.created,
            creator: self.creator,
            flags: self.flags.clone(),
            primary_gid: self.primary_gid,
            secondary_gids: self.secondary_gids.clone(),
            gadmin_gids: self.gadmin_gids.clone(),
            ip_masks: self.ip_masks.iter().map(|m| m.as_str().to_string()).collect(),
            weekly_allotment_kb: self.weekly_allotment_kb,
            idle_time_secs: self.idle_time_secs,
            max_down_speed: self.max_down_speed,
            max_up_speed: self.max_up_speed,
            max_sim_down: self.max_sim_down,
            max_sim_up: self.max_sim_up,
            num_logins: self.num_logins,
            expires: self.expires,
            logged_in: self.logged_in,
            last_login: self.last_login,
            ratio: self.ratio.clone(),
            credits: self.credits.clone(),
            comment: self.comment.clone(),
            tagline: self.tagline.clone(),
            home_dir: self.home_dir.clone(),
            deleted: self.deleted,
            modified: self.modified,
        }
    }
}

/// Immutable value copy of a [`UserProfile`] handed to callers outside
/// the cache. Mutation APIs live only on the cache, never here.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSnapshot {
    pub id: i32,
    pub name: String,
    pub created: DateTime<Utc>,
    pub creator: i32,
    pub flags: FlagSet,
    pub primary_gid: GroupID,
    pub secondary_gids: Vec<GroupID>,
    pub gadmin_gids: HashSet<GroupID>,
    pub ip_masks: Vec<String>,
    pub weekly_allotment_kb: i64,
    pub idle_time_secs: i64,
    pub max_down_speed: i64,
    pub max_up_speed: i64,
    pub max_sim_down: i32,
    pub max_sim_up: i32,
    pub num_logins: i32,
    pub expires: Option<DateTime<Utc>>,
    pub logged_in: u32,
    pub last_login: Option<DateTime<Utc>>,
    pub ratio: BTreeMap<String, i32>,
    pub credits: BTreeMap<String, i64>,
    pub comment: String,
    pub tagline: String,
    pub home_dir: String,
    pub deleted: bool,
    pub modified: DateTime<Utc>,
}

impl UserSnapshot {
    /// Renders a `"1:N"` / `"unlimited"` / `"Leech"` ratio string the way
    /// a `STAT`/`SITE USERS` reply shows it (grounded in
    /// `original_source`'s `RatioString`).
    pub fn ratio_string(&self, section: &str) -> String {
        let ratio = self.ratio.get(section).copied().unwrap_or_else(|| self.ratio.get("").copied().unwrap_or(3));
        if ratio == 0 { "Leech".to_string() } else { format!("1:{ratio}") }
    }

    /// Renders the credit balance for `section`'s bucket as a
    /// human-readable `"N.NN MB"` string.
    pub fn credit_string(&self, key: &str) -> String {
        let kb = self.credits.get(key).copied().unwrap_or(0);
        format!("{:.2} MB", kb as f64 / 1024.0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|e| now >= e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_round_trip_verify() {
        let c = Credentials::new("hunter2");
        assert!(c.verify("hunter2"));
        assert!(!c.verify("wrong"));
    }

    #[test]
    fn touch_is_monotonic() {
        let mut u = UserProfile::new(1, "alice", "pw", -1);
        let first = u.modified;
        u.touch();
        assert!(u.modified >= first);
    }

    #[test]
    fn sub_credits_clamps_without_force() {
        let mut u = UserProfile::new(1, "alice", "pw", -1);
        u.add_credits("", 10);
        assert!(u.sub_credits("", 20, false).is_err());
        u.sub_credits("", 5, false).unwrap();
        assert_eq!(u.credits_in(""), 5);
    }

    #[test]
    fn sub_credits_force_allows_negative() {
        let mut u = UserProfile::new(1, "alice", "pw", -1);
        u.sub_credits("", 5, true).unwrap();
        assert_eq!(u.credits_in(""), -5);
    }

    #[test]
    fn ratio_string_reports_leech() {
        let mut u = UserProfile::new(1, "alice", "pw", -1);
        u.ratio.insert("".to_string(), 0);
        assert_eq!(u.snapshot().ratio_string(""), "Leech");
    }

    #[test]
    fn serde_round_trip_equal_modulo_modified() {
        let mut u = UserProfile::new(7, "alice", "pw", -1);
        u.ip_masks.push(super::super::ipmask::IpMask::parse("*@1.2.3.4").unwrap());
        u.add_credits("", 42);
        let json = serde_json::to_string(&u).unwrap();
        let mut back: UserProfile = serde_json::from_str(&json).unwrap();
        back.modified = u.modified;
        assert_eq!(u, back);
    }
}
