// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Process-global `UserCache`/`GroupCache` (spec.md §4.4): the
//! authoritative, name/id-indexed in-memory mirror of account state.
//! All mutations go through here; direct persistent-store writes are
//! forbidden.

use std::{
    collections::HashMap,
    net::IpAddr,
    sync::{Arc, Mutex, RwLock},
};

use chrono::{DateTime, Utc};

use crate::{
    acl::{
        group::{GroupProfile, GroupSnapshot},
        ids::{GroupID, NO_ID, UserID, validate_groupname, validate_username},
        ipmask::IpMask,
        user::{UserProfile, UserSnapshot},
    },
    db::StoreProxy,
    error::Error,
};

struct UserState {
    by_id: HashMap<UserID, UserProfile>,
    name_to_id: HashMap<String, UserID>,
    next_id: UserID,
}

/// The process-wide authoritative mirror of user accounts.
///
/// Two coarse locks as spec.md §4.4 requires: `state` (name/id maps and
/// profile fields) and `ip_masks` (a separate reader-writer lock), plus
/// `creation` to serialize name-collision checks with id allocation.
pub struct UserCache {
    state: Mutex<UserState>,
    ip_masks: RwLock<HashMap<UserID, Vec<IpMask>>>,
    creation: Mutex<()>,
    last_replicate: Mutex<DateTime<Utc>>,
    store: Arc<StoreProxy>,
}

impl UserCache {
    pub fn new(store: Arc<StoreProxy>) -> Self {
        Self {
            state: Mutex::new(UserState { by_id: HashMap::new(), name_to_id: HashMap::new(), next_id: 1 }),
            ip_masks: RwLock::new(HashMap::new()),
            creation: Mutex::new(()),
            last_replicate: Mutex::new(DateTime::<Utc>::MIN_UTC),
            store,
        }
    }

    /// Loads every user document from the persistent store into the
    /// in-memory maps (spec.md §4.4 `Initialize`).
    pub fn initialize(&self) -> Result<(), Error> {
        let docs = self.store.store().load_all("users")?;
        let mut state = self.lock_state();
        for doc in docs {
            let profile: UserProfile = serde_json::from_value(doc).map_err(|e| Error::Runtime(e.to_string()))?;
            state.next_id = state.next_id.max(profile.id + 1);
            if !profile.deleted {
                state.name_to_id.insert(profile.name.clone(), profile.id);
            }
            let mut masks = self.ip_masks.write().unwrap_or_else(|e| e.into_inner());
            masks.insert(profile.id, profile.ip_masks.clone());
            state.by_id.insert(profile.id, profile);
        }
        Ok(())
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, UserState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, profile: &UserProfile) {
        let doc = serde_json::to_value(profile).unwrap_or_else(|_| serde_json::Value::Null);
        let _ = self.store.flush("users", profile.id, doc);
    }

    // --- existence / lookup -------------------------------------------------

    pub fn exists_name(&self, name: &str) -> bool {
        let state = self.lock_state();
        state.name_to_id.contains_key(name)
    }

    pub fn exists_uid(&self, uid: UserID) -> bool {
        let state = self.lock_state();
        state.by_id.get(&uid).is_some_and(|u| !u.deleted)
    }

    pub fn name_to_uid(&self, name: &str) -> Option<UserID> {
        let state = self.lock_state();
        state.name_to_id.get(name).copied()
    }

    pub fn uid_to_name(&self, uid: UserID) -> Option<String> {
        let state = self.lock_state();
        state.by_id.get(&uid).map(|u| u.name.clone())
    }

    pub fn user_by_name(&self, name: &str) -> Result<UserSnapshot, Error> {
        let state = self.lock_state();
        let id = *state.name_to_id.get(name).ok_or_else(|| Error::Runtime(format!("no such user: {name}")))?;
        Ok(state.by_id[&id].snapshot())
    }

    pub fn user_by_id(&self, uid: UserID) -> Result<UserSnapshot, Error> {
        let state = self.lock_state();
        state.by_id.get(&uid).map(|u| u.snapshot()).ok_or_else(|| Error::Runtime(format!("no such uid: {uid}")))
    }

    pub fn primary_gid(&self, uid: UserID) -> Result<GroupID, Error> {
        let state = self.lock_state();
        state.by_id.get(&uid).map(|u| u.primary_gid).ok_or_else(|| Error::Runtime(format!("no such uid: {uid}")))
    }

    pub fn has_gid(&self, name: &str, gid: GroupID) -> Result<bool, Error> {
        let state = self.lock_state();
        let id = *state.name_to_id.get(name).ok_or_else(|| Error::Runtime(format!("no such user: {name}")))?;
        let u = &state.by_id[&id];
        Ok(u.primary_gid == gid || u.secondary_gids.contains(&gid))
    }

    /// Count of non-deleted users, or all users when `include_deleted`.
    pub fn count(&self, include_deleted: bool) -> usize {
        let state = self.lock_state();
        if include_deleted { state.by_id.len() } else { state.by_id.values().filter(|u| !u.deleted).count() }
    }

    // --- creation / deletion -------------------------------------------------

    pub fn create(&self, name: &str, password: &str, flags: &str, creator: UserID) -> Result<UserSnapshot, Error> {
        validate_username(name)?;
        let _guard = self.creation.lock().unwrap_or_else(|e| e.into_inner());
        {
            let state = self.lock_state();
            if state.name_to_id.contains_key(name) {
                return Err(Error::Runtime(format!("user already exists: {name}")));
            }
        }
        let mut state = self.lock_state();
        let id = state.next_id;
        state.next_id += 1;
        let mut profile = UserProfile::new(id, name, password, creator);
        profile.flags.add(flags);
        state.name_to_id.insert(name.to_string(), id);
        let snap = profile.snapshot();
        state.by_id.insert(id, profile.clone());
        drop(state);
        self.ip_masks.write().unwrap_or_else(|e| e.into_inner()).insert(id, Vec::new());
        self.persist(&profile);
        Ok(snap)
    }

    /// Soft-delete: marks the record, preserves the id, frees the name.
    pub fn delete(&self, name: &str) -> Result<(), Error> {
        let mut state = self.lock_state();
        let id = *state.name_to_id.get(name).ok_or_else(|| Error::Runtime(format!("no such user: {name}")))?;
        state.name_to_id.remove(name);
        let profile = state.by_id.get_mut(&id).expect("id present from name_to_id");
        profile.deleted = true;
        profile.touch();
        let snapshot_doc = profile.clone();
        drop(state);
        self.persist(&snapshot_doc);
        Ok(())
    }

    /// Hard-delete: the record is gone even from the soft-deleted set.
    pub fn purge(&self, name: &str) -> Result<(), Error> {
        let mut state = self.lock_state();
        let id = state
            .by_id
            .values()
            .find(|u| u.name == name)
            .map(|u| u.id)
            .ok_or_else(|| Error::Runtime(format!("no such user: {name}")))?;
        state.name_to_id.remove(name);
        state.by_id.remove(&id);
        drop(state);
        self.ip_masks.write().unwrap_or_else(|e| e.into_inner()).remove(&id);
        Ok(())
    }

    /// Restores a soft-deleted user under its original name.
    pub fn readd(&self, name: &str) -> Result<UserSnapshot, Error> {
        let mut state = self.lock_state();
        let id = state
            .by_id
            .values()
            .find(|u| u.name == name && u.deleted)
            .map(|u| u.id)
            .ok_or_else(|| Error::Runtime(format!("no deleted user: {name}")))?;
        if state.name_to_id.contains_key(name) {
            return Err(Error::Runtime(format!("name already in use: {name}")));
        }
        let profile = state.by_id.get_mut(&id).expect("id present");
        profile.deleted = false;
        profile.touch();
        state.name_to_id.insert(name.to_string(), id);
        let snap = state.by_id[&id].snapshot();
        let doc = state.by_id[&id].clone();
        drop(state);
        self.persist(&doc);
        Ok(snap)
    }

    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<(), Error> {
        validate_username(new_name)?;
        let mut state = self.lock_state();
        if state.name_to_id.contains_key(new_name) {
            return Err(Error::Runtime(format!("name already in use: {new_name}")));
        }
        let id = *state.name_to_id.get(old_name).ok_or_else(|| Error::Runtime(format!("no such user: {old_name}")))?;
        state.name_to_id.remove(old_name);
        state.name_to_id.insert(new_name.to_string(), id);
        let profile = state.by_id.get_mut(&id).expect("id present");
        profile.name = new_name.to_string();
        profile.touch();
        let doc = profile.clone();
        drop(state);
        self.persist(&doc);
        Ok(())
    }

    fn mutate<F>(&self, name: &str, f: F) -> Result<UserSnapshot, Error>
    where F: FnOnce(&mut UserProfile) -> Result<(), Error> {
        let mut state = self.lock_state();
        let id = *state.name_to_id.get(name).ok_or_else(|| Error::Runtime(format!("no such user: {name}")))?;
        let profile = state.by_id.get_mut(&id).expect("id present");
        f(profile)?;
        profile.touch();
        let snap = profile.snapshot();
        let doc = profile.clone();
        drop(state);
        self.persist(&doc);
        Ok(snap)
    }

    /// Checks `password` against the stored hash without ever handing
    /// the credentials themselves outside the cache (spec.md §9:
    /// "publish snapshots only").
    pub fn verify_password(&self, name: &str, password: &str) -> Result<bool, Error> {
        let state = self.lock_state();
        let id = *state.name_to_id.get(name).ok_or_else(|| Error::Runtime(format!("no such user: {name}")))?;
        Ok(state.by_id[&id].credentials.verify(password))
    }

    pub fn set_password(&self, name: &str, password: &str) -> Result<UserSnapshot, Error> {
        self.mutate(name, |u| {
            u.credentials = crate::acl::user::Credentials::new(password);
            Ok(())
        })
    }

    pub fn set_flags(&self, name: &str, flags: &str) -> Result<UserSnapshot, Error> {
        self.mutate(name, |u| {
            u.flags.set(flags);
            Ok(())
        })
    }

    pub fn add_flags(&self, name: &str, flags: &str) -> Result<UserSnapshot, Error> {
        self.mutate(name, |u| {
            u.flags.add(flags);
            Ok(())
        })
    }

    pub fn del_flags(&self, name: &str, flags: &str) -> Result<UserSnapshot, Error> {
        self.mutate(name, |u| {
            u.flags.remove(flags);
            Ok(())
        })
    }

    /// Sets the primary gid, returning the previous one. `-1` when the
    /// user had none (spec.md §9 decided Open Question).
    pub fn set_primary_gid(&self, name: &str, new_gid: GroupID) -> Result<GroupID, Error> {
        let mut old_gid = NO_ID;
        self.mutate(name, |u| {
            old_gid = u.primary_gid;
            u.secondary_gids.retain(|&g| g != new_gid);
            u.primary_gid = new_gid;
            Ok(())
        })?;
        Ok(old_gid)
    }

    pub fn set_tagline(&self, name: &str, tagline: &str) -> Result<UserSnapshot, Error> {
        crate::acl::ids::validate_tagline(tagline)?;
        self.mutate(name, |u| {
            u.tagline = tagline.to_string();
            Ok(())
        })
    }

    pub fn add_gid(&self, name: &str, gid: GroupID) -> Result<UserSnapshot, Error> {
        self.mutate(name, |u| {
            if u.primary_gid == gid {
                return Err(Error::Validation("gid is already the primary group".into()));
            }
            if !u.secondary_gids.contains(&gid) {
                u.secondary_gids.push(gid);
            }
            Ok(())
        })
    }

    pub fn del_gid(&self, name: &str, gid: GroupID) -> Result<UserSnapshot, Error> {
        self.mutate(name, |u| {
            u.secondary_gids.retain(|&g| g != gid);
            u.gadmin_gids.remove(&gid);
            Ok(())
        })
    }

    pub fn reset_gids(&self, name: &str) -> Result<UserSnapshot, Error> {
        self.mutate(name, |u| {
            u.secondary_gids.clear();
            u.gadmin_gids.clear();
            Ok(())
        })
    }

    pub fn toggle_gadmin_gid(&self, name: &str, gid: GroupID) -> Result<bool, Error> {
        let mut now_gadmin = false;
        self.mutate(name, |u| {
            if u.gadmin_gids.remove(&gid) {
                now_gadmin = false;
            } else {
                u.gadmin_gids.insert(gid);
                now_gadmin = true;
            }
            Ok(())
        })?;
        Ok(now_gadmin)
    }

    // --- IP masks -------------------------------------------------------------

    /// Adds a mask, returning the existing masks it renders redundant
    /// (spec.md §4.4 "IP-mask semantics").
    pub fn add_ip_mask(&self, name: &str, mask: &str) -> Result<Vec<String>, Error> {
        let uid = self.name_to_uid(name).ok_or_else(|| Error::Runtime(format!("no such user: {name}")))?;
        let new_mask = IpMask::parse(mask)?;

        let mut masks = self.ip_masks.write().unwrap_or_else(|e| e.into_inner());
        let list = masks.entry(uid).or_default();
        if list.iter().any(|m| m.as_str() == new_mask.as_str()) {
            return Err(Error::Validation(format!("duplicate IP mask: {mask}")));
        }
        let redundant: Vec<String> =
            list.iter().filter(|existing| new_mask.subsumes(existing)).map(|m| m.as_str().to_string()).collect();
        list.retain(|existing| !redundant.contains(&existing.as_str().to_string()));
        list.push(new_mask);
        drop(masks);

        self.sync_ip_masks_to_profile(uid);
        Ok(redundant)
    }

    /// Deletes the mask at `index` in insertion order, returning it.
    pub fn del_ip_mask(&self, name: &str, index: usize) -> Result<String, Error> {
        let uid = self.name_to_uid(name).ok_or_else(|| Error::Runtime(format!("no such user: {name}")))?;
        let removed = {
            let mut masks = self.ip_masks.write().unwrap_or_else(|e| e.into_inner());
            let list = masks.entry(uid).or_default();
            if index >= list.len() {
                return Err(Error::Validation(format!("no IP mask at index {index}")));
            }
            list.remove(index).as_str().to_string()
        };
        self.sync_ip_masks_to_profile(uid);
        Ok(removed)
    }

    pub fn del_all_ip_masks(&self, name: &str) -> Result<Vec<String>, Error> {
        let uid = self.name_to_uid(name).ok_or_else(|| Error::Runtime(format!("no such user: {name}")))?;
        let deleted = {
            let mut masks = self.ip_masks.write().unwrap_or_else(|e| e.into_inner());
            masks.entry(uid).or_default().drain(..).map(|m| m.as_str().to_string()).collect::<Vec<_>>()
        };
        self.sync_ip_masks_to_profile(uid);
        Ok(deleted)
    }

    pub fn list_ip_masks(&self, name: &str) -> Result<Vec<String>, Error> {
        let uid = self.name_to_uid(name).ok_or_else(|| Error::Runtime(format!("no such user: {name}")))?;
        let masks = self.ip_masks.read().unwrap_or_else(|e| e.into_inner());
        Ok(masks.get(&uid).map(|l| l.iter().map(|m| m.as_str().to_string()).collect()).unwrap_or_default())
    }

    /// True if any non-deleted user's mask allows `(ident, ip)`.
    pub fn ip_allowed(&self, ident: &str, ip: IpAddr) -> bool {
        let masks = self.ip_masks.read().unwrap_or_else(|e| e.into_inner());
        masks.values().any(|list| list.iter().any(|m| m.matches(ident, ip)))
    }

    /// True if `uid`'s own masks allow `(ident, ip)`.
    pub fn ident_ip_allowed(&self, uid: UserID, ident: &str, ip: IpAddr) -> bool {
        let masks = self.ip_masks.read().unwrap_or_else(|e| e.into_inner());
        masks.get(&uid).is_some_and(|list| list.iter().any(|m| m.matches(ident, ip)))
    }

    fn sync_ip_masks_to_profile(&self, uid: UserID) {
        let current = {
            let masks = self.ip_masks.read().unwrap_or_else(|e| e.into_inner());
            masks.get(&uid).cloned().unwrap_or_default()
        };
        let mut state = self.lock_state();
        if let Some(profile) = state.by_id.get_mut(&uid) {
            profile.ip_masks = current;
            profile.touch();
            let doc = profile.clone();
            drop(state);
            self.persist(&doc);
        }
    }

    // --- credits / logins -------------------------------------------------

    pub fn incr_credits(&self, name: &str, section_key: &str, kb: i64) -> Result<UserSnapshot, Error> {
        self.mutate(name, |u| {
            u.add_credits(section_key, kb);
            Ok(())
        })
    }

    pub fn decr_credits(&self, name: &str, section_key: &str, kb: i64, force: bool) -> Result<UserSnapshot, Error> {
        self.mutate(name, |u| u.sub_credits(section_key, kb, force))
    }

    /// Delegates straight to the default-section variant (spec.md §9:
    /// the source's infinite-recursion bug is not reproduced).
    pub fn decr_default_credits(&self, name: &str, kb: i64, force: bool) -> Result<UserSnapshot, Error> {
        self.decr_credits(name, "", kb, force)
    }

    pub fn incr_logged_in(&self, name: &str) -> Result<UserSnapshot, Error> {
        self.mutate(name, |u| {
            u.logged_in += 1;
            u.last_login = Some(Utc::now());
            Ok(())
        })
    }

    pub fn decr_logged_in(&self, name: &str) -> Result<UserSnapshot, Error> {
        self.mutate(name, |u| {
            u.logged_in = u.logged_in.saturating_sub(1);
            Ok(())
        })
    }

    // --- replication -------------------------------------------------------

    /// Drains records modified since the last tick and emits serialized
    /// diffs for replication, last-writer-wins at field granularity
    /// (spec.md §4.4 "Replication").
    pub fn replicate_tick(&self) -> Vec<serde_json::Value> {
        let mut last = self.last_replicate.lock().unwrap_or_else(|e| e.into_inner());
        let state = self.lock_state();
        let mut diffs = Vec::new();
        let mut max_seen = *last;
        for profile in state.by_id.values() {
            if profile.modified > *last {
                diffs.push(serde_json::to_value(profile).unwrap_or(serde_json::Value::Null));
                max_seen = max_seen.max(profile.modified);
            }
        }
        *last = max_seen;
        diffs
    }
}

struct GroupState {
    by_id: HashMap<GroupID, GroupProfile>,
    name_to_id: HashMap<String, GroupID>,
    next_id: GroupID,
}

/// The process-wide authoritative mirror of groups. Symmetric to
/// [`UserCache`] minus the IP-mask subsystem (spec.md §4.4, SPEC_FULL
/// §4.4 "NEW — GroupCache operations").
pub struct GroupCache {
    state: Mutex<GroupState>,
    store: Arc<StoreProxy>,
}

impl GroupCache {
    pub fn new(store: Arc<StoreProxy>) -> Self {
        Self { state: Mutex::new(GroupState { by_id: HashMap::new(), name_to_id: HashMap::new(), next_id: 1 }), store }
    }

    pub fn initialize(&self) -> Result<(), Error> {
        let docs = self.store.store().load_all("groups")?;
        let mut state = self.lock_state();
        for doc in docs {
            let profile: GroupProfile = serde_json::from_value(doc).map_err(|e| Error::Runtime(e.to_string()))?;
            state.next_id = state.next_id.max(profile.id + 1);
            if !profile.deleted {
                state.name_to_id.insert(profile.name.clone(), profile.id);
            }
            state.by_id.insert(profile.id, profile);
        }
        Ok(())
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, GroupState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, profile: &GroupProfile) {
        let doc = serde_json::to_value(profile).unwrap_or_else(|_| serde_json::Value::Null);
        let _ = self.store.flush("groups", profile.id, doc);
    }

    pub fn exists_name(&self, name: &str) -> bool {
        self.lock_state().name_to_id.contains_key(name)
    }

    pub fn exists_gid(&self, gid: GroupID) -> bool {
        self.lock_state().by_id.get(&gid).is_some_and(|g| !g.deleted)
    }

    pub fn gid_to_name(&self, gid: GroupID) -> Option<String> {
        self.lock_state().by_id.get(&gid).map(|g| g.name.clone())
    }

    pub fn name_to_gid(&self, name: &str) -> Option<GroupID> {
        self.lock_state().name_to_id.get(name).copied()
    }

    pub fn count(&self, include_deleted: bool) -> usize {
        let state = self.lock_state();
        if include_deleted { state.by_id.len() } else { state.by_id.values().filter(|g| !g.deleted).count() }
    }

    pub fn create(&self, name: &str) -> Result<GroupSnapshot, Error> {
        validate_groupname(name)?;
        let mut state = self.lock_state();
        if state.name_to_id.contains_key(name) {
            return Err(Error::Runtime(format!("group already exists: {name}")));
        }
        let id = state.next_id;
        state.next_id += 1;
        let profile = GroupProfile::new(id, name);
        state.name_to_id.insert(name.to_string(), id);
        let snap = profile.snapshot();
        state.by_id.insert(id, profile.clone());
        drop(state);
        self.persist(&profile);
        Ok(snap)
    }

    pub fn delete(&self, name: &str) -> Result<(), Error> {
        let mut state = self.lock_state();
        let id = *state.name_to_id.get(name).ok_or_else(|| Error::Runtime(format!("no such group: {name}")))?;
        state.name_to_id.remove(name);
        let profile = state.by_id.get_mut(&id).expect("id present");
        profile.deleted = true;
        profile.touch();
        let doc = profile.clone();
        drop(state);
        self.persist(&doc);
        Ok(())
    }

    pub fn purge(&self, name: &str) -> Result<(), Error> {
        let mut state = self.lock_state();
        let id = state
            .by_id
            .values()
            .find(|g| g.name == name)
            .map(|g| g.id)
            .ok_or_else(|| Error::Runtime(format!("no such group: {name}")))?;
        state.name_to_id.remove(name);
        state.by_id.remove(&id);
        Ok(())
    }

    pub fn readd(&self, name: &str) -> Result<GroupSnapshot, Error> {
        let mut state = self.lock_state();
        let id = state
            .by_id
            .values()
            .find(|g| g.name == name && g.deleted)
            .map(|g| g.id)
            .ok_or_else(|| Error::Runtime(format!("no deleted group: {name}")))?;
        let profile = state.by_id.get_mut(&id).expect("id present");
        profile.deleted = false;
        profile.touch();
        state.name_to_id.insert(name.to_string(), id);
        let snap = state.by_id[&id].snapshot();
        let doc = state.by_id[&id].clone();
        drop(state);
        self.persist(&doc);
        Ok(snap)
    }

    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<(), Error> {
        validate_groupname(new_name)?;
        let mut state = self.lock_state();
        if state.name_to_id.contains_key(new_name) {
            return Err(Error::Runtime(format!("name already in use: {new_name}")));
        }
        let id =
            *state.name_to_id.get(old_name).ok_or_else(|| Error::Runtime(format!("no such group: {old_name}")))?;
        state.name_to_id.remove(old_name);
        state.name_to_id.insert(new_name.to_string(), id);
        let profile = state.by_id.get_mut(&id).expect("id present");
        profile.name = new_name.to_string();
        profile.touch();
        let doc = profile.clone();
        drop(state);
        self.persist(&doc);
        Ok(())
    }

    fn mutate<F>(&self, name: &str, f: F) -> Result<GroupSnapshot, Error>
    where F: FnOnce(&mut GroupProfile) -> Result<(), Error> {
        let mut state = self.lock_state();
        let id = *state.name_to_id.get(name).ok_or_else(|| Error::Runtime(format!("no such group: {name}")))?;
        let profile = state.by_id.get_mut(&id).expect("id present");
        f(profile)?;
        profile.touch();
        let snap = profile.snapshot();
        let doc = profile.clone();
        drop(state);
        self.persist(&doc);
        Ok(snap)
    }

    pub fn set_flags(&self, name: &str, flags: &str) -> Result<GroupSnapshot, Error> {
        self.mutate(name, |g| {
            g.flags.set(flags);
            Ok(())
        })
    }

    pub fn add_flags(&self, name: &str, flags: &str) -> Result<GroupSnapshot, Error> {
        self.mutate(name, |g| {
            g.flags.add(flags);
            Ok(())
        })
    }

    pub fn del_flags(&self, name: &str, flags: &str) -> Result<GroupSnapshot, Error> {
        self.mutate(name, |g| {
            g.flags.remove(flags);
            Ok(())
        })
    }

    pub fn set_comment(&self, name: &str, comment: &str) -> Result<GroupSnapshot, Error> {
        self.mutate(name, |g| {
            g.comment = comment.to_string();
            Ok(())
        })
    }

    pub fn set_slots(&self, name: &str, slots: i32) -> Result<GroupSnapshot, Error> {
        self.mutate(name, |g| {
            g.slots = slots;
            Ok(())
        })
    }
}
