// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! `GroupProfile` and its immutable [`GroupSnapshot`] (spec.md §3:
//! "GroupProfile symmetric ... Membership is stored on the user side").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::acl::flags::FlagSet;

/// The mutable, cache-owned group record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupProfile {
    pub id: i32,
    pub name: String,
    pub flags: FlagSet,
    pub comment: String,
    pub description: String,
    pub slots: i32,
    pub leech_slots: i32,
    pub allotment_slots: i32,
    pub deleted: bool,
    pub modified: DateTime<Utc>,
}

impl GroupProfile {
    pub fn new(id: i32, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            flags: FlagSet::default(),
            comment: String::new(),
            description: String::new(),
            slots: -1,
            leech_slots: -1,
            allotment_slots: -1,
            deleted: false,
            modified: now,
        }
    }

    pub fn touch(&mut self) {
        let now = Utc::now();
        self.modified = if now > self.modified { now } else { self.modified + chrono::Duration::microseconds(1) };
    }

    pub fn snapshot(&self) -> GroupSnapshot {
        GroupSnapshot {
            id: self.id,
            name: self.name.clone(),
            flags: self.flags.clone(),
            comment: self.comment.clone(),
            description: self.description.clone(),
            slots: self.slots,
            deleted: self.deleted,
            modified: self.modified,
        }
    }
}

/// Immutable value copy of a [`GroupProfile`].
#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    pub id: i32,
    pub name: String,
    pub flags: FlagSet,
    pub comment: String,
    pub description: String,
    pub slots: i32,
    pub deleted: bool,
    pub modified: DateTime<Utc>,
}
