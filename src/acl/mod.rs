// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Access-control and accounting state (spec.md §3, §4.4, §4.6): the
//! account model, the process-global user/group cache, and the ACL/path
//! filter every administrative and transfer verb consults.

/// Identifiers and name validators shared by users and groups.
pub mod ids;
/// Single-character capability flags.
pub mod flags;
/// `ident@host` IP masks and their matching rules.
pub mod ipmask;
/// `UserProfile` and its immutable `UserSnapshot`.
pub mod user;
/// `GroupProfile` and its immutable `GroupSnapshot`.
pub mod group;
/// Process-global `UserCache`/`GroupCache`.
pub mod cache;
/// `SITE` command ACL and path filter.
pub mod filter;

pub use cache::{GroupCache, UserCache};
pub use group::{GroupProfile, GroupSnapshot};
pub use ids::{GroupID, UserID};
pub use user::{UserProfile, UserSnapshot};
