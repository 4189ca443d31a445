// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! `SITE` command ACL and path filter (spec.md §4.6).

use crate::{
    acl::user::UserSnapshot,
    cfg::config::AclRule,
    util::wildcard::wildcard_match,
};

/// A capability gated per-section by path-glob rules (spec.md §4.6: the
/// two capabilities relevant to the core).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Suppress the uploader's name/age in a dupe message.
    Hideowner,
    /// Exclude a path from stats accounting.
    Nostats,
}

/// One rule in a [`Capability`] table: a path glob plus the flag
/// expression that must be satisfied for the capability to apply.
#[derive(Debug, Clone)]
pub struct CapabilityRule {
    pub path_glob: String,
    pub flag_expr: String,
}

/// Evaluates an ordered list of `(keyword, allow/deny, expr)` rules;
/// first match wins, default deny (spec.md §4.6 `AllowSiteCmd`).
pub fn allow_site_cmd(user: &UserSnapshot, keyword: &str, rules: &[AclRule]) -> bool {
    for rule in rules {
        if !rule.keyword.eq_ignore_ascii_case(keyword) && rule.keyword != "*" {
            continue;
        }
        if expr_matches(user, &rule.expr) {
            return rule.allow;
        }
    }
    false
}

/// Evaluates a single ACL expression against a user: a flag expression
/// (e.g. `"1M"`), a group expression (`"=staff"`), or a bare username.
fn expr_matches(user: &UserSnapshot, expr: &str) -> bool {
    if expr == "*" {
        return true;
    }
    if let Some(group_name) = expr.strip_prefix('=') {
        // Group membership is resolved by gid elsewhere; here we only
        // know the user's own name/flags, so group expressions are
        // matched by exact group id passed in as a decimal string.
        return group_name.parse::<i32>().is_ok_and(|gid| user.primary_gid == gid || user.secondary_gids.contains(&gid));
    }
    if expr.chars().all(|c| c.is_alphanumeric()) && expr.chars().any(|c| c.is_ascii_digit()) {
        return user.flags.has_all(expr);
    }
    user.name == expr
}

/// Evaluates whether `user` has `capability` for `vpath` under a
/// section-scoped rule table (spec.md §4.6 `FileAllowed<Capability>`).
pub fn file_allowed(user: &UserSnapshot, vpath: &str, rules: &[CapabilityRule]) -> bool {
    rules.iter().any(|r| wildcard_match(&r.path_glob, vpath) && user.flags.has_all(&r.flag_expr))
}

/// Rejects basenames containing disallowed characters. Rules are
/// positive character-class allow-lists (spec.md §4.6 `Filter`); the
/// default allow-list is conservative ASCII.
pub fn filter_basename(basename: &str, allowed_chars: &str) -> Result<(), String> {
    if basename.is_empty() || basename == "." || basename == ".." {
        return Err(format!("'{basename}' is not a valid filename"));
    }
    let allow: Vec<char> = if allowed_chars.is_empty() {
        default_allowed_chars()
    } else {
        allowed_chars.chars().collect()
    };
    for c in basename.chars() {
        if !allow.contains(&c) {
            return Err(sanitize_message(basename));
        }
    }
    Ok(())
}

fn default_allowed_chars() -> Vec<char> {
    let mut v: Vec<char> = ('a'..='z').chain('A'..='Z').chain('0'..='9').collect();
    v.extend(['.', '_', '-', ' ', '+', '(', ')', '[', ']']);
    v
}

/// Produces a sanitized variant of `basename` safe to echo back in a
/// reply, replacing disallowed bytes with `_`.
fn sanitize_message(basename: &str) -> String {
    basename.chars().map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::{flags::FlagSet, ids::NO_ID};

    fn sample_user(flags: &str) -> UserSnapshot {
        UserSnapshot {
            id: 1,
            name: "alice".into(),
            created: chrono::Utc::now(),
            creator: NO_ID,
            flags: FlagSet::parse(flags),
            primary_gid: 10,
            secondary_gids: vec![20],
            gadmin_gids: Default::default(),
            ip_masks: vec![],
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
            ratio: Default::default(),
            credits: Default::default(),
            comment: String::new(),
            tagline: String::new(),
            home_dir: String::new(),
            deleted: false,
            modified: chrono::Utc::now(),
        }
    }

    #[test]
    fn first_match_wins_default_deny() {
        let user = sample_user("1M");
        let rules = vec![
            AclRule { keyword: "KICK".into(), allow: true, expr: "1".into() },
            AclRule { keyword: "KICK".into(), allow: false, expr: "*".into() },
        ];
        assert!(allow_site_cmd(&user, "KICK", &rules));
        assert!(!allow_site_cmd(&user, "SHUTDOWN", &rules));
    }

    #[test]
    fn group_expr_matches_primary_or_secondary() {
        let user = sample_user("");
        let rules = vec![AclRule { keyword: "*".into(), allow: true, expr: "=20".into() }];
        assert!(allow_site_cmd(&user, "GIVE", &rules));
    }

    #[test]
    fn filter_basename_rejects_dot_entries() {
        assert!(filter_basename(".", "").is_err());
        assert!(filter_basename("..", "").is_err());
        assert!(filter_basename("report.txt", "").is_ok());
    }

    #[test]
    fn filter_basename_rejects_control_chars() {
        assert!(filter_basename("evil\n.txt", "").is_err());
    }
}
