// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Single-character capability flags (spec.md §3: "set of single-character
//! flags (alphanumeric); subset test = all requested present").

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An unordered, deduplicated set of single-character flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet(BTreeSet<char>);

impl Serialize for FlagSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_string())
    }
}

impl<'de> Deserialize<'de> for FlagSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where D: Deserializer<'de> {
        let s = String::deserialize(deserializer)?;
        Ok(FlagSet::parse(&s))
    }
}

impl FlagSet {
    /// Builds a flag set from a string, ignoring non-alphanumeric chars
    /// and duplicates.
    pub fn parse(s: &str) -> Self {
        Self(s.chars().filter(|c| c.is_alphanumeric()).collect())
    }

    /// True if every character of `requested` is present in this set
    /// (spec.md's `CheckFlags`: scenario 5 "`1V` on `1A3V`" -> true).
    pub fn has_all(&self, requested: &str) -> bool {
        requested.chars().filter(|c| c.is_alphanumeric()).all(|c| self.0.contains(&c))
    }

    /// True if at least one character of `requested` is present.
    pub fn has_any(&self, requested: &str) -> bool {
        requested.chars().any(|c| self.0.contains(&c))
    }

    /// Adds flags, returning the updated set's canonical string form.
    pub fn add(&mut self, flags: &str) {
        for c in flags.chars().filter(|c| c.is_alphanumeric()) {
            self.0.insert(c);
        }
    }

    /// Removes flags.
    pub fn remove(&mut self, flags: &str) {
        for c in flags.chars() {
            self.0.remove(&c);
        }
    }

    /// Replaces the set wholesale.
    pub fn set(&mut self, flags: &str) {
        *self = Self::parse(flags);
    }

    /// Canonical (sorted) string form, e.g. `"1AV"`.
    pub fn as_string(&self) -> String {
        self.0.iter().collect()
    }
}

impl std::fmt::Display for FlagSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_check_matches_spec_scenario() {
        let flags = FlagSet::parse("1A3V");
        assert!(flags.has_all("1V"));
        assert!(!flags.has_all("G"));
    }

    #[test]
    fn add_and_remove_are_idempotent() {
        let mut flags = FlagSet::parse("A");
        flags.add("AB");
        assert_eq!(flags.as_string(), "AB");
        flags.remove("A");
        assert_eq!(flags.as_string(), "B");
        flags.remove("Z");
        assert_eq!(flags.as_string(), "B");
    }

    #[test]
    fn canonical_form_is_sorted_and_deduped() {
        let flags = FlagSet::parse("VA1A");
        assert_eq!(flags.as_string(), "1AV");
    }
}
