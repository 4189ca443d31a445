// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Identifier types and the name validators spec.md §3 requires.

use crate::error::Error;

/// A user identifier. `-1` is the sentinel for "absent".
pub type UserID = i32;
/// A group identifier. `-1` is the sentinel for "absent".
pub type GroupID = i32;

/// The sentinel value for an absent user or group id.
pub const NO_ID: i32 = -1;

const MAX_NAME_LEN: usize = 32;

/// Validates a username: non-empty, `<= 32` chars, `[A-Za-z0-9_-]`, no
/// leading digit.
pub fn validate_username(name: &str) -> Result<(), Error> {
    validate_account_name(name, "username")
}

/// Validates a group name under the same grammar as usernames.
pub fn validate_groupname(name: &str) -> Result<(), Error> {
    validate_account_name(name, "groupname")
}

fn validate_account_name(name: &str, kind: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::Validation(format!("{kind} must not be empty")));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "{kind} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(Error::Validation(format!("{kind} must not start with a digit")));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(Error::Validation(format!(
            "{kind} may only contain letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}

/// Validates a tagline: 7-bit printable ASCII, no CR/LF.
pub fn validate_tagline(tagline: &str) -> Result<(), Error> {
    if !tagline.is_ascii() {
        return Err(Error::Validation("tagline must be 7-bit ASCII".into()));
    }
    if tagline.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err(Error::Validation("tagline must not contain CR/LF".into()));
    }
    if tagline.bytes().any(|b| b < 0x20 && b != 0) {
        return Err(Error::Validation("tagline must be printable".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_username() {
        assert!(validate_username("alice_1-2").is_ok());
    }

    #[test]
    fn rejects_leading_digit() {
        assert!(validate_username("1alice").is_err());
    }

    #[test]
    fn rejects_empty_and_long_names() {
        assert!(validate_username("").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
    }

    #[test]
    fn rejects_disallowed_characters() {
        assert!(validate_username("al ice").is_err());
        assert!(validate_groupname("grp!").is_err());
    }

    #[test]
    fn tagline_rejects_crlf() {
        assert!(validate_tagline("hello\r\nworld").is_err());
        assert!(validate_tagline("a fine tagline").is_ok());
    }
}
