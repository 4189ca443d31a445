// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Virtual-path resolution. Every transfer and directory verb operates
//! on a virtual path rooted at `/`; this module maps that virtual path
//! onto `runtime.dataDir` on the real filesystem, the way the session's
//! `homeDir` + `cwd` pair does in spec.md §3 without ever trusting a
//! client-supplied `..` to escape the configured root.

use std::path::{Path, PathBuf};

/// Joins `cwd` (an already-normalized absolute virtual path) with a
/// client-supplied argument, producing a new normalized virtual path.
/// `..` components above the root are clamped rather than rejected,
/// mirroring a chroot's behavior.
pub fn normalize(cwd: &str, arg: &str) -> String {
    let start: Vec<&str> = if arg.starts_with('/') {
        Vec::new()
    } else {
        cwd.split('/').filter(|s| !s.is_empty()).collect()
    };
    let mut stack = start;
    for part in arg.split('/') {
        match part {
            "" | "." => {},
            ".." => {
                stack.pop();
            },
            other => stack.push(other),
        }
    }
    format!("/{}", stack.join("/"))
}

/// Maps a normalized virtual path onto the real filesystem under
/// `data_dir`.
pub fn to_physical(data_dir: &str, vpath: &str) -> PathBuf {
    let trimmed = vpath.trim_start_matches('/');
    if trimmed.is_empty() { PathBuf::from(data_dir) } else { Path::new(data_dir).join(trimmed) }
}

/// The basename (final path component) of a virtual path.
pub fn basename(vpath: &str) -> &str {
    vpath.rsplit('/').next().unwrap_or(vpath)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_join_stays_under_cwd() {
        assert_eq!(normalize("/incoming", "foo.zip"), "/incoming/foo.zip");
    }

    #[test]
    fn absolute_argument_replaces_cwd() {
        assert_eq!(normalize("/incoming", "/pub/foo.zip"), "/pub/foo.zip");
    }

    #[test]
    fn dotdot_climbs_but_clamps_at_root() {
        assert_eq!(normalize("/a/b", ".."), "/a");
        assert_eq!(normalize("/", ".."), "/");
        assert_eq!(normalize("/a", "../../../../etc"), "/etc");
    }

    #[test]
    fn to_physical_joins_under_data_dir() {
        assert_eq!(to_physical("/srv/ftp", "/incoming/foo.zip"), PathBuf::from("/srv/ftp/incoming/foo.zip"));
        assert_eq!(to_physical("/srv/ftp", "/"), PathBuf::from("/srv/ftp"));
    }

    #[test]
    fn basename_extracts_final_component() {
        assert_eq!(basename("/a/b/c.txt"), "c.txt");
        assert_eq!(basename("c.txt"), "c.txt");
    }
}
