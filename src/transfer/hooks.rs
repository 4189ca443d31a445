// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Pre/post-transfer hooks (spec.md §4.3 steps 3 and 12): external
//! programs invoked with positional arguments. A missing hook command
//! is not an error; it simply means the step contributes nothing.

use std::process::Command;

use crate::cfg::config::HooksConfig;

/// Runs the pre-upload hook, if configured, returning its exit code.
/// `None` (no hook configured) behaves as exit code `0` per spec.md
/// step 3: "on non-zero exit, skip remainder silently".
pub fn run_pre_upload(hooks: &HooksConfig, vpath: &str, section: &str) -> i32 {
    run(hooks.pre_upload.as_deref(), &[vpath, section])
}

/// Runs the post-upload hook with `(path, crc-hex, speed, section)`
/// (spec.md step 12).
pub fn run_post_upload(hooks: &HooksConfig, vpath: &str, crc_hex: &str, speed: f64, section: &str) -> i32 {
    run(hooks.post_upload.as_deref(), &[vpath, crc_hex, &format!("{speed:.0}"), section])
}

/// Runs the post-download hook with `(path, speed, section)`.
pub fn run_post_download(hooks: &HooksConfig, vpath: &str, speed: f64, section: &str) -> i32 {
    run(hooks.post_download.as_deref(), &[vpath, &format!("{speed:.0}"), section])
}

fn run(cmd: Option<&str>, args: &[&str]) -> i32 {
    match cmd {
        None => 0,
        Some(program) => Command::new(program)
            .args(args)
            .status()
            .map(|status| status.code().unwrap_or(-1))
            .unwrap_or(-1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_hook_reports_success() {
        let hooks = HooksConfig::default();
        assert_eq!(run_pre_upload(&hooks, "/f", ""), 0);
        assert_eq!(run_post_upload(&hooks, "/f", "000000", 0.0, ""), 0);
    }

    #[test]
    fn missing_program_reports_failure_not_panic() {
        let hooks = HooksConfig { pre_upload: Some("/no/such/program-ironftpd-test".into()), ..Default::default() };
        assert_eq!(run_pre_upload(&hooks, "/f", ""), -1);
    }
}
