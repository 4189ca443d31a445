// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Command-line argument handling, mirroring the teacher's
//! `resolve_config_path` plus a small flag parser for the entry point.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Resolves a config path relative to the current working directory and
/// canonicalizes it, so relative paths behave the same regardless of
/// where the process was launched from.
pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let p = Path::new(rel);

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    let canon = abs
        .canonicalize()
        .with_context(|| format!("failed to canonicalize path {abs:?}"))?;

    Ok(canon)
}

/// Parsed command-line arguments for the `ironftpd` binary.
#[derive(Debug, Clone)]
pub struct Args {
    /// Path to the YAML configuration file.
    pub config: String,
    /// Stay attached to the controlling terminal instead of daemonizing.
    pub foreground: bool,
}

impl Args {
    /// Parses `argv[1..]`. Recognizes `--config <path>` (default
    /// `ironftpd.yaml`) and `--foreground`.
    pub fn parse<I: IntoIterator<Item = String>>(argv: I) -> Result<Self> {
        let mut config = "ironftpd.yaml".to_string();
        let mut foreground = false;

        let mut it = argv.into_iter();
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--config" => {
                    config = it.next().context("--config requires a path argument")?;
                },
                "--foreground" => foreground = true,
                other => bail!("unrecognized argument: {other}"),
            }
        }

        Ok(Self { config, foreground })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_args() {
        let args = Args::parse(Vec::<String>::new()).unwrap();
        assert_eq!(args.config, "ironftpd.yaml");
        assert!(!args.foreground);
    }

    #[test]
    fn parses_config_and_foreground() {
        let args = Args::parse(
            ["--config", "/etc/ironftpd.yaml", "--foreground"]
                .into_iter()
                .map(String::from),
        )
        .unwrap();
        assert_eq!(args.config, "/etc/ironftpd.yaml");
        assert!(args.foreground);
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(Args::parse(["--bogus".to_string()]).is_err());
    }
}
