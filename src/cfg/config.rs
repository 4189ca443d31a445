// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! On-disk configuration (spec.md §9 "Global singletons"; SPEC_FULL §2
//! "Configuration"). Parsed once at startup (or on `SITE RELOAD`) into a
//! `Config` tree and handed to the listener as an `Arc` snapshot; nothing
//! downstream mutates it in place.

use std::{fs, net::IpAddr, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

/// Top-level configuration tree, one YAML document per process.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Listening endpoints and TLS.
    pub listen: ListenConfig,
    /// Default quotas applied to newly created users.
    pub users: UserDefaults,
    /// Path-glob sections governing ratio/credits/stats.
    #[serde(default)]
    pub sections: Vec<SectionConfig>,
    /// Ordered `SITE` command ACL rules.
    #[serde(default)]
    pub acl: Vec<AclRule>,
    /// Transfer-engine tuning (CRC masks, ASCII globs, speed floor).
    pub transfer: TransferConfig,
    /// Process-wide runtime limits.
    pub runtime: RuntimeConfig,
    /// External pre/post-transfer hook commands.
    #[serde(default)]
    pub hooks: HooksConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    /// One or more IPs to bind; a listener is opened per IP (spec.md §4.1).
    pub ips: Vec<IpAddr>,
    pub port: u16,
    /// Path to a PEM certificate/key pair; absent disables TLS entirely.
    #[serde(default)]
    pub tls_cert: Option<String>,
    #[serde(default)]
    pub tls_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserDefaults {
    #[serde(rename = "weeklyAllotment", default)]
    pub weekly_allotment_kb: i64,
    #[serde(rename = "idleTime", default = "default_idle_time")]
    pub idle_time_secs: i64,
    #[serde(rename = "maxDownSpeed", default)]
    pub max_down_speed: i64,
    #[serde(rename = "maxUpSpeed", default)]
    pub max_up_speed: i64,
    #[serde(rename = "maxSimDown", default = "default_unlimited_slots")]
    pub max_sim_down: i32,
    #[serde(rename = "maxSimUp", default = "default_unlimited_slots")]
    pub max_sim_up: i32,
    #[serde(rename = "numLogins", default = "default_unlimited_slots")]
    pub num_logins: i32,
    #[serde(rename = "defaultRatio", default = "default_ratio")]
    pub default_ratio: i32,
}

fn default_idle_time() -> i64 {
    900
}

fn default_unlimited_slots() -> i32 {
    -1
}

fn default_ratio() -> i32 {
    3
}

/// A path-glob governed scope: ratio overrides, credit isolation, stats
/// bucket naming (GLOSSARY "Section").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SectionConfig {
    pub name: String,
    #[serde(rename = "pathGlob")]
    pub path_glob: String,
    #[serde(rename = "separateCredits", default)]
    pub separate_credits: bool,
    #[serde(rename = "ratio")]
    pub ratio: Option<i32>,
    #[serde(rename = "noStats", default)]
    pub no_stats: bool,
    /// Forbids `TYPE A` uploads into this section (spec.md §4.3 step 5).
    #[serde(rename = "asciiRestricted", default)]
    pub ascii_restricted: bool,
}

/// One `(keyword, allow/deny, expr)` rule consumed by `AllowSiteCmd`
/// (spec.md §4.6); first match wins, default deny.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AclRule {
    pub keyword: String,
    pub allow: bool,
    /// A flag expression (`"1M"`), a `=groupname` expression, or a bare
    /// username; evaluated by [`crate::acl::filter::allow_site_cmd`].
    pub expr: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferConfig {
    /// Wildcards selecting paths that get a CRC32 computed on upload.
    #[serde(rename = "calcCrc", default)]
    pub calc_crc: Vec<String>,
    /// Wildcards selecting paths transcoded CRLF<->LF under `TYPE A`.
    #[serde(rename = "asciiGlobs", default)]
    pub ascii_globs: Vec<String>,
    /// Floor, in bytes/sec, below which a stalled transfer aborts.
    #[serde(rename = "minSpeed", default)]
    pub min_speed: f64,
    /// Grace window, in seconds, before a sub-floor speed aborts.
    #[serde(rename = "minSpeedGraceSecs", default = "default_grace")]
    pub min_speed_grace_secs: u64,
    /// Background (worker-thread) CRC computation instead of inline.
    #[serde(rename = "crcBackground", default)]
    pub crc_background: bool,
    #[serde(rename = "maxSimUpGlobal", default = "default_unlimited_slots")]
    pub max_sim_up_global: i32,
    #[serde(rename = "maxSimDownGlobal", default = "default_unlimited_slots")]
    pub max_sim_down_global: i32,
}

fn default_grace() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    #[serde(rename = "dataDir")]
    pub data_dir: String,
    #[serde(rename = "programFullname", default = "default_program_name")]
    pub program_fullname: String,
    #[serde(rename = "maxSessions", default)]
    pub max_sessions: usize,
}

fn default_program_name() -> String {
    "ironftpd".to_string()
}

/// External pre/post-transfer hook commands (spec.md §4.3 steps 3 and
/// 12). Each is an external program path invoked with positional
/// arguments; absent means the hook step is skipped (pre: treated as
/// exit code 0, post: nothing extra to report).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HooksConfig {
    #[serde(rename = "preUpload", default)]
    pub pre_upload: Option<String>,
    #[serde(rename = "postUpload", default)]
    pub post_upload: Option<String>,
    #[serde(rename = "postDownload", default)]
    pub post_download: Option<String>,
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates cross-field invariants and fills in derived defaults.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(!self.listen.ips.is_empty(), "listen.ips must not be empty");
        ensure!(self.listen.port != 0, "listen.port must be nonzero");
        ensure!(
            self.listen.tls_cert.is_some() == self.listen.tls_key.is_some(),
            "tls_cert and tls_key must be set together"
        );

        for section in &mut self.sections {
            ensure!(!section.path_glob.is_empty(), "section path_glob must not be empty");
            if let Some(r) = section.ratio {
                ensure!(r >= 0, "section ratio must be >= 0");
            }
        }

        ensure!(
            self.transfer.min_speed_grace_secs > 0,
            "transfer.min_speed_grace_secs must be > 0"
        );

        if self.runtime.program_fullname.is_empty() {
            self.runtime.program_fullname = default_program_name();
        }

        Ok(())
    }

    /// The first configured section whose glob matches `vpath`, or `None`
    /// for the default (unsectioned) scope.
    pub fn section_for(&self, vpath: &str) -> Option<&SectionConfig> {
        self.sections
            .iter()
            .find(|s| crate::util::wildcard::wildcard_match(&s.path_glob, vpath))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            listen: ListenConfig {
                ips: vec!["0.0.0.0".parse().unwrap()],
                port: 2121,
                tls_cert: None,
                tls_key: None,
            },
            users: UserDefaults {
                weekly_allotment_kb: 0,
                idle_time_secs: 900,
                max_down_speed: 0,
                max_up_speed: 0,
                max_sim_down: -1,
                max_sim_up: -1,
                num_logins: -1,
                default_ratio: 3,
            },
            sections: vec![SectionConfig {
                name: "incoming".into(),
                path_glob: "/incoming/*".into(),
                separate_credits: true,
                ratio: Some(0),
                no_stats: false,
                ascii_restricted: false,
            }],
            acl: vec![],
            transfer: TransferConfig {
                calc_crc: vec!["*.zip".into()],
                ascii_globs: vec!["*.txt".into()],
                min_speed: 0.0,
                min_speed_grace_secs: 10,
                crc_background: false,
                max_sim_up_global: -1,
                max_sim_down_global: -1,
            },
            runtime: RuntimeConfig {
                data_dir: "/tmp/ironftpd".into(),
                program_fullname: "ironftpd".into(),
                max_sessions: 0,
            },
            hooks: HooksConfig::default(),
        }
    }

    #[test]
    fn validates_clean_config() {
        let mut cfg = sample();
        cfg.validate_and_normalize().unwrap();
    }

    #[test]
    fn rejects_empty_listen_ips() {
        let mut cfg = sample();
        cfg.listen.ips.clear();
        assert!(cfg.validate_and_normalize().is_err());
    }

    #[test]
    fn section_for_matches_glob() {
        let cfg = sample();
        let s = cfg.section_for("/incoming/foo.zip").unwrap();
        assert_eq!(s.name, "incoming");
        assert!(cfg.section_for("/pub/foo.zip").is_none());
    }
}
