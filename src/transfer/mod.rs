// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Upload/download transfer engine (spec.md §4.3): offset/resume, ASCII
//! transcoding, CRC32, speed governor, pre/post hooks, dupe detection,
//! stats and credit posting.

/// ASCII<->binary transcoding.
pub mod ascii;
/// CRC32 computation, inline or background.
pub mod crc;
/// Data-connection establishment plan (PASV/PORT).
pub mod data_channel;
/// `RETR` pipeline.
pub mod download;
/// Pre/post-transfer hook invocation.
pub mod hooks;
/// Per-connection speed governor.
pub mod speed;
/// `STOR`/`APPE` pipeline.
pub mod upload;
/// Upload-owner tracking for the `STOR` dupe message.
pub mod owner;

use crate::cfg::config::SectionConfig;

/// `TYPE A`/`TYPE I` as negotiated by the session (spec.md §4.3 inputs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Ascii,
    Binary,
}

/// The resolved section governing a path: ratio, credit isolation, and
/// stats bucket naming (GLOSSARY "Section").
#[derive(Debug, Clone)]
pub struct SectionCtx {
    pub name: String,
    pub ratio_override: Option<i32>,
    pub separate_credits: bool,
    pub no_stats: bool,
    pub ascii_restricted: bool,
}

impl SectionCtx {
    pub fn default_section() -> Self {
        Self {
            name: String::new(),
            ratio_override: None,
            separate_credits: false,
            no_stats: false,
            ascii_restricted: false,
        }
    }

    pub fn from_config(cfg: Option<&SectionConfig>) -> Self {
        match cfg {
            None => Self::default_section(),
            Some(c) => Self {
                name: c.name.clone(),
                ratio_override: c.ratio,
                separate_credits: c.separate_credits,
                no_stats: c.no_stats,
                ascii_restricted: c.ascii_restricted,
            },
        }
    }

    /// The credit bucket key this section's transfers post to (spec.md
    /// §3: only the section's own counter is touched when it has
    /// separate credits, otherwise the default bucket).
    pub fn credit_key(&self) -> &str {
        if self.separate_credits { &self.name } else { "" }
    }

    /// The stats bucket name, or `None` when the path is configured
    /// `nostats`.
    pub fn stats_key(&self) -> Option<&str> {
        if self.no_stats { None } else { Some(if self.name.is_empty() { "default" } else { &self.name }) }
    }
}

/// How a transfer ended, driving the post-transfer dispatch (spec.md §9
/// "re-express as a local tagged outcome").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferResult {
    Completed,
    AbortedByClient,
    AbortedByPolicy,
    IoFailed,
}

/// Final accounting for a completed or aborted transfer.
#[derive(Debug, Clone)]
pub struct TransferStats {
    pub bytes: u64,
    pub duration_secs: f64,
    pub crc_hex: String,
    pub result: TransferResult,
}

impl TransferStats {
    pub fn speed_bytes_per_sec(&self) -> f64 {
        if self.duration_secs > 0.0 { self.bytes as f64 / self.duration_secs } else { self.bytes as f64 }
    }
}
