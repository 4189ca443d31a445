// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Error kinds shared across the core (spec.md §7).
//!
//! Five kinds propagate as [`Error`]; a disjoint set of flow signals
//! ([`Flow`]) never reach a client directly and instead drive the
//! transfer engine's post-transfer dispatch.

use std::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The five error kinds a handler or cache operation can surface.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// OS failure from I/O; `errno` is preserved for logging/diagnosis.
    #[error("system error ({errno}): {message}")]
    System {
        /// The underlying `errno` value, when known.
        errno: i32,
        /// Human-readable description.
        message: String,
    },
    /// Malformed input that fails a validator.
    #[error("validation error: {0}")]
    Validation(String),
    /// Cache-level invariant violation (e.g. no such user).
    #[error("runtime error: {0}")]
    Runtime(String),
    /// Control or data channel failure.
    #[error("network error: {0}")]
    Network(String),
    /// Protocol-level violation (bad sequence, unsupported option).
    #[error("protocol error: {0}")]
    Protocol(String),
    /// A transfer ended early in a way that must still surface to stats
    /// and credit accounting as "aborted" rather than "failed".
    #[error("transfer aborted: {0}")]
    AbortedTransfer(String),
}

impl Error {
    /// Wraps a raw OS error together with a human message.
    pub fn system(errno: i32, message: impl Into<String>) -> Self {
        Error::System { errno, message: message.into() }
    }

    /// The FTP reply code this error would normally translate to, when a
    /// handler has not already produced a more specific reply.
    pub fn default_reply_code(&self) -> u16 {
        match self {
            Error::System { .. } => 451,
            Error::Validation(_) => 501,
            Error::Runtime(_) => 550,
            Error::Network(_) => 426,
            Error::Protocol(_) => 500,
            Error::AbortedTransfer(_) => 426,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::system(e.raw_os_error().unwrap_or(0), e.to_string())
    }
}

/// Flow-control signals raised inside the transfer engine. These never
/// reach a client as-is; they drive the post-transfer state machine
/// described in spec.md §4.3 and §9 ("exceptions used as flow control").
#[derive(Debug)]
pub enum Flow {
    /// The data connection or sink ended cleanly (EOF on the socket).
    EndOfStream,
    /// The transfer was cut short by client action or `SITE KICK`.
    TransferAborted,
    /// The instantaneous speed dropped below the configured floor for
    /// longer than the grace window.
    MinimumSpeed {
        /// Observed speed in bytes/sec.
        speed: f64,
        /// Configured floor in bytes/sec.
        limit: f64,
    },
    /// A reply has already been sent; the caller must not run the
    /// post-transfer hook or emit a second reply.
    NoPostScript,
    /// An error severe enough that the owning session must terminate;
    /// wraps the original error for logging.
    Control(Box<Error>),
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::EndOfStream => write!(f, "end of stream"),
            Flow::TransferAborted => write!(f, "transfer aborted"),
            Flow::MinimumSpeed { speed, limit } => {
                write!(f, "speed {speed:.1} B/s below floor {limit:.1} B/s")
            },
            Flow::NoPostScript => write!(f, "no post-script"),
            Flow::Control(e) => write!(f, "control error: {e}"),
        }
    }
}

impl std::error::Error for Flow {}
