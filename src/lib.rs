// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Core runtime for a multi-user file-transfer daemon: the session
//! dispatcher, the upload/download transfer engine, and the user/group
//! cache that every transfer touches.

/// Access-control and accounting state: users, groups, flags, IP masks.
pub mod acl;
/// Configuration, command-line parsing, and logging.
pub mod cfg;
/// Persistent-store proxy: the write-through boundary to the document store.
pub mod db;
/// Error and flow-control types shared across the core.
pub mod error;
/// Listener, session state machine, task queue, and command dispatch.
pub mod server;
/// Upload/download transfer engine: transcoding, CRC, speed control.
pub mod transfer;
/// Small standalone helpers: wall-clock/duration types, wildcard matching.
pub mod util;

pub use error::{Error, Result};
