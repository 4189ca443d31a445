// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Control-channel reply formatting (spec.md §6): `NNN text` single-line
//! replies, and `NNN-text` continuations terminated by a final `NNN text`
//! line.

use std::io::Write;

use crate::error::Error;

/// Sends a single-line reply.
pub fn send(writer: &mut impl Write, code: u16, msg: &str) -> Result<(), Error> {
    writer.write_all(format!("{code} {msg}\r\n").as_bytes()).map_err(|e| Error::Network(e.to_string()))
}

/// Sends a multi-line reply: every line in `lines` as a `NNN-` dash
/// continuation, then `final_msg` as the terminating `NNN ` line.
pub fn send_multi(writer: &mut impl Write, code: u16, lines: &[String], final_msg: &str) -> Result<(), Error> {
    for line in lines {
        writer.write_all(format!("{code}-{line}\r\n").as_bytes()).map_err(|e| Error::Network(e.to_string()))?;
    }
    send(writer, code, final_msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_uses_space_separator() {
        let mut buf = Vec::new();
        send(&mut buf, 220, "ironftpd ready").unwrap();
        assert_eq!(buf, b"220 ironftpd ready\r\n");
    }

    #[test]
    fn multi_line_dashes_continuations() {
        let mut buf = Vec::new();
        send_multi(&mut buf, 553, &["XDUPE".to_string(), "owned by alice".to_string()], "File exists").unwrap();
        assert_eq!(buf, b"553-XDUPE\r\n553-owned by alice\r\n553 File exists\r\n");
    }
}
