// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! CRC32 computation over an upload (spec.md §4.3 step 9), either
//! synchronous (folded into the read loop) or handed off to a worker
//! thread when `crcBackground` is configured.

use std::sync::mpsc::{Receiver, Sender, channel};

use crc::{CRC_32_ISO_HDLC, Crc};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Either folds bytes into a running digest inline, or ships them to a
/// background worker thread that does the folding off the transfer's
/// hot path.
pub enum CrcSink {
    Inline(crc::Digest<'static, u32>),
    Background { tx: Sender<Vec<u8>>, result: Receiver<u32> },
}

impl CrcSink {
    pub fn inline() -> Self {
        CrcSink::Inline(CRC32.digest())
    }

    /// Spawns a worker thread that folds chunks as they arrive and
    /// reports the final digest once the channel closes.
    pub fn background() -> Self {
        let (tx, rx) = channel::<Vec<u8>>();
        let (result_tx, result_rx) = channel::<u32>();
        std::thread::spawn(move || {
            let mut digest = CRC32.digest();
            while let Ok(chunk) = rx.recv() {
                digest.update(&chunk);
            }
            let _ = result_tx.send(digest.finalize());
        });
        CrcSink::Background { tx, result: result_rx }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        match self {
            CrcSink::Inline(digest) => digest.update(chunk),
            CrcSink::Background { tx, .. } => {
                let _ = tx.send(chunk.to_vec());
            },
        }
    }

    /// Finalizes the digest, waiting for the background worker if one
    /// was used.
    pub fn finalize(self) -> u32 {
        match self {
            CrcSink::Inline(digest) => digest.finalize(),
            CrcSink::Background { tx, result } => {
                drop(tx);
                result.recv().unwrap_or(0)
            },
        }
    }
}

/// Formats a CRC32 value the way a post-transfer hook expects it
/// (spec.md §4.3 step 12: "crc-hex or `000000`").
pub fn format_hex(crc: u32) -> String {
    format!("{crc:08X}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_and_background_agree() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut inline = CrcSink::inline();
        inline.update(data);
        let inline_crc = inline.finalize();

        let mut background = CrcSink::background();
        background.update(data);
        let background_crc = background.finalize();

        assert_eq!(inline_crc, background_crc);
    }

    #[test]
    fn format_hex_is_uppercase_8_digits() {
        assert_eq!(format_hex(0), "00000000");
        assert_eq!(format_hex(0xDEADBEEF), "DEADBEEF");
    }
}
