// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! ASCII<->binary transcoding (spec.md §4.3 step 9: "Decode ASCII if
//! applicable (CRLF->LF in-place, into a side buffer)").

/// Decodes an incoming ASCII-mode chunk: CRLF -> LF. A trailing lone
/// `\r` is held back by the caller across chunk boundaries via
/// `pending_cr` so a split `\r\n` is never mis-decoded as two lines.
pub fn decode_crlf_to_lf(input: &[u8], pending_cr: &mut bool, out: &mut Vec<u8>) {
    out.clear();
    let mut iter = input.iter().peekable();
    if *pending_cr {
        match iter.peek() {
            Some(&&b'\n') => {
                out.push(b'\n');
                iter.next();
            },
            _ => out.push(b'\r'),
        }
        *pending_cr = false;
    }
    while let Some(&b) = iter.next() {
        if b == b'\r' {
            match iter.peek() {
                Some(&&b'\n') => {
                    out.push(b'\n');
                    iter.next();
                },
                Some(_) => out.push(b'\r'),
                None => {
                    *pending_cr = true;
                },
            }
        } else {
            out.push(b);
        }
    }
}

/// Encodes an outgoing ASCII-mode chunk: LF -> CRLF.
pub fn encode_lf_to_crlf(input: &[u8], out: &mut Vec<u8>) {
    out.clear();
    for &b in input {
        if b == b'\n' {
            out.push(b'\r');
        }
        out.push(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_simple_crlf() {
        let mut pending = false;
        let mut out = Vec::new();
        decode_crlf_to_lf(b"hello\r\nworld\r\n", &mut pending, &mut out);
        assert_eq!(out, b"hello\nworld\n");
        assert!(!pending);
    }

    #[test]
    fn decode_handles_split_crlf_across_chunks() {
        let mut pending = false;
        let mut out = Vec::new();
        decode_crlf_to_lf(b"hello\r", &mut pending, &mut out);
        assert_eq!(out, b"hello");
        assert!(pending);
        decode_crlf_to_lf(b"\nworld", &mut pending, &mut out);
        assert_eq!(out, b"\nworld");
        assert!(!pending);
    }

    #[test]
    fn lone_cr_not_followed_by_lf_is_preserved() {
        let mut pending = false;
        let mut out = Vec::new();
        decode_crlf_to_lf(b"a\rb", &mut pending, &mut out);
        assert_eq!(out, b"a\rb");
    }

    #[test]
    fn encode_round_trips_decode() {
        let original = b"line one\nline two\n";
        let mut crlf = Vec::new();
        encode_lf_to_crlf(original, &mut crlf);
        let mut pending = false;
        let mut back = Vec::new();
        decode_crlf_to_lf(&crlf, &mut pending, &mut back);
        assert_eq!(back, original);
    }
}
