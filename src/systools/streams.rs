// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Console stream helpers

use once_cell::sync::Lazy;
use regex::bytes::Regex;

/// 7-bit C1 escape sequences, CSI included
///
/// 8-bit sequences are left alone: they collide with multi-byte UTF-8
/// characters such as the box drawing ones used by progress bars.
static ANSI_ESCAPE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").ok());

/// Remove ANSI sequences from a stream
#[must_use]
pub fn filter_ansi(stream: &[u8]) -> Vec<u8> {
    match ANSI_ESCAPE.as_ref() {
        Some(pattern) => pattern.replace_all(stream, &b""[..]).into_owned(),
        None => stream.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_ansi() {
        assert_eq!(filter_ansi(b"\x1b[33mhello\x1b[0m"), b"hello".to_vec());
        assert_eq!(filter_ansi(b"\x1b[1;31;40mbold\x1b[m!"), b"bold!".to_vec());
    }

    #[test]
    fn test_box_drawing_survives() {
        let content = "\u{2501}".as_bytes();
        assert_eq!(filter_ansi(content), content.to_vec());
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(filter_ansi(b"no colors here"), b"no colors here".to_vec());
    }
}
