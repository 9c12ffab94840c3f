// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `text` module provides UTF-8 aware string helpers.

/// Default delimiter set for [`extract_first_token`].
const DEFAULT_DELIMITERS: &[&str] = &[";", "/", ",", " - "];

/// Truncate a string to at most `max_bytes` bytes without splitting a multi-byte sequence.
pub fn utf8_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Return the prefix of `s` before the first occurrence of any delimiter, right-trimmed.
///
/// The default delimiter set is `;`, `/`, `,`, and the literal ` - `.
pub fn extract_first_token<'a>(s: &'a str, delimiters: Option<&[&str]>) -> &'a str {
    let delimiters = delimiters.unwrap_or(DEFAULT_DELIMITERS);

    let mut end = s.len();
    for delim in delimiters {
        if delim.is_empty() {
            continue;
        }
        if let Some(pos) = s.find(delim) {
            end = end.min(pos);
        }
    }

    s[..end].trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_utf8_truncate() {
        assert_eq!(utf8_truncate("hello", 10), "hello");
        assert_eq!(utf8_truncate("hello", 3), "hel");
        assert_eq!(utf8_truncate("héllo", 2), "h");
        assert_eq!(utf8_truncate("héllo", 3), "hé");
        assert_eq!(utf8_truncate("日本語", 4), "日");
        assert_eq!(utf8_truncate("日本語", 2), "");
    }

    #[test]
    fn verify_extract_first_token() {
        assert_eq!(extract_first_token("Davis; Evans", None), "Davis");
        assert_eq!(extract_first_token("AC/DC", None), "AC");
        assert_eq!(extract_first_token("One, Two", None), "One");
        assert_eq!(extract_first_token("Artist - Title", None), "Artist");
        assert_eq!(extract_first_token("Plain", None), "Plain");
        assert_eq!(extract_first_token("", None), "");
        // A hyphen without surrounding spaces is not a delimiter.
        assert_eq!(extract_first_token("Jean-Luc", None), "Jean-Luc");
        // Custom delimiter sets override the default.
        assert_eq!(extract_first_token("a|b;c", Some(&["|"])), "a");
    }
}
