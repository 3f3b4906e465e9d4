//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Mimetree.
//
// Mimetree is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mimetree is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mimetree. If not, see <http://www.gnu.org/licenses/>.


//! RFC 2047 "encoded words" in header text.

use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::Regex;

use super::charset::CharsetRegistry;
use super::quoted_printable::qp_decode;

lazy_static! {
    static ref ENCODED_WORD: Regex =
        Regex::new(r"=\?([!->@-~]*)\?([!->@-~]*)\?([!->@-~]*)\?=").unwrap();
}

/// The most input bytes placed in a single encoded word we generate. 45 bytes
/// become 60 base64 characters, which with the `=?utf-8?b?...?=` wrapper stays
/// under the 75-character limit of RFC 2047.
const MAX_WORD_INPUT: usize = 45;

/// Test if `word` (in its entirety) is an RFC 2047 "encoded word".
///
/// If it is, decode it and return its decoded value.
///
/// Returns `None` if it is not an encoded word or if it could not be decoded.
pub fn ew_decode(word: &str, charsets: &CharsetRegistry) -> Option<String> {
    let captures = ENCODED_WORD.captures(word)?;
    let whole = captures.get(0)?;
    if 0 != whole.start() || word.len() != whole.end() {
        return None;
    }

    decode_parts(
        captures.get(1)?.as_str(),
        captures.get(2)?.as_str(),
        captures.get(3)?.as_str(),
        charsets,
    )
}

// RFC 2047 specifies the maximum length of an encoded word as 75 characters.
// Plenty of agents produce longer ones and other readers accept them, so no
// limit is enforced here.
fn decode_parts(
    charset: &str,
    transfer_encoding: &str,
    content: &str,
    charsets: &CharsetRegistry,
) -> Option<String> {
    let content = decode_xfer(transfer_encoding, content.as_bytes())?;
    charsets.decode(charset, &content).ok()
}

fn decode_xfer(xfer: &str, content: &[u8]) -> Option<Vec<u8>> {
    match xfer {
        "q" | "Q" => {
            // _ in the content (before transfer decoding) stands for ASCII
            // space regardless of charset
            let content = content
                .iter()
                .map(|&b| if b'_' == b { b' ' } else { b })
                .collect::<Vec<u8>>();
            Some(qp_decode(&content).0.into_owned())
        },
        "b" | "B" => base64::decode(content).ok().or_else(|| {
            let mut end = content.len();
            while end > 0 && b'=' == content[end - 1] {
                end -= 1;
            }
            base64::decode_config(&content[..end], base64::STANDARD_NO_PAD)
                .ok()
        }),
        _ => None,
    }
}

/// Decodes every encoded word found in `text`.
///
/// Linear whitespace between two adjacent encoded words is deleted. Words
/// which cannot be decoded (bad syntax, unknown charset) are left as they
/// are.
pub fn decode_text<'a>(
    text: &'a str,
    charsets: &CharsetRegistry,
) -> Cow<'a, str> {
    if !text.contains("=?") {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut last_end = 0;
    let mut last_was_encoded = false;

    for captures in ENCODED_WORD.captures_iter(text) {
        let whole = match captures.get(0) {
            Some(m) => m,
            None => continue,
        };

        let decoded = match (captures.get(1), captures.get(2), captures.get(3))
        {
            (Some(c), Some(x), Some(t)) => {
                decode_parts(c.as_str(), x.as_str(), t.as_str(), charsets)
            },
            _ => None,
        };

        let between = &text[last_end..whole.start()];
        match decoded {
            Some(decoded) => {
                let skip_between = last_was_encoded
                    && between.bytes().all(|b| b' ' == b || b'\t' == b);
                if !skip_between {
                    out.push_str(between);
                }
                out.push_str(&decoded);
                last_was_encoded = true;
            },

            None => {
                log::debug!("Leaving undecodable word {:?}", whole.as_str());
                out.push_str(between);
                out.push_str(whole.as_str());
                last_was_encoded = false;
            },
        }

        last_end = whole.end();
    }

    out.push_str(&text[last_end..]);
    Cow::Owned(out)
}

/// Whether `text` must be encoded to be placed in a header.
///
/// Text needs encoding if it contains anything other than printable ASCII,
/// space, and tab, or if it contains something a reader could mistake for an
/// encoded word.
pub fn needs_encoding(text: &str) -> bool {
    text.bytes()
        .any(|b| !(b' '..=b'~').contains(&b) && b'\t' != b)
        || text.contains("=?")
}

/// Encodes `text` for use in a header if `needs_encoding()` says it must be.
///
/// The result is a sequence of space-separated base64 UTF-8 encoded words,
/// each holding whole characters.
pub fn encode_text(text: &str) -> Cow<'_, str> {
    if !needs_encoding(text) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() * 2);
    let mut rest = text;
    while !rest.is_empty() {
        let mut end = rest.len().min(MAX_WORD_INPUT);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        // A single character is at most 4 bytes, so this only happens if
        // MAX_WORD_INPUT is absurdly small.
        if 0 == end {
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }

        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str("=?utf-8?b?");
        out.push_str(&base64::encode(&rest[..end]));
        out.push_str("?=");
        rest = &rest[end..];
    }

    Cow::Owned(out)
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn ew(word: &str) -> Option<String> {
        ew_decode(word, &CharsetRegistry::extended())
    }

    #[test]
    fn test_ew_decode() {
        assert_eq!(None, ew("hello world"));
        assert_eq!(None, ew("x =?US-ASCII?Q?Keith_Moore?="));

        // Examples from RFC 2047
        assert_eq!(
            Some("Keith Moore".to_owned()),
            ew("=?US-ASCII?Q?Keith_Moore?=")
        );
        assert_eq!(
            Some("Keld Jørn Simonsen".to_owned()),
            ew("=?ISO-8859-1?Q?Keld_J=F8rn_Simonsen?=")
        );
        assert_eq!(Some("André".to_owned()), ew("=?ISO-8859-1?Q?Andr=E9?="));
        assert_eq!(
            Some("If you can read this yo".to_owned()),
            ew("=?ISO-8859-1?B?SWYgeW91IGNhbiByZWFkIHRoaXMgeW8=?=")
        );
        assert_eq!(
            Some("u understand the example.".to_owned()),
            ew("=?ISO-8859-2?B?dSB1bmRlcnN0YW5kIHRoZSBleGFtcGxlLg==?=")
        );
        assert_eq!(
            Some("םולש ןב ילטפנ".to_owned()),
            ew("=?iso-8859-8?b?7eXs+SDv4SDp7Oj08A==?=")
        );

        // Missing and excess padding
        assert_eq!(Some("hi".to_owned()), ew("=?utf-8?b?aGk?="));
        assert_eq!(Some("hi".to_owned()), ew("=?utf-8?b?aGk==?="));
        // Language suffix
        assert_eq!(Some("hi".to_owned()), ew("=?us-ascii*en?q?hi?="));
        // Underscore is literal in B encoding
        assert_eq!(Some("a_b".to_owned()), ew("=?utf-8?b?YV9i?="));
    }

    #[test]
    fn decode_runs_of_words() {
        let charsets = CharsetRegistry::extended();
        assert_eq!(
            "(ab)",
            decode_text("(=?ISO-8859-1?Q?a?= =?ISO-8859-1?Q?b?=)", &charsets)
        );
        assert_eq!(
            "(a b)",
            decode_text("(=?ISO-8859-1?Q?a?= b)", &charsets)
        );
        assert_eq!(
            "Hello there",
            decode_text("Hello =?utf-8?q?there?=", &charsets)
        );
        assert_eq!(
            "=?x-bogus?q?a?= b",
            decode_text("=?x-bogus?q?a?= =?utf-8?q?b?=", &charsets)
        );
        assert_eq!("plain", decode_text("plain", &charsets));
    }

    #[test]
    fn encode_only_when_needed() {
        assert_eq!("Hello\tWorld", encode_text("Hello\tWorld"));
        assert_eq!("=?utf-8?b?w6k=?=", encode_text("é"));
        assert_eq!("=?utf-8?b?PT8=?=", encode_text("=?"));

        let long = "ü".repeat(40);
        let encoded = encode_text(&long);
        for word in encoded.split(' ') {
            assert!(word.len() <= 75, "{:?} too long", word);
        }
        assert_eq!(
            long,
            decode_text(&encoded, &CharsetRegistry::default())
        );
    }

    proptest! {
        #[test]
        fn ew_decode_never_panics(s in r"=\?.*\?.*\?.*\?=") {
            ew(&s);
        }

        #[test]
        fn encoded_text_decodes_to_original(s in "\\PC*") {
            let encoded = encode_text(&s);
            prop_assert_eq!(
                &s,
                &decode_text(&encoded, &CharsetRegistry::default())
            );
        }
    }
}
