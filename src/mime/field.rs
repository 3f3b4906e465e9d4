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


//! A single header field: a name, a decoded body, and optionally the raw bytes
//! the field was parsed from.

use std::borrow::Cow;
use std::convert::TryFrom;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::charset;
use super::encoded_word;
use super::split::Break;
use crate::support::error::Error;

/// The decoded form of a field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldBase {
    name: String,
    body: String,
}

impl FieldBase {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

/// The bytes a field was parsed from, exactly as read, including the line
/// break ending the field (if there was one).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raw {
    bytes: Vec<u8>,
    colon: usize,
}

impl Raw {
    /// Creates a new `Raw` from `bytes`, where `colon` is the index of the
    /// colon separating name from body.
    ///
    /// `colon` may equal the length of `bytes` if (and only if) there is no
    /// colon at all.
    pub fn new(bytes: Vec<u8>, colon: usize) -> Result<Self, Error> {
        let valid = match bytes.get(colon) {
            Some(&b) => b':' == b,
            None => {
                colon == bytes.len() && memchr::memchr(b':', &bytes).is_none()
            },
        };

        if valid {
            Ok(Raw { bytes, colon })
        } else {
            Err(Error::InvalidRaw(colon))
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn colon(&self) -> usize {
        self.colon
    }
}

/// One header field.
///
/// A field parsed from a message keeps its raw bytes, which are written back
/// verbatim as long as neither the name nor the body is changed. Changing
/// either discards them, so that the field is then folded and encoded anew.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    base: FieldBase,
    raw: Option<Raw>,
}

impl Field {
    /// Creates a new field with no raw bytes.
    pub fn new(
        name: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Self, Error> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Field {
            base: FieldBase {
                name,
                body: body.into(),
            },
            raw: None,
        })
    }

    /// Parses one logical field line, as produced by `split::split_fields`.
    ///
    /// The body is unfolded, trimmed, and has its encoded words decoded via
    /// the process-wide charset registry. A line without a colon is accepted:
    /// the whole line becomes the name and the body is empty.
    pub fn parse(bytes: &[u8]) -> Self {
        let colon =
            memchr::memchr(b':', bytes).unwrap_or_else(|| bytes.len());

        let (name, body) = if colon < bytes.len() {
            let name = String::from_utf8_lossy(&bytes[..colon]);
            let body = String::from_utf8_lossy(&bytes[colon + 1..]);
            let body = unfold(&body);
            let body = encoded_word::decode_text(
                body.trim(),
                &charset::registry(),
            )
            .into_owned();
            (name.trim().to_owned(), body)
        } else {
            let end = memchr::memchr2(b'\r', b'\n', bytes)
                .unwrap_or_else(|| bytes.len());
            let name = String::from_utf8_lossy(&bytes[..end]);
            (name.trim().to_owned(), String::new())
        };

        Field {
            base: FieldBase { name, body },
            raw: Some(Raw {
                bytes: bytes.to_vec(),
                colon,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn body(&self) -> &str {
        &self.base.body
    }

    pub fn base(&self) -> &FieldBase {
        &self.base
    }

    pub fn raw(&self) -> Option<&Raw> {
        self.raw.as_ref()
    }

    /// Renames the field, discarding its raw bytes.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), Error> {
        let name = name.into();
        validate_name(&name)?;
        self.base.name = name;
        self.raw = None;
        Ok(())
    }

    /// Replaces the decoded body, discarding the raw bytes.
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.base.body = body.into();
        self.raw = None;
    }

    /// Installs new raw bytes without changing the decoded form.
    pub fn set_raw(&mut self, raw: Raw) {
        self.raw = Some(raw);
    }

    /// Whether the name matches `name`, ignoring ASCII case.
    pub fn is(&self, name: &str) -> bool {
        self.base.name.eq_ignore_ascii_case(name)
    }

    /// Returns `Name: Body` with RFC 2047 encoding applied to the body, on a
    /// single line.
    pub fn string(&self) -> String {
        self.to_string()
    }

    /// Returns the bytes to write for this field, including the final line
    /// break.
    ///
    /// Raw bytes are returned verbatim if present. Otherwise, the field is
    /// encoded and folded according to `fold`.
    pub fn encoded(&self, lbr: Break, fold: &FoldEncoding) -> Cow<'_, [u8]> {
        if let Some(ref raw) = self.raw {
            return Cow::Borrowed(&raw.bytes);
        }

        let line = self.to_string();
        let mut out = fold.fold(&line, self.base.name.len() + 2, lbr);
        out.push_str(std::str::from_utf8(lbr.as_bytes()).unwrap_or("\r\n"));
        Cow::Owned(out.into_bytes())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.base.name,
            encoded_word::encode_text(&self.base.body)
        )
    }
}

fn validate_name(name: &str) -> Result<(), Error> {
    if name.is_empty() || name.contains(|c| ':' == c || '\r' == c || '\n' == c)
    {
        Err(Error::InvalidFieldName(name.to_owned()))
    } else {
        Ok(())
    }
}

/// Removes folding from `s`.
///
/// Each line break, together with any whitespace or further line breaks
/// directly after it, becomes a single space. Other whitespace, including
/// tabs, is left alone.
pub fn unfold(s: &str) -> Cow<'_, str> {
    if !s.contains(|c| '\r' == c || '\n' == c) {
        return Cow::Borrowed(s);
    }

    let mut unfolded = String::with_capacity(s.len());
    let mut is_unfolding = false;
    for ch in s.chars() {
        if is_unfolding {
            if ' ' == ch || '\t' == ch || '\r' == ch || '\n' == ch {
                continue;
            } else {
                is_unfolding = false;
                unfolded.push(ch);
            }
        } else if '\r' == ch || '\n' == ch {
            unfolded.push(' ');
            is_unfolding = true;
        } else {
            unfolded.push(ch);
        }
    }

    Cow::Owned(unfolded)
}

/// Controls how fields without raw bytes are folded on output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FoldEncodingConfig", into = "FoldEncodingConfig")]
pub struct FoldEncoding {
    indent: String,
    preferred: Option<usize>,
    forced: Option<usize>,
}

impl Default for FoldEncoding {
    fn default() -> Self {
        FoldEncoding {
            indent: " ".to_owned(),
            preferred: Some(78),
            forced: Some(998),
        }
    }
}

impl FoldEncoding {
    /// Creates a new fold encoding.
    ///
    /// `indent` must be 1 to 4 spaces or tabs. `preferred` is the width at
    /// which folding is attempted and must be at least 3. `forced` is the
    /// width beyond which lines are split even inside a word; it must be at
    /// least `preferred` and longer than `indent`. `None` means "do not fold"
    /// for either width.
    pub fn new(
        indent: impl Into<String>,
        preferred: Option<usize>,
        forced: Option<usize>,
    ) -> Result<Self, Error> {
        let indent = indent.into();
        if indent.is_empty() || indent.len() > 4 {
            return Err(Error::InvalidFoldEncoding(
                "indent must be 1 to 4 bytes",
            ));
        }
        if !indent.bytes().all(|b| b' ' == b || b'\t' == b) {
            return Err(Error::InvalidFoldEncoding(
                "indent must be spaces or tabs",
            ));
        }
        if preferred.map_or(false, |p| p < 3) {
            return Err(Error::InvalidFoldEncoding(
                "preferred length must be at least 3",
            ));
        }
        if let Some(forced) = forced {
            if preferred.map_or(false, |p| forced < p) {
                return Err(Error::InvalidFoldEncoding(
                    "forced length must be at least the preferred length",
                ));
            }
            if forced <= indent.len() {
                return Err(Error::InvalidFoldEncoding(
                    "forced length must exceed the indent",
                ));
            }
        }

        Ok(FoldEncoding {
            indent,
            preferred,
            forced,
        })
    }

    /// A fold encoding which never folds.
    pub fn never() -> Self {
        FoldEncoding {
            indent: " ".to_owned(),
            preferred: None,
            forced: None,
        }
    }

    pub fn indent(&self) -> &str {
        &self.indent
    }

    pub fn preferred(&self) -> Option<usize> {
        self.preferred
    }

    pub fn forced(&self) -> Option<usize> {
        self.forced
    }

    /// Folds `line`, which must not contain line breaks.
    ///
    /// `min_fold` is the first byte offset at which a fold or split is
    /// permitted on the first line; this keeps the field name and its colon
    /// together.
    ///
    /// A fold replaces a single space (one not directly followed by other
    /// whitespace) with `lbr` followed by the indent, so that `unfold`
    /// restores the original text. If a word is too long to fit within the
    /// forced width, it is split at exactly that width instead.
    pub fn fold(&self, line: &str, min_fold: usize, lbr: Break) -> String {
        let forced = self.forced.unwrap_or(usize::MAX);
        let preferred = self.preferred.unwrap_or(forced).min(forced);
        if usize::MAX == forced && usize::MAX == preferred {
            return line.to_owned();
        }

        let lbr = std::str::from_utf8(lbr.as_bytes()).unwrap_or("\r\n");
        let bytes = line.as_bytes();
        let mut out = String::with_capacity(line.len() + line.len() / 32);
        let mut start = 0;
        // Bytes already used on the current physical line
        let mut used = 0;
        // Lowest permitted fold offset on the current line
        let mut min = min_fold.max(1);

        loop {
            let rest = &line[start..];
            let fits = |budget: usize| used + rest.len() <= budget;
            if fits(preferred) {
                out.push_str(rest);
                break;
            }

            let is_fold_point = |k: usize| {
                k >= min
                    && b' ' == bytes[k]
                    && bytes
                        .get(k + 1)
                        .map_or(false, |&b| b' ' != b && b'\t' != b)
            };
            // The last index whose content fits in `budget`
            let limit = |budget: usize| {
                (start + budget.saturating_sub(used)).min(bytes.len())
            };

            let soft = (start..=limit(preferred).min(bytes.len() - 1))
                .rev()
                .find(|&k| is_fold_point(k))
                .or_else(|| {
                    (start..=limit(forced).min(bytes.len() - 1))
                        .find(|&k| is_fold_point(k))
                });

            let (end, resume) = if let Some(k) = soft {
                (k, k + 1)
            } else if fits(forced) {
                out.push_str(rest);
                break;
            } else {
                let mut end =
                    limit(forced).max(min).max(start + 1).min(bytes.len());
                while end < bytes.len() && !line.is_char_boundary(end) {
                    end -= 1;
                }
                if end <= start {
                    let first =
                        rest.chars().next().map_or(rest.len(), char::len_utf8);
                    end = start + first;
                }
                (end, end)
            };

            out.push_str(&line[start..end]);
            if resume >= bytes.len() {
                break;
            }
            out.push_str(lbr);
            out.push_str(&self.indent);
            used = self.indent.len();
            start = resume;
            min = start + 1;
        }

        out
    }
}

/// The serialised form of `FoldEncoding`, where 0 means "do not fold".
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
struct FoldEncodingConfig {
    /// The whitespace prefixed to continuation lines.
    indent: String,
    /// The width at which folding at whitespace is attempted.
    preferred: usize,
    /// The width beyond which words are split.
    forced: usize,
}

impl Default for FoldEncodingConfig {
    fn default() -> Self {
        FoldEncoding::default().into()
    }
}

impl TryFrom<FoldEncodingConfig> for FoldEncoding {
    type Error = Error;

    fn try_from(config: FoldEncodingConfig) -> Result<Self, Error> {
        let nonzero = |n: usize| if 0 == n { None } else { Some(n) };
        FoldEncoding::new(
            config.indent,
            nonzero(config.preferred),
            nonzero(config.forced),
        )
    }
}

impl From<FoldEncoding> for FoldEncodingConfig {
    fn from(fold: FoldEncoding) -> Self {
        FoldEncodingConfig {
            indent: fold.indent,
            preferred: fold.preferred.unwrap_or(0),
            forced: fold.forced.unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn fold(preferred: usize, forced: usize, line: &str) -> String {
        FoldEncoding::new(" ", Some(preferred), Some(forced))
            .unwrap()
            .fold(line, 0, Break::Lf)
    }

    #[test]
    fn parse_simple_field() {
        let field = Field::parse(b"Subject: test\n");
        assert_eq!("Subject", field.name());
        assert_eq!("test", field.body());
        assert_eq!(b"Subject: test\n", field.raw().unwrap().bytes());
        assert_eq!(7, field.raw().unwrap().colon());

        let field = Field::parse(b"X-Folded : one\r\n\ttwo\r\n   three \r\n");
        assert_eq!("X-Folded", field.name());
        assert_eq!("one two three", field.body());
    }

    #[test]
    fn parse_encoded_words() {
        let field = Field::parse(
            b"Subject: =?utf-8?Q?Andrew=2C_you=27ve_got_\
              Smart_Matches=E2=84=A2=21?=\n",
        );
        assert_eq!("Andrew, you've got Smart Matches™!", field.body());
    }

    #[test]
    fn parse_without_colon() {
        let field = Field::parse(b"Just some junk\r\n");
        assert_eq!("Just some junk", field.name());
        assert_eq!("", field.body());
        assert_eq!(16, field.raw().unwrap().colon());
    }

    #[test]
    fn mutation_discards_raw() {
        let mut field = Field::parse(b"Subject:   spaced\r\n");
        assert_eq!(
            b"Subject:   spaced\r\n".to_vec(),
            field.encoded(Break::Lf, &FoldEncoding::default()).into_owned()
        );

        field.set_body("tidy");
        assert!(field.raw().is_none());
        assert_eq!(
            b"Subject: tidy\r\n".to_vec(),
            field.encoded(Break::Crlf, &FoldEncoding::default()).into_owned()
        );

        let mut field = Field::parse(b"subject: x\n");
        field.set_name("Subject").unwrap();
        assert!(field.raw().is_none());
        assert_matches!(
            Err(Error::InvalidFieldName(_)),
            field.set_name("Bad:Name")
        );
        assert_matches!(Err(Error::InvalidFieldName(_)), Field::new("", "x"));
    }

    #[test]
    fn set_raw_keeps_decoded_form() {
        let mut field = Field::new("Subject", "hello").unwrap();
        field.set_raw(Raw::new(b"Subject:hello\n".to_vec(), 7).unwrap());
        assert_eq!("hello", field.body());
        assert_eq!(
            b"Subject:hello\n".to_vec(),
            field.encoded(Break::Crlf, &FoldEncoding::default()).into_owned()
        );

        assert_matches!(
            Err(Error::InvalidRaw(3)),
            Raw::new(b"Subject:hello\n".to_vec(), 3)
        );
        assert_matches!(Ok(_), Raw::new(b"no colon".to_vec(), 8));
        assert_matches!(
            Err(Error::InvalidRaw(3)),
            Raw::new(b"a:b".to_vec(), 3)
        );
    }

    #[test]
    fn string_encodes_non_ascii() {
        let field = Field::new("Subject", "Grüße").unwrap();
        assert_eq!("Subject: =?utf-8?b?R3LDvMOfZQ==?=", field.string());
    }

    #[test]
    fn fold_at_whitespace() {
        assert_eq!("aaa bbb", fold(10, 20, "aaa bbb"));
        assert_eq!("aaa bbb\n ccc", fold(10, 20, "aaa bbb ccc"));
        assert_eq!(
            "Subject: aaaa\n bbbb cccc",
            FoldEncoding::new(" ", Some(14), Some(20))
                .unwrap()
                .fold("Subject: aaaa bbbb cccc", 9, Break::Lf)
        );
        // Preferred width can't be met, so use the first point within forced
        assert_eq!("aaaaaaaa\n bb", fold(5, 20, "aaaaaaaa bb"));
        assert_eq!("aaaaaaaa\n bbbbbbbb", fold(5, 10, "aaaaaaaa bbbbbbbb"));
        // Don't fold at a space followed by more whitespace
        assert_eq!("a  \n b", fold(3, 4, "a   b"));
    }

    #[test]
    fn split_long_words() {
        assert_eq!("aaaaa\n aaaa\n aaaa\n a", fold(3, 5, "aaaaaaaaaaaaaa"));
        assert_eq!("ééé\n éé\n é", fold(3, 6, "éééééé"));
    }

    #[test]
    fn never_fold() {
        let line = "x ".repeat(1000);
        assert_eq!(line, FoldEncoding::never().fold(&line, 0, Break::Crlf));
    }

    #[test]
    fn fold_encoding_validation() {
        assert_matches!(Ok(_), FoldEncoding::new("\t", Some(3), Some(3)));
        assert_matches!(
            Err(Error::InvalidFoldEncoding(_)),
            FoldEncoding::new("", Some(78), Some(998))
        );
        assert_matches!(
            Err(Error::InvalidFoldEncoding(_)),
            FoldEncoding::new("     ", Some(78), Some(998))
        );
        assert_matches!(
            Err(Error::InvalidFoldEncoding(_)),
            FoldEncoding::new("x", Some(78), Some(998))
        );
        assert_matches!(
            Err(Error::InvalidFoldEncoding(_)),
            FoldEncoding::new(" ", Some(2), Some(998))
        );
        assert_matches!(
            Err(Error::InvalidFoldEncoding(_)),
            FoldEncoding::new(" ", Some(78), Some(77))
        );
        assert_matches!(
            Err(Error::InvalidFoldEncoding(_)),
            FoldEncoding::new("    ", Some(3), Some(4))
        );
        assert_matches!(Ok(_), FoldEncoding::new(" ", None, Some(10)));
        assert_matches!(Ok(_), FoldEncoding::new(" ", Some(10), None));
    }

    #[test]
    fn unfold_collapses_breaks() {
        assert_eq!("a b", unfold("a\r\n b"));
        assert_eq!("a b", unfold("a\n\t\t b"));
        assert_eq!("a\tb", unfold("a\tb"));
        assert_eq!("a b", unfold("a\r\n\r\n  b"));
        assert_eq!("a b", unfold("a\rb"));
    }

    proptest! {
        #[test]
        fn fold_respects_forced_width(
            words in prop::collection::vec("[a-z]{1,30}", 1..30),
            preferred in 3usize..40,
            extra in 0usize..40,
        ) {
            let line = words.join(" ");
            let forced = preferred + extra;
            let folded = fold(preferred, forced, &line);
            for physical in folded.split('\n') {
                prop_assert!(physical.len() <= forced);
            }

            if words.iter().all(|w| w.len() + 1 <= forced) {
                prop_assert_eq!(&line, &unfold(&folded));
            }
        }

        #[test]
        fn parse_never_panics(
            s in prop::collection::vec(prop::num::u8::ANY, 0..100)
        ) {
            Field::parse(&s);
        }
    }
}
