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


//! Parameterised field values, such as `Content-Type` and
//! `Content-Disposition`.

use std::fmt;

use super::charset;
use crate::support::error::Error;

/// A value like `text/plain; charset=UTF-8`.
///
/// Parameter names are lowercased and kept in their original order. The
/// value is immutable; `modify()` produces a changed copy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParamValue {
    value: String,
    params: Vec<(String, String)>,
}

/// One change applied by `ParamValue::modify`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Modifier {
    /// Replace the primary value.
    Change(String),
    /// Set a parameter, replacing any existing value in place.
    Set(String, String),
    /// Remove a parameter if present.
    Delete(String),
}

fn is_tspecial(b: u8) -> bool {
    b"()<>@,;:\\\"/[]?=".contains(&b)
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| b > b' ' && b < 0x7F && !is_tspecial(b))
}

impl ParamValue {
    /// Creates a value with no parameters.
    pub fn new(value: impl Into<String>) -> Result<Self, Error> {
        let value = value.into();
        validate_value(&value)?;
        Ok(ParamValue {
            value,
            params: Vec::new(),
        })
    }

    /// Parses a field body.
    ///
    /// This never fails. Parameters without `=` are dropped, and an unclosed
    /// quoted string runs to the end of the input. RFC 2231 continuations
    /// and charset-tagged values are reassembled and decoded.
    pub fn parse(s: &str) -> Self {
        let bytes = s.as_bytes();
        let primary_end = find_unquoted(bytes, 0, b';');
        let value = strip_comments(&s[..primary_end]);

        let mut raw = Vec::new();
        let mut pos = primary_end;
        while pos < bytes.len() {
            while pos < bytes.len()
                && (b';' == bytes[pos] || bytes[pos].is_ascii_whitespace())
            {
                pos += 1;
            }
            if pos >= bytes.len() {
                break;
            }

            let end = find_unquoted(bytes, pos, b';');
            let eq = match memchr::memchr(b'=', &bytes[pos..end]) {
                Some(eq) => pos + eq,
                None => {
                    log::debug!(
                        "Ignoring parameter without value: {:?}",
                        &s[pos..end]
                    );
                    pos = end;
                    continue;
                },
            };

            let name = s[pos..eq].trim().to_ascii_lowercase();
            let value = s[eq + 1..end].trim();
            let value = if value.starts_with('"') {
                unquote(&value[1..])
            } else {
                value.to_owned()
            };

            if !name.is_empty() {
                raw.push((name, value));
            }
            pos = end;
        }

        ParamValue {
            value,
            params: reassemble(raw),
        }
    }

    /// The primary value, as written.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Looks up a parameter by case-insensitive name.
    pub fn get(&self, param: &str) -> Result<&str, Error> {
        self.params
            .iter()
            .find(|&&(ref name, _)| name.eq_ignore_ascii_case(param))
            .map(|&(_, ref value)| value.as_str())
            .ok_or_else(|| Error::NotFoundParameter(param.to_owned()))
    }

    /// All parameters, in order, with lowercased names.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.params.iter().map(|&(ref n, ref v)| (n.as_str(), v.as_str()))
    }

    /// Returns a copy with `ops` applied in order.
    pub fn modify(&self, ops: &[Modifier]) -> Result<Self, Error> {
        let mut new = self.clone();
        for op in ops {
            match *op {
                Modifier::Change(ref value) => {
                    validate_value(value)?;
                    new.value = value.clone();
                },
                Modifier::Set(ref name, ref value) => {
                    if !is_token(name)
                        || value.contains(|c| '\r' == c || '\n' == c)
                    {
                        return Err(Error::InvalidParamValue(format!(
                            "{}={}",
                            name, value
                        )));
                    }
                    let name = name.to_ascii_lowercase();
                    if let Some(existing) =
                        new.params.iter_mut().find(|p| p.0 == name)
                    {
                        existing.1 = value.clone();
                    } else {
                        new.params.push((name, value.clone()));
                    }
                },
                Modifier::Delete(ref name) => {
                    new.params.retain(|p| !p.0.eq_ignore_ascii_case(name));
                },
            }
        }
        Ok(new)
    }

    /// The lowercased media type, e.g. `text/plain`.
    pub fn media_type(&self) -> String {
        self.value.to_ascii_lowercase()
    }

    /// The lowercased top-level type, e.g. `text`.
    pub fn main_type(&self) -> String {
        let mt = self.media_type();
        match mt.find('/') {
            Some(slash) => mt[..slash].trim().to_owned(),
            None => mt,
        }
    }

    /// The lowercased subtype, e.g. `plain`, or empty if there is none.
    pub fn subtype(&self) -> String {
        let mt = self.media_type();
        match mt.find('/') {
            Some(slash) => mt[slash + 1..].trim().to_owned(),
            None => String::new(),
        }
    }

    pub fn charset(&self) -> Result<&str, Error> {
        self.get("charset")
    }

    pub fn boundary(&self) -> Result<&str, Error> {
        self.get("boundary")
    }

    /// For `Content-Disposition`, the presentation (e.g. `attachment`),
    /// lowercased.
    pub fn presentation(&self) -> String {
        self.media_type()
    }

    pub fn filename(&self) -> Result<&str, Error> {
        self.get("filename")
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.value)?;
        for &(ref name, ref value) in &self.params {
            if !value.is_ascii() {
                write!(f, "; {}*=utf-8''", name)?;
                for &b in value.as_bytes() {
                    if b.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&b)
                    {
                        write!(f, "{}", b as char)?;
                    } else {
                        write!(f, "%{:02X}", b)?;
                    }
                }
            } else if is_token(value) {
                write!(f, "; {}={}", name, value)?;
            } else {
                write!(f, "; {}=\"", name)?;
                for ch in value.chars() {
                    if '"' == ch || '\\' == ch {
                        write!(f, "\\")?;
                    }
                    write!(f, "{}", ch)?;
                }
                write!(f, "\"")?;
            }
        }
        Ok(())
    }
}

fn validate_value(value: &str) -> Result<(), Error> {
    if value.contains(|c| ';' == c || '\r' == c || '\n' == c) {
        Err(Error::InvalidParamValue(value.to_owned()))
    } else {
        Ok(())
    }
}

/// Returns the index of the first `needle` at or after `start` which is not
/// inside a quoted string, or the length of `bytes`.
fn find_unquoted(bytes: &[u8], start: usize, needle: u8) -> usize {
    let mut in_quote = false;
    let mut escaped = false;
    for (ix, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
        } else if in_quote && b'\\' == b {
            escaped = true;
        } else if b'"' == b {
            in_quote = !in_quote;
        } else if !in_quote && needle == b {
            return ix;
        }
    }
    bytes.len()
}

// `s` is the text after the opening quote
fn unquote(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            },
            '"' => break,
            _ => out.push(ch),
        }
    }
    out
}

fn strip_comments(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    for ch in s.chars() {
        match ch {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth > 0 => (),
            _ => out.push(ch),
        }
    }
    out.trim().to_owned()
}

/// A parameter name split into its RFC 2231 parts.
struct Section<'a> {
    base: &'a str,
    index: Option<u32>,
    encoded: bool,
}

fn section(name: &str) -> Section<'_> {
    let (name, encoded) = if name.ends_with('*') {
        (&name[..name.len() - 1], true)
    } else {
        (name, false)
    };

    if let Some(star) = name.rfind('*') {
        if let Ok(index) = name[star + 1..].parse::<u32>() {
            return Section {
                base: &name[..star],
                index: Some(index),
                encoded,
            };
        }
    }

    Section {
        base: name,
        index: None,
        encoded,
    }
}

fn percent_decode(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut ix = 0;
    while ix < bytes.len() {
        if b'%' == bytes[ix] && ix + 2 < bytes.len() {
            if let Some(b) = std::str::from_utf8(&bytes[ix + 1..ix + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok())
            {
                out.push(b);
                ix += 3;
                continue;
            }
        }
        out.push(bytes[ix]);
        ix += 1;
    }
    out
}

/// Decodes a `charset'language'%XX` value, or a continuation of one.
fn decode_extended(charset_name: &str, bytes: &[u8]) -> String {
    if charset_name.is_empty() {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    match charset::registry().decode(charset_name, bytes) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("Can't decode RFC 2231 parameter: {}", e);
            String::from_utf8_lossy(bytes).into_owned()
        },
    }
}

/// Joins RFC 2231 continuations and decodes extended values, keeping each
/// parameter at the position of its first section.
fn reassemble(raw: Vec<(String, String)>) -> Vec<(String, String)> {
    if !raw.iter().any(|p| p.0.contains('*')) {
        return raw;
    }

    // (base, plain value, sections)
    let mut out: Vec<(String, Option<String>, Vec<(u32, bool, String)>)> =
        Vec::new();
    for (name, value) in raw {
        let sec = section(&name);
        let base = sec.base.to_owned();
        let slot = match out.iter().position(|o| o.0 == base) {
            Some(ix) => ix,
            None => {
                out.push((base, None, Vec::new()));
                out.len() - 1
            },
        };

        match (sec.index, sec.encoded) {
            (None, false) => out[slot].1 = Some(value),
            (None, true) => out[slot].2.push((0, true, value)),
            (Some(index), encoded) => out[slot].2.push((index, encoded, value)),
        }
    }

    out.into_iter()
        .map(|(base, plain, mut sections)| {
            if sections.is_empty() {
                return (base, plain.unwrap_or_default());
            }

            sections.sort_by_key(|s| s.0);
            let mut charset_name = String::new();
            let mut bytes = Vec::new();
            for (ix, &(_, encoded, ref value)) in sections.iter().enumerate() {
                if !encoded {
                    bytes.extend_from_slice(value.as_bytes());
                    continue;
                }

                let mut value = value.as_str();
                if 0 == ix {
                    let mut parts = value.splitn(3, '\'');
                    if let (Some(cs), Some(_lang), Some(rest)) =
                        (parts.next(), parts.next(), parts.next())
                    {
                        charset_name = cs.to_owned();
                        value = rest;
                    }
                }
                bytes.extend_from_slice(&percent_decode(value));
            }

            (base, decode_extended(&charset_name, &bytes))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_content_type() {
        let pv = ParamValue::parse("text/plain; charset=UTF-8");
        assert_eq!("text/plain", pv.value());
        assert_eq!("text", pv.main_type());
        assert_eq!("plain", pv.subtype());
        assert_eq!("UTF-8", pv.charset().unwrap());
        assert_matches!(Err(Error::NotFoundParameter(_)), pv.boundary());

        let pv = ParamValue::parse(
            "Multipart/Mixed (comment); BOUNDARY=\"a;b \\\"c\\\"\";x=y",
        );
        assert_eq!("Multipart/Mixed", pv.value());
        assert_eq!("multipart/mixed", pv.media_type());
        assert_eq!("a;b \"c\"", pv.boundary().unwrap());
        assert_eq!("y", pv.get("X").unwrap());
    }

    #[test]
    fn parse_sloppy_params() {
        let pv = ParamValue::parse("attachment;; filename=foo.pdf ; junk ;");
        assert_eq!("attachment", pv.presentation());
        assert_eq!("foo.pdf", pv.filename().unwrap());
        assert_eq!(1, pv.params().count());

        let pv = ParamValue::parse("inline; filename=\"unclosed");
        assert_eq!("unclosed", pv.filename().unwrap());

        let pv = ParamValue::parse("");
        assert_eq!("", pv.value());
    }

    #[test]
    fn rfc2231_values() {
        let pv = ParamValue::parse(
            "attachment; filename*=utf-8''%E2%82%AC%20rates.txt",
        );
        assert_eq!("€ rates.txt", pv.filename().unwrap());

        let pv = ParamValue::parse(
            "message/external-body; access-type=URL; \
             URL*0=\"ftp://\"; URL*1=\"example.com/file\"",
        );
        assert_eq!("ftp://example.com/file", pv.get("url").unwrap());
        assert_eq!(
            vec![("access-type", "URL"), ("url", "ftp://example.com/file")],
            pv.params().collect::<Vec<_>>()
        );

        let pv = ParamValue::parse(
            "attachment; name*1*=%20world; name*0*=us-ascii'en'hello",
        );
        assert_eq!("hello world", pv.get("name").unwrap());
    }

    #[test]
    fn modify_and_format() {
        let pv =
            ParamValue::parse("text/plain; charset=us-ascii; format=flowed");
        let pv2 = pv
            .modify(&[
                Modifier::Change("text/html".to_owned()),
                Modifier::Set("Charset".to_owned(), "utf-8".to_owned()),
                Modifier::Delete("FORMAT".to_owned()),
                Modifier::Set("name".to_owned(), "my file.html".to_owned()),
            ])
            .unwrap();
        assert_eq!(
            "text/html; charset=utf-8; name=\"my file.html\"",
            pv2.to_string()
        );
        // Original is untouched
        assert_eq!("us-ascii", pv.charset().unwrap());

        assert_matches!(
            Err(Error::InvalidParamValue(_)),
            pv.modify(&[Modifier::Change("a;b".to_owned())])
        );
        assert_matches!(
            Err(Error::InvalidParamValue(_)),
            pv.modify(&[Modifier::Set("a b".to_owned(), "c".to_owned())])
        );

        let set_name =
            Modifier::Set("filename".to_owned(), "€.txt".to_owned());
        let pv = ParamValue::new("attachment")
            .unwrap()
            .modify(&[set_name])
            .unwrap();
        assert_eq!(
            "attachment; filename*=utf-8''%E2%82%AC.txt",
            pv.to_string()
        );
        assert_eq!(pv, ParamValue::parse(&pv.to_string()));
    }
}
