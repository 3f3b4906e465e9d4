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


//! Parsing bytes into a `MessagePart` tree.
//!
//! Each part is first split into header and body. If the header declares a
//! multipart type with a boundary, the body is then split into child parts
//! which are parsed the same way, down to the configured depth.
//!
//! Given boundary `B` and line break `L`, the delimiters are:
//!
//! - start: `--B L`, only at the very start of the body
//! - interior: `L --B L`
//! - closing: `L --B--`, followed by anything
//!
//! Everything outside the delimiters is kept so that an unmodified tree
//! writes back out as the bytes it was parsed from.

use std::io::Read;

use memchr::memmem;
use serde::{Deserialize, Serialize};

use super::field::FoldEncoding;
use super::header::Header;
use super::part::{MessagePart, Multipart, Opaque};
use super::split::{self, Break};
use crate::support::error::{Error, Partial, Resumable, ResumableExt};

/// How far down the tree multipart bodies are split.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    /// Split at most this many levels. 0 doesn't even split the top level.
    Limited(u32),
    Unlimited,
}

impl Default for Depth {
    fn default() -> Self {
        Depth::Limited(10)
    }
}

impl Depth {
    /// Split the top level but treat every child as opaque.
    pub const NO_RECURSION: Depth = Depth::Limited(1);

    fn allows_split(self) -> bool {
        Depth::Limited(0) != self
    }

    fn descend(self) -> Self {
        match self {
            Depth::Limited(n) => Depth::Limited(n.saturating_sub(1)),
            Depth::Unlimited => Depth::Unlimited,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseConfig {
    pub depth: Depth,
    /// Folding applied to every parsed header when fields are changed.
    pub fold: FoldEncoding,
}

/// Parses a whole message.
///
/// Problems which still allow a tree to be built, such as junk before the
/// header or unparseable child parts, are returned alongside that tree.
pub fn parse(data: &[u8], config: &ParseConfig) -> Resumable<MessagePart> {
    let mut errors = Vec::new();
    let opaque = collect(parse_opaque(data, config), &mut errors);
    let part =
        collect(parse_multipart(opaque, config.depth, config), &mut errors);
    finish(part, errors)
}

/// Reads `r` to the end and parses it.
pub fn parse_reader(
    mut r: impl Read,
    config: &ParseConfig,
) -> Resumable<MessagePart> {
    let mut data = Vec::new();
    if let Err(e) = r.read_to_end(&mut data) {
        return Err(Partial::new(MessagePart::default(), e.into()));
    }

    parse(&data, config)
}

/// Splits `data` into header and body without looking at the body.
pub fn parse_opaque(data: &[u8], config: &ParseConfig) -> Resumable<Opaque> {
    let mut header = Header::new();
    header.set_fold(config.fold.clone());

    if data.is_empty() {
        header.set_blank_line(false);
        return Err(Partial::new(
            Opaque {
                header,
                body: Vec::new(),
            },
            Error::EmptyPart,
        ));
    }

    let split = split::split_message(data);
    let (mut header, error) =
        Header::parse(split.header, split.lbr).into_parts();
    header.set_fold(config.fold.clone());
    header.set_blank_line(split.terminated);

    if !split.terminated && header.is_empty() {
        log::warn!("Part has no header fields or header/body separator");
        header.set_blank_line(false);
        return Err(Partial::new(
            Opaque {
                header,
                body: data.to_vec(),
            },
            Error::NoHeaderBodySplit,
        ));
    }

    let opaque = Opaque {
        header,
        body: split.body.to_vec(),
    };
    match error {
        None => Ok(opaque),
        Some(e) => Err(Partial::new(opaque, e)),
    }
}

/// Splits the body of `opaque` into parts if its header calls for it.
///
/// Anything that isn't `multipart/*` or `message/*` with a boundary comes
/// back unchanged. A multipart type without a boundary also comes back
/// unchanged, but with a `NoBoundary` error.
pub fn parse_multipart(
    opaque: Opaque,
    depth: Depth,
    config: &ParseConfig,
) -> Resumable<MessagePart> {
    let ct = match opaque.header.content_type() {
        Ok(ct) => ct,
        Err(_) => return Ok(opaque.into()),
    };

    let main_type = ct.main_type();
    if "multipart" != main_type && "message" != main_type {
        return Ok(opaque.into());
    }

    let boundary = match ct.boundary() {
        Ok(b) if !b.is_empty() => b.to_owned(),
        _ if "multipart" == main_type => {
            log::warn!("{} has no boundary", ct.media_type());
            return Err(Partial::new(opaque.into(), Error::NoBoundary));
        },
        _ => return Ok(opaque.into()),
    };

    if !depth.allows_split() {
        log::debug!("Not splitting {}: depth exhausted", ct.media_type());
        return Ok(opaque.into());
    }

    // Nothing to split, and a header-only multipart must stay header-only
    if opaque.body.is_empty() {
        return Ok(opaque.into());
    }

    let lbr = opaque.header.break_or_default();
    log::debug!("Splitting {} on {:?}", ct.media_type(), boundary);
    let segments = split_body(&opaque.body, &boundary, lbr);

    let mut errors = Vec::new();
    let mut parts = Vec::with_capacity(segments.parts.len());
    for segment in &segments.parts {
        let child = collect(parse_opaque(segment, config), &mut errors);
        let child = collect(
            parse_multipart(child, depth.descend(), config),
            &mut errors,
        );
        parts.push(child);
    }

    let multipart = MessagePart::Multipart(Multipart {
        header: opaque.header,
        prefix: segments.prefix.map(<[u8]>::to_vec),
        suffix: segments.suffix.map(<[u8]>::to_vec),
        parts,
        boundary,
    });

    if errors.is_empty() {
        Ok(multipart)
    } else {
        log::warn!("{} problem(s) in child parts", errors.len());
        Err(Partial::new(multipart, Error::Parse(errors)))
    }
}

/// The pieces of a multipart body.
#[derive(Debug, PartialEq, Eq)]
struct Segments<'a> {
    prefix: Option<&'a [u8]>,
    parts: Vec<&'a [u8]>,
    suffix: Option<&'a [u8]>,
}

/// Interior delimiters are taken wherever they occur. The closing delimiter
/// is only looked for after the last of them.
fn split_body<'a>(body: &'a [u8], boundary: &str, lbr: Break) -> Segments<'a> {
    let l = lbr.as_bytes();
    let dashed = [b"--", boundary.as_bytes()].concat();
    let start = [&dashed[..], l].concat();
    let interior = [l, &dashed[..], l].concat();
    let closing = [l, &dashed[..], b"--"].concat();

    let (prefix, mut pos) = if body.starts_with(&start) {
        (Some(&body[..0]), start.len())
    } else {
        match memmem::find(body, &interior) {
            Some(ix) => (Some(&body[..ix + l.len()]), ix + interior.len()),
            None => (None, 0),
        }
    };

    let mut parts = Vec::new();
    let finder = memmem::Finder::new(&interior);
    while let Some(ix) = finder.find(&body[pos..]) {
        parts.push(&body[pos..pos + ix]);
        pos += ix + interior.len();
    }

    let rest = &body[pos..];
    let suffix = match memmem::find(rest, &closing) {
        Some(c) => {
            parts.push(&rest[..c]);
            Some(&rest[c + closing.len()..])
        },
        None => {
            parts.push(rest);
            None
        },
    };

    Segments {
        prefix,
        parts,
        suffix,
    }
}

fn collect<T>(result: Resumable<T>, errors: &mut Vec<Error>) -> T {
    let (value, error) = result.into_parts();
    match error {
        Some(Error::Parse(nested)) => errors.extend(nested),
        Some(e) => errors.push(e),
        None => (),
    }
    value
}

fn finish<T>(value: T, mut errors: Vec<Error>) -> Resumable<T> {
    match errors.len() {
        0 => Ok(value),
        1 => Err(Partial::new(value, errors.remove(0))),
        _ => Err(Partial::new(value, Error::Parse(errors))),
    }
}
