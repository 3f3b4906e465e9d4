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

//! Locating the header/body boundary and framing header bytes into logical
//! field lines.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A line-break convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Break {
    Lf,
    Crlf,
    Cr,
    Lfcr,
}

impl Default for Break {
    fn default() -> Self {
        Break::Crlf
    }
}

impl Break {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Break::Lf => b"\n",
            Break::Crlf => b"\r\n",
            Break::Cr => b"\r",
            Break::Lfcr => b"\n\r",
        }
    }

    pub fn len(self) -> usize {
        self.as_bytes().len()
    }
}

impl fmt::Display for Break {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Break::Lf => "LF",
            Break::Crlf => "CRLF",
            Break::Cr => "CR",
            Break::Lfcr => "LFCR",
        })
    }
}

// Order matters only for ties, which can't happen between these since they
// all differ in their first two bytes.
const TERMINATORS: [(&[u8], Break); 4] = [
    (b"\r\n\r\n", Break::Crlf),
    (b"\n\r\n\r", Break::Lfcr),
    (b"\n\n", Break::Lf),
    (b"\r\r", Break::Cr),
];

// Used both for the leading-break check and for guessing the break of a
// header with no terminator. For the latter, the order is the order of
// preference when more than one occurs.
const GUESSES: [(&[u8], Break); 4] = [
    (b"\r\n", Break::Crlf),
    (b"\n", Break::Lf),
    (b"\r", Break::Cr),
    (b"\n\r", Break::Lfcr),
];

/// The result of splitting a message into header and body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Split<'a> {
    /// The header bytes, including the line ending of the last field but not
    /// the blank line.
    pub header: &'a [u8],
    /// Everything after the blank line.
    pub body: &'a [u8],
    /// The line break the message uses.
    pub lbr: Break,
    /// Whether a blank line separating header from body was found.
    pub terminated: bool,
}

/// Splits `data` at the header/body boundary.
///
/// If `data` starts with a line break, the header is empty and that break is
/// the separator. Otherwise, the earliest of the four doubled breaks
/// determines both the boundary and the line-break convention. If there is
/// none, the whole input is header.
pub fn split_message(data: &[u8]) -> Split<'_> {
    // A leading break means an empty header. Check CRLF before LFCR before
    // the single-byte forms so that the longest plausible break wins.
    for &(brk, lbr) in &[
        (&b"\r\n"[..], Break::Crlf),
        (&b"\n\r"[..], Break::Lfcr),
        (&b"\n"[..], Break::Lf),
        (&b"\r"[..], Break::Cr),
    ] {
        if data.starts_with(brk) {
            return Split {
                header: &[],
                body: &data[brk.len()..],
                lbr,
                terminated: true,
            };
        }
    }

    let found = TERMINATORS
        .iter()
        .filter_map(|&(term, lbr)| {
            memchr::memmem::find(data, term).map(|pos| (pos, lbr))
        })
        .min_by_key(|&(pos, _)| pos);

    if let Some((pos, lbr)) = found {
        let half = lbr.len();
        log::debug!("Header ends at byte {} with {} line breaks", pos, lbr);
        Split {
            header: &data[..pos + half],
            body: &data[pos + 2 * half..],
            lbr,
            terminated: true,
        }
    } else {
        let lbr = guess_break(data);
        log::debug!("No header terminator; guessed {} line breaks", lbr);
        Split {
            header: data,
            body: &[],
            lbr,
            terminated: false,
        }
    }
}

/// Guesses the line break used by text that doesn't contain a header
/// terminator.
pub fn guess_break(data: &[u8]) -> Break {
    GUESSES
        .iter()
        .find(|&&(brk, _)| memchr::memmem::find(data, brk).is_some())
        .map(|&(_, lbr)| lbr)
        .unwrap_or(Break::Cr)
}

/// The result of framing header bytes into logical lines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Lines<'a> {
    /// Each logical field, including its continuation lines and final line
    /// break (if any).
    pub fields: Vec<&'a [u8]>,
    /// Lines which preceded the first real field.
    pub junk: &'a [u8],
}

/// Splits header bytes into logical field lines.
///
/// A field starts on a line which does not begin with whitespace and which
/// contains a colon. It continues through any following lines that begin with
/// whitespace or lack a colon.
pub fn split_fields(header: &[u8], lbr: Break) -> Lines<'_> {
    let mut lines = Lines::default();
    let mut current: Option<(usize, usize)> = None;
    let mut junk_end = 0;

    for (start, end) in physical_lines(header, lbr) {
        let line = &header[start..end];
        let starts_field = !line.is_empty()
            && b' ' != line[0]
            && b'\t' != line[0]
            && memchr::memchr(b':', line).is_some();

        if starts_field {
            if let Some((s, e)) = current.take() {
                lines.fields.push(&header[s..e]);
            }
            current = Some((start, end));
        } else if let Some((_, ref mut e)) = current {
            *e = end;
        } else {
            junk_end = end;
        }
    }

    if let Some((s, e)) = current {
        lines.fields.push(&header[s..e]);
    }
    lines.junk = &header[..junk_end];
    lines
}

/// Yields `(start, end)` of each line in `data`, where `end` includes the line
/// break.
fn physical_lines(
    data: &[u8],
    lbr: Break,
) -> impl Iterator<Item = (usize, usize)> + '_ {
    let brk = lbr.as_bytes();
    let mut start = 0;
    let mut breaks = memchr::memmem::find_iter(data, brk);

    std::iter::from_fn(move || {
        if start >= data.len() {
            return None;
        }

        let line_start = start;
        // find_iter yields non-overlapping matches, so anything it returns
        // before `start` was already consumed as part of an earlier line.
        let end = loop {
            match breaks.next() {
                Some(pos) if pos < line_start => continue,
                Some(pos) => break pos + brk.len(),
                None => break data.len(),
            }
        };
        start = end;
        Some((line_start, end))
    })
}
