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


//! Building parts from scratch.

use std::io::{self, Write};

use rand::Rng;

use super::header::Header;
use super::param::{Modifier, ParamValue};
use super::part::{MessagePart, Multipart, Opaque};
use super::transfer;
use crate::support::error::Error;

/// Which kind of part `Buffer::part()` builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferMode {
    Opaque,
    Multipart,
}

impl Default for BufferMode {
    fn default() -> Self {
        BufferMode::Opaque
    }
}

/// A builder for either an `Opaque` or a `Multipart`.
///
/// Bytes written through `Write` are the body exactly as it will appear.
/// Bytes given to `write_decoded` are collected and transfer-encoded, per the
/// header, when an `Opaque` is built; they follow any raw bytes.
///
/// Building doesn't consume the buffer, so it can be built again after
/// further changes.
#[derive(Clone, Debug, Default)]
pub struct Buffer {
    pub header: Header,
    body: Vec<u8>,
    decoded: Vec<u8>,
    parts: Vec<MessagePart>,
    mode: BufferMode,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: BufferMode) {
        self.mode = mode;
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// Appends a child part for when this is built as a `Multipart`.
    pub fn add(&mut self, part: impl Into<MessagePart>) {
        self.parts.push(part.into());
    }

    pub fn parts(&self) -> &[MessagePart] {
        &self.parts
    }

    /// Appends content which is to be transfer-encoded.
    pub fn write_decoded(&mut self, data: &[u8]) {
        self.decoded.extend_from_slice(data);
    }

    pub fn opaque(&self) -> Result<Opaque, Error> {
        let mut body = self.body.clone();
        if !self.decoded.is_empty() {
            body.extend(
                transfer::registry().encode(&self.header, &self.decoded)?,
            );
        }

        Ok(Opaque {
            header: self.header.clone(),
            body,
        })
    }

    /// Builds a `Multipart` of the parts added so far.
    ///
    /// `Content-Type` defaults to `multipart/mixed`. If it has no boundary, a
    /// random one is generated and stored in this buffer's header, so
    /// building again gives the same boundary.
    pub fn multipart(&mut self) -> Result<Multipart, Error> {
        let ct = match self.header.content_type() {
            Ok(ct) => ct,
            Err(e) if e.is_not_found() => ParamValue::new("multipart/mixed")?,
            Err(e) => return Err(e),
        };

        let boundary = match ct.boundary() {
            Ok(b) if !b.is_empty() => b.to_owned(),
            _ => {
                let boundary = make_boundary();
                log::debug!("Generated boundary {:?}", boundary);
                let ct = ct.modify(&[Modifier::Set(
                    "boundary".to_owned(),
                    boundary.clone(),
                )])?;
                self.header.set_content_type(&ct)?;
                boundary
            },
        };

        Ok(Multipart {
            header: self.header.clone(),
            prefix: Some(Vec::new()),
            suffix: Some(self.header.break_or_default().as_bytes().to_vec()),
            parts: self.parts.clone(),
            boundary,
        })
    }

    /// Builds whichever kind of part the mode selects.
    pub fn part(&mut self) -> Result<MessagePart, Error> {
        match self.mode {
            BufferMode::Opaque => self.opaque().map(MessagePart::Opaque),
            BufferMode::Multipart => {
                self.multipart().map(MessagePart::Multipart)
            },
        }
    }
}

impl Write for Buffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A boundary which can't occur in base64 or quoted-printable content.
fn make_boundary() -> String {
    let mut boundary = "=_".to_owned();
    boundary.extend(
        rand::thread_rng()
            .sample_iter(rand::distributions::Alphanumeric)
            .take(40)
            .map(char::from),
    );
    boundary
}
