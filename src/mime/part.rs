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


//! The message tree: opaque leaves and multipart branches.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use super::charset;
use super::header::Header;
use super::transfer;
use crate::support::error::Error;

/// A part whose body is not decomposed further.
#[derive(Clone, Debug, Default)]
pub struct Opaque {
    pub header: Header,
    /// The body exactly as it appears in the message, still transfer-encoded.
    pub body: Vec<u8>,
}

/// A part whose body is a sequence of parts separated by a boundary.
#[derive(Clone, Debug, Default)]
pub struct Multipart {
    pub header: Header,
    /// Bytes before the first delimiter, including the line break that
    /// starts it. `None` if the body had no start or interior delimiter.
    pub prefix: Option<Vec<u8>>,
    /// Bytes after the closing `--boundary--`, including the line break that
    /// ends it. `None` if there was no closing delimiter.
    pub suffix: Option<Vec<u8>>,
    pub parts: Vec<MessagePart>,
    /// The boundary the parts were split on.
    pub boundary: String,
}

#[derive(Clone, Debug)]
pub enum MessagePart {
    Opaque(Opaque),
    Multipart(Multipart),
}

impl Default for MessagePart {
    fn default() -> Self {
        MessagePart::Opaque(Opaque::default())
    }
}

impl From<Opaque> for MessagePart {
    fn from(o: Opaque) -> Self {
        MessagePart::Opaque(o)
    }
}

impl From<Multipart> for MessagePart {
    fn from(m: Multipart) -> Self {
        MessagePart::Multipart(m)
    }
}

impl MessagePart {
    pub fn header(&self) -> &Header {
        match *self {
            MessagePart::Opaque(ref o) => &o.header,
            MessagePart::Multipart(ref m) => &m.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut Header {
        match *self {
            MessagePart::Opaque(ref mut o) => &mut o.header,
            MessagePart::Multipart(ref mut m) => &mut m.header,
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(*self, MessagePart::Multipart(_))
    }

    /// The raw body of an opaque part, which can be used as a `Read`.
    pub fn get_reader(&self) -> Result<&[u8], Error> {
        match *self {
            MessagePart::Opaque(ref o) => Ok(&o.body),
            MessagePart::Multipart(_) => Err(Error::Multipart),
        }
    }

    pub fn get_parts(&self) -> Result<&[MessagePart], Error> {
        match *self {
            MessagePart::Opaque(_) => Err(Error::NotMultipart),
            MessagePart::Multipart(ref m) => Ok(&m.parts),
        }
    }

    pub fn get_parts_mut(&mut self) -> Result<&mut Vec<MessagePart>, Error> {
        match *self {
            MessagePart::Opaque(_) => Err(Error::NotMultipart),
            MessagePart::Multipart(ref mut m) => Ok(&mut m.parts),
        }
    }
}

impl Opaque {
    /// The body with its transfer encoding removed.
    pub fn decoded_content(&self) -> Result<Vec<u8>, Error> {
        transfer::registry().decode(&self.header, &self.body)
    }

    /// The body decoded to text through the declared charset, which defaults
    /// to US-ASCII.
    pub fn text(&self) -> Result<String, Error> {
        let content = self.decoded_content()?;
        let cs = self
            .header
            .charset()
            .unwrap_or_else(|_| "us-ascii".to_owned());
        charset::registry().decode(&cs, &content)
    }

    /// Replaces the body with `content` encoded per the header's
    /// `Content-Transfer-Encoding`.
    pub fn set_decoded_content(&mut self, content: &[u8]) -> Result<(), Error> {
        self.body = transfer::registry().encode(&self.header, content)?;
        Ok(())
    }
}

impl Multipart {
    /// The boundary that will be written: the one in `Content-Type` if there
    /// is one, otherwise the one the parts were split on.
    pub fn effective_boundary(&self) -> String {
        self.header
            .boundary()
            .unwrap_or_else(|_| self.boundary.clone())
    }
}

/// Serialisation policy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Write a start delimiter before the first part of a multipart that had
    /// none, and a closing delimiter after the last part of one that had
    /// none. This changes the bytes of such messages.
    pub strict_boundaries: bool,
}

/// Serialisation of any part of the tree.
pub trait WriteTo {
    /// Writes with the default `OutputConfig`, returning the number of bytes
    /// written.
    fn write_to(&self, w: &mut dyn Write) -> io::Result<u64> {
        self.write_to_with(w, &OutputConfig::default())
    }

    fn write_to_with(
        &self,
        w: &mut dyn Write,
        config: &OutputConfig,
    ) -> io::Result<u64>;
}

impl WriteTo for Opaque {
    fn write_to_with(
        &self,
        w: &mut dyn Write,
        _: &OutputConfig,
    ) -> io::Result<u64> {
        let header_len = self.header.write_to(w, !self.body.is_empty())?;
        w.write_all(&self.body)?;
        Ok(header_len + self.body.len() as u64)
    }
}

impl WriteTo for Multipart {
    fn write_to_with(
        &self,
        w: &mut dyn Write,
        config: &OutputConfig,
    ) -> io::Result<u64> {
        let lbr = self.header.break_or_default().as_bytes();
        let boundary = self.effective_boundary();
        let mut out = Counted {
            inner: w,
            written: 0,
        };
        out.written += self.header.write_to(out.inner, true)?;

        if let Some(ref prefix) = self.prefix {
            out.put(prefix)?;
        }
        if self.prefix.is_some() || config.strict_boundaries {
            out.put_all(&[b"--", boundary.as_bytes(), lbr])?;
        }

        for (ix, part) in self.parts.iter().enumerate() {
            if ix > 0 {
                out.put_all(&[lbr, b"--", boundary.as_bytes(), lbr])?;
            }
            out.written += part.write_to_with(out.inner, config)?;
        }

        let suffix = match self.suffix {
            Some(ref suffix) => Some(&suffix[..]),
            None if config.strict_boundaries => Some(lbr),
            None => None,
        };
        if let Some(suffix) = suffix {
            out.put_all(&[lbr, b"--", boundary.as_bytes(), b"--", suffix])?;
        }

        Ok(out.written)
    }
}

struct Counted<'a> {
    inner: &'a mut dyn Write,
    written: u64,
}

impl Counted<'_> {
    fn put(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    fn put_all(&mut self, pieces: &[&[u8]]) -> io::Result<()> {
        for piece in pieces {
            self.put(piece)?;
        }
        Ok(())
    }
}

impl WriteTo for MessagePart {
    fn write_to_with(
        &self,
        w: &mut dyn Write,
        config: &OutputConfig,
    ) -> io::Result<u64> {
        match *self {
            MessagePart::Opaque(ref o) => o.write_to_with(w, config),
            MessagePart::Multipart(ref m) => m.write_to_with(w, config),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mime::field::Field;

    fn opaque(fields: &[(&str, &str)], body: &[u8]) -> Opaque {
        let mut header = Header::new();
        for &(name, value) in fields {
            header.push(Field::new(name, value).unwrap());
        }
        Opaque {
            header,
            body: body.to_vec(),
        }
    }

    fn mixed_header() -> Header {
        opaque(&[("Content-Type", "multipart/mixed; boundary=b")], b"").header
    }

    fn serialise(part: &dyn WriteTo, config: &OutputConfig) -> String {
        let mut out = Vec::new();
        let n = part.write_to_with(&mut out, config).unwrap();
        assert_eq!(out.len() as u64, n);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn variant_access() {
        let o: MessagePart = opaque(&[("Subject", "x")], b"body").into();
        assert!(!o.is_multipart());
        assert_eq!(b"body", o.get_reader().unwrap());
        assert_matches!(Err(Error::NotMultipart), o.get_parts());

        let m: MessagePart = Multipart::default().into();
        assert!(m.is_multipart());
        assert_matches!(Err(Error::Multipart), m.get_reader());
        assert_eq!(0, m.get_parts().unwrap().len());
    }

    #[test]
    fn write_multipart() {
        let m = Multipart {
            header: mixed_header(),
            prefix: Some(b"preamble\r\n".to_vec()),
            suffix: Some(b"\r\nepilogue".to_vec()),
            parts: vec![
                opaque(&[("X", "1")], b"one").into(),
                opaque(&[("X", "2")], b"two").into(),
            ],
            boundary: "b".to_owned(),
        };

        assert_eq!(
            "Content-Type: multipart/mixed; boundary=b\r\n\r\n\
             preamble\r\n--b\r\n\
             X: 1\r\n\r\none\r\n--b\r\n\
             X: 2\r\n\r\ntwo\r\n--b--\r\nepilogue",
            serialise(&m, &OutputConfig::default())
        );
    }

    #[test]
    fn absent_delimiters_follow_policy() {
        let m = Multipart {
            header: mixed_header(),
            prefix: None,
            suffix: None,
            parts: vec![opaque(&[("X", "1")], b"one").into()],
            boundary: "stale".to_owned(),
        };

        let head = "Content-Type: multipart/mixed; boundary=b\r\n\r\n";
        assert_eq!(
            format!("{}X: 1\r\n\r\none", head),
            serialise(&m, &OutputConfig::default())
        );
        assert_eq!(
            format!("{}--b\r\nX: 1\r\n\r\none\r\n--b--\r\n", head),
            serialise(
                &m,
                &OutputConfig {
                    strict_boundaries: true
                }
            )
        );
    }

    #[test]
    fn decoded_content_and_text() {
        let mut o = opaque(
            &[
                ("Content-Type", "text/plain; charset=utf-8"),
                ("Content-Transfer-Encoding", "base64"),
            ],
            b"",
        );
        o.set_decoded_content("héllo".as_bytes()).unwrap();
        assert_eq!(b"aMOpbGxv".to_vec(), o.body);
        assert_eq!("héllo".as_bytes().to_vec(), o.decoded_content().unwrap());
        assert_eq!("héllo", o.text().unwrap());

        let o = opaque(&[], b"\xE9");
        assert_matches!(Err(Error::Charset(_)), o.text());
    }
}
