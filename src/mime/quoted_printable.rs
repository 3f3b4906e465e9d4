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

use std::borrow::Cow;
use std::io::{self, Write};
use std::str;

use super::split::Break;

/// The longest encoded line we produce, not counting the soft break's `=`.
const MAX_LINE: usize = 75;

/// Decodes quoted-printable encoding, as described by RFC 2045.
///
/// Encoded bytes and soft line endings are both handled, the latter by
/// discarding. Soft breaks may use LF, CRLF, or a lone CR.
///
/// This never fails. Invalid sequences are passed through untransformed.
/// Certain restrictions, such as not having trailing whitespace on a line, are
/// not enforced, and are passed through. 8-bit characters are passed through,
/// including invalid UTF-8.
///
/// Returns the decoded text, as well as a possible "dangling" slice, which
/// represents a QP escape sequence that is not yet complete.
pub fn qp_decode(s: &[u8]) -> (Cow<[u8]>, &[u8]) {
    if memchr::memchr(b'=', s).is_none() {
        return (Cow::Borrowed(s), &[]);
    }

    let mut transformed = Vec::with_capacity(s.len());
    let mut dangling: Option<&[u8]> = None;

    let mut split = s.split(|&b| b'=' == b).peekable();
    if let Some(prefix) = split.next() {
        transformed.extend_from_slice(prefix);
    }

    while let Some(element) = split.next() {
        let is_last = split.peek().is_none();

        if let Some(dangling) = dangling.take() {
            transformed.push(b'=');
            transformed.extend_from_slice(dangling);
        }

        if element.is_empty() {
            dangling = Some(element);
            continue;
        }

        if b'\n' == element[0] {
            // Soft line break with UNIX ending, discard
            transformed.extend_from_slice(&element[1..]);
            continue;
        }

        if b"\r" == element && !is_last {
            // Soft line break with a bare CR, directly followed by another
            // escape
            continue;
        }

        // All other = sequences are two bytes long
        if element.len() < 2 {
            dangling = Some(element);
            continue;
        }

        let encoded = &element[..2];
        let tail = &element[2..];
        if b"\r\n" == encoded {
            // Soft line break with DOS ending, discard
            transformed.extend_from_slice(tail);
            continue;
        }

        if b'\r' == encoded[0] {
            // Soft line break with a bare CR
            transformed.extend_from_slice(&element[1..]);
            continue;
        }

        if let Some(ch) = str::from_utf8(encoded)
            .ok()
            .and_then(|e| u8::from_str_radix(e, 16).ok())
        {
            // Valid encoded byte
            transformed.push(ch);
            transformed.extend_from_slice(tail);
        } else {
            // Invalid encoding, just push the whole string verbatim
            transformed.push(b'=');
            transformed.extend_from_slice(element);
        }
    }

    (
        Cow::Owned(transformed),
        dangling.map(|d| &s[s.len() - d.len() - 1..]).unwrap_or(&[]),
    )
}

/// Streaming quoted-printable encoder.
///
/// Line breaks in the input are passed through literally, so text keeps its
/// line structure. Whitespace immediately before a line break or the end of
/// input is encoded. Lines are soft-broken so that no encoded line exceeds 76
/// bytes.
pub struct QpEncoder<W> {
    inner: W,
    soft_break: &'static [u8],
    line_len: usize,
    pending_space: Option<u8>,
    out: Vec<u8>,
}

impl<W: Write> QpEncoder<W> {
    pub fn new(inner: W, lbr: Break) -> Self {
        QpEncoder {
            inner,
            soft_break: match lbr {
                Break::Lf | Break::Lfcr => b"=\n",
                Break::Crlf => b"=\r\n",
                Break::Cr => b"=\r",
            },
            line_len: 0,
            pending_space: None,
            out: Vec::new(),
        }
    }

    /// Flushes any held whitespace and returns the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(space) = self.pending_space.take() {
            self.push_escaped(space);
        }
        self.inner.write_all(&self.out)?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn push_token(&mut self, token: &[u8]) {
        if self.line_len + token.len() > MAX_LINE {
            self.out.extend_from_slice(self.soft_break);
            self.line_len = 0;
        }
        self.out.extend_from_slice(token);
        self.line_len += token.len();
    }

    fn push_escaped(&mut self, byte: u8) {
        const HEX: &[u8; 16] = b"0123456789ABCDEF";
        self.push_token(&[
            b'=',
            HEX[(byte >> 4) as usize],
            HEX[(byte & 0xF) as usize],
        ]);
    }

    fn push_byte(&mut self, byte: u8) {
        match byte {
            b'\r' | b'\n' => {
                if let Some(space) = self.pending_space.take() {
                    self.push_escaped(space);
                }
                self.out.push(byte);
                self.line_len = 0;
            },

            b' ' | b'\t' => {
                if let Some(space) = self.pending_space.replace(byte) {
                    self.push_token(&[space]);
                }
            },

            _ => {
                if let Some(space) = self.pending_space.take() {
                    self.push_token(&[space]);
                }

                if (b'!'..=b'~').contains(&byte) && b'=' != byte {
                    self.push_token(&[byte]);
                } else {
                    self.push_escaped(byte);
                }
            },
        }
    }
}

impl<W: Write> Write for QpEncoder<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        for &byte in data {
            self.push_byte(byte);
        }

        self.inner.write_all(&self.out)?;
        self.out.clear();
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Encodes `data` in one shot.
pub fn qp_encode(data: &[u8], lbr: Break) -> Vec<u8> {
    let mut encoder = QpEncoder::new(io::sink(), lbr);
    for &byte in data {
        encoder.push_byte(byte);
    }
    if let Some(space) = encoder.pending_space.take() {
        encoder.push_escaped(space);
    }
    encoder.out
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn assert_qp(expected: &[u8], expected_dangling: &[u8], input: &[u8]) {
        let (actual, actual_dangling) = qp_decode(input);
        assert_eq!(expected, &actual[..]);
        assert_eq!(expected_dangling, actual_dangling);
    }

    #[test]
    fn test_qp_decode() {
        assert_qp(b"hello world", b"", b"hello world");
        assert_qp(b"\xabfoo", b"", b"=ABfoo");
        assert_qp(b"fo\xabo", b"", b"fo=ABo");
        assert_qp(b"foo\xab", b"", b"foo=AB");

        assert_qp(b"foo\xab\xcd", b"", b"foo=AB=CD");
        assert_qp(b"foo\xabbar\xcd", b"", b"foo=ABbar=CD");

        assert_qp(b"foo", b"", b"foo=\n");
        assert_qp(b"foobar", b"", b"foo=\nbar");
        assert_qp(b"foo", b"", b"foo=\r\n");
        assert_qp(b"foobar", b"", b"foo=\r\nbar");
        assert_qp(b"foobar", b"", b"foo=\rbar");
        assert_qp(b"a=b", b"", b"a=\r=3Db");

        assert_qp(b"foo=()bar", b"", b"foo=()bar");
        assert_qp(b"foo=\xabbar", b"", b"foo==ABbar");
        assert_qp(b"foo=A\xabbar", b"", b"foo=A=ABbar");
        assert_qp("foo=ゑbar".as_bytes(), b"", "foo=ゑbar".as_bytes());
        assert_qp(b"foo=\x80\x80bar", b"", b"foo=\x80\x80bar");

        assert_qp(b"foo", b"=", b"foo=");
        assert_qp(b"foo", b"=A", b"foo=A");
        assert_qp(b"foo", b"=\r", b"foo=\r");
        assert_qp(b"", b"=", b"=");
    }

    #[test]
    fn test_qp_encode() {
        assert_eq!(
            b"hello world".to_vec(),
            qp_encode(b"hello world", Break::Lf)
        );
        assert_eq!(b"a=3Db".to_vec(), qp_encode(b"a=b", Break::Lf));
        assert_eq!(
            b"caf=C3=A9\r\nnext".to_vec(),
            qp_encode("café\r\nnext".as_bytes(), Break::Crlf)
        );
        assert_eq!(
            b"trailing=20\nspace=09".to_vec(),
            qp_encode(b"trailing \nspace\t", Break::Lf)
        );
        assert_eq!(b"a  b".to_vec(), qp_encode(b"a  b", Break::Lf));

        let long = vec![b'x'; 100];
        let encoded = qp_encode(&long, Break::Crlf);
        let mut expected = vec![b'x'; 75];
        expected.extend_from_slice(b"=\r\n");
        expected.extend_from_slice(&[b'x'; 25]);
        assert_eq!(expected, encoded);
    }

    #[test]
    fn streaming_encoder_matches_one_shot() {
        let data = "Grüße aus der Ferne \r\n\ttabbed = line ".as_bytes();
        let mut encoder = QpEncoder::new(Vec::new(), Break::Crlf);
        for chunk in data.chunks(3) {
            encoder.write_all(chunk).unwrap();
        }
        let streamed = encoder.finish().unwrap();
        assert_eq!(qp_encode(data, Break::Crlf), streamed);
    }

    proptest! {
        #[test]
        fn qp_decode_never_fails_for_str(s in ".*") {
            qp_decode(s.as_bytes());
        }

        #[test]
        fn qp_decode_never_fails_for_bytes(
            s in prop::collection::vec(prop::num::u8::ANY, 0..20)
        ) {
            qp_decode(&s);
        }

        #[test]
        fn qp_encoding_is_reversible(
            s in prop::collection::vec(prop::num::u8::ANY, 0..300)
        ) {
            for &lbr in &[Break::Lf, Break::Crlf, Break::Cr] {
                let encoded = qp_encode(&s, lbr);
                for line in encoded.split(|&b| b'\n' == b || b'\r' == b) {
                    prop_assert!(line.len() <= MAX_LINE + 1);
                }
                let (decoded, dangling) = qp_decode(&encoded);
                prop_assert!(dangling.is_empty());
                prop_assert_eq!(&s[..], &decoded[..]);
            }
        }
    }
}
