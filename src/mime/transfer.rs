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


//! Content-Transfer-Encoding codecs and the registry that selects them.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;

use super::header::Header;
use super::quoted_printable::{qp_decode, QpEncoder};
use super::split::Break;
use crate::support::error::Error;

/// Longest base64 line we write, not counting the line break.
pub const BASE64_LINE: usize = 76;

/// A `Write` which must be explicitly finished to flush buffered state.
pub trait TransferEncoder: Write {
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// A bidirectional transfer encoding.
pub trait TransferCodec: Send + Sync {
    /// Wraps `inner` so that everything written is encoded into it, using
    /// `lbr` for any line breaks the encoding introduces.
    fn encoder<'a>(
        &self,
        inner: Box<dyn Write + 'a>,
        lbr: Break,
    ) -> Box<dyn TransferEncoder + 'a>;

    /// Wraps `inner` so that reads yield decoded data.
    fn decoder<'a>(&self, inner: Box<dyn Read + 'a>) -> Box<dyn Read + 'a>;
}

struct Identity;

struct IdentityEncoder<'a>(Box<dyn Write + 'a>);

impl Write for IdentityEncoder<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl TransferEncoder for IdentityEncoder<'_> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.0.flush()
    }
}

impl TransferCodec for Identity {
    fn encoder<'a>(
        &self,
        inner: Box<dyn Write + 'a>,
        _: Break,
    ) -> Box<dyn TransferEncoder + 'a> {
        Box::new(IdentityEncoder(inner))
    }

    fn decoder<'a>(&self, inner: Box<dyn Read + 'a>) -> Box<dyn Read + 'a> {
        inner
    }
}

struct QuotedPrintable;

impl<W: Write> TransferEncoder for QpEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        QpEncoder::finish(*self).map(|_| ())
    }
}

impl TransferCodec for QuotedPrintable {
    fn encoder<'a>(
        &self,
        inner: Box<dyn Write + 'a>,
        lbr: Break,
    ) -> Box<dyn TransferEncoder + 'a> {
        Box::new(QpEncoder::new(inner, lbr))
    }

    fn decoder<'a>(&self, inner: Box<dyn Read + 'a>) -> Box<dyn Read + 'a> {
        Box::new(DecodingReader::new(inner, QpChunks::default()))
    }
}

struct Base64;

impl TransferCodec for Base64 {
    fn encoder<'a>(
        &self,
        inner: Box<dyn Write + 'a>,
        lbr: Break,
    ) -> Box<dyn TransferEncoder + 'a> {
        Box::new(Base64Encoder {
            inner,
            lbr,
            pending: Vec::with_capacity(3),
            line_len: 0,
            out: String::new(),
        })
    }

    fn decoder<'a>(&self, inner: Box<dyn Read + 'a>) -> Box<dyn Read + 'a> {
        Box::new(DecodingReader::new(inner, Base64Chunks::default()))
    }
}

/// Streaming base64 encoder which breaks lines every `BASE64_LINE` bytes.
///
/// No line break follows the last line.
struct Base64Encoder<'a> {
    inner: Box<dyn Write + 'a>,
    lbr: Break,
    // Input bytes not yet forming a full 3-byte group
    pending: Vec<u8>,
    line_len: usize,
    out: String,
}

impl Base64Encoder<'_> {
    fn emit(&mut self, groups: &[u8]) -> io::Result<()> {
        self.out.clear();
        base64::encode_config_buf(groups, base64::STANDARD, &mut self.out);

        let mut encoded = self.out.as_bytes();
        while !encoded.is_empty() {
            if BASE64_LINE == self.line_len {
                self.inner.write_all(self.lbr.as_bytes())?;
                self.line_len = 0;
            }

            let n = encoded.len().min(BASE64_LINE - self.line_len);
            self.inner.write_all(&encoded[..n])?;
            self.line_len += n;
            encoded = &encoded[n..];
        }

        Ok(())
    }
}

impl Write for Base64Encoder<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut input = data;
        if !self.pending.is_empty() {
            let n = input.len().min(3 - self.pending.len());
            self.pending.extend_from_slice(&input[..n]);
            input = &input[n..];
            if 3 == self.pending.len() {
                let group = [self.pending[0], self.pending[1], self.pending[2]];
                self.pending.clear();
                self.emit(&group)?;
            }
        }

        let whole = input.len() / 3 * 3;
        if whole > 0 {
            self.emit(&input[..whole])?;
        }
        self.pending.extend_from_slice(&input[whole..]);

        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl TransferEncoder for Base64Encoder<'_> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest)?;
        }
        self.inner.flush()
    }
}

/// Incremental decoding state for `DecodingReader`.
trait ChunkDecoder {
    /// Decodes as much of `data` as possible, appending to `out` and holding
    /// back anything incomplete.
    fn push(&mut self, data: &[u8], out: &mut Vec<u8>);
    /// Handles whatever was held back at the end of input.
    fn finish(&mut self, out: &mut Vec<u8>);
}

#[derive(Default)]
struct Base64Chunks {
    input_buffer: Vec<u8>,
}

impl ChunkDecoder for Base64Chunks {
    fn push(&mut self, data: &[u8], out: &mut Vec<u8>) {
        self.input_buffer.extend(data.iter().copied().filter(|&b| {
            b.is_ascii_alphanumeric() || b'+' == b || b'/' == b || b'=' == b
        }));

        let consumed = decode_base64_groups(&self.input_buffer, out);
        self.input_buffer.drain(..consumed);
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        let rest = std::mem::take(&mut self.input_buffer);
        let end = memchr::memchr(b'=', &rest).unwrap_or(rest.len());
        decode_base64_group(&rest[..end], out);
    }
}

/// Decodes every complete 4-character group at the front of `data`, which
/// must contain only base64 alphabet and `=`.
///
/// A padded group ends a block; decoding resumes at the next group, so
/// concatenated blocks each decode in full. Padding found where a group
/// should start is skipped.
///
/// Returns the number of bytes consumed.
fn decode_base64_groups(data: &[u8], out: &mut Vec<u8>) -> usize {
    let mut pos = 0;
    let mut run_start = 0;

    loop {
        if data.get(pos).map_or(false, |&b| b'=' == b) {
            decode_base64_run(&data[run_start..pos], out);
            pos += 1;
            run_start = pos;
            continue;
        }

        let group = match data.get(pos..pos + 4) {
            Some(group) => group,
            None => break,
        };

        if let Some(pad) = memchr::memchr(b'=', group) {
            decode_base64_run(&data[run_start..pos], out);
            decode_base64_group(&group[..pad], out);
            run_start = pos + 4;
        }
        pos += 4;
    }

    decode_base64_run(&data[run_start..pos], out);
    pos
}

/// Decodes whole unpadded groups.
fn decode_base64_run(run: &[u8], out: &mut Vec<u8>) {
    if run.is_empty() {
        return;
    }

    match base64::decode_config(run, base64::STANDARD) {
        Ok(decoded) => out.extend_from_slice(&decoded),
        Err(e) => log::debug!("Discarding undecodable base64: {}", e),
    }
}

/// Decodes a single group with its padding removed.
fn decode_base64_group(group: &[u8], out: &mut Vec<u8>) {
    if group.len() < 2 {
        if !group.is_empty() {
            log::debug!("Discarding {} stray base64 characters", group.len());
        }
        return;
    }

    let mut buf = [0u8; 3];
    let decoded =
        base64::decode_config_slice(group, base64::STANDARD_NO_PAD, &mut buf);
    match decoded {
        Ok(n) => out.extend_from_slice(&buf[..n]),
        Err(e) => log::debug!("Discarding truncated base64: {}", e),
    }
}

#[derive(Default)]
struct QpChunks {
    input_buffer: Vec<u8>,
}

impl ChunkDecoder for QpChunks {
    fn push(&mut self, data: &[u8], out: &mut Vec<u8>) {
        let input: Cow<[u8]> = if self.input_buffer.is_empty() {
            Cow::Borrowed(data)
        } else {
            let mut joined = std::mem::take(&mut self.input_buffer);
            joined.extend_from_slice(data);
            Cow::Owned(joined)
        };

        let (decoded, dangling) = qp_decode(&input);
        out.extend_from_slice(&decoded);
        self.input_buffer.extend_from_slice(dangling);
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        // "=\r" at the very end is a soft break; other incomplete escapes
        // pass through verbatim
        if b"=\r" != &self.input_buffer[..] {
            out.extend_from_slice(&self.input_buffer);
        }
        self.input_buffer.clear();
    }
}

/// Adapts a `ChunkDecoder` into a `Read` over an encoded `Read`.
struct DecodingReader<R, D> {
    inner: R,
    decoder: D,
    chunk: Vec<u8>,
    out: Vec<u8>,
    out_pos: usize,
    eof: bool,
}

impl<R: Read, D: ChunkDecoder> DecodingReader<R, D> {
    fn new(inner: R, decoder: D) -> Self {
        DecodingReader {
            inner,
            decoder,
            chunk: vec![0u8; 4096],
            out: Vec::new(),
            out_pos: 0,
            eof: false,
        }
    }
}

impl<R: Read, D: ChunkDecoder> Read for DecodingReader<R, D> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        while self.out_pos >= self.out.len() && !self.eof {
            self.out.clear();
            self.out_pos = 0;

            let n = match self.inner.read(&mut self.chunk) {
                Ok(n) => n,
                Err(e) if io::ErrorKind::Interrupted == e.kind() => continue,
                Err(e) => return Err(e),
            };

            if 0 == n {
                self.eof = true;
                self.decoder.finish(&mut self.out);
            } else {
                self.decoder.push(&self.chunk[..n], &mut self.out);
            }
        }

        let available = &self.out[self.out_pos..];
        let n = available.len().min(dst.len());
        dst[..n].copy_from_slice(&available[..n]);
        self.out_pos += n;
        Ok(n)
    }
}

/// Maps `Content-Transfer-Encoding` values (case-insensitively) to codecs.
#[derive(Clone)]
pub struct TransferRegistry {
    codecs: HashMap<String, Arc<dyn TransferCodec>>,
}

impl fmt::Debug for TransferRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut names = self.codecs.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("TransferRegistry")
            .field("codecs", &names)
            .finish()
    }
}

impl Default for TransferRegistry {
    fn default() -> Self {
        let mut this = TransferRegistry {
            codecs: HashMap::new(),
        };
        let identity: Arc<dyn TransferCodec> = Arc::new(Identity);
        for &name in &["", "7bit", "8bit", "binary"] {
            this.register(name, Arc::clone(&identity));
        }
        this.register("quoted-printable", Arc::new(QuotedPrintable));
        this.register("base64", Arc::new(Base64));
        this
    }
}

impl TransferRegistry {
    pub fn register(&mut self, name: &str, codec: Arc<dyn TransferCodec>) {
        self.codecs
            .insert(name.trim().to_ascii_lowercase(), codec);
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn TransferCodec>, Error> {
        self.codecs
            .get(&name.trim().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| Error::TransferEncoding(name.to_owned()))
    }

    /// Returns a reader which decodes `r` according to `header`.
    ///
    /// Multipart bodies are never decoded as a whole, whatever encoding they
    /// claim.
    pub fn apply_decoding<'a>(
        &self,
        header: &Header,
        r: Box<dyn Read + 'a>,
    ) -> Result<Box<dyn Read + 'a>, Error> {
        if is_multipart(header) {
            return Ok(r);
        }

        Ok(self.lookup(&header.transfer_encoding())?.decoder(r))
    }

    /// Returns a writer which encodes into `w` according to `header`.
    pub fn apply_encoding<'a>(
        &self,
        header: &Header,
        w: Box<dyn Write + 'a>,
    ) -> Result<Box<dyn TransferEncoder + 'a>, Error> {
        let codec: Arc<dyn TransferCodec> = if is_multipart(header) {
            Arc::new(Identity)
        } else {
            self.lookup(&header.transfer_encoding())?
        };

        Ok(codec.encoder(w, header.break_or_default()))
    }

    /// Decodes a whole body.
    pub fn decode(
        &self,
        header: &Header,
        data: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(data.len());
        self.apply_decoding(header, Box::new(data))?
            .read_to_end(&mut out)?;
        Ok(out)
    }

    /// Encodes a whole body.
    pub fn encode(
        &self,
        header: &Header,
        data: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(data.len() * 4 / 3 + 4);
        {
            let mut encoder = self.apply_encoding(header, Box::new(&mut out))?;
            encoder.write_all(data)?;
            encoder.finish()?;
        }
        Ok(out)
    }
}

fn is_multipart(header: &Header) -> bool {
    header
        .media_type()
        .map_or(false, |mt| mt.starts_with("multipart/"))
}

lazy_static! {
    static ref REGISTRY: RwLock<Arc<TransferRegistry>> =
        RwLock::new(Arc::new(TransferRegistry::default()));
}

/// Returns the process-wide registry.
pub fn registry() -> Arc<TransferRegistry> {
    match REGISTRY.read() {
        Ok(r) => Arc::clone(&r),
        Err(poisoned) => Arc::clone(&poisoned.into_inner()),
    }
}

/// Replaces the process-wide registry.
pub fn set_registry(registry: TransferRegistry) {
    let registry = Arc::new(registry);
    match REGISTRY.write() {
        Ok(mut r) => *r = registry,
        Err(poisoned) => *poisoned.into_inner() = registry,
    }
}
