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

//! Named charsets and the process-wide registry used to look them up.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;

use crate::support::error::Error;

/// A bidirectional translation between bytes in some charset and Unicode.
pub trait Charset: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<String, Error>;
    fn encode(&self, text: &str) -> Result<Vec<u8>, Error>;
}

struct Utf8;

impl Charset for Utf8 {
    fn decode(&self, bytes: &[u8]) -> Result<String, Error> {
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::Charset("utf-8".to_owned()))
    }

    fn encode(&self, text: &str) -> Result<Vec<u8>, Error> {
        Ok(text.as_bytes().to_vec())
    }
}

struct Ascii;

impl Charset for Ascii {
    fn decode(&self, bytes: &[u8]) -> Result<String, Error> {
        if bytes.is_ascii() {
            // ASCII is a subset of UTF-8
            Ok(String::from_utf8_lossy(bytes).into_owned())
        } else {
            Err(Error::Charset("us-ascii".to_owned()))
        }
    }

    fn encode(&self, text: &str) -> Result<Vec<u8>, Error> {
        if text.is_ascii() {
            Ok(text.as_bytes().to_vec())
        } else {
            Err(Error::Charset("us-ascii".to_owned()))
        }
    }
}

/// Adapts an `encoding_rs` encoding.
///
/// Decoding is lossy, as is usual for mail agents: malformed sequences become
/// U+FFFD. Encoding fails if any character is unmappable.
struct EncodingRs(&'static encoding_rs::Encoding);

impl Charset for EncodingRs {
    fn decode(&self, bytes: &[u8]) -> Result<String, Error> {
        Ok(self.0.decode_with_bom_removal(bytes).0.into_owned())
    }

    fn encode(&self, text: &str) -> Result<Vec<u8>, Error> {
        let (encoded, _, had_errors) = self.0.encode(text);
        if had_errors {
            Err(Error::Charset(self.0.name().to_owned()))
        } else {
            Ok(encoded.into_owned())
        }
    }
}

/// Maps charset names (case-insensitively) to implementations.
///
/// The default registry knows only UTF-8 and US-ASCII. `extended()` falls
/// back to every label `encoding_rs` knows for anything not explicitly
/// registered.
#[derive(Clone)]
pub struct CharsetRegistry {
    charsets: HashMap<String, Arc<dyn Charset>>,
    fallback_to_encoding_rs: bool,
}

impl fmt::Debug for CharsetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut names = self.charsets.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("CharsetRegistry")
            .field("charsets", &names)
            .field("fallback_to_encoding_rs", &self.fallback_to_encoding_rs)
            .finish()
    }
}

impl Default for CharsetRegistry {
    fn default() -> Self {
        let mut this = CharsetRegistry::empty();
        let utf8: Arc<dyn Charset> = Arc::new(Utf8);
        let ascii: Arc<dyn Charset> = Arc::new(Ascii);
        this.register("utf-8", Arc::clone(&utf8));
        this.register("utf8", utf8);
        this.register("us-ascii", Arc::clone(&ascii));
        this.register("ascii", ascii);
        this
    }
}

impl CharsetRegistry {
    /// A registry which supports nothing at all.
    pub fn empty() -> Self {
        CharsetRegistry {
            charsets: HashMap::new(),
            fallback_to_encoding_rs: false,
        }
    }

    /// The default registry plus every charset `encoding_rs` supports.
    pub fn extended() -> Self {
        CharsetRegistry {
            fallback_to_encoding_rs: true,
            ..CharsetRegistry::default()
        }
    }

    /// Registers `charset` under `name`, replacing any existing entry.
    pub fn register(&mut self, name: &str, charset: Arc<dyn Charset>) {
        self.charsets.insert(name.to_ascii_lowercase(), charset);
    }

    /// Registers the `encoding_rs` implementation of `label`.
    pub fn register_encoding(&mut self, label: &str) -> Result<(), Error> {
        let encoding =
            encoding_rs::Encoding::for_label_no_replacement(label.as_bytes())
                .ok_or_else(|| Error::CharsetUnsupported(label.to_owned()))?;
        self.register(label, Arc::new(EncodingRs(encoding)));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Charset>, Error> {
        // RFC 2231 allows a language suffix, as in `us-ascii*en`
        let name = name.split('*').next().unwrap_or("").trim();

        if let Some(charset) = self.charsets.get(&name.to_ascii_lowercase()) {
            return Ok(Arc::clone(charset));
        }

        if self.fallback_to_encoding_rs {
            if let Some(encoding) =
                encoding_rs::Encoding::for_label_no_replacement(name.as_bytes())
            {
                return Ok(Arc::new(EncodingRs(encoding)));
            }
        }

        Err(Error::CharsetUnsupported(name.to_owned()))
    }

    pub fn decode(&self, name: &str, bytes: &[u8]) -> Result<String, Error> {
        self.lookup(name)?.decode(bytes)
    }

    pub fn encode(&self, name: &str, text: &str) -> Result<Vec<u8>, Error> {
        self.lookup(name)?.encode(text)
    }
}

lazy_static! {
    static ref REGISTRY: RwLock<Arc<CharsetRegistry>> =
        RwLock::new(Arc::new(CharsetRegistry::default()));
}

/// Returns the process-wide registry.
///
/// The returned snapshot is unaffected by later calls to `set_registry`.
pub fn registry() -> Arc<CharsetRegistry> {
    match REGISTRY.read() {
        Ok(r) => Arc::clone(&r),
        Err(poisoned) => Arc::clone(&poisoned.into_inner()),
    }
}

/// Replaces the process-wide registry.
///
/// This is meant to be done once at startup.
pub fn set_registry(registry: CharsetRegistry) {
    let registry = Arc::new(registry);
    match REGISTRY.write() {
        Ok(mut r) => *r = registry,
        Err(poisoned) => *poisoned.into_inner() = registry,
    }
}
