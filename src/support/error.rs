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

use std::fmt;
use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Header begins with {} bytes of junk", skipped.len())]
    BadStart { skipped: Vec<u8> },
    #[error("Field index {index} out of range (header has {len} fields)")]
    FieldIndexOutOfRange { index: usize, len: usize },
    #[error("No {0} field in header")]
    NotFound(String),
    #[error("Expected one {name} field, found {count}")]
    TooManyFields { name: String, count: usize },
    #[error("No {0} parameter")]
    NotFoundParameter(String),
    #[error("Field requires a single mailbox, not a group")]
    WrongAddressType,
    #[error("Multipart Content-Type has no boundary")]
    NoBoundary,
    #[error("{} error(s) while parsing message: {}", .0.len(), ErrorList(.0))]
    Parse(Vec<Error>),
    #[error("Unparseable date/time: {0:?}")]
    TimeParse(String),
    #[error("Unsupported charset: {0}")]
    CharsetUnsupported(String),
    #[error("Text cannot be represented in charset {0}")]
    Charset(String),
    #[error("Transfer encoding {0:?} not supported")]
    TransferEncoding(String),
    #[error("Part is multipart and has no single body")]
    Multipart,
    #[error("Part is not multipart")]
    NotMultipart,
    #[error("Invalid field name: {0:?}")]
    InvalidFieldName(String),
    #[error("Raw field bytes have no colon at {0}")]
    InvalidRaw(usize),
    #[error("Invalid fold encoding: {0}")]
    InvalidFoldEncoding(&'static str),
    #[error("Unparseable address list: {0:?}")]
    InvalidAddress(String),
    #[error("Unparseable parameterised value: {0:?}")]
    InvalidParamValue(String),
    #[error("Part has no header/body separator")]
    NoHeaderBodySplit,
    #[error("Empty part")]
    EmptyPart,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

struct ErrorList<'a>(&'a [Error]);

impl fmt::Display for ErrorList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, e) in self.0.iter().enumerate() {
            if ix > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

/// A best-effort value returned alongside the error that prevented a clean
/// result.
///
/// Callers which consider the error fatal can use `?`, since `Partial`
/// converts into `Error` by discarding the value. Callers which don't can use
/// `best_effort()` or `into_parts()`.
#[derive(Debug)]
pub struct Partial<T> {
    pub value: T,
    pub error: Error,
}

pub type Resumable<T> = Result<T, Partial<T>>;

impl<T> Partial<T> {
    pub fn new(value: T, error: Error) -> Self {
        Partial { value, error }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Partial<U> {
        Partial {
            value: f(self.value),
            error: self.error,
        }
    }
}

impl<T> From<Partial<T>> for Error {
    fn from(p: Partial<T>) -> Self {
        p.error
    }
}

/// Extension methods for `Resumable`.
pub trait ResumableExt<T> {
    /// Returns the value, whether or not an error accompanied it.
    fn best_effort(self) -> T;
    /// Splits into the value and the error, if any.
    fn into_parts(self) -> (T, Option<Error>);
}

impl<T> ResumableExt<T> for Resumable<T> {
    fn best_effort(self) -> T {
        match self {
            Ok(v) => v,
            Err(p) => p.value,
        }
    }

    fn into_parts(self) -> (T, Option<Error>) {
        match self {
            Ok(v) => (v, None),
            Err(p) => (p.value, Some(p.error)),
        }
    }
}

impl Error {
    /// Whether this is `NotFound`, which many callers treat as an empty value.
    pub fn is_not_found(&self) -> bool {
        matches!(*self, Error::NotFound(_))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_error_lists_children() {
        let e = Error::Parse(vec![Error::EmptyPart, Error::NoBoundary]);
        assert_eq!(
            "2 error(s) while parsing message: Empty part; \
             Multipart Content-Type has no boundary",
            e.to_string()
        );
    }

    #[test]
    fn resumable_helpers() {
        let r: Resumable<u32> = Err(Partial::new(42, Error::NoBoundary));
        let (v, e) = r.into_parts();
        assert_eq!(42, v);
        assert_matches!(Some(Error::NoBoundary), e);

        let r: Resumable<u32> = Ok(7);
        assert_eq!(7, r.best_effort());

        fn fatal() -> Result<u32, Error> {
            let r: Resumable<u32> =
                Err(Partial::new(1, Error::NotFound("To".to_owned())));
            Ok(r?)
        }
        assert_matches!(Err(Error::NotFound(_)), fatal());
    }
}
