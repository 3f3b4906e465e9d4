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


//! The header model: an ordered list of fields with typed accessors for the
//! well-known ones.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;

use chrono::prelude::*;

use super::address;
use super::date;
use super::field::{Field, FoldEncoding};
use super::model::{AddressList, Mailbox};
use super::param::ParamValue;
use super::split::{self, Break};
use crate::support::error::{Error, Partial, Resumable};

/// A parsed structured value, memoised by lowercased field name.
#[derive(Clone, Debug)]
enum Cached {
    Time(DateTime<FixedOffset>),
    AddressList(AddressList),
    AllAddressLists(AddressList),
    Param(ParamValue),
    Keywords(Vec<String>),
    Strings(Vec<String>),
}

/// An ordered sequence of fields.
///
/// Name lookups ignore ASCII case. Duplicate names are allowed and field order
/// is always preserved.
///
/// Typed getters memoise what they parse. The memo for a name is dropped
/// whenever a field with that name is added, removed, or given a new body
/// through the header; `get_field_mut` drops all of them since it can't know
/// what the caller will change.
#[derive(Clone, Debug)]
pub struct Header {
    fields: Vec<Field>,
    lbr: Option<Break>,
    fold: FoldEncoding,
    // Whether the blank line after the fields is written even with no body
    blank_line: bool,
    cache: RefCell<HashMap<String, Arc<Cached>>>,
}

impl Default for Header {
    fn default() -> Self {
        Header {
            fields: Vec::new(),
            lbr: None,
            fold: FoldEncoding::default(),
            blank_line: true,
            cache: RefCell::new(HashMap::new()),
        }
    }
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses header bytes (not including the blank line) which use `lbr`.
    ///
    /// Lines before the first field are dropped and reported as `BadStart`
    /// alongside the header made of everything else.
    pub fn parse(bytes: &[u8], lbr: Break) -> Resumable<Self> {
        let lines = split::split_fields(bytes, lbr);
        let header = Header {
            fields: lines.fields.iter().map(|f| Field::parse(f)).collect(),
            lbr: Some(lbr),
            ..Header::default()
        };

        if lines.junk.is_empty() {
            Ok(header)
        } else {
            log::warn!(
                "Discarding {} bytes of junk before first header field",
                lines.junk.len()
            );
            Err(Partial::new(
                header,
                Error::BadStart {
                    skipped: lines.junk.to_vec(),
                },
            ))
        }
    }

    /// The line break this header was parsed with or was given.
    pub fn lbr(&self) -> Option<Break> {
        self.lbr
    }

    pub fn set_lbr(&mut self, lbr: Option<Break>) {
        self.lbr = lbr;
    }

    /// The line break used when writing, CRLF if none was set.
    pub fn break_or_default(&self) -> Break {
        self.lbr.unwrap_or_default()
    }

    pub fn fold(&self) -> &FoldEncoding {
        &self.fold
    }

    pub fn set_fold(&mut self, fold: FoldEncoding) {
        self.fold = fold;
    }

    pub(crate) fn set_blank_line(&mut self, blank_line: bool) {
        self.blank_line = blank_line;
    }

    // Positional access

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get_field_by_index(&self, index: usize) -> Result<&Field, Error> {
        let len = self.fields.len();
        self.fields
            .get(index)
            .ok_or(Error::FieldIndexOutOfRange { index, len })
    }

    pub fn get_field_mut(&mut self, index: usize) -> Result<&mut Field, Error> {
        let len = self.fields.len();
        self.cache.get_mut().clear();
        self.fields
            .get_mut(index)
            .ok_or(Error::FieldIndexOutOfRange { index, len })
    }

    /// Inserts `field` so that it ends up at `index`. `index` may equal the
    /// length, which appends.
    pub fn insert_before(
        &mut self,
        index: usize,
        field: Field,
    ) -> Result<(), Error> {
        if index > self.fields.len() {
            return Err(Error::FieldIndexOutOfRange {
                index,
                len: self.fields.len(),
            });
        }

        self.invalidate(field.name());
        self.fields.insert(index, field);
        Ok(())
    }

    pub fn push(&mut self, field: Field) {
        self.invalidate(field.name());
        self.fields.push(field);
    }

    /// Removes and returns the field at `index`.
    pub fn delete(&mut self, index: usize) -> Result<Field, Error> {
        if index >= self.fields.len() {
            return Err(Error::FieldIndexOutOfRange {
                index,
                len: self.fields.len(),
            });
        }

        let field = self.fields.remove(index);
        self.invalidate(field.name());
        Ok(field)
    }

    pub fn clear(&mut self) {
        self.fields.clear();
        self.cache.get_mut().clear();
    }

    // Access by name

    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.is(name))
    }

    pub fn get_all_fields<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Field> + 'a {
        self.fields.iter().filter(move |f| f.is(name))
    }

    pub fn get_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.is(name))
    }

    pub fn get_all_indexes(&self, name: &str) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|&(_, f)| f.is(name))
            .map(|(ix, _)| ix)
            .collect()
    }

    pub fn get_body(&self, name: &str) -> Option<&str> {
        self.get_field(name).map(Field::body)
    }

    pub fn get_all_bodies<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.get_all_fields(name).map(Field::body)
    }

    /// Returns the body of the only field called `name`.
    ///
    /// If there is more than one, the first body is returned with a
    /// `TooManyFields` error. If there are none, the value is empty and the
    /// error is `NotFound`.
    pub fn get(&self, name: &str) -> Resumable<String> {
        let mut bodies = self.get_all_bodies(name);
        let first = match bodies.next() {
            Some(body) => body.to_owned(),
            None => {
                return Err(Partial::new(
                    String::new(),
                    Error::NotFound(name.to_owned()),
                ))
            },
        };

        let extra = bodies.count();
        if 0 == extra {
            Ok(first)
        } else {
            Err(Partial::new(
                first,
                Error::TooManyFields {
                    name: name.to_owned(),
                    count: extra + 1,
                },
            ))
        }
    }

    /// Sets the body of the field called `name`.
    ///
    /// The first such field is changed in place and any others are removed.
    /// If there is none, a new field is appended.
    pub fn set(
        &mut self,
        name: &str,
        body: impl Into<String>,
    ) -> Result<(), Error> {
        self.set_all(name, Some(body))
    }

    /// Makes the fields called `name` have exactly the bodies in `bodies`.
    ///
    /// Existing fields are reused in order, so their positions don't change.
    /// Extra fields are deleted, and missing ones are appended.
    pub fn set_all<S: Into<String>>(
        &mut self,
        name: &str,
        bodies: impl IntoIterator<Item = S>,
    ) -> Result<(), Error> {
        let indexes = self.get_all_indexes(name);
        let mut used = 0;
        for body in bodies {
            let body = body.into();
            if let Some(&ix) = indexes.get(used) {
                self.fields[ix].set_body(body);
            } else {
                self.fields.push(Field::new(name, body)?);
            }
            used += 1;
        }

        for &ix in indexes[used.min(indexes.len())..].iter().rev() {
            self.fields.remove(ix);
        }

        self.invalidate(name);
        Ok(())
    }

    // Typed access

    /// Parses the first field called `name` as a date.
    pub fn get_time(&self, name: &str) -> Result<DateTime<FixedOffset>, Error> {
        let key = name.to_ascii_lowercase();
        if let Some(cached) = self.cache_get(&key) {
            if let Cached::Time(t) = *cached {
                return Ok(t);
            }
        }

        let t = date::parse_time(self.require_body(name)?)?;
        self.cache_put(key, Cached::Time(t));
        Ok(t)
    }

    pub fn set_time(
        &mut self,
        name: &str,
        t: &DateTime<FixedOffset>,
    ) -> Result<(), Error> {
        self.set(name, date::format_time(t))?;
        self.cache_put(name.to_ascii_lowercase(), Cached::Time(*t));
        Ok(())
    }

    pub fn date(&self) -> Result<DateTime<FixedOffset>, Error> {
        self.get_time("Date")
    }

    pub fn set_date(&mut self, t: &DateTime<FixedOffset>) -> Result<(), Error> {
        self.set_time("Date", t)
    }

    /// Parses the first field called `name` as an address list.
    ///
    /// A present but blank field is an empty list.
    pub fn get_address_list(&self, name: &str) -> Result<AddressList, Error> {
        let key = name.to_ascii_lowercase();
        if let Some(cached) = self.cache_get(&key) {
            if let Cached::AddressList(ref list) = *cached {
                return Ok(list.clone());
            }
        }

        let list = address::parse_address_list(self.require_body(name)?);
        self.cache_put(key, Cached::AddressList(list.clone()));
        Ok(list)
    }

    /// Parses every field called `name` as an address list and concatenates
    /// the results, in order.
    pub fn get_all_address_lists(&self, name: &str) -> AddressList {
        let key = name.to_ascii_lowercase();
        if let Some(cached) = self.cache_get(&key) {
            if let Cached::AllAddressLists(ref list) = *cached {
                return list.clone();
            }
        }

        let list = AddressList(
            self.get_all_bodies(name)
                .flat_map(|body| address::parse_address_list(body).0)
                .collect(),
        );
        self.cache_put(key, Cached::AllAddressLists(list.clone()));
        list
    }

    pub fn set_address_list(
        &mut self,
        name: &str,
        list: &AddressList,
    ) -> Result<(), Error> {
        self.set(name, list.to_string())?;
        self.cache_put(
            name.to_ascii_lowercase(),
            Cached::AddressList(list.clone()),
        );
        Ok(())
    }

    /// Parses `s` and sets it as the address list `name`.
    ///
    /// Fails without changing anything if `s` holds no address.
    pub fn set_address_list_str(
        &mut self,
        name: &str,
        s: &str,
    ) -> Result<(), Error> {
        let list = address::parse_address_list_strictly(s)?;
        self.set_address_list(name, &list)
    }

    pub fn to(&self) -> Result<AddressList, Error> {
        self.get_address_list("To")
    }

    pub fn cc(&self) -> Result<AddressList, Error> {
        self.get_address_list("Cc")
    }

    pub fn bcc(&self) -> Result<AddressList, Error> {
        self.get_address_list("Bcc")
    }

    pub fn from(&self) -> Result<AddressList, Error> {
        self.get_address_list("From")
    }

    pub fn reply_to(&self) -> Result<AddressList, Error> {
        self.get_address_list("Reply-To")
    }

    /// The single mailbox of the `Sender` field.
    pub fn sender(&self) -> Result<Mailbox, Error> {
        address::parse_single_mailbox(self.require_body("Sender")?)
    }

    pub fn set_sender(&mut self, mailbox: &Mailbox) -> Result<(), Error> {
        self.set_address_list("Sender", &vec![mailbox.clone()].into())
    }

    /// Parses the first field called `name` as a parameterised value.
    pub fn get_param(&self, name: &str) -> Result<ParamValue, Error> {
        let key = name.to_ascii_lowercase();
        if let Some(cached) = self.cache_get(&key) {
            if let Cached::Param(ref pv) = *cached {
                return Ok(pv.clone());
            }
        }

        let pv = ParamValue::parse(self.require_body(name)?);
        self.cache_put(key, Cached::Param(pv.clone()));
        Ok(pv)
    }

    pub fn set_param(
        &mut self,
        name: &str,
        value: &ParamValue,
    ) -> Result<(), Error> {
        self.set(name, value.to_string())?;
        self.cache_put(name.to_ascii_lowercase(), Cached::Param(value.clone()));
        Ok(())
    }

    pub fn content_type(&self) -> Result<ParamValue, Error> {
        self.get_param("Content-Type")
    }

    pub fn set_content_type(
        &mut self,
        value: &ParamValue,
    ) -> Result<(), Error> {
        self.set_param("Content-Type", value)
    }

    /// The lowercased media type, e.g. `text/plain`.
    pub fn media_type(&self) -> Result<String, Error> {
        self.content_type().map(|ct| ct.media_type())
    }

    pub fn charset(&self) -> Result<String, Error> {
        self.content_type()?.charset().map(str::to_owned)
    }

    pub fn boundary(&self) -> Result<String, Error> {
        self.content_type()?.boundary().map(str::to_owned)
    }

    pub fn content_disposition(&self) -> Result<ParamValue, Error> {
        self.get_param("Content-Disposition")
    }

    pub fn set_content_disposition(
        &mut self,
        value: &ParamValue,
    ) -> Result<(), Error> {
        self.set_param("Content-Disposition", value)
    }

    /// The lowercased disposition, e.g. `attachment`.
    pub fn presentation(&self) -> Result<String, Error> {
        self.content_disposition().map(|cd| cd.presentation())
    }

    pub fn filename(&self) -> Result<String, Error> {
        self.content_disposition()?
            .filename()
            .map(str::to_owned)
    }

    /// All keywords from every `Keywords` field, in order.
    pub fn keywords(&self) -> Vec<String> {
        if let Some(cached) = self.cache_get("keywords") {
            if let Cached::Keywords(ref kw) = *cached {
                return kw.clone();
            }
        }

        let kw = self
            .get_all_bodies("Keywords")
            .flat_map(|body| body.split(','))
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_owned)
            .collect::<Vec<_>>();
        self.cache_put("keywords".to_owned(), Cached::Keywords(kw.clone()));
        kw
    }

    /// Replaces all `Keywords` fields with a single one.
    pub fn set_keywords<S: AsRef<str>>(
        &mut self,
        keywords: &[S],
    ) -> Result<(), Error> {
        let body = keywords
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(", ");
        self.set("Keywords", body)?;
        self.cache_put(
            "keywords".to_owned(),
            Cached::Keywords(
                keywords.iter().map(|k| k.as_ref().to_owned()).collect(),
            ),
        );
        Ok(())
    }

    pub fn subject(&self) -> Resumable<String> {
        self.get("Subject")
    }

    pub fn set_subject(&mut self, subject: &str) -> Result<(), Error> {
        self.set("Subject", subject)
    }

    pub fn message_id(&self) -> Result<String, Error> {
        self.require_body("Message-ID").map(|b| b.trim().to_owned())
    }

    pub fn set_message_id(&mut self, id: &str) -> Result<(), Error> {
        self.set("Message-ID", id)
    }

    /// The message IDs listed in the first field called `name`.
    pub fn get_message_ids(&self, name: &str) -> Result<Vec<String>, Error> {
        let key = name.to_ascii_lowercase();
        if let Some(cached) = self.cache_get(&key) {
            if let Cached::Strings(ref ids) = *cached {
                return Ok(ids.clone());
            }
        }

        let ids = message_ids(self.require_body(name)?);
        self.cache_put(key, Cached::Strings(ids.clone()));
        Ok(ids)
    }

    pub fn set_message_ids<S: AsRef<str>>(
        &mut self,
        name: &str,
        ids: &[S],
    ) -> Result<(), Error> {
        let ids = ids
            .iter()
            .map(|id| id.as_ref().to_owned())
            .collect::<Vec<_>>();
        self.set(name, ids.join(" "))?;
        self.cache_put(name.to_ascii_lowercase(), Cached::Strings(ids));
        Ok(())
    }

    pub fn references(&self) -> Result<Vec<String>, Error> {
        self.get_message_ids("References")
    }

    pub fn in_reply_to(&self) -> Result<Vec<String>, Error> {
        self.get_message_ids("In-Reply-To")
    }

    /// The lowercased `Content-Transfer-Encoding`, or empty if there is none.
    pub fn transfer_encoding(&self) -> String {
        self.get_body("Content-Transfer-Encoding")
            .map(|cte| cte.trim().to_ascii_lowercase())
            .unwrap_or_default()
    }

    pub fn set_transfer_encoding(&mut self, cte: &str) -> Result<(), Error> {
        self.set("Content-Transfer-Encoding", cte)
    }

    // Output

    /// Writes the fields and, if there is one, the blank line.
    ///
    /// A parsed header with no blank line gets one anyway when `body_follows`,
    /// unless it has no fields at all, in which case the body is written
    /// bare, as it was read.
    pub fn write_to(
        &self,
        w: &mut dyn Write,
        body_follows: bool,
    ) -> io::Result<u64> {
        let lbr = self.break_or_default();
        let blank_line =
            self.blank_line || (body_follows && !self.fields.is_empty());
        let mut written = 0u64;

        for (ix, field) in self.fields.iter().enumerate() {
            let bytes = field.encoded(lbr, &self.fold);
            w.write_all(&bytes)?;
            written += bytes.len() as u64;

            // A raw field at the end of a header-only message may have no
            // line break of its own
            let more = blank_line || ix + 1 < self.fields.len();
            if more && !bytes.ends_with(b"\n") && !bytes.ends_with(b"\r") {
                w.write_all(lbr.as_bytes())?;
                written += lbr.len() as u64;
            }
        }

        if blank_line {
            w.write_all(lbr.as_bytes())?;
            written += lbr.len() as u64;
        }

        Ok(written)
    }

    fn require_body(&self, name: &str) -> Result<&str, Error> {
        self.get_body(name)
            .ok_or_else(|| Error::NotFound(name.to_owned()))
    }

    fn cache_get(&self, key: &str) -> Option<Arc<Cached>> {
        self.cache.borrow().get(key).cloned()
    }

    fn cache_put(&self, key: String, value: Cached) {
        self.cache.borrow_mut().insert(key, Arc::new(value));
    }

    fn invalidate(&mut self, name: &str) {
        self.cache.get_mut().remove(&name.to_ascii_lowercase());
    }
}

/// Extracts `<id>` tokens, falling back to whitespace-separated words for
/// bodies with no angle brackets at all.
fn message_ids(body: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut rest = body;
    while let Some(open) = rest.find('<') {
        match rest[open..].find('>') {
            Some(close) => {
                ids.push(rest[open..open + close + 1].to_owned());
                rest = &rest[open + close + 1..];
            },
            None => break,
        }
    }

    if ids.is_empty() {
        ids = body.split_whitespace().map(str::to_owned).collect();
    }
    ids
}
