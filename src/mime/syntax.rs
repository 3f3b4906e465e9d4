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


//! The RFC 5322 grammar for addresses and dates, including the obsolete
//! forms and the RFC 6532 extensions to non-ASCII text.
//!
//! Everything here operates on bytes and returns borrowed syntax trees. The
//! owned, decoded forms callers deal with are in `model`.

use std::borrow::Cow;
use std::str;

use chrono::prelude::*;
use nom::{
    branch::alt,
    bytes::complete::{is_a, is_not, take, take_while1, take_while_m_n},
    character::complete::char,
    combinator::{all_consuming, map, map_opt, opt, value},
    multi::{fold_many0, many0, many0_count, many1_count,
            separated_nonempty_list},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::support::chronox::{self, FixedOffsetX};

type Res<'a, T> = IResult<&'a [u8], T>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddrSpec<'a> {
    pub local: Vec<Cow<'a, [u8]>>,
    pub domain: Vec<Cow<'a, [u8]>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxSpec<'a> {
    pub addr: AddrSpec<'a>,
    pub name: Vec<Cow<'a, [u8]>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupSpec<'a> {
    pub name: Vec<Cow<'a, [u8]>>,
    pub boxes: Vec<MailboxSpec<'a>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddressSpec<'a> {
    Mailbox(MailboxSpec<'a>),
    Group(GroupSpec<'a>),
}

fn is_digit(b: u8) -> bool {
    b.is_ascii_digit()
}

// Only ever applied to slices already matched as ASCII digits
fn digits<T: str::FromStr + Default>(s: &[u8]) -> T {
    str::from_utf8(s)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

// RFC 5322 3.2.1 "quoted-pair", including the 8-bit clean "obsolete" syntax
fn quoted_pair(i: &[u8]) -> Res<&[u8]> {
    preceded(char('\\'), take(1usize))(i)
}

// RFC 5322 3.2.2 "Folding white space".
// Unfolding has already happened by the time anything reaches this grammar,
// but stray line-ending characters are treated as whitespace all the same.
fn fws(i: &[u8]) -> Res<&[u8]> {
    map(is_a(" \t\r\n"), |_| &b" "[..])(i)
}

// RFC 5322 3.2.2 "Comment text".
fn ctext(i: &[u8]) -> Res<&[u8]> {
    is_not("()\\ \t\r\n")(i)
}

// RFC 5322 3.2.2 "Comment content", with FWS moved in here from `comment`.
fn ccontent(i: &[u8]) -> Res<()> {
    alt((
        value((), ctext),
        value((), quoted_pair),
        value((), fws),
        comment,
    ))(i)
}

// RFC 5322 3.2.2 "Comment". Note it is recursive.
fn comment(i: &[u8]) -> Res<()> {
    delimited(char('('), value((), many0_count(ccontent)), char(')'))(i)
}

// RFC 5322 3.2.2 "Comment or folding white space".
// Unlike the RFC, this requires at least one element; use it through `opt`.
fn cfws(i: &[u8]) -> Res<()> {
    value((), many1_count(alt((value((), fws), comment))))(i)
}

fn is_atext(ch: u8) -> bool {
    ch.is_ascii_alphanumeric()
        || b"!#$%&'*+-/=?^_`{|}~".contains(&ch)
        // RFC 6532 Unicode
        || ch >= 0x80
}

// RFC 5322 3.2.3 "Atom text"
fn atext(i: &[u8]) -> Res<&[u8]> {
    take_while1(is_atext)(i)
}

// RFC 5322 3.2.3 "Atom"
fn atom(i: &[u8]) -> Res<&[u8]> {
    delimited(opt(cfws), atext, opt(cfws))(i)
}

// RFC 5322 3.2.4 "Quoted [string] text", plus 8-bit text
fn qtext(i: &[u8]) -> Res<&[u8]> {
    is_not(" \t\r\n\\\"")(i)
}

// RFC 5322 3.2.4 "Quoted [string] content", with FWS moved in here.
fn qcontent(i: &[u8]) -> Res<&[u8]> {
    alt((qtext, quoted_pair, fws))(i)
}

// RFC 5322 3.2.4 "Quoted string"
fn quoted_string(i: &[u8]) -> Res<Vec<u8>> {
    delimited(
        pair(opt(cfws), char('"')),
        fold_many0(qcontent, Vec::new(), |mut acc: Vec<u8>, item| {
            acc.extend_from_slice(item);
            acc
        }),
        pair(char('"'), opt(cfws)),
    )(i)
}

// RFC 5322 3.2.5 "word"
fn word(i: &[u8]) -> Res<Cow<[u8]>> {
    alt((map(atom, Cow::Borrowed), map(quoted_string, Cow::Owned)))(i)
}

// Part of the `obs-phrase` grammar, for the '.' that many agents put
// unquoted into display names.
fn obs_dot(i: &[u8]) -> Res<Cow<[u8]>> {
    // Only need to handle CFWS at end since there is always a preceding token
    // that allows CFWS.
    terminated(value(Cow::Borrowed(&b"."[..]), char('.')), opt(cfws))(i)
}

// RFC 5322 3.2.5 "phrase", plus "obsolete phrase" syntax.
fn phrase(i: &[u8]) -> Res<Vec<Cow<[u8]>>> {
    map(pair(word, many0(alt((word, obs_dot)))), |(head, mut tail)| {
        tail.insert(0, head);
        tail
    })(i)
}

// RFC 5322 3.4.1 local part of address
// Formally, this is `dot-atom / quoted-string / obs-local-part`, with
// `obs-local-part` being `word *("." word)`. Any dot-atom or quoted-string
// conforms to obs-local-part, so we just parse that.
fn local_part(i: &[u8]) -> Res<Vec<Cow<[u8]>>> {
    separated_nonempty_list(char('.'), word)(i)
}

// RFC 5322 4.4 obsolete domain format, which subsumes dot-atom
fn obs_domain(i: &[u8]) -> Res<Vec<Cow<[u8]>>> {
    separated_nonempty_list(char('.'), map(atom, Cow::Borrowed))(i)
}

// RFC 5322 3.4.1 domain name text, amended by RFC 6532
fn dtext(i: &[u8]) -> Res<&[u8]> {
    is_not("[]\\ \t\r\n")(i)
}

// RFC 5322 3.4.1 domain literal content, with FWS moved in here.
fn dcontent(i: &[u8]) -> Res<&[u8]> {
    alt((dtext, quoted_pair, fws))(i)
}

// RFC 5322 3.4.1 domain literal
fn domain_literal(i: &[u8]) -> Res<Vec<u8>> {
    map(
        delimited(
            pair(opt(cfws), char('[')),
            fold_many0(dcontent, vec![b'['], |mut acc: Vec<u8>, item| {
                acc.extend_from_slice(item);
                acc
            }),
            pair(char(']'), opt(cfws)),
        ),
        |mut res| {
            res.push(b']');
            res
        },
    )(i)
}

// RFC 5322 3.4.1 domain
fn domain(i: &[u8]) -> Res<Vec<Cow<[u8]>>> {
    alt((obs_domain, map(domain_literal, |v| vec![Cow::Owned(v)])))(i)
}

// RFC 5322 3.4.1 address specification
fn addr_spec(i: &[u8]) -> Res<AddrSpec> {
    map(
        pair(local_part, preceded(char('@'), domain)),
        |(local, domain)| AddrSpec { local, domain },
    )(i)
}

// RFC 5322 4.4 obsolete routing information, which is discarded
fn obs_route(i: &[u8]) -> Res<()> {
    value(
        (),
        tuple((
            char('@'),
            domain,
            many0_count(tuple((
                many0_count(alt((cfws, value((), char(','))))),
                char('@'),
                domain,
            ))),
            char(':'),
        )),
    )(i)
}

// RFC 5322 3.4 angle-delimited address, including the obsolete route
fn angle_addr(i: &[u8]) -> Res<AddrSpec> {
    delimited(
        tuple((opt(cfws), char('<'), opt(cfws), opt(obs_route))),
        addr_spec,
        pair(char('>'), opt(cfws)),
    )(i)
}

// RFC 5322 3.4 mailbox
fn mailbox(i: &[u8]) -> Res<MailboxSpec> {
    map(
        alt((
            pair(opt(phrase), angle_addr),
            map(addr_spec, |a| (None, a)),
        )),
        |(name, addr)| MailboxSpec {
            name: name.unwrap_or_default(),
            addr,
        },
    )(i)
}

// Used in obsolete list syntax, which permits empty list elements
fn obs_list_delim(i: &[u8]) -> Res<()> {
    value((), many1_count(tuple((opt(cfws), char(','), opt(cfws)))))(i)
}

// RFC 5322 3.4 mailbox list, including 4.4 obsolete syntax
fn mailbox_list(i: &[u8]) -> Res<Vec<MailboxSpec>> {
    delimited(
        opt(obs_list_delim),
        separated_nonempty_list(obs_list_delim, mailbox),
        opt(obs_list_delim),
    )(i)
}

// RFC 5322 3.4 group
// The terminating ';' is frequently missing in the wild, so it is optional.
fn group(i: &[u8]) -> Res<GroupSpec> {
    map(
        pair(
            terminated(phrase, char(':')),
            terminated(
                opt(mailbox_list),
                pair(opt(cfws), opt(pair(char(';'), opt(cfws)))),
            ),
        ),
        |(name, boxes)| GroupSpec {
            name,
            boxes: boxes.unwrap_or_default(),
        },
    )(i)
}

// RFC 5322 3.4 address
fn address(i: &[u8]) -> Res<AddressSpec> {
    alt((
        map(mailbox, AddressSpec::Mailbox),
        map(group, AddressSpec::Group),
    ))(i)
}

// RFC 5322 3.4 address list, including 4.4 obsolete syntax
fn address_list(i: &[u8]) -> Res<Vec<AddressSpec>> {
    delimited(
        opt(obs_list_delim),
        separated_nonempty_list(obs_list_delim, address),
        opt(obs_list_delim),
    )(i)
}

/// Parses `s` as an RFC 5322 address list in its entirety.
///
/// Returns `None` if `s` is not syntactically valid. An empty or blank `s` is
/// not valid.
pub fn parse_address_list(s: &[u8]) -> Option<Vec<AddressSpec<'_>>> {
    all_consuming(terminated(address_list, opt(cfws)))(s)
        .ok()
        .map(|(_, list)| list)
}

/// Parses `s` as a single RFC 5322 mailbox.
pub fn parse_mailbox(s: &[u8]) -> Option<MailboxSpec<'_>> {
    all_consuming(terminated(mailbox, opt(cfws)))(s)
        .ok()
        .map(|(_, mailbox)| mailbox)
}

// RFC 5322 3.3 date/time syntax, including obsolete forms.
// In general, the obsolete forms allow CFWS between all terms, so we just
// write that in the whole date/time definitions instead of the rather
// arbitrary distribution the RFC uses.
fn year(i: &[u8]) -> Res<i32> {
    map(take_while_m_n(2, 4, is_digit), |s: &[u8]| {
        let y: i32 = digits(s);
        // Y2K compliance workarounds described by RFC 5322 4.3
        if 2 == s.len() && y < 50 {
            y + 2000
        } else if s.len() < 4 {
            y + 1900
        } else {
            y
        }
    })(i)
}

fn month_number(name: &[u8]) -> Option<u32> {
    const MONTHS: [&[u8]; 12] = [
        b"jan", b"feb", b"mar", b"apr", b"may", b"jun", b"jul", b"aug",
        b"sep", b"oct", b"nov", b"dec",
    ];
    MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(name))
        .map(|ix| ix as u32 + 1)
}

fn month(i: &[u8]) -> Res<u32> {
    map_opt(
        take_while_m_n(3, 3, |b: u8| b.is_ascii_alphabetic()),
        month_number,
    )(i)
}

fn day(i: &[u8]) -> Res<u32> {
    map(take_while_m_n(1, 2, is_digit), digits)(i)
}

fn two_digit(i: &[u8]) -> Res<u32> {
    map(take_while_m_n(2, 2, is_digit), digits)(i)
}

fn day_of_week(i: &[u8]) -> Res<()> {
    value(
        (),
        tuple((
            take_while1(|b: u8| b.is_ascii_alphabetic()),
            opt(cfws),
            char(','),
            opt(cfws),
        )),
    )(i)
}

fn date(i: &[u8]) -> Res<(i32, u32, u32)> {
    map(
        tuple((
            terminated(day, opt(cfws)),
            terminated(month, opt(cfws)),
            terminated(year, opt(cfws)),
        )),
        |(d, m, y)| (y, m, d),
    )(i)
}

fn colon(i: &[u8]) -> Res<()> {
    value((), tuple((opt(cfws), char(':'), opt(cfws))))(i)
}

fn time_of_day(i: &[u8]) -> Res<(u32, u32, u32)> {
    map(
        tuple((
            terminated(two_digit, colon),
            two_digit,
            opt(preceded(colon, two_digit)),
        )),
        |(h, m, s)| (h, m, s.unwrap_or(0)),
    )(i)
}

fn numeric_zone(i: &[u8]) -> Res<i32> {
    map(
        pair(alt((char('+'), char('-'))), take_while_m_n(4, 4, is_digit)),
        |(sign, s)| {
            let n: i32 = digits(s);
            if '-' == sign {
                -n
            } else {
                n
            }
        },
    )(i)
}

/// Maps a named zone to its `±HHMM` offset.
///
/// RFC 5322 indicates that the military time zones were so poorly defined
/// that they must be treated as 0 unless additional information is
/// available. Unknown time zones must also be treated as 0.
pub fn named_zone(name: &[u8]) -> i32 {
    const ZONES: [(&[u8], i32); 11] = [
        (b"ut", 0),
        (b"utc", 0),
        (b"gmt", 0),
        (b"edt", -400),
        (b"est", -500),
        (b"cdt", -500),
        (b"cst", -600),
        (b"mdt", -600),
        (b"mst", -700),
        (b"pdt", -700),
        (b"pst", -800),
    ];

    ZONES
        .iter()
        .find(|&&(zone, _)| zone.eq_ignore_ascii_case(name))
        .map_or(0, |&(_, offset)| offset)
}

fn zone(i: &[u8]) -> Res<i32> {
    alt((
        numeric_zone,
        map(take_while1(|b: u8| b.is_ascii_alphabetic()), named_zone),
    ))(i)
}

fn date_time(i: &[u8]) -> Res<Option<DateTime<FixedOffset>>> {
    map(
        tuple((
            opt(cfws),
            opt(day_of_week),
            date,
            time_of_day,
            opt(cfws),
            zone,
            opt(cfws),
        )),
        |(_, _, ymd, hms, _, zone, _)| {
            FixedOffset::from_hhmm(zone)
                .and_then(|offset| chronox::ymd_hms(offset, ymd, hms))
        },
    )(i)
}

/// Strictly parses an RFC 5322 date-time, including the obsolete syntax.
pub fn parse_date_time(s: &[u8]) -> Option<DateTime<FixedOffset>> {
    all_consuming(date_time)(s).ok().and_then(|(_, dt)| dt)
}

/// Whether `name` is made up entirely of atom text, and so needs no quoting
/// in a phrase.
pub fn is_atom(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(is_atext)
}

/// Whether `s` can be written as a dot-atom.
pub fn is_dot_atom(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_atom)
}

fn to_utf8(cow: Cow<[u8]>) -> String {
    match cow {
        Cow::Owned(owned) => match String::from_utf8(owned) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        },
        Cow::Borrowed(borrowed) => {
            String::from_utf8_lossy(borrowed).into_owned()
        },
    }
}

/// Joins the words of a phrase with spaces, except before obsolete dots.
pub fn decode_phrase(phrase: Vec<Cow<[u8]>>) -> String {
    let mut accum = String::new();
    for word in phrase {
        if !accum.is_empty() && b"." != &word[..] {
            accum.push(' ');
        }
        accum.push_str(&to_utf8(word));
    }
    accum
}

/// Joins a local part or domain with dots.
pub fn decode_dotted(parts: Vec<Cow<[u8]>>) -> String {
    parts
        .into_iter()
        .map(to_utf8)
        .collect::<Vec<_>>()
        .join(".")
}
