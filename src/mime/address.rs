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


//! Liberal address-list parsing.
//!
//! A strict RFC 5322 parse is attempted first. Anything it rejects goes
//! through a heuristic which extracts something plausible from almost any
//! text.

use super::model::*;
use super::syntax::{self, AddressSpec, MailboxSpec};
use crate::support::error::Error;

/// Parses `s` as an address list.
///
/// A blank `s` is an empty list. Otherwise, the strict grammar is tried
/// before the heuristic. The result is empty only if `s` contains no
/// plausible address at all (for example, if it is just commas).
pub fn parse_address_list(s: &str) -> AddressList {
    if s.trim().is_empty() {
        return AddressList::default();
    }

    if let Some(specs) = syntax::parse_address_list(s.as_bytes()) {
        return AddressList(specs.into_iter().map(address_from_spec).collect());
    }

    log::debug!("Using heuristic address parse for {:?}", s);
    AddressList(
        s.split(',')
            .filter_map(heuristic_mailbox)
            .map(Address::Mailbox)
            .collect(),
    )
}

/// Like `parse_address_list`, but fails if `s` is not blank and yet yields
/// nothing.
pub fn parse_address_list_strictly(s: &str) -> Result<AddressList, Error> {
    let list = parse_address_list(s);
    if list.is_empty() && !s.trim().is_empty() {
        Err(Error::InvalidAddress(s.to_owned()))
    } else {
        Ok(list)
    }
}

/// Parses `s` as exactly one mailbox.
///
/// Fails with `WrongAddressType` if `s` is a group, and with `InvalidAddress`
/// if it holds no or several addresses.
pub fn parse_single_mailbox(s: &str) -> Result<Mailbox, Error> {
    if let Some(spec) = syntax::parse_mailbox(s.as_bytes()) {
        return Ok(mailbox_from_spec(spec));
    }

    let mut list = parse_address_list(s).0;
    if 1 != list.len() {
        return Err(Error::InvalidAddress(s.to_owned()));
    }

    match list.pop() {
        Some(Address::Mailbox(m)) => Ok(m),
        Some(Address::Group(_)) => Err(Error::WrongAddressType),
        None => Err(Error::InvalidAddress(s.to_owned())),
    }
}

fn address_from_spec(spec: AddressSpec<'_>) -> Address {
    match spec {
        AddressSpec::Mailbox(m) => Address::Mailbox(mailbox_from_spec(m)),
        AddressSpec::Group(g) => Address::Group(Group {
            display_name: syntax::decode_phrase(g.name),
            members: g.boxes.into_iter().map(mailbox_from_spec).collect(),
        }),
    }
}

fn mailbox_from_spec(spec: MailboxSpec<'_>) -> Mailbox {
    Mailbox::new(
        syntax::decode_phrase(spec.name),
        syntax::decode_dotted(spec.addr.local),
        syntax::decode_dotted(spec.addr.domain),
    )
}

fn heuristic_mailbox(piece: &str) -> Option<Mailbox> {
    let (stripped, comment) = strip_comments(piece);
    let mut tokens = stripped.split_whitespace().collect::<Vec<_>>();
    let addr = tokens.pop()?;
    let addr = addr.trim_start_matches('<').trim_end_matches('>');

    let display_name = tokens.join(" ");
    let display_name = display_name.trim_matches('"');

    let (local_part, domain) = match addr.rfind('@') {
        Some(at) => (&addr[..at], &addr[at + 1..]),
        None => (addr, ""),
    };

    let mut mailbox = Mailbox::new(display_name, local_part, domain);
    mailbox.comment = comment;
    Some(mailbox)
}

/// Removes parenthesised comments from `s`.
///
/// Returns the text without the comments and the text of the comments
/// themselves, with quoted pairs inside comments unescaped. Each top-level
/// balanced pair is removed. Unmatched close parentheses are kept, as is an
/// unclosed comment.
pub fn strip_comments(s: &str) -> (String, String) {
    let mut text = String::with_capacity(s.len());
    let mut comments = String::new();
    let mut depth = 0usize;
    let mut open_at = 0;
    let mut comments_at_open = 0;
    let mut chars = s.char_indices();

    while let Some((ix, ch)) = chars.next() {
        match ch {
            '\\' if depth > 0 => {
                if let Some((_, escaped)) = chars.next() {
                    comments.push(escaped);
                }
            },

            '(' => {
                if 0 == depth {
                    open_at = ix;
                    comments_at_open = comments.len();
                } else {
                    comments.push(ch);
                }
                depth += 1;
            },

            ')' if depth > 0 => {
                depth -= 1;
                if 0 == depth {
                    comments.push(' ');
                } else {
                    comments.push(ch);
                }
            },

            _ if depth > 0 => comments.push(ch),
            _ => text.push(ch),
        }
    }

    if depth > 0 {
        // Put the unclosed comment back, dropping whatever it contributed to
        // `comments`
        comments.truncate(comments_at_open);
        text.push_str(&s[open_at..]);
    }

    let comments = comments.split_whitespace().collect::<Vec<_>>().join(" ");
    (text, comments)
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn mailboxes(s: &str) -> Vec<Mailbox> {
        parse_address_list(s)
            .mailboxes()
            .into_iter()
            .cloned()
            .collect()
    }

    #[test]
    fn strict_then_heuristic() {
        assert_eq!(
            vec![Mailbox::new("Jane Doe", "jane", "example.com")],
            mailboxes("Jane Doe <jane@example.com>")
        );

        // Unquoted comma in display name isn't valid, so the heuristic takes
        // over
        assert_eq!(
            vec![
                Mailbox::new("", "Doe", ""),
                Mailbox::new("Jane", "jane", "example.com"),
            ],
            mailboxes("Doe, Jane <jane@example.com>")
        );

        // Unbalanced angle brackets
        assert_eq!(
            vec![Mailbox::new("Bob", "bob", "example.com")],
            mailboxes("Bob <bob@example.com")
        );

        let mut expected = Mailbox::new("Jim", "jim", "example.com");
        expected.comment = "work".to_owned();
        assert_eq!(
            vec![expected],
            mailboxes("\"Jim\" (work) jim@example.com>")
        );
    }

    #[test]
    fn empty_lists() {
        assert!(parse_address_list("").is_empty());
        assert!(parse_address_list("  \t").is_empty());
        assert!(parse_address_list(" , ,").is_empty());
        assert_matches!(
            Err(Error::InvalidAddress(_)),
            parse_address_list_strictly(",")
        );
        assert_matches!(Ok(_), parse_address_list_strictly(""));
    }

    #[test]
    fn single_mailbox() {
        assert_eq!(
            Mailbox::new("A", "a", "b.c"),
            parse_single_mailbox("A <a@b.c>").unwrap()
        );
        assert_matches!(
            Err(Error::WrongAddressType),
            parse_single_mailbox("G: a@b.c;")
        );
        assert_matches!(
            Err(Error::InvalidAddress(_)),
            parse_single_mailbox("a@b.c, d@e.f")
        );
    }

    #[test]
    fn comment_stripping() {
        assert_eq!(
            ("a  b".to_owned(), "c".to_owned()),
            strip_comments("a (c) b")
        );
        assert_eq!(
            ("a b".to_owned(), "c (d) e".to_owned()),
            strip_comments("a(c (d) e) b")
        );
        assert_eq!(("a) b".to_owned(), "".to_owned()), strip_comments("a) b"));
        assert_eq!(
            ("a (b c".to_owned(), "".to_owned()),
            strip_comments("a (b c")
        );
        assert_eq!(
            ("x  (y".to_owned(), "ok".to_owned()),
            strip_comments("x (ok) (y")
        );
        assert_eq!(
            ("a  b".to_owned(), "c) (\\".to_owned()),
            strip_comments("a (c\\) \\(\\\\) b")
        );
        assert_eq!(
            ("a (b\\".to_owned(), "".to_owned()),
            strip_comments("a (b\\")
        );
    }

    proptest! {
        #[test]
        fn never_panics(s in ".*") {
            parse_address_list(&s);
            let _ = parse_single_mailbox(&s);
        }
    }
}
