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


//! Owned, decoded address types.

use std::fmt;
use std::slice;
use std::vec;

use super::syntax;

/// A single mailbox, such as `Jane Doe <jane@example.com>`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Mailbox {
    /// The display name, or empty if there is none.
    pub display_name: String,
    pub local_part: String,
    /// The domain, or empty for a bare local part.
    pub domain: String,
    /// The text of any comments attached to the mailbox.
    pub comment: String,
}

impl Mailbox {
    pub fn new(
        display_name: impl Into<String>,
        local_part: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Mailbox {
            display_name: display_name.into(),
            local_part: local_part.into(),
            domain: domain.into(),
            comment: String::new(),
        }
    }

    /// Returns `local@domain`, with the local part quoted if needed.
    pub fn addr_spec(&self) -> String {
        let mut s = if syntax::is_dot_atom(&self.local_part) {
            self.local_part.clone()
        } else {
            quote(&self.local_part)
        };

        if !self.domain.is_empty() {
            s.push('@');
            s.push_str(&self.domain);
        }
        s
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.display_name.is_empty() {
            write!(f, "{}", self.addr_spec())?;
        } else {
            write!(
                f,
                "{} <{}>",
                phrase(&self.display_name),
                self.addr_spec()
            )?;
        }

        if !self.comment.is_empty() {
            write!(f, " ({})", escape_comment(&self.comment))?;
        }

        Ok(())
    }
}

/// A named group of mailboxes, such as `Friends: a@example.com;`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Group {
    pub display_name: String,
    pub members: Vec<Mailbox>,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:", phrase(&self.display_name))?;
        for (ix, member) in self.members.iter().enumerate() {
            write!(f, "{}{}", if 0 == ix { " " } else { ", " }, member)?;
        }
        write!(f, ";")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Address {
    Mailbox(Mailbox),
    Group(Group),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Address::Mailbox(ref m) => fmt::Display::fmt(m, f),
            Address::Group(ref g) => fmt::Display::fmt(g, f),
        }
    }
}

impl From<Mailbox> for Address {
    fn from(m: Mailbox) -> Self {
        Address::Mailbox(m)
    }
}

impl From<Group> for Address {
    fn from(g: Group) -> Self {
        Address::Group(g)
    }
}

/// An ordered list of addresses, as found in `To`, `Cc`, and friends.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct AddressList(pub Vec<Address>);

impl AddressList {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Address> {
        self.0.iter()
    }

    /// Returns every mailbox in the list, with groups flattened in place.
    pub fn mailboxes(&self) -> Vec<&Mailbox> {
        let mut out = Vec::new();
        for address in &self.0 {
            match *address {
                Address::Mailbox(ref m) => out.push(m),
                Address::Group(ref g) => out.extend(g.members.iter()),
            }
        }
        out
    }
}

impl fmt::Display for AddressList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, address) in self.0.iter().enumerate() {
            if ix > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", address)?;
        }
        Ok(())
    }
}

impl From<Vec<Address>> for AddressList {
    fn from(v: Vec<Address>) -> Self {
        AddressList(v)
    }
}

impl From<Vec<Mailbox>> for AddressList {
    fn from(v: Vec<Mailbox>) -> Self {
        AddressList(v.into_iter().map(Address::Mailbox).collect())
    }
}

impl IntoIterator for AddressList {
    type Item = Address;
    type IntoIter = vec::IntoIter<Address>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a AddressList {
    type Item = &'a Address;
    type IntoIter = slice::Iter<'a, Address>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn phrase(name: &str) -> String {
    if name.split(' ').all(syntax::is_atom) {
        name.to_owned()
    } else {
        quote(name)
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        if '"' == ch || '\\' == ch {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

fn escape_comment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if '(' == ch || ')' == ch || '\\' == ch {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mime::address;

    #[test]
    fn format_mailboxes() {
        assert_eq!(
            "jane@example.com",
            Mailbox::new("", "jane", "example.com").to_string()
        );
        assert_eq!(
            "Jane Doe <jane@example.com>",
            Mailbox::new("Jane Doe", "jane", "example.com").to_string()
        );
        assert_eq!(
            "\"Doe, Jane\" <jane@example.com>",
            Mailbox::new("Doe, Jane", "jane", "example.com").to_string()
        );
        assert_eq!(
            "\"say \\\"hi\\\"\"@example.com",
            Mailbox::new("", "say \"hi\"", "example.com").to_string()
        );
        assert_eq!(
            "postmaster",
            Mailbox::new("", "postmaster", "").to_string()
        );

        let mut m = Mailbox::new("", "jane", "example.com");
        m.comment = "Jane".to_owned();
        assert_eq!("jane@example.com (Jane)", m.to_string());

        m.comment = "a(b\\c)".to_owned();
        assert_eq!("jane@example.com (a\\(b\\\\c\\))", m.to_string());
    }

    #[test]
    fn formatted_comments_reparse() {
        let mut m = Mailbox::new("Jane Doe", "jane", "example.com");
        for comment in &["a(b", "x) y", "back\\slash", "((", ")"] {
            m.comment = (*comment).to_owned();
            let text = m.to_string();
            assert!(
                syntax::parse_mailbox(text.as_bytes()).is_some(),
                "didn't reparse: {}",
                text
            );
            let (_, stripped) = address::strip_comments(&text);
            assert_eq!(*comment, stripped);
        }
    }

    #[test]
    fn format_groups_and_lists() {
        let list = AddressList(vec![
            Address::Group(Group {
                display_name: "Friends".to_owned(),
                members: vec![
                    Mailbox::new("", "a", "example.com"),
                    Mailbox::new("B", "b", "example.com"),
                ],
            }),
            Address::Group(Group {
                display_name: "undisclosed-recipients".to_owned(),
                members: vec![],
            }),
            Mailbox::new("", "c", "example.com").into(),
        ]);
        assert_eq!(
            "Friends: a@example.com, B <b@example.com>;, \
             undisclosed-recipients:;, c@example.com",
            list.to_string()
        );
        assert_eq!(
            vec!["a", "b", "c"],
            list.mailboxes()
                .iter()
                .map(|m| m.local_part.as_str())
                .collect::<Vec<_>>()
        );
    }
}
