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


//! Depth-first traversal of a `MessagePart` tree.
//!
//! Every callback receives the chain of multipart ancestors of the part being
//! visited, outermost first, so `parents.len()` is the depth of the part.

use super::part::{MessagePart, Multipart, Opaque};

/// Calls `visitor` on every part of the tree in pre-order.
///
/// The walk stops at the first error, which is returned.
pub fn and_process<E>(
    root: &MessagePart,
    mut visitor: impl FnMut(&MessagePart, &[&MessagePart]) -> Result<(), E>,
) -> Result<(), E> {
    let mut parents = Vec::new();
    process(root, &mut parents, &mut visitor)
}

fn process<'a, E>(
    part: &'a MessagePart,
    parents: &mut Vec<&'a MessagePart>,
    visitor: &mut impl FnMut(&MessagePart, &[&MessagePart]) -> Result<(), E>,
) -> Result<(), E> {
    visitor(part, &parents[..])?;

    if let MessagePart::Multipart(ref m) = *part {
        parents.push(part);
        for child in &m.parts {
            process(child, parents, visitor)?;
        }
        parents.pop();
    }

    Ok(())
}

/// Like `and_process`, but only calls `visitor` on opaque parts.
pub fn and_process_opaque<E>(
    root: &MessagePart,
    mut visitor: impl FnMut(&Opaque, &[&MessagePart]) -> Result<(), E>,
) -> Result<(), E> {
    and_process(root, |part, parents| match *part {
        MessagePart::Opaque(ref o) => visitor(o, parents),
        MessagePart::Multipart(_) => Ok(()),
    })
}

/// Like `and_process`, but only calls `visitor` on multipart parts.
pub fn and_process_multipart<E>(
    root: &MessagePart,
    mut visitor: impl FnMut(&Multipart, &[&MessagePart]) -> Result<(), E>,
) -> Result<(), E> {
    and_process(root, |part, parents| match *part {
        MessagePart::Opaque(_) => Ok(()),
        MessagePart::Multipart(ref m) => visitor(m, parents),
    })
}

/// Calls `transformer` on every part of the tree in pre-order, threading a
/// stack of states.
///
/// `transformer` receives the part, its parents, and the states returned for
/// each of those parents (outermost first). The state it returns is pushed
/// while the children of the part are visited. The state computed for `root`
/// is returned.
pub fn and_transform<S, E>(
    root: &MessagePart,
    mut transformer: impl FnMut(
        &MessagePart,
        &[&MessagePart],
        &[S],
    ) -> Result<S, E>,
) -> Result<S, E> {
    let mut parents = Vec::new();
    let mut states = Vec::new();
    transform(root, &mut parents, &mut states, &mut transformer)
}

fn transform<'a, S, E>(
    part: &'a MessagePart,
    parents: &mut Vec<&'a MessagePart>,
    states: &mut Vec<S>,
    transformer: &mut impl FnMut(
        &MessagePart,
        &[&MessagePart],
        &[S],
    ) -> Result<S, E>,
) -> Result<S, E> {
    let state = transformer(part, &parents[..], &states[..])?;

    let m = match *part {
        MessagePart::Opaque(_) => return Ok(state),
        MessagePart::Multipart(ref m) => m,
    };

    // Every call leaves both stacks as long as it found them
    let depth = states.len();
    parents.push(part);
    states.push(state);
    let result = m
        .parts
        .iter()
        .try_for_each(|child| {
            transform(child, parents, states, transformer).map(|_| ())
        });
    parents.truncate(depth);
    let state = states.swap_remove(depth);

    result.map(|()| state)
}

/// Computes a value for every part of the tree in post-order.
///
/// `builder` receives each part together with the values already computed for
/// its children, in order. Opaque parts get an empty list. The value computed
/// for `root` is returned.
///
/// This is the natural way to produce a modified copy of a tree.
pub fn and_rebuild<T, E>(
    root: &MessagePart,
    mut builder: impl FnMut(&MessagePart, Vec<T>) -> Result<T, E>,
) -> Result<T, E> {
    rebuild(root, &mut builder)
}

fn rebuild<T, E>(
    part: &MessagePart,
    builder: &mut impl FnMut(&MessagePart, Vec<T>) -> Result<T, E>,
) -> Result<T, E> {
    let children = match *part {
        MessagePart::Opaque(_) => Vec::new(),
        MessagePart::Multipart(ref m) => m
            .parts
            .iter()
            .map(|child| rebuild(child, builder))
            .collect::<Result<Vec<_>, _>>()?,
    };

    builder(part, children)
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use super::*;
    use crate::mime::parse::{parse, ParseConfig};
    use crate::mime::part::WriteTo;
    use crate::support::error::Error;
    use crate::test_data::*;

    fn nested() -> MessagePart {
        crate::init_test_log();
        parse(NESTED_MULTIPART, &ParseConfig::default()).unwrap()
    }

    fn depth_counts(root: &MessagePart) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        and_process(root, |_, parents| {
            *counts.entry(parents.len()).or_insert(0) += 1;
            Ok::<(), ()>(())
        })
        .unwrap();
        counts
    }

    #[test]
    fn nested_structure() {
        let root = nested();

        let expected: BTreeMap<usize, usize> =
            vec![(0, 1), (1, 3), (2, 2)].into_iter().collect();
        assert_eq!(expected, depth_counts(&root));

        let mut filenames = Vec::new();
        and_process_opaque(&root, |o, _| {
            if let Ok(name) = o.header.filename() {
                filenames.push(name);
            }
            Ok::<(), ()>(())
        })
        .unwrap();
        assert_eq!(vec!["micro.pdf", "att-1.gif"], filenames);

        let mut media_types = Vec::new();
        and_process_multipart(&root, |m, parents| {
            media_types.push((parents.len(), m.header.media_type().unwrap()));
            Ok::<(), ()>(())
        })
        .unwrap();
        assert_eq!(
            vec![
                (0, "multipart/mixed".to_owned()),
                (1, "multipart/alternate".to_owned()),
            ],
            media_types
        );
    }

    #[test]
    fn visitor_error_stops_walk() {
        let root = nested();
        let mut visited = 0;
        let result = and_process(&root, |part, _| {
            visited += 1;
            if part.is_multipart() && visited > 1 {
                Err("stop")
            } else {
                Ok(())
            }
        });
        assert_eq!(Err("stop"), result);
        // root, then the multipart/alternate
        assert_eq!(2, visited);
    }

    #[test]
    fn transform_threads_section_numbers() {
        let root = nested();
        let mut sections = Vec::new();
        // Children seen so far at each depth
        let mut counters: Vec<u32> = Vec::new();

        let root_path = and_transform(&root, |part, parents, states: &[String]| {
            let path = match states.last() {
                None => String::new(),
                Some(parent_path) => {
                    counters.truncate(parents.len());
                    let n = match counters.last_mut() {
                        Some(n) => {
                            *n += 1;
                            *n
                        },
                        None => 1,
                    };
                    if parent_path.is_empty() {
                        n.to_string()
                    } else {
                        format!("{}.{}", parent_path, n)
                    }
                },
            };
            if part.is_multipart() {
                counters.push(0);
            }
            sections.push((path.clone(), part.header().media_type().ok()));
            Ok::<String, ()>(path)
        })
        .unwrap();

        assert_eq!("", root_path);
        let paths = sections.iter().map(|s| &s.0[..]).collect::<Vec<_>>();
        assert_eq!(vec!["", "1", "1.1", "1.2", "2", "3"], paths);
        assert_eq!(Some("text/plain".to_owned()), sections[3].1);
    }

    #[test]
    fn transform_restores_states_after_subtree() {
        let root = nested();
        let mut seen = Vec::new();
        let depth = and_transform(&root, |_, parents, states: &[usize]| {
            assert_eq!(parents.len(), states.len());
            seen.push(states.to_vec());
            Ok::<usize, ()>(states.len())
        })
        .unwrap();

        assert_eq!(0, depth);
        assert_eq!(
            vec![
                vec![],
                vec![0],
                vec![0, 1],
                vec![0, 1],
                vec![0],
                vec![0],
            ],
            seen
        );
    }

    #[test]
    fn transform_error_is_returned() {
        let root = nested();
        let result = and_transform(&root, |_, parents, states| {
            assert_eq!(parents.len(), states.len());
            if parents.len() == 2 {
                Err(Error::EmptyPart)
            } else {
                Ok(())
            }
        });
        assert_matches!(Err(Error::EmptyPart), result);
    }

    fn to_base64(
        part: &MessagePart,
        children: Vec<MessagePart>,
    ) -> Result<MessagePart, Error> {
        Ok(match *part {
            MessagePart::Opaque(ref o) => {
                let mut leaf = Opaque {
                    header: o.header.clone(),
                    body: Vec::new(),
                };
                leaf.header.set_transfer_encoding("base64")?;
                leaf.set_decoded_content(&o.decoded_content()?)?;
                leaf.into()
            },
            MessagePart::Multipart(ref m) => Multipart {
                header: m.header.clone(),
                prefix: m.prefix.clone(),
                suffix: m.suffix.clone(),
                parts: children,
                boundary: m.boundary.clone(),
            }
            .into(),
        })
    }

    #[test]
    fn rebuild_as_base64() {
        let root = nested();

        let rebuilt = and_rebuild(&root, to_base64).unwrap();

        let mut out = Vec::new();
        rebuilt.write_to(&mut out).unwrap();
        let reparsed = parse(&out, &ParseConfig::default()).unwrap();
        assert_eq!(depth_counts(&root), depth_counts(&reparsed));

        let mut leaves = Vec::new();
        and_process_opaque(&reparsed, |o, _| {
            assert_eq!("base64", o.header.transfer_encoding());
            for line in o.body.split(|&b| b'\n' == b) {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                assert!(line.len() <= 76, "line too long: {:?}", line);
                assert!(!line.contains(&b' '));
            }
            leaves.push(o.decoded_content().unwrap());
            Ok::<(), ()>(())
        })
        .unwrap();

        let mut originals = Vec::new();
        and_process_opaque(&root, |o, _| {
            originals.push(o.decoded_content().unwrap());
            Ok::<(), ()>(())
        })
        .unwrap();

        assert_eq!(4, leaves.len());
        assert_eq!(originals, leaves);
        assert_eq!(b"Hello World!".to_vec(), leaves[0]);
    }
}
