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


/// A message with most of the interesting header fields set, in a mix of
/// plain, encoded, folded, and grouped forms.
pub static CHRISTMAS_TREE: &[u8] = include_bytes!("christmas-tree.eml");

/// A `multipart/mixed` holding a `multipart/alternate` (HTML and plain text,
/// both "Hello World!") and two base64 attachments, `micro.pdf` and
/// `att-1.gif`.
pub static NESTED_MULTIPART: &[u8] = include_bytes!("nested-multipart.eml");
