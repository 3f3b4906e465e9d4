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


pub mod address;
pub mod buffer;
pub mod charset;
pub mod date;
pub mod encoded_word;
pub mod field;
pub mod header;
pub mod model;
pub mod param;
pub mod parse;
pub mod part;
pub mod quoted_printable;
pub mod split;
pub mod syntax;
pub mod transfer;
pub mod walk;
