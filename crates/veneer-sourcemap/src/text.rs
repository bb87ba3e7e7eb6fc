// Dweve Veneer - Surface Syntax Language Bridge
//
// Copyright (c) 2025 Dweve IP B.V. and individual contributors.
//
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository or at: http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Line and column helpers shared by the generator and the translator.
//!
//! Columns throughout the crate count characters (Unicode scalar values), while
//! tree-sitter reports byte offsets. Everything here is UTF-8 boundary aware.

/// Safely get a string slice up to a byte position, ensuring UTF-8 character boundaries.
///
/// If the requested position falls in the middle of a multi-byte character, it
/// rounds down to the nearest valid character boundary.
///
/// # Example
///
/// ```
/// use veneer_sourcemap::text::safe_slice_to;
///
/// let s = "x := \"世界\"";
/// assert_eq!(safe_slice_to(s, 6), "x := \"");
/// // Position 7 would be mid-character, so it rounds down to 6
/// assert_eq!(safe_slice_to(s, 7), "x := \"");
/// ```
pub fn safe_slice_to(s: &str, byte_pos: usize) -> &str {
    if byte_pos >= s.len() {
        return s;
    }

    let mut pos = byte_pos;
    while pos > 0 && !s.is_char_boundary(pos) {
        pos -= 1;
    }
    &s[..pos]
}

/// Convert a byte column within `line` into a character column.
pub fn byte_to_char_column(line: &str, byte_col: usize) -> usize {
    safe_slice_to(line, byte_col).chars().count()
}

/// Number of characters on a line, excluding any trailing `\r`.
pub fn line_char_len(line: &str) -> usize {
    line.strip_suffix('\r').unwrap_or(line).chars().count()
}

/// 0-based character column of the first non-whitespace character.
pub fn first_non_whitespace(line: &str) -> Option<usize> {
    line.chars().position(|c| !c.is_whitespace())
}

/// Returns `true` for lines that carry no code: blank lines and lines that
/// hold only a comment.
///
/// Block comment continuation lines (`* ...`) are treated as comments too,
/// which matches how both the surface language and Go format doc blocks.
pub fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty()
        || trimmed.starts_with("//")
        || trimmed.starts_with("/*")
        || trimmed.starts_with("*/")
        || trimmed == "*"
        || trimmed.starts_with("* ")
}

/// Split text into lines the way editors count them.
///
/// A trailing newline does not create an extra empty line, and `\r\n` endings
/// are normalized away.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.lines().collect()
}
