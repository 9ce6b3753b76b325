//! Position model.
//!
//! Editors address text by `(line, character)` where `character` counts UTF-16 code units and
//! lines are delimited by `\n` only. Internally everything else (tree-sitter, slicing) works in
//! UTF-8 byte offsets. [`LineIndex`] converts between the two using a [`ropey::Rope`], giving
//! O(log N) lookups in both directions.

use ropey::Rope;
use std::ops::Range;
use thiserror::Error;

/// Errors produced when a position or offset does not address the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("line {line} is out of range (document has {line_count} lines)")]
    /// The line does not exist.
    LineOutOfRange {
        /// Requested line (0-based).
        line: u32,
        /// Number of lines in the text.
        line_count: usize,
    },

    #[error("character {character} is out of range on line {line} (line length {line_length})")]
    /// The character is past the end of its line.
    CharacterOutOfRange {
        /// Requested line (0-based).
        line: u32,
        /// Requested character (UTF-16 code units).
        character: u32,
        /// Length of the line in UTF-16 code units, excluding the line break.
        line_length: usize,
    },

    #[error("byte offset {offset} is out of range (text length {len})")]
    /// The byte offset is past the end of the text.
    OffsetOutOfRange {
        /// Requested byte offset.
        offset: usize,
        /// Text length in bytes.
        len: usize,
    },
}

/// Protocol position (UTF-16 code units).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LspPosition {
    /// Line number (0-based)
    pub line: u32,
    /// Character offset (UTF-16 code units, 0-based)
    pub character: u32,
}

impl LspPosition {
    /// Create a new position.
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Protocol range, half-open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LspRange {
    /// Range start position (inclusive).
    pub start: LspPosition,
    /// Range end position (exclusive).
    pub end: LspPosition,
}

impl LspRange {
    /// Create a new range.
    pub fn new(start: LspPosition, end: LspPosition) -> Self {
        Self { start, end }
    }

    /// Whether `position` lies inside the range, treating the end as inclusive.
    ///
    /// Cursor queries use this form: a cursor placed right after the last character of a token
    /// still points at that token.
    pub fn contains_inclusive(&self, position: LspPosition) -> bool {
        self.start <= position && position <= self.end
    }
}

/// A span expressed both in editor positions and in byte offsets.
///
/// Both halves always describe the same text; build values through [`SourceRange::from_bytes`]
/// so they cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRange {
    /// Position range (UTF-16 based).
    pub positions: LspRange,
    /// Byte range into the document text.
    pub bytes: Range<usize>,
}

impl SourceRange {
    /// Build a source range from a byte span, clamping it to the text.
    pub fn from_bytes(index: &LineIndex, bytes: Range<usize>) -> Self {
        let len = index.len_bytes();
        let end = bytes.end.min(len);
        let start = bytes.start.min(end);
        let start_byte = index.snap_to_char_boundary(start);
        let end_byte = index.snap_to_char_boundary(end);
        Self {
            positions: LspRange::new(
                index.position_at_clamped(start_byte),
                index.position_at_clamped(end_byte),
            ),
            bytes: start_byte..end_byte,
        }
    }

    /// Whether `position` lies inside the range (end-inclusive).
    pub fn contains(&self, position: LspPosition) -> bool {
        self.positions.contains_inclusive(position)
    }

    /// Byte length of the span.
    pub fn len(&self) -> usize {
        self.bytes.end - self.bytes.start
    }

    /// Whether the span is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Line index over a text, backed by a rope.
///
/// Only `\n` starts a new line; a `\r` before it is an ordinary character of the previous line.
#[derive(Debug, Clone, Default)]
pub struct LineIndex {
    rope: Rope,
}

impl LineIndex {
    /// Build a line index from text.
    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
        }
    }

    /// Number of lines. An empty text, and a text ending in `\n`, still have a final (empty) line.
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Total byte count.
    pub fn len_bytes(&self) -> usize {
        self.rope.len_bytes()
    }

    /// Total character count.
    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    /// Text of a line, without its line break.
    pub fn line_text(&self, line: usize) -> Option<String> {
        if line >= self.rope.len_lines() {
            return None;
        }
        let mut text = self.rope.line(line).to_string();
        if text.ends_with('\n') {
            text.pop();
        }
        Some(text)
    }

    /// Length of a line in UTF-16 code units, excluding the trailing `\n`.
    fn line_len_utf16(&self, line: usize) -> usize {
        let slice = self.rope.line(line);
        let len = slice.len_utf16_cu();
        let chars = slice.len_chars();
        if chars > 0 && slice.char(chars - 1) == '\n' {
            len - 1
        } else {
            len
        }
    }

    /// Convert a position to a character (scalar value) index.
    pub fn to_char_offset(&self, position: LspPosition) -> Result<usize, PositionError> {
        let line = position.line as usize;
        let line_count = self.rope.len_lines();
        if line >= line_count {
            return Err(PositionError::LineOutOfRange {
                line: position.line,
                line_count,
            });
        }

        let line_length = self.line_len_utf16(line);
        let character = position.character as usize;
        if character > line_length {
            return Err(PositionError::CharacterOutOfRange {
                line: position.line,
                character: position.character,
                line_length,
            });
        }

        let line_start_char = self.rope.line_to_char(line);
        let line_start_utf16 = self.rope.char_to_utf16_cu(line_start_char);
        // Rounds down when `character` splits a surrogate pair.
        Ok(self.rope.utf16_cu_to_char(line_start_utf16 + character))
    }

    /// Convert a position to a byte offset.
    pub fn to_offset(&self, position: LspPosition) -> Result<usize, PositionError> {
        let char_idx = self.to_char_offset(position)?;
        Ok(self.rope.char_to_byte(char_idx))
    }

    /// Convert a byte offset to a position.
    ///
    /// An offset inside a multi-byte character maps to the start of that character.
    pub fn to_position(&self, offset: usize) -> Result<LspPosition, PositionError> {
        let len = self.rope.len_bytes();
        if offset > len {
            return Err(PositionError::OffsetOutOfRange { offset, len });
        }
        Ok(self.position_at_clamped(offset))
    }

    /// Convert a position range to a byte range.
    pub fn range_to_bytes(&self, range: LspRange) -> Result<Range<usize>, PositionError> {
        Ok(self.to_offset(range.start)?..self.to_offset(range.end)?)
    }

    /// Convert a byte range to a position range.
    pub fn bytes_to_range(&self, bytes: Range<usize>) -> Result<LspRange, PositionError> {
        Ok(LspRange::new(
            self.to_position(bytes.start)?,
            self.to_position(bytes.end)?,
        ))
    }

    fn position_at_clamped(&self, offset: usize) -> LspPosition {
        let offset = offset.min(self.rope.len_bytes());
        let char_idx = self.rope.byte_to_char(offset);
        let line = self.rope.char_to_line(char_idx);
        let line_start_char = self.rope.line_to_char(line);
        let character =
            self.rope.char_to_utf16_cu(char_idx) - self.rope.char_to_utf16_cu(line_start_char);
        LspPosition::new(line as u32, character as u32)
    }

    fn snap_to_char_boundary(&self, offset: usize) -> usize {
        let char_idx = self.rope.byte_to_char(offset.min(self.rope.len_bytes()));
        self.rope.char_to_byte(char_idx)
    }

    /// Replace a character range with `text`.
    pub(crate) fn replace(&mut self, chars: Range<usize>, text: &str) {
        let end = chars.end.min(self.rope.len_chars());
        let start = chars.start.min(end);
        if start < end {
            self.rope.remove(start..end);
        }
        if !text.is_empty() {
            self.rope.insert(start, text);
        }
    }

    /// Complete text.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }
}
