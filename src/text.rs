//! Conversions between UTF-8 byte offsets and editor line/column positions.
//!
//! Editors speaking LSP count columns in UTF-16 code units, while every span
//! produced by the scanners is a byte offset into the Rust `str`.

use lsp_types::{Position, Range};

use crate::types::TextSpan;

/// Byte offsets of each line start, built once per document.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { text, line_starts }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Converts a byte offset to a position. Offsets past the end clamp to
    /// the end of the text; offsets inside a multi-byte character snap back
    /// to its start.
    pub fn offset_to_position(&self, offset: usize) -> Position {
        let mut offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let character: usize = self.text[line_start..offset]
            .chars()
            .map(char::len_utf16)
            .sum();
        Position::new(line as u32, character as u32)
    }

    /// Converts a position to a byte offset.
    ///
    /// Returns `None` when the line does not exist. A column past the end of
    /// the line clamps to the line end (before the newline).
    pub fn position_to_offset(&self, position: Position) -> Option<usize> {
        let line = position.line as usize;
        let line_start = *self.line_starts.get(line)?;
        let line_end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        let line_text = &self.text[line_start..line_end];
        let line_text = line_text.strip_suffix('\r').unwrap_or(line_text);

        let mut units = 0usize;
        for (byte_idx, ch) in line_text.char_indices() {
            if units >= position.character as usize {
                return Some(line_start + byte_idx);
            }
            units += ch.len_utf16();
        }
        Some(line_start + line_text.len())
    }

    pub fn span_to_range(&self, span: TextSpan) -> Range {
        Range {
            start: self.offset_to_position(span.start),
            end: self.offset_to_position(span.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_roundtrip_positions() {
        let text = "first line\nsecond @ref\nthird";
        let index = LineIndex::new(text);
        assert_eq!(index.line_count(), 3);

        let offset = text.find("@ref").unwrap();
        let pos = index.offset_to_position(offset);
        assert_eq!(pos, Position::new(1, 7));
        assert_eq!(index.position_to_offset(pos), Some(offset));
    }

    #[test]
    fn test_utf16_columns() {
        // "é" is 2 bytes / 1 UTF-16 unit, "😀" is 4 bytes / 2 units.
        let text = "é😀 a1b2c3d";
        let index = LineIndex::new(text);
        let offset = text.find('a').unwrap();
        assert_eq!(offset, 7);
        assert_eq!(index.offset_to_position(offset), Position::new(0, 4));
        assert_eq!(index.position_to_offset(Position::new(0, 4)), Some(7));
    }

    #[test]
    fn test_column_past_line_end_clamps() {
        let text = "ab\r\ncd";
        let index = LineIndex::new(text);
        assert_eq!(index.position_to_offset(Position::new(0, 99)), Some(2));
        assert_eq!(index.position_to_offset(Position::new(1, 99)), Some(6));
    }

    #[test]
    fn test_line_past_eof() {
        let index = LineIndex::new("one line");
        assert_eq!(index.position_to_offset(Position::new(1, 0)), None);
    }

    #[test]
    fn test_offset_past_end_clamps() {
        let index = LineIndex::new("ab\ncd");
        assert_eq!(index.offset_to_position(100), Position::new(1, 2));
    }

    #[test]
    fn test_span_to_range_across_lines() {
        let text = "x\n@docs/a.md\n";
        let index = LineIndex::new(text);
        let range = index.span_to_range(TextSpan::new(2, 12));
        assert_eq!(range.start, Position::new(1, 0));
        assert_eq!(range.end, Position::new(1, 10));
    }
}
