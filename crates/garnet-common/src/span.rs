use std::fmt;

use serde::{Deserialize, Serialize};

/// A source position attached to a syntax node: 1-based line and column plus
/// the file the node was parsed from.
///
/// Locations are carried for error reporting only. They never take part in
/// structural equality of nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Location {
    /// Create a location without an originating file.
    pub fn new(line: u32, column: u32) -> Self {
        Self {
            line,
            column,
            file: None,
        }
    }

    /// Attach the originating file name.
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// Pre-computed index of line start positions.
///
/// Built once per source text. Converts between byte offsets and 1-based
/// (line, column) pairs; the diagnostics renderer needs byte ranges while
/// syntax nodes only know their line and column.
#[derive(Debug)]
pub struct LineIndex {
    /// Byte offset of the start of each line. The first entry is always 0.
    line_starts: Vec<u32>,
    len: u32,
}

impl LineIndex {
    /// Build a line index by scanning the source text for newline characters.
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Self {
            line_starts,
            len: source.len() as u32,
        }
    }

    /// Convert a byte offset to a 1-based (line, column) pair.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let line_idx = self.line_starts.partition_point(|&start| start <= offset);
        let line_idx = line_idx.saturating_sub(1);
        let line = (line_idx as u32) + 1;
        let col = offset - self.line_starts[line_idx] + 1;
        (line, col)
    }

    /// Convert a 1-based (line, column) pair back to a byte offset, clamped to
    /// the end of the source. Line 0 or column 0 are treated as 1.
    pub fn offset(&self, line: u32, column: u32) -> u32 {
        let line_idx = (line.max(1) - 1) as usize;
        let Some(&start) = self.line_starts.get(line_idx) else {
            return self.len;
        };
        (start + column.max(1) - 1).min(self.len)
    }

    /// Return the number of lines in the source.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_display() {
        assert_eq!(Location::new(3, 7).to_string(), "3:7");
        assert_eq!(
            Location::new(1, 2).with_file("main.gt").to_string(),
            "main.gt:1:2"
        );
    }

    #[test]
    fn line_index_multiple_lines() {
        let src = "hello\nworld\nfoo";
        let idx = LineIndex::new(src);
        assert_eq!(idx.line_col(0), (1, 1));
        assert_eq!(idx.line_col(6), (2, 1));
        assert_eq!(idx.line_col(13), (3, 2));
    }

    #[test]
    fn offset_round_trips_line_col() {
        let src = "ab\ncd\nef";
        let idx = LineIndex::new(src);
        for offset in 0..src.len() as u32 {
            let (line, col) = idx.line_col(offset);
            assert_eq!(idx.offset(line, col), offset);
        }
    }

    #[test]
    fn offset_clamps_past_end() {
        let idx = LineIndex::new("a\nb");
        assert_eq!(idx.offset(9, 1), 3);
        assert_eq!(idx.offset(2, 40), 3);
        assert_eq!(idx.line_count(), 2);
    }
}
