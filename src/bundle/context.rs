//! Source context lookup for diagnostic display.

use super::types::SourceContext;

/// Widest slice of a line kept around the reported column.
const MAX_CONTEXT_WIDTH: usize = 140;

/// Maps byte offsets to lines and renders the lines around a finding.
#[derive(Debug, Clone)]
pub struct ContextGenerator {
    lines: Vec<String>,
    /// Byte offset at which each line starts.
    line_starts: Vec<usize>,
}

impl ContextGenerator {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        let lines = source
            .split('\n')
            .map(|l| l.trim_end_matches('\r').to_string())
            .collect();
        Self { lines, line_starts }
    }

    /// 1-indexed line containing the byte offset.
    pub fn get_line(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    /// 0-indexed column of the byte offset within its line.
    pub fn get_column(&self, offset: usize) -> usize {
        let line = self.get_line(offset);
        offset - self.line_starts[line - 1]
    }

    /// The line above, the line itself and the line below (1-indexed line).
    pub fn get_context(&self, line: usize, column: usize) -> SourceContext {
        let idx = line.saturating_sub(1);
        let at = |i: Option<usize>| -> Option<String> {
            let i = i?;
            self.lines.get(i).map(|l| trim_line(l, column))
        };
        [
            at(idx.checked_sub(1)),
            at(Some(idx)),
            at(Some(idx + 1)),
        ]
    }
}

/// Trim surrounding whitespace and cut long lines around the column.
fn trim_line(line: &str, column: usize) -> String {
    let trimmed = line.trim();
    if trimmed.chars().count() <= MAX_CONTEXT_WIDTH {
        return trimmed.to_string();
    }
    let chars: Vec<char> = line.chars().collect();
    let center = column.min(chars.len());
    let start = center.saturating_sub(MAX_CONTEXT_WIDTH / 2);
    let end = (start + MAX_CONTEXT_WIDTH).min(chars.len());
    chars[start..end].iter().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_line() {
        let gen = ContextGenerator::new("a\nbb\nccc");
        assert_eq!(gen.get_line(0), 1);
        assert_eq!(gen.get_line(2), 2);
        assert_eq!(gen.get_line(3), 2);
        assert_eq!(gen.get_line(5), 3);
        assert_eq!(gen.get_column(6), 1);
    }

    #[test]
    fn test_get_context_edges() {
        let gen = ContextGenerator::new("first\n  second  \nthird");
        let ctx = gen.get_context(1, 0);
        assert_eq!(ctx[0], None);
        assert_eq!(ctx[1].as_deref(), Some("first"));
        assert_eq!(ctx[2].as_deref(), Some("second"));

        let ctx = gen.get_context(3, 0);
        assert_eq!(ctx[2], None);
    }

    #[test]
    fn test_long_line_is_windowed() {
        let long = "x".repeat(1000);
        let gen = ContextGenerator::new(&long);
        let ctx = gen.get_context(1, 500);
        assert_eq!(ctx[1].as_ref().unwrap().len(), MAX_CONTEXT_WIDTH);
    }
}
