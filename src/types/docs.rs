//! Documentation text handling.
//!
//! Renderers only ever see documentation as a list of single lines, so an
//! embedded newline in the source description cannot leak into emitted code.

use serde::Serialize;

/// Documentation already split into lines, none containing a line break.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Doc(Vec<String>);

impl Doc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        Doc(doc_lines(text))
    }

    pub fn line(mut self, text: &str) -> Self {
        self.push(text);
        self
    }

    /// Append text, splitting it if it spans several lines.
    pub fn push(&mut self, text: &str) {
        self.0.extend(doc_lines(text));
    }

    /// Append a blank separator line unless the doc is empty.
    pub fn paragraph(&mut self) {
        if !self.0.is_empty() {
            self.0.push(String::new());
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Split on `\r\n`, `\n` and lone `\r`, trimming trailing whitespace and
/// surrounding blank lines.
pub fn doc_lines(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<String> = normalized
        .split('\n')
        .map(|line| line.trim_end().to_string())
        .collect();

    while lines.first().is_some_and(|l| l.is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

/// Render `text` as a comment block with every line prefixed.
pub fn comment_block(text: &str, prefix: &str) -> String {
    doc_lines(text)
        .iter()
        .map(|line| {
            if line.is_empty() {
                prefix.trim_end().to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_line_prefixed() {
        let block = comment_block("List pets.\nSupports paging.\r\nSorted by name.", "// ");
        assert_eq!(block, "// List pets.\n// Supports paging.\n// Sorted by name.");
        for line in block.lines() {
            assert!(line.starts_with("//"));
        }
    }

    #[test]
    fn test_blank_lines_keep_bare_prefix() {
        let block = comment_block("\nTitle\n\nBody\n\n", "// ");
        assert_eq!(block, "// Title\n//\n// Body");
    }

    #[test]
    fn test_lone_carriage_return_splits() {
        assert_eq!(doc_lines("a\rb"), vec!["a", "b"]);
    }

    #[test]
    fn test_doc_push_never_stores_newlines() {
        let mut doc = Doc::from_text("first\nsecond");
        doc.paragraph();
        doc.push("Deprecated: use v2");
        assert_eq!(doc.len(), 4);
        assert!(doc.lines().iter().all(|l| !l.contains('\n')));
    }
}
