//! Source locations for diagnostics
//!
//! The parser records, for every node, the file it came from and the
//! character offset where the node starts. Line and column are computed
//! lazily, only when an error is displayed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Location in source code for error reporting
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: Arc<str>,
    pub offset: usize,
}

impl Location {
    pub fn new(file: &str, offset: usize) -> Self {
        Self {
            file: Arc::from(file),
            offset,
        }
    }

    /// Compute the 1-based line and column of this location in `source`.
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        let mut line = 1;
        let mut column = 1;
        for (i, c) in source.chars().enumerate() {
            if i >= self.offset {
                break;
            }
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        (line, column)
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::new("<unknown>", 0)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col() {
        let source = "data a: Float\ndata b: Float\n  b = a";
        assert_eq!(Location::new("m", 0).line_col(source), (1, 1));
        assert_eq!(Location::new("m", 14).line_col(source), (2, 1));
        assert_eq!(Location::new("m", 30).line_col(source), (3, 3));
    }

    #[test]
    fn test_display() {
        assert_eq!(Location::new("model.siml", 42).to_string(), "model.siml:42");
    }
}
