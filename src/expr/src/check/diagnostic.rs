//! Located compile diagnostics with caret rendering

use std::fmt;

/// Position of a token in the source text
///
/// `offset` counts code points from the start; `line` and `column` are
/// 1-based, with columns counted in code points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Location {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub(crate) const START: Location = Location {
        offset: 0,
        line: 1,
        column: 1,
    };
}

/// A single compile error tied to a source location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    location: Location,
    message: String,
    snippet: String,
}

impl Diagnostic {
    pub(crate) fn new(source: &str, location: Location, message: impl Into<String>) -> Self {
        let snippet = source
            .lines()
            .nth(location.line.saturating_sub(1))
            .unwrap_or_default()
            .replace('\t', " ");
        Self {
            location,
            message: message.into(),
            snippet,
        }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Location { line, column, .. } = self.location;
        write!(f, "ERROR: <input>:{}:{}: {}", line, column, self.message)?;
        write!(f, "\n | {}", self.snippet)?;
        let dots = column.saturating_sub(1).min(self.snippet.chars().count());
        write!(f, "\n | {}^", ".".repeat(dots))
    }
}

/// Diagnostics of one compilation, ordered by location
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub(crate) fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub(crate) fn sorted(mut self) -> Self {
        self.0.sort_by_key(|d| d.location.offset);
        self.0.dedup();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}
