//! Typed tree IR for the verifier frontend
//!
//! This crate defines the trees the elaboration passes consume and produce:
//! expressions, types, class/sort/function definitions, specification
//! clauses, and the symbol tables that tie them together.
//!
//! The IR is designed to be:
//! - Immutable: passes build new definitions rather than mutating input
//! - Position-carrying: every expression records its source span
//! - Serializable for result caching

pub mod config;
pub mod defs;
pub mod expr;
pub mod report;
pub mod specs;
pub mod symbols;
pub mod types;

pub use config::*;
pub use defs::*;
pub use expr::*;
pub use report::*;
pub use specs::*;
pub use symbols::*;
pub use types::*;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Unique identifier for a definition or binder
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SymbolId(pub u64);

impl std::fmt::Display for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source location for error reporting
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    pub file: Arc<str>,
    pub line_start: u32,
    pub line_end: u32,
    pub col_start: u32,
    pub col_end: u32,
}

impl Default for SourceSpan {
    fn default() -> Self {
        Self {
            file: "<unknown>".into(),
            line_start: 0,
            line_end: 0,
            col_start: 0,
            col_end: 0,
        }
    }
}

impl SourceSpan {
    /// Create a dummy source span for testing
    #[must_use]
    pub fn dummy() -> Self {
        Self::default()
    }

    /// A span on a single line of a named file
    #[must_use]
    pub fn line(file: &str, line: u32) -> Self {
        Self {
            file: file.into(),
            line_start: line,
            line_end: line,
            col_start: 0,
            col_end: 0,
        }
    }
}

impl std::fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line_start == self.line_end {
            write!(
                f,
                "{}:{}:{}-{}",
                self.file, self.line_start, self.col_start, self.col_end
            )
        } else {
            write!(
                f,
                "{}:{}:{}-{}:{}",
                self.file, self.line_start, self.col_start, self.line_end, self.col_end
            )
        }
    }
}

/// A typed binder or variable occurrence
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable {
    pub id: SymbolId,
    pub name: String,
    pub tpe: types::Type,
}

impl Variable {
    #[must_use]
    pub fn new(id: SymbolId, name: impl Into<String>, tpe: types::Type) -> Self {
        Self {
            id,
            name: name.into(),
            tpe,
        }
    }

    /// Same binder with another type
    #[must_use]
    pub fn with_type(&self, tpe: types::Type) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            tpe,
        }
    }
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_display_single_line() {
        let span = SourceSpan {
            file: "main.lang".into(),
            line_start: 3,
            line_end: 3,
            col_start: 1,
            col_end: 9,
        };
        assert_eq!(span.to_string(), "main.lang:3:1-9");
    }

    #[test]
    fn test_span_default_is_unknown() {
        assert_eq!(&*SourceSpan::default().file, "<unknown>");
    }
}
