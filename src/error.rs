//! Error types shared across the crate.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by parsing, validation, editing, and serialization.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed CIF syntax. The parser is fail-fast: the first error
    /// aborts the parse with the line it occurred on.
    #[error("parse error at line {line}: {message}")]
    Parse { line: u32, message: String },

    /// A value failed its type regex, enumeration, or mandatory-field
    /// check, or an unknown tag was seen under a strict validator.
    #[error("validation error in _{}{}: {}", .category, fmt_item(.item), .message)]
    Validation {
        category: String,
        item: Option<String>,
        message: String,
    },

    /// A row insert or cascaded update would duplicate a primary key.
    #[error("duplicate key in category {category}: {key}")]
    DuplicateKey { category: String, key: String },

    /// A link validator references an unknown category or tag.
    #[error("link error between {parent} and {child}: {message}")]
    Link {
        parent: String,
        child: String,
        message: String,
    },

    /// Structural problem in a dictionary being parsed.
    #[error("dictionary error: {0}")]
    Dictionary(String),

    /// Passthrough from the byte-stream boundary.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn fmt_item(item: &Option<String>) -> String {
    match item {
        Some(item) => format!(".{item}"),
        None => String::new(),
    }
}

impl Error {
    /// Create a parse error at a line.
    pub fn parse(line: u32, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Create a validation error scoped to a category.
    pub fn validation(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            category: category.into(),
            item: None,
            message: message.into(),
        }
    }

    /// Create a validation error scoped to a single item.
    pub fn validation_item(
        category: impl Into<String>,
        item: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            category: category.into(),
            item: Some(item.into()),
            message: message.into(),
        }
    }

    /// Create a duplicate-key error.
    pub fn duplicate_key(category: impl Into<String>, key: impl Into<String>) -> Self {
        Self::DuplicateKey {
            category: category.into(),
            key: key.into(),
        }
    }

    /// Create a link error between a parent and child category.
    pub fn link(
        parent: impl Into<String>,
        child: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Link {
            parent: parent.into(),
            child: child.into(),
            message: message.into(),
        }
    }

    /// Create a dictionary error.
    pub fn dictionary(message: impl Into<String>) -> Self {
        Self::Dictionary(message.into())
    }

    /// True for duplicate-key failures, which callers often handle
    /// separately from other validation problems.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = Error::parse(12, "unterminated string");
        assert_eq!(err.to_string(), "parse error at line 12: unterminated string");
    }

    #[test]
    fn test_validation_error_display() {
        let err = Error::validation_item("atom_site", "occupancy", "does not match type");
        assert_eq!(
            err.to_string(),
            "validation error in _atom_site.occupancy: does not match type"
        );

        let err = Error::validation("atom_site", "missing mandatory item");
        assert_eq!(
            err.to_string(),
            "validation error in _atom_site: missing mandatory item"
        );
    }

    #[test]
    fn test_duplicate_key_is_distinguishable() {
        assert!(Error::duplicate_key("cat", "aap").is_duplicate_key());
        assert!(!Error::dictionary("broken").is_duplicate_key());
    }
}
