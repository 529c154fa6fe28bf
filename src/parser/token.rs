//! Token types produced by the scanner.

use smol_str::SmolStr;

/// Classification of a value lexeme.
///
/// The scanner's restart ladder settles on `Float`, `Int`, or `String`;
/// `TextField` marks semicolon-delimited multiline values, and the two
/// null markers `?` and `.` get their own kinds so that unknown and
/// inapplicable stay distinguishable from ordinary text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Float,
    String,
    TextField,
    /// `.`: the value does not apply.
    Inapplicable,
    /// `?`: the value is not known.
    Unknown,
}

/// A classified value lexeme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedValue {
    pub text: SmolStr,
    pub kind: ValueKind,
}

impl ParsedValue {
    pub fn new(text: impl Into<SmolStr>, kind: ValueKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    /// The unknown value `?`: no text at all.
    pub fn unknown() -> Self {
        Self::new("", ValueKind::Unknown)
    }

    /// The inapplicable value `.`.
    pub fn inapplicable() -> Self {
        Self::new(".", ValueKind::Inapplicable)
    }

    /// True for both null kinds.
    pub fn is_null(&self) -> bool {
        matches!(self.kind, ValueKind::Unknown | ValueKind::Inapplicable)
    }
}

/// One lexical token.
///
/// Reserved words are promoted from value lexemes by case-insensitive
/// comparison after scanning; `data_` and `save_` carry their trailing
/// name (a bare `save_` terminates a frame and carries an empty name).
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Eof,
    DataName(String),
    SaveName(String),
    Loop,
    Global,
    Stop,
    Tag(String),
    Value(ParsedValue),
}

impl Token {
    /// Short description for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Eof => "end of input".into(),
            Token::DataName(n) => format!("data_{n}"),
            Token::SaveName(n) if n.is_empty() => "save_".into(),
            Token::SaveName(n) => format!("save_{n}"),
            Token::Loop => "loop_".into(),
            Token::Global => "global_".into(),
            Token::Stop => "stop_".into(),
            Token::Tag(t) => t.clone(),
            Token::Value(v) => format!("value '{}'", v.text),
        }
    }
}
