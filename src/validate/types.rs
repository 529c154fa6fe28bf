//! Type validators: a named primitive class plus a compiled pattern.
//!
//! mmCIF dictionaries write their `construct` patterns in POSIX extended
//! syntax. The `regex` crate accepts most of it; [`translate_pattern`]
//! rewrites the POSIX-isms it rejects, chiefly a literal `]` or `[`
//! inside a character class.

use std::cmp::Ordering;

use regex::Regex;

use crate::base::number::parse_float;
use crate::base::text::fold;
use crate::error::{Error, Result};

/// The three DDL2 primitive classes.
///
/// `UChar` compares case-insensitively; `Numb` compares numerically;
/// `Char` compares bytewise. All three collapse runs of spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Primitive {
    #[default]
    Char,
    UChar,
    Numb,
}

impl Primitive {
    /// Parse a `_item_type_list.primitive_code` value (case-insensitive).
    pub fn parse(code: &str) -> Self {
        match code.to_ascii_lowercase().as_str() {
            "uchar" => Self::UChar,
            "numb" => Self::Numb,
            _ => Self::Char,
        }
    }

    pub fn is_case_insensitive(&self) -> bool {
        matches!(self, Self::UChar)
    }
}

/// A named type: primitive class and the compiled `construct` regex.
#[derive(Debug)]
pub struct TypeValidator {
    name: String,
    primitive: Primitive,
    pattern: Regex,
}

impl TypeValidator {
    /// Compile a type from its dictionary declaration. The empty pattern
    /// normalizes to `.+`.
    pub fn new(name: impl Into<String>, primitive: Primitive, pattern: &str) -> Result<Self> {
        let name = name.into();
        let source = if pattern.is_empty() { ".+" } else { pattern };
        let translated = translate_pattern(source);
        // Anchor: a value matches its type only as a whole.
        let anchored = format!("^(?s:{translated})$");
        let pattern = Regex::new(&anchored)
            .map_err(|e| Error::dictionary(format!("bad pattern for type {name}: {e}")))?;
        Ok(Self {
            name,
            primitive,
            pattern,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    /// Does the value match the type's pattern?
    pub fn matches(&self, value: &str) -> bool {
        self.pattern.is_match(value)
    }

    /// Type-aware three-way compare.
    ///
    /// `Numb` compares numerically with an epsilon proportional to the
    /// magnitudes; the empty value sorts before any non-empty value.
    /// `UChar` folds case; both character classes collapse runs of
    /// spaces to a single space.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self.primitive {
            Primitive::Numb => match (parse_float(a), parse_float(b)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => compare_numeric(x, y),
            },
            Primitive::UChar => collapsed(a, true).cmp(collapsed(b, true)),
            Primitive::Char => collapsed(a, false).cmp(collapsed(b, false)),
        }
    }
}

fn collapsed(s: &str, fold_case: bool) -> impl Iterator<Item = u8> + '_ {
    let mut prev_space = false;
    s.bytes().filter_map(move |b| {
        let is_space = b == b' ';
        let skip = is_space && prev_space;
        prev_space = is_space;
        if skip {
            None
        } else if fold_case {
            Some(fold(b))
        } else {
            Some(b)
        }
    })
}

/// Numeric compare within a magnitude-relative epsilon.
pub(crate) fn compare_numeric(x: f64, y: f64) -> Ordering {
    let scale = x.abs().max(y.abs()).max(1.0);
    if (x - y).abs() <= f64::EPSILON * scale * 4.0 {
        Ordering::Equal
    } else if x < y {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// Rewrite a POSIX extended pattern into `regex`-crate syntax.
///
/// Inside a character class, POSIX treats a leading `]` and any `[` as
/// literals; the `regex` crate needs both escaped (an unescaped `[` there
/// opens a nested class). POSIX named classes like `[:alpha:]` pass
/// through unchanged.
fn translate_pattern(posix: &str) -> String {
    let bytes = posix.as_bytes();
    let mut out = String::with_capacity(posix.len() + 4);
    let mut i = 0;
    let mut in_class = false;
    let mut class_start = false;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if !in_class {
            match c {
                '\\' if i + 1 < bytes.len() => {
                    out.push('\\');
                    out.push(bytes[i + 1] as char);
                    i += 2;
                    continue;
                }
                '[' => {
                    in_class = true;
                    class_start = true;
                    out.push('[');
                    i += 1;
                    if i < bytes.len() && bytes[i] == b'^' {
                        out.push('^');
                        i += 1;
                    }
                    continue;
                }
                _ => out.push(c),
            }
            i += 1;
        } else {
            match c {
                ']' if class_start => out.push_str("\\]"),
                ']' => {
                    in_class = false;
                    out.push(']');
                }
                '[' if bytes.get(i + 1) == Some(&b':') => out.push('['),
                '[' => out.push_str("\\["),
                '\\' if i + 1 < bytes.len() => {
                    out.push('\\');
                    out.push(bytes[i + 1] as char);
                    i += 2;
                    class_start = false;
                    continue;
                }
                _ => out.push(c),
            }
            class_start = false;
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(primitive: Primitive, pattern: &str) -> TypeValidator {
        TypeValidator::new("test", primitive, pattern).expect("compile")
    }

    #[test]
    fn test_empty_pattern_matches_nonempty() {
        let t = ty(Primitive::Char, "");
        assert!(t.matches("anything"));
        assert!(!t.matches(""));
    }

    #[test]
    fn test_posix_class_with_leading_bracket() {
        // The mmCIF `text` construct uses classes like this one.
        let t = ty(Primitive::Char, "[][ \n\t_(),.;:\"&<>/\\{}'`~!@#$%A-Za-z0-9*|+-]*");
        assert!(t.matches("C [ 1 ] ; x"));
        assert!(t.matches(""));
    }

    #[test]
    fn test_full_match_anchoring() {
        let t = ty(Primitive::Char, "[0-9]+");
        assert!(t.matches("123"));
        assert!(!t.matches("12a"));
        assert!(!t.matches("a12"));
    }

    #[test]
    fn test_numb_compare() {
        let t = ty(Primitive::Numb, ".*");
        assert_eq!(t.compare("1.0", "1"), Ordering::Equal);
        assert_eq!(t.compare("3.000000", "3"), Ordering::Equal);
        assert_eq!(t.compare("1.5", "2"), Ordering::Less);
        assert_eq!(t.compare("", "0"), Ordering::Less);
        assert_eq!(t.compare("", ""), Ordering::Equal);
    }

    #[test]
    fn test_uchar_compare_folds_case_and_spaces() {
        let t = ty(Primitive::UChar, ".*");
        assert_eq!(t.compare("AAP", "aap"), Ordering::Equal);
        assert_eq!(t.compare("a  b", "A B"), Ordering::Equal);
        assert_eq!(t.compare("aap", "noot"), Ordering::Less);
    }

    #[test]
    fn test_char_compare_is_case_sensitive() {
        let t = ty(Primitive::Char, ".*");
        assert_ne!(t.compare("AAP", "aap"), Ordering::Equal);
        assert_eq!(t.compare("a  b", "a b"), Ordering::Equal);
    }

    #[test]
    fn test_primitive_parse() {
        assert_eq!(Primitive::parse("uchar"), Primitive::UChar);
        assert_eq!(Primitive::parse("UCHAR"), Primitive::UChar);
        assert_eq!(Primitive::parse("numb"), Primitive::Numb);
        assert_eq!(Primitive::parse("char"), Primitive::Char);
        assert_eq!(Primitive::parse("anything"), Primitive::Char);
    }
}
