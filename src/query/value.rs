//! Typed values for conditions and typed row projection.

use smol_str::SmolStr;

use crate::base::number::{parse_float, parse_int};

/// A typed comparison operand. Conditions compare cell text against one
/// of these; `Null` matches the unknown (`?`), inapplicable (`.`), and
/// empty values alike.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Null,
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// Conversion from stored cell text into a caller type.
///
/// `None` signals both a missing/null cell and a failed conversion; the
/// row accessors map `?` and `.` to `None` before this trait is asked.
pub trait FromCifValue: Sized {
    fn from_cif(text: &str) -> Option<Self>;
}

impl FromCifValue for String {
    fn from_cif(text: &str) -> Option<Self> {
        Some(text.to_string())
    }
}

impl FromCifValue for SmolStr {
    fn from_cif(text: &str) -> Option<Self> {
        Some(SmolStr::new(text))
    }
}

impl FromCifValue for i64 {
    fn from_cif(text: &str) -> Option<Self> {
        parse_int(text)
    }
}

impl FromCifValue for i32 {
    fn from_cif(text: &str) -> Option<Self> {
        parse_int(text)?.try_into().ok()
    }
}

impl FromCifValue for u32 {
    fn from_cif(text: &str) -> Option<Self> {
        parse_int(text)?.try_into().ok()
    }
}

impl FromCifValue for usize {
    fn from_cif(text: &str) -> Option<Self> {
        parse_int(text)?.try_into().ok()
    }
}

impl FromCifValue for f64 {
    fn from_cif(text: &str) -> Option<Self> {
        parse_float(text)
    }
}

impl FromCifValue for f32 {
    fn from_cif(text: &str) -> Option<Self> {
        parse_float(text).map(|v| v as f32)
    }
}

impl FromCifValue for bool {
    fn from_cif(text: &str) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "y" | "yes" | "true" | "1" => Some(true),
            "n" | "no" | "false" | "0" => Some(false),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(i64::from_cif("42"), Some(42));
        assert_eq!(i64::from_cif("1.0"), None);
        assert_eq!(f64::from_cif("-.2e11"), Some(-0.2e11));
        assert_eq!(bool::from_cif("YES"), Some(true));
        assert_eq!(bool::from_cif("no"), Some(false));
        assert_eq!(bool::from_cif("maybe"), None);
        assert_eq!(String::from_cif("aap"), Some("aap".to_string()));
    }

    #[test]
    fn test_value_from() {
        assert_eq!(Value::from(1), Value::Int(1));
        assert_eq!(Value::from("aap"), Value::Text("aap".into()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(2.5)), Value::Float(2.5));
    }
}
