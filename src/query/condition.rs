//! The condition algebra: composable predicates over the rows of one
//! category.
//!
//! A [`Condition`] names columns by tag; [`Prepared`] is the same tree
//! with tags resolved to column indices and item validators, built once
//! per query. Evaluation is pure. Cell tests go through the column's
//! type validator when one is attached, lexical compare otherwise.

use std::cmp::Ordering;
use std::ops::{BitAnd, BitOr};
use std::sync::Arc;

use regex::Regex;

use crate::base::number::{parse_float, parse_int};
use crate::error::{Error, Result};
use crate::store::cell::Row;
use crate::store::{Category, RowRef};
use crate::validate::ItemValidator;
use crate::validate::compare_numeric;

use super::value::{FromCifValue, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn allows(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

/// A predicate tree over one category's rows.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Matches every row.
    All,
    KeyEquals {
        tag: String,
        value: Value,
    },
    KeyNotEquals {
        tag: String,
        value: Value,
    },
    KeyIsNull {
        tag: String,
    },
    KeyCompare {
        tag: String,
        op: CompareOp,
        value: Value,
    },
    KeyMatches {
        tag: String,
        regex: Regex,
    },
    /// Any cell of the row equals the value.
    AnyEquals {
        value: Value,
    },
    /// Any cell of the row matches the pattern.
    AnyMatches {
        regex: Regex,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl BitAnd for Condition {
    type Output = Condition;

    fn bitand(self, rhs: Condition) -> Condition {
        Condition::And(Box::new(self), Box::new(rhs))
    }
}

impl BitOr for Condition {
    type Output = Condition;

    fn bitor(self, rhs: Condition) -> Condition {
        Condition::Or(Box::new(self), Box::new(rhs))
    }
}

/// Start a condition on a column: `key("id").is(1) & key("n").is_null()`.
pub fn key(tag: impl Into<String>) -> Key {
    Key(tag.into())
}

pub struct Key(String);

impl Key {
    pub fn is(self, value: impl Into<Value>) -> Condition {
        Condition::KeyEquals {
            tag: self.0,
            value: value.into(),
        }
    }

    pub fn is_not(self, value: impl Into<Value>) -> Condition {
        Condition::KeyNotEquals {
            tag: self.0,
            value: value.into(),
        }
    }

    pub fn is_null(self) -> Condition {
        Condition::KeyIsNull { tag: self.0 }
    }

    pub fn lt(self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Lt, value)
    }

    pub fn le(self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Le, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Gt, value)
    }

    pub fn ge(self, value: impl Into<Value>) -> Condition {
        self.compare(CompareOp::Ge, value)
    }

    fn compare(self, op: CompareOp, value: impl Into<Value>) -> Condition {
        Condition::KeyCompare {
            tag: self.0,
            op,
            value: value.into(),
        }
    }

    pub fn matches(self, pattern: &str) -> Result<Condition> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::validation("", format!("bad condition pattern: {e}")))?;
        Ok(Condition::KeyMatches { tag: self.0, regex })
    }
}

pub fn any_equals(value: impl Into<Value>) -> Condition {
    Condition::AnyEquals {
        value: value.into(),
    }
}

pub fn any_matches(pattern: &str) -> Result<Condition> {
    let regex = Regex::new(pattern)
        .map_err(|e| Error::validation("", format!("bad condition pattern: {e}")))?;
    Ok(Condition::AnyMatches { regex })
}

// ----------------------------------------------------------------------
// Prepared form
// ----------------------------------------------------------------------

enum Test {
    Equals(Value),
    NotEquals(Value),
    IsNull,
    Compare(CompareOp, Value),
    Matches(Regex),
}

/// A condition with column indices and item validators bound to one
/// category's layout.
pub(crate) enum Prepared {
    All,
    Key {
        /// `None` when the category has no such column: every row then
        /// reads as null for this key.
        col: Option<usize>,
        validator: Option<Arc<ItemValidator>>,
        test: Test,
    },
    Any(Test),
    And(Box<Prepared>, Box<Prepared>),
    Or(Box<Prepared>, Box<Prepared>),
}

impl Prepared {
    pub(crate) fn compile(cond: &Condition, cat: &Category) -> Prepared {
        let bind = |tag: &str, test: Test| {
            let col = cat.column_ix(tag);
            let validator = col
                .and_then(|c| cat.columns()[c].validator())
                .cloned();
            Prepared::Key {
                col,
                validator,
                test,
            }
        };
        match cond {
            Condition::All => Prepared::All,
            Condition::KeyEquals { tag, value } => bind(tag, Test::Equals(value.clone())),
            Condition::KeyNotEquals { tag, value } => bind(tag, Test::NotEquals(value.clone())),
            Condition::KeyIsNull { tag } => bind(tag, Test::IsNull),
            Condition::KeyCompare { tag, op, value } => {
                bind(tag, Test::Compare(*op, value.clone()))
            }
            Condition::KeyMatches { tag, regex } => bind(tag, Test::Matches(regex.clone())),
            Condition::AnyEquals { value } => Prepared::Any(Test::Equals(value.clone())),
            Condition::AnyMatches { regex } => Prepared::Any(Test::Matches(regex.clone())),
            Condition::And(l, r) => Prepared::And(
                Box::new(Self::compile(l, cat)),
                Box::new(Self::compile(r, cat)),
            ),
            Condition::Or(l, r) => Prepared::Or(
                Box::new(Self::compile(l, cat)),
                Box::new(Self::compile(r, cat)),
            ),
        }
    }

    pub(crate) fn matches(&self, cat: &Category, row: &Row) -> bool {
        match self {
            Prepared::All => true,
            Prepared::Key {
                col,
                validator,
                test,
            } => {
                let cell = col.and_then(|c| row.get(c as u16));
                eval(cell, validator.as_ref(), test)
            }
            Prepared::Any(test) => row.cells.iter().any(|cell| {
                let validator = cat
                    .columns()
                    .get(cell.column as usize)
                    .and_then(|c| c.validator());
                eval(Some(cell.text.as_str()), validator, test)
            }),
            Prepared::And(l, r) => l.matches(cat, row) && r.matches(cat, row),
            Prepared::Or(l, r) => l.matches(cat, row) || r.matches(cat, row),
        }
    }
}

fn is_null_text(cell: Option<&str>) -> bool {
    matches!(cell, None | Some("") | Some("."))
}

fn eval(cell: Option<&str>, validator: Option<&Arc<ItemValidator>>, test: &Test) -> bool {
    match test {
        Test::IsNull => is_null_text(cell),
        Test::Equals(Value::Null) => is_null_text(cell),
        Test::Equals(value) => equals(cell, value, validator),
        Test::NotEquals(Value::Null) => !is_null_text(cell),
        Test::NotEquals(value) => !equals(cell, value, validator),
        Test::Compare(op, value) => match ordering(cell, value, validator) {
            Some(ord) => op.allows(ord),
            None => false,
        },
        Test::Matches(regex) => cell.is_some_and(|text| regex.is_match(text)),
    }
}

fn equals(cell: Option<&str>, value: &Value, validator: Option<&Arc<ItemValidator>>) -> bool {
    if is_null_text(cell) {
        return false;
    }
    let Some(text) = cell else { return false };
    match value {
        Value::Null => unreachable!("handled by caller"),
        Value::Int(i) => {
            parse_int(text) == Some(*i)
                || parse_float(text).is_some_and(|f| compare_numeric(f, *i as f64).is_eq())
        }
        Value::Float(f) => {
            parse_float(text).is_some_and(|v| compare_numeric(v, *f).is_eq())
        }
        Value::Text(s) => match validator {
            Some(v) => v.compare(text, s).is_eq(),
            None => text == s,
        },
        Value::Bool(b) => bool::from_cif(text) == Some(*b),
    }
}

fn ordering(
    cell: Option<&str>,
    value: &Value,
    validator: Option<&Arc<ItemValidator>>,
) -> Option<Ordering> {
    if is_null_text(cell) {
        return None;
    }
    let text = cell?;
    match value {
        Value::Int(i) => Some(compare_numeric(parse_float(text)?, *i as f64)),
        Value::Float(f) => Some(compare_numeric(parse_float(text)?, *f)),
        Value::Text(s) => Some(match validator {
            Some(v) => v.compare(text, s),
            None => text.cmp(s.as_str()),
        }),
        Value::Bool(_) | Value::Null => None,
    }
}

/// Extract several columns of a row into a tuple of typed values; a row
/// with a null or unconvertible cell in any position yields `None`.
pub trait FromRow: Sized {
    const WIDTH: usize;

    fn from_row(row: &RowRef<'_>, tags: &[&str]) -> Option<Self>;
}

macro_rules! tuple_from_row {
    ($width:expr; $($ty:ident => $ix:tt),+) => {
        impl<$($ty: FromCifValue),+> FromRow for ($($ty,)+) {
            const WIDTH: usize = $width;

            fn from_row(row: &RowRef<'_>, tags: &[&str]) -> Option<Self> {
                Some(($(row.get_as::<$ty>(tags.get($ix)?)?,)+))
            }
        }
    };
}

tuple_from_row!(1; A => 0);
tuple_from_row!(2; A => 0, B => 1);
tuple_from_row!(3; A => 0, B => 1, C => 2);
tuple_from_row!(4; A => 0, B => 1, C => 2, D => 3);
