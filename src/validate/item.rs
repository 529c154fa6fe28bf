//! Item validators: one per tag, holding mandatoriness, a type
//! reference, and an optional enumeration of allowed values.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::base::text::iequals;
use crate::error::{Error, Result};

use super::types::{Primitive, TypeValidator};

#[derive(Debug, Clone)]
pub struct ItemValidator {
    /// Category part of the tag.
    pub category: String,
    /// Item part of the tag.
    pub item_name: String,
    pub mandatory: bool,
    pub type_validator: Option<Arc<TypeValidator>>,
    /// Allowed values; empty means unconstrained.
    pub enums: Vec<String>,
}

impl ItemValidator {
    pub fn new(category: impl Into<String>, item_name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            item_name: item_name.into(),
            mandatory: false,
            type_validator: None,
            enums: Vec::new(),
        }
    }

    /// The fully qualified tag, `_category.item`.
    pub fn tag(&self) -> String {
        format!("_{}.{}", self.category, self.item_name)
    }

    fn case_insensitive(&self) -> bool {
        self.type_validator
            .as_ref()
            .is_some_and(|t| t.primitive().is_case_insensitive())
    }

    /// Validate a stored value. The null values (unknown, passed here
    /// as `?`; inapplicable `.`; the empty string) are never checked
    /// against type or enumeration.
    pub fn validate(&self, value: &str) -> Result<()> {
        if value.is_empty() || value == "." || value == "?" {
            return Ok(());
        }
        if let Some(ty) = &self.type_validator {
            if !ty.matches(value) {
                return Err(Error::validation_item(
                    &self.category,
                    &self.item_name,
                    format!("value '{value}' does not match type {}", ty.name()),
                ));
            }
        }
        if !self.enums.is_empty() {
            let folded = self.case_insensitive();
            let hit = self.enums.iter().any(|e| {
                if folded {
                    iequals(e, value)
                } else {
                    e == value
                }
            });
            if !hit {
                return Err(Error::validation_item(
                    &self.category,
                    &self.item_name,
                    format!("value '{value}' is not in the enumeration"),
                ));
            }
        }
        Ok(())
    }

    /// Compare two stored values under this item's type; lexical compare
    /// when no type is attached.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match &self.type_validator {
            Some(ty) => ty.compare(a, b),
            None => a.cmp(b),
        }
    }

    /// Key normalization for the primary-key index: `UChar` keys fold to
    /// lower case so `AAP` and `aap` collide.
    pub fn normalize_key(&self, value: &str) -> String {
        if self.case_insensitive() {
            value.to_ascii_lowercase()
        } else {
            value.to_string()
        }
    }

    pub fn primitive(&self) -> Primitive {
        self.type_validator
            .as_ref()
            .map(|t| t.primitive())
            .unwrap_or_default()
    }
}
