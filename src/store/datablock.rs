//! Data blocks: ordered, name-keyed categories plus an attached
//! validator.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::base::text::to_lower;
use crate::error::{Error, Result};
use crate::validate::Validator;

use super::category::Category;

/// One `data_<name>` scope: an ordered set of categories, unique by
/// case-insensitive name.
#[derive(Debug, Clone, Default)]
pub struct DataBlock {
    name: String,
    /// Keyed by lowercased category name; the category keeps the
    /// original spelling.
    categories: IndexMap<String, Category>,
    validator: Option<Arc<Validator>>,
}

impl DataBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn validator(&self) -> Option<&Arc<Validator>> {
        self.validator.as_ref()
    }

    /// Find or create a category. A second `emplace_category` with the
    /// same name (any casing) returns the existing one.
    pub fn emplace_category(&mut self, name: &str) -> &mut Category {
        let key = to_lower(name);
        let validator = self.validator.clone();
        self.categories.entry(key).or_insert_with(|| {
            let mut cat = Category::new(name);
            if let Some(v) = &validator {
                cat.set_validator(v.get_category(name).cloned(), v.is_strict());
            }
            cat
        })
    }

    pub fn get_category(&self, name: &str) -> Option<&Category> {
        self.categories.get(&to_lower(name))
    }

    pub fn get_category_mut(&mut self, name: &str) -> Option<&mut Category> {
        self.categories.get_mut(&to_lower(name))
    }

    /// Move a category to the front of the block; the serializer uses
    /// this to hoist `entry` and `audit_conform`.
    pub fn promote_category(&mut self, name: &str) -> bool {
        match self.categories.get_index_of(&to_lower(name)) {
            Some(ix) => {
                self.categories.move_index(ix, 0);
                true
            }
            None => false,
        }
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    pub(crate) fn categories_by_key(&self) -> &IndexMap<String, Category> {
        &self.categories
    }

    pub(crate) fn categories_by_key_mut(&mut self) -> &mut IndexMap<String, Category> {
        &mut self.categories
    }

    /// Attach a validator, cascading into every category.
    pub fn set_validator(&mut self, validator: Option<Arc<Validator>>) {
        self.validator = validator;
        self.update_links();
    }

    /// Re-bind category validators and link resolution. Links are
    /// resolved by category name at use, so after a clone this only has
    /// to re-attach the validator references.
    pub fn update_links(&mut self) {
        let validator = self.validator.clone();
        let strict = validator.as_ref().is_some_and(|v| v.is_strict());
        for cat in self.categories.values_mut() {
            let cv = validator
                .as_ref()
                .and_then(|v| v.get_category(cat.name()).cloned());
            cat.set_validator(cv, strict);
        }
    }

    /// Check the whole block against the validator: mandatory
    /// categories and items, value types, and primary-key uniqueness.
    /// Under a strict validator the first failure is returned; otherwise
    /// failures are warned and the check continues.
    pub fn validate(&self) -> Result<()> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        for cv in validator.categories() {
            if cv.mandatory && self.get_category(&cv.name).is_none() {
                validator.report(Error::validation(
                    &cv.name,
                    "mandatory category is missing",
                ))?;
            }
        }
        for cat in self.categories.values() {
            let Some(cv) = cat.validator() else {
                if validator.is_strict() {
                    return Err(Error::validation(
                        cat.name(),
                        "category is not defined in the dictionary",
                    ));
                }
                continue;
            };
            let mandatory: Vec<_> = cv.mandatory_items().cloned().collect();
            for row in cat.rows() {
                for item in &mandatory {
                    if row.is_null(&item.item_name) {
                        validator.report(Error::validation_item(
                            cat.name(),
                            &item.item_name,
                            "mandatory item is missing a value",
                        ))?;
                    }
                }
                for column in cat.columns() {
                    if let (Some(iv), Some(text)) = (column.validator(), row.get(column.name())) {
                        if let Err(err) = iv.validate(text) {
                            validator.report(err)?;
                        }
                    }
                }
            }
            // Primary-key uniqueness across rows.
            if cv.has_key() {
                let mut seen = rustc_hash::FxHashSet::default();
                for id in cat.row_order() {
                    let Some(row) = cat.row_data(*id) else { continue };
                    if let Some(key) = cat.key_string(row) {
                        if !seen.insert(key.clone()) {
                            validator.report(Error::duplicate_key(cat.name(), key))?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Data-identity compare: categories are matched by name, values
    /// type-aware, block names case-insensitive.
    pub fn same_data(&self, other: &DataBlock) -> bool {
        if !crate::base::text::iequals(&self.name, &other.name)
            || self.categories.len() != other.categories.len()
        {
            return false;
        }
        self.categories.values().all(|cat| {
            other
                .get_category(cat.name())
                .is_some_and(|o| cat.same_data(o))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emplace_category_is_idempotent() {
        let mut block = DataBlock::new("TEST");
        block.emplace_category("atom_site").emplace([("id", "1")]).expect("row");
        let again = block.emplace_category("ATOM_SITE");
        assert_eq!(again.len(), 1);
        assert_eq!(block.categories().count(), 1);
    }

    #[test]
    fn test_promote_category_moves_to_front() {
        let mut block = DataBlock::new("TEST");
        block.emplace_category("atom_site");
        block.emplace_category("entry");
        assert!(block.promote_category("entry"));
        let names: Vec<_> = block.categories().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["entry", "atom_site"]);
        assert!(!block.promote_category("missing"));
    }

    #[test]
    fn test_same_data_ignores_category_order() {
        let mut a = DataBlock::new("d");
        a.emplace_category("x").emplace([("v", "1")]).expect("row");
        a.emplace_category("y").emplace([("v", "2")]).expect("row");
        let mut b = DataBlock::new("D");
        b.emplace_category("y").emplace([("v", "2")]).expect("row");
        b.emplace_category("x").emplace([("v", "1")]).expect("row");
        assert!(a.same_data(&b));
        b.emplace_category("z");
        assert!(!a.same_data(&b));
    }
}
