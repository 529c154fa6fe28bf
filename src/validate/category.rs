//! Category validators: the items of a category, its primary key, and
//! its mandatory set.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::item::ItemValidator;

#[derive(Debug, Default, Clone)]
pub struct CategoryValidator {
    pub name: String,
    /// Whether the category itself is mandatory in a data block.
    pub mandatory: bool,
    /// Primary-key item names, in dictionary order.
    pub keys: Vec<String>,
    /// Item validators keyed by ASCII-lowercased item name. Aliases are
    /// extra entries sharing the canonical item's `Arc`.
    items: FxHashMap<String, Arc<ItemValidator>>,
}

impl CategoryValidator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_item(&mut self, item: Arc<ItemValidator>) {
        self.items
            .insert(item.item_name.to_ascii_lowercase(), item);
    }

    /// Register `alias` as a synonym for an already-registered item.
    pub fn add_alias(&mut self, alias: &str, canonical: &str) {
        if let Some(item) = self.items.get(&canonical.to_ascii_lowercase()).cloned() {
            self.items.insert(alias.to_ascii_lowercase(), item);
        }
    }

    pub fn get_item(&self, item_name: &str) -> Option<&Arc<ItemValidator>> {
        self.items.get(&item_name.to_ascii_lowercase())
    }

    pub fn items(&self) -> impl Iterator<Item = &Arc<ItemValidator>> {
        self.items.values()
    }

    /// Item names that every row must carry a non-null value for.
    pub fn mandatory_items(&self) -> impl Iterator<Item = &Arc<ItemValidator>> {
        self.items.values().filter(|i| i.mandatory)
    }

    pub fn has_key(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn is_key(&self, item_name: &str) -> bool {
        self.keys.iter().any(|k| k.eq_ignore_ascii_case(item_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_lookup_is_case_insensitive() {
        let mut cat = CategoryValidator::new("atom_site");
        cat.add_item(Arc::new(ItemValidator::new("atom_site", "label")));
        assert!(cat.get_item("LABEL").is_some());
        assert!(cat.get_item("missing").is_none());
    }

    #[test]
    fn test_alias_shares_the_item() {
        let mut cat = CategoryValidator::new("atom_site");
        cat.add_item(Arc::new(ItemValidator::new("atom_site", "type_symbol")));
        cat.add_alias("atom_type_symbol", "type_symbol");
        let canonical = cat.get_item("type_symbol").expect("canonical").clone();
        let via_alias = cat.get_item("atom_type_symbol").expect("alias").clone();
        assert!(Arc::ptr_eq(&canonical, &via_alias));
    }

    #[test]
    fn test_key_membership() {
        let mut cat = CategoryValidator::new("t");
        cat.keys = vec!["id".into()];
        assert!(cat.is_key("ID"));
        assert!(!cat.is_key("n"));
        assert!(cat.has_key());
    }
}
