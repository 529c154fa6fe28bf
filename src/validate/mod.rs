//! Dictionary-derived schema: type, item, category, and link validators,
//! plus the process-wide validator factory.
//!
//! A [`Validator`] is built once (usually by the dictionary loader) and
//! then shared immutably across files via `Arc`. Its strict flag decides
//! whether a failed check is an error or a `tracing::warn!` diagnostic.

mod category;
mod factory;
mod item;
mod link;
mod types;

pub(crate) use types::compare_numeric;

pub use category::CategoryValidator;
pub use factory::ValidatorFactory;
pub use item::ItemValidator;
pub use link::LinkValidator;
pub use types::{Primitive, TypeValidator};

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::base::text::{iequals, to_lower};
use crate::error::{Error, Result};

/// A complete schema: the compiled form of one data dictionary.
#[derive(Debug, Default)]
pub struct Validator {
    name: String,
    version: String,
    strict: bool,
    types: FxHashMap<String, Arc<TypeValidator>>,
    categories: IndexMap<String, Arc<CategoryValidator>>,
    links: Vec<Arc<LinkValidator>>,
    /// Legacy alias tags (full tag, lowercased) → canonical full tag.
    aliases: FxHashMap<String, String>,
}

impl Validator {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Dictionary title, e.g. `mmcif_pdbx.dic`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Strictness must be decided before the validator is shared.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Route a failed check: an error under strict validation, a warning
    /// diagnostic otherwise.
    pub fn report(&self, err: Error) -> Result<()> {
        if self.strict {
            Err(err)
        } else {
            warn!("{err}");
            Ok(())
        }
    }

    pub fn add_type(&mut self, type_validator: TypeValidator) -> Arc<TypeValidator> {
        let arc = Arc::new(type_validator);
        self.types
            .insert(arc.name().to_ascii_lowercase(), arc.clone());
        arc
    }

    pub fn get_type(&self, name: &str) -> Option<&Arc<TypeValidator>> {
        self.types.get(&name.to_ascii_lowercase())
    }

    pub fn add_category(&mut self, category: CategoryValidator) {
        self.categories
            .insert(to_lower(&category.name), Arc::new(category));
    }

    pub fn get_category(&self, name: &str) -> Option<&Arc<CategoryValidator>> {
        self.categories.get(&to_lower(name))
    }

    pub fn categories(&self) -> impl Iterator<Item = &Arc<CategoryValidator>> {
        self.categories.values()
    }

    pub fn add_link(&mut self, link: LinkValidator) {
        self.links.push(Arc::new(link));
    }

    pub fn links(&self) -> &[Arc<LinkValidator>] {
        &self.links
    }

    /// Link groups in which `category` is the parent.
    pub fn links_for_parent<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a Arc<LinkValidator>> + 'a {
        self.links
            .iter()
            .filter(move |l| iequals(&l.parent_category, category))
    }

    /// Link groups in which `category` is the child.
    pub fn links_for_child<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a Arc<LinkValidator>> + 'a {
        self.links
            .iter()
            .filter(move |l| iequals(&l.child_category, category))
    }

    pub fn add_alias(&mut self, alias_tag: &str, canonical_tag: &str) {
        self.aliases
            .insert(to_lower(alias_tag), to_lower(canonical_tag));
    }

    /// Resolve an item validator from category and item names, following
    /// legacy aliases when the direct lookup misses.
    pub fn get_item(&self, category: &str, item_name: &str) -> Option<&Arc<ItemValidator>> {
        if let Some(cat) = self.get_category(category) {
            if let Some(item) = cat.get_item(item_name) {
                return Some(item);
            }
        }
        let tag = if category.is_empty() {
            format!("_{item_name}")
        } else {
            format!("_{category}.{item_name}")
        };
        let canonical = self.aliases.get(&to_lower(&tag))?;
        let (cat, item) = crate::base::text::split_tag_name(canonical);
        self.get_category(cat)?.get_item(item)
    }
}
