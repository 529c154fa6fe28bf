//! Link validators: N-column foreign-key relationships between two
//! categories, identified by a link group id. Multiple link groups
//! between the same pair of categories are independent join paths.

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct LinkValidator {
    pub link_group_id: u32,
    pub parent_category: String,
    pub child_category: String,
    /// Item names on the parent side, index-aligned with `child_keys`.
    pub parent_keys: Vec<String>,
    pub child_keys: Vec<String>,
    /// Human-readable label from `_pdbx_item_linked_group.label`.
    pub label: Option<String>,
}

impl LinkValidator {
    pub fn new(
        link_group_id: u32,
        parent_category: impl Into<String>,
        child_category: impl Into<String>,
        parent_keys: Vec<String>,
        child_keys: Vec<String>,
    ) -> Result<Self> {
        let parent_category = parent_category.into();
        let child_category = child_category.into();
        if parent_keys.len() != child_keys.len() || parent_keys.is_empty() {
            return Err(Error::link(
                &parent_category,
                &child_category,
                format!(
                    "link group {link_group_id} has {} parent keys and {} child keys",
                    parent_keys.len(),
                    child_keys.len()
                ),
            ));
        }
        Ok(Self {
            link_group_id,
            parent_category,
            child_category,
            parent_keys,
            child_keys,
            label: None,
        })
    }

    pub fn key_count(&self) -> usize {
        self.parent_keys.len()
    }

    /// Position of a parent-side item name within the key tuple.
    pub fn parent_key_index(&self, item_name: &str) -> Option<usize> {
        self.parent_keys
            .iter()
            .position(|k| k.eq_ignore_ascii_case(item_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatched_key_counts_are_rejected() {
        let err = LinkValidator::new(
            1,
            "parent",
            "child",
            vec!["id".into()],
            vec!["parent_id".into(), "extra".into()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("link error"));
    }

    #[test]
    fn test_parent_key_index() {
        let link = LinkValidator::new(
            1,
            "parent",
            "child",
            vec!["id".into(), "sub".into()],
            vec!["parent_id".into(), "parent_sub".into()],
        )
        .expect("link");
        assert_eq!(link.parent_key_index("ID"), Some(0));
        assert_eq!(link.parent_key_index("sub"), Some(1));
        assert_eq!(link.parent_key_index("other"), None);
    }
}
