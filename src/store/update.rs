//! Referential update propagation across link groups.
//!
//! The mutating operations must keep primary keys unique and child
//! joins consistent.
//! Updates and erases run in three stages: a read-only *plan* walk over
//! the link graph, a *validation* pass over the staged changes, and only
//! then the in-place *apply*. A failed validation leaves the store
//! untouched.
//!
//! When a parent key changes, every link group it participates in is
//! walked. A matching child is normally rewritten in place; but when the
//! child is also joined to some other live parent, through a different
//! link group whose resolved parent row is not itself being rewritten by
//! this cascade, the child is *split*: a clone with the new key tuple
//! is inserted right after it and the original keeps its old joins.

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use tracing::trace;

use crate::base::text::to_lower;
use crate::error::{Error, Result};
use crate::query::condition::Condition;
use crate::validate::{LinkValidator, Validator};

use super::category::{Category, encode_value};
use super::cell::{Row, RowId};
use super::datablock::DataBlock;

/// A child row whose complete join tuple has no matching parent row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkIssue {
    pub link_group_id: u32,
    pub parent_category: String,
    pub child_category: String,
    pub child_row: RowId,
}

/// A link group with both sides resolved against a block.
struct ResolvedLink {
    link: Arc<LinkValidator>,
    parent_key: String,
    parent_cols: Vec<usize>,
    child_key: String,
    child_cols: Vec<usize>,
}

#[derive(Default)]
struct Plan {
    /// Per-row staged cell writes, in discovery order.
    writes: IndexMap<(String, RowId), Vec<(usize, Option<SmolStr>)>>,
    clones: Vec<CloneOp>,
    /// (category, row, link group) triples already handled; this is the
    /// visited set that terminates cyclic link graphs.
    visited: FxHashSet<(String, RowId, u32)>,
}

struct CloneOp {
    cat: String,
    src: RowId,
    overrides: Vec<(usize, Option<SmolStr>)>,
}

impl Plan {
    fn add_write(&mut self, cat: &str, row: RowId, col: usize, value: Option<SmolStr>) {
        let writes = self
            .writes
            .entry((cat.to_string(), row))
            .or_default();
        match writes.iter_mut().find(|(c, _)| *c == col) {
            Some(entry) => entry.1 = value,
            None => writes.push((col, value)),
        }
    }

    fn touches_row(&self, cat: &str, row: RowId) -> bool {
        self.writes.contains_key(&(cat.to_string(), row))
    }

    fn visit(&mut self, cat: &str, row: RowId, link_group_id: u32) -> bool {
        self.visited.insert((cat.to_string(), row, link_group_id))
    }
}

impl DataBlock {
    /// Update one cell, cascading through link groups when the column is
    /// a parent key. Fail-fast: on any validation failure the store is
    /// left unchanged.
    pub fn update_value(
        &mut self,
        category: &str,
        row: RowId,
        tag: &str,
        value: &str,
    ) -> Result<()> {
        let cat_key = to_lower(category);
        let cat = self
            .categories_by_key()
            .get(&cat_key)
            .ok_or_else(|| Error::validation(category, "unknown category"))?;
        if cat.row_data(row).is_none() {
            return Err(Error::validation(category, "no such row"));
        }
        let item = strip_tag(tag);

        let validator = self.validator().cloned();
        let parent_links: Vec<Arc<LinkValidator>> = match &validator {
            Some(v) => v
                .links_for_parent(cat.name())
                .filter(|l| l.parent_key_index(item).is_some())
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        let col = cat.column_ix(item);

        // Not a parent key (or the column holds no values yet): local
        // validated rewrite.
        let (Some(validator), Some(col), false) = (validator, col, parent_links.is_empty())
        else {
            let cat = self
                .categories_by_key_mut()
                .get_mut(&cat_key)
                .ok_or_else(|| Error::validation(category, "unknown category"))?;
            return cat.set_value(row, tag, value);
        };

        let new_value = encode_value(value);
        let old_value = cat
            .row_data(row)
            .and_then(|r| r.get(col as u16))
            .map(SmolStr::new);
        if old_value.as_deref() == new_value.as_deref() {
            return Ok(());
        }

        // Stage 1: plan.
        let mut plan = Plan::default();
        plan.add_write(&cat_key, row, col, new_value.clone());
        let mut queue: VecDeque<(String, RowId, usize, Option<SmolStr>)> = VecDeque::new();
        queue.push_back((cat_key.clone(), row, col, new_value));

        while let Some((pcat_key, prow, pcol, pnew)) = queue.pop_front() {
            let Some(pcat) = self.categories_by_key().get(&pcat_key) else {
                continue;
            };
            let pcol_item = pcat.columns()[pcol].name().to_string();
            let links: Vec<Arc<LinkValidator>> = validator
                .links_for_parent(pcat.name())
                .filter(|l| l.parent_key_index(&pcol_item).is_some())
                .cloned()
                .collect();
            for link in links {
                let Some(resolved) = self.resolve_link(&link) else {
                    continue;
                };
                let Some(ki) = link.parent_key_index(&pcol_item) else {
                    continue;
                };
                let old_tuple = row_tuple(pcat, prow, &resolved.parent_cols);
                let Some(child_cat) = self.categories_by_key().get(&resolved.child_key) else {
                    continue;
                };
                for ch in child_cat.row_order().to_vec() {
                    let ch_tuple = row_tuple(child_cat, ch, &resolved.child_cols);
                    if !tuple_complete(&ch_tuple)
                        || !tuples_match(child_cat, &resolved.child_cols, &ch_tuple, &old_tuple)
                    {
                        continue;
                    }
                    if !plan.visit(&resolved.child_key, ch, link.link_group_id) {
                        continue;
                    }
                    if self.bound_elsewhere(&validator, &resolved, ch, &plan) {
                        // Split: the clone follows the renamed parent,
                        // the original keeps its other joins.
                        trace!(
                            child = %link.child_category,
                            group = link.link_group_id,
                            "splitting child row on cascade"
                        );
                        let mut overrides: Vec<(usize, Option<SmolStr>)> = Vec::new();
                        for (i, ccol) in resolved.child_cols.iter().enumerate() {
                            let component = if i == ki {
                                pnew.clone()
                            } else {
                                ch_tuple[i].clone()
                            };
                            overrides.push((*ccol, component));
                        }
                        plan.clones.push(CloneOp {
                            cat: resolved.child_key.clone(),
                            src: ch,
                            overrides,
                        });
                    } else {
                        let ccol = resolved.child_cols[ki];
                        plan.add_write(&resolved.child_key, ch, ccol, pnew.clone());
                        // The child may itself be a parent elsewhere.
                        queue.push_back((resolved.child_key.clone(), ch, ccol, pnew.clone()));
                    }
                }
            }
        }

        // Stage 2: validate the staged changes.
        self.validate_plan(&plan)?;

        // Stage 3: apply, clones first, then the in-place rewrites.
        self.apply_plan(plan);
        Ok(())
    }

    /// Erase a row, cascading into children: a child with no other
    /// surviving resolved parent is erased too; otherwise only the
    /// columns of the removed link are blanked.
    pub fn erase_row_cascading(&mut self, category: &str, row: RowId) -> Result<bool> {
        let cat_key = to_lower(category);
        let Some(cat) = self.categories_by_key().get(&cat_key) else {
            return Err(Error::validation(category, "unknown category"));
        };
        if cat.row_data(row).is_none() {
            return Ok(false);
        }
        let Some(validator) = self.validator().cloned() else {
            if let Some(cat) = self.categories_by_key_mut().get_mut(&cat_key) {
                cat.erase_row(row);
            }
            return Ok(true);
        };

        let mut erases: IndexMap<(String, RowId), ()> = IndexMap::new();
        let mut blanks: Vec<(String, RowId, Vec<usize>)> = Vec::new();
        erases.insert((cat_key.clone(), row), ());
        let mut stack = vec![(cat_key, row)];

        while let Some((pcat_key, prow)) = stack.pop() {
            let Some(pcat) = self.categories_by_key().get(&pcat_key) else {
                continue;
            };
            for link in validator
                .links_for_parent(pcat.name())
                .cloned()
                .collect::<Vec<_>>()
            {
                let Some(resolved) = self.resolve_link(&link) else {
                    continue;
                };
                let old_tuple = row_tuple(pcat, prow, &resolved.parent_cols);
                let Some(child_cat) = self.categories_by_key().get(&resolved.child_key) else {
                    continue;
                };
                for ch in child_cat.row_order().to_vec() {
                    if erases.contains_key(&(resolved.child_key.clone(), ch)) {
                        continue;
                    }
                    let ch_tuple = row_tuple(child_cat, ch, &resolved.child_cols);
                    if !tuple_complete(&ch_tuple)
                        || !tuples_match(child_cat, &resolved.child_cols, &ch_tuple, &old_tuple)
                    {
                        continue;
                    }
                    if self.survives_elsewhere(&validator, &resolved, ch, &erases) {
                        blanks.push((resolved.child_key.clone(), ch, resolved.child_cols.clone()));
                    } else {
                        erases.insert((resolved.child_key.clone(), ch), ());
                        stack.push((resolved.child_key.clone(), ch));
                    }
                }
            }
        }

        for ((cat_key, row), _) in &erases {
            if let Some(cat) = self.categories_by_key_mut().get_mut(cat_key) {
                cat.erase_row(*row);
            }
        }
        for (cat_key, row, cols) in blanks {
            if let Some(cat) = self.categories_by_key_mut().get_mut(&cat_key) {
                for col in cols {
                    cat.set_raw(row, col, None);
                }
            }
        }
        Ok(true)
    }

    /// Erase every row matching the condition, cascading each one.
    /// Returns the number of directly erased rows.
    pub fn erase_rows(&mut self, category: &str, cond: &Condition) -> Result<usize> {
        let ids: Vec<RowId> = match self.get_category(category) {
            Some(cat) => cat.find(cond).map(|r| r.id()).collect(),
            None => return Err(Error::validation(category, "unknown category")),
        };
        let mut erased = 0;
        for id in ids {
            if self.erase_row_cascading(category, id)? {
                erased += 1;
            }
        }
        Ok(erased)
    }

    /// Report every child row whose complete join tuple resolves to no
    /// parent row.
    pub fn validate_links(&self) -> Vec<LinkIssue> {
        let Some(validator) = self.validator() else {
            return Vec::new();
        };
        let mut issues = Vec::new();
        for link in validator.links() {
            let Some(resolved) = self.resolve_link(link) else {
                continue;
            };
            let (Some(parent_cat), Some(child_cat)) = (
                self.categories_by_key().get(&resolved.parent_key),
                self.categories_by_key().get(&resolved.child_key),
            ) else {
                continue;
            };
            for ch in child_cat.row_order() {
                let ch_tuple = row_tuple(child_cat, *ch, &resolved.child_cols);
                if !tuple_complete(&ch_tuple) {
                    continue;
                }
                let found = parent_cat.row_order().iter().any(|pr| {
                    let p_tuple = row_tuple(parent_cat, *pr, &resolved.parent_cols);
                    tuples_match(child_cat, &resolved.child_cols, &ch_tuple, &p_tuple)
                });
                if !found {
                    issues.push(LinkIssue {
                        link_group_id: link.link_group_id,
                        parent_category: link.parent_category.clone(),
                        child_category: link.child_category.clone(),
                        child_row: *ch,
                    });
                }
            }
        }
        issues
    }

    // ------------------------------------------------------------------
    // Plan internals
    // ------------------------------------------------------------------

    fn resolve_link(&self, link: &Arc<LinkValidator>) -> Option<ResolvedLink> {
        let parent_key = to_lower(&link.parent_category);
        let child_key = to_lower(&link.child_category);
        let parent = self.categories_by_key().get(&parent_key)?;
        let child = self.categories_by_key().get(&child_key)?;
        let parent_cols = link
            .parent_keys
            .iter()
            .map(|k| parent.column_ix(k))
            .collect::<Option<Vec<_>>>()?;
        let child_cols = link
            .child_keys
            .iter()
            .map(|k| child.column_ix(k))
            .collect::<Option<Vec<_>>>()?;
        Some(ResolvedLink {
            link: link.clone(),
            parent_key,
            parent_cols,
            child_key,
            child_cols,
        })
    }

    /// Is this child row joined, through a different link group, to a
    /// live parent row that the current plan is not rewriting?
    fn bound_elsewhere(
        &self,
        validator: &Validator,
        current: &ResolvedLink,
        child_row: RowId,
        plan: &Plan,
    ) -> bool {
        let Some(child_cat) = self.categories_by_key().get(&current.child_key) else {
            return false;
        };
        for link in validator.links_for_child(child_cat.name()) {
            if link.link_group_id == current.link.link_group_id {
                continue;
            }
            let Some(resolved) = self.resolve_link(link) else {
                continue;
            };
            if resolved.child_key != current.child_key {
                continue;
            }
            let ch_tuple = row_tuple(child_cat, child_row, &resolved.child_cols);
            if !tuple_complete(&ch_tuple) {
                continue;
            }
            let Some(parent_cat) = self.categories_by_key().get(&resolved.parent_key) else {
                continue;
            };
            let bound = parent_cat.row_order().iter().any(|pr| {
                if plan.touches_row(&resolved.parent_key, *pr) {
                    return false;
                }
                let p_tuple = row_tuple(parent_cat, *pr, &resolved.parent_cols);
                tuples_match(child_cat, &resolved.child_cols, &ch_tuple, &p_tuple)
            });
            if bound {
                return true;
            }
        }
        false
    }

    /// Like [`Self::bound_elsewhere`], with "being erased" instead of
    /// "being rewritten".
    fn survives_elsewhere(
        &self,
        validator: &Validator,
        current: &ResolvedLink,
        child_row: RowId,
        erases: &IndexMap<(String, RowId), ()>,
    ) -> bool {
        let Some(child_cat) = self.categories_by_key().get(&current.child_key) else {
            return false;
        };
        for link in validator.links_for_child(child_cat.name()) {
            if link.link_group_id == current.link.link_group_id {
                continue;
            }
            let Some(resolved) = self.resolve_link(link) else {
                continue;
            };
            if resolved.child_key != current.child_key {
                continue;
            }
            let ch_tuple = row_tuple(child_cat, child_row, &resolved.child_cols);
            if !tuple_complete(&ch_tuple) {
                continue;
            }
            let Some(parent_cat) = self.categories_by_key().get(&resolved.parent_key) else {
                continue;
            };
            let survives = parent_cat.row_order().iter().any(|pr| {
                if erases.contains_key(&(resolved.parent_key.clone(), *pr)) {
                    return false;
                }
                let p_tuple = row_tuple(parent_cat, *pr, &resolved.parent_cols);
                tuples_match(child_cat, &resolved.child_cols, &ch_tuple, &p_tuple)
            });
            if survives {
                return true;
            }
        }
        false
    }

    fn validate_plan(&self, plan: &Plan) -> Result<()> {
        // Item-level validation of every staged value.
        for ((cat_key, _row), writes) in &plan.writes {
            let Some(cat) = self.categories_by_key().get(cat_key) else {
                continue;
            };
            for (col, value) in writes {
                if let (Some(column), Some(text)) = (cat.columns().get(*col), value.as_ref()) {
                    if let Some(iv) = column.validator() {
                        iv.validate(text)?;
                    }
                }
            }
        }

        // Primary-key collision check over the simulated final state of
        // every touched category.
        let mut touched: Vec<&String> = plan.writes.keys().map(|(c, _)| c).collect();
        for clone in &plan.clones {
            touched.push(&clone.cat);
        }
        touched.sort();
        touched.dedup();

        for cat_key in touched {
            let Some(cat) = self.categories_by_key().get(cat_key) else {
                continue;
            };
            if !cat.validator().is_some_and(|v| v.has_key()) {
                continue;
            }
            let mut seen: FxHashSet<String> = FxHashSet::default();
            let mut check = |key: Option<String>| -> Result<()> {
                if let Some(key) = key {
                    if !seen.insert(key.clone()) {
                        return Err(Error::duplicate_key(cat.name(), key));
                    }
                }
                Ok(())
            };
            for id in cat.row_order() {
                let Some(row) = cat.row_data(*id) else { continue };
                let mut candidate = row.clone();
                if let Some(writes) = plan.writes.get(&(cat_key.clone(), *id)) {
                    for (col, value) in writes {
                        candidate.set(*col as u16, value.clone());
                    }
                }
                check(cat.key_string(&candidate))?;
            }
            for clone in plan.clones.iter().filter(|c| &c.cat == cat_key) {
                let Some(src) = cat.row_data(clone.src) else { continue };
                let mut candidate = src.clone();
                for (col, value) in &clone.overrides {
                    candidate.set(*col as u16, value.clone());
                }
                check(cat.key_string(&candidate))?;
            }
        }
        Ok(())
    }

    fn apply_plan(&mut self, plan: Plan) {
        for clone in &plan.clones {
            if let Some(cat) = self.categories_by_key_mut().get_mut(&clone.cat) {
                let Some(src) = cat.row_data(clone.src) else {
                    continue;
                };
                let mut row = src.clone();
                for (col, value) in &clone.overrides {
                    row.set(*col as u16, value.clone());
                }
                cat.insert_row_after(clone.src, row);
            }
        }
        for ((cat_key, row), writes) in plan.writes {
            if let Some(cat) = self.categories_by_key_mut().get_mut(&cat_key) {
                for (col, value) in writes {
                    cat.set_raw(row, col, value);
                }
            }
        }
    }
}

fn strip_tag(tag: &str) -> &str {
    if tag.starts_with('_') {
        crate::base::text::split_tag_name(tag).1
    } else {
        tag
    }
}

fn row_tuple(cat: &Category, row: RowId, cols: &[usize]) -> Vec<Option<SmolStr>> {
    let data: Option<&Row> = cat.row_data(row);
    cols.iter()
        .map(|c| {
            data.and_then(|r| r.get(*c as u16))
                .map(SmolStr::new)
        })
        .collect()
}

fn tuple_complete(tuple: &[Option<SmolStr>]) -> bool {
    tuple
        .iter()
        .all(|v| matches!(v.as_deref(), Some(t) if !t.is_empty() && t != "."))
}

/// Component-wise compare of a child tuple against a parent tuple, using
/// the child column's item validator when one is attached.
fn tuples_match(
    child_cat: &Category,
    child_cols: &[usize],
    child_tuple: &[Option<SmolStr>],
    parent_tuple: &[Option<SmolStr>],
) -> bool {
    if child_tuple.len() != parent_tuple.len() {
        return false;
    }
    child_tuple
        .iter()
        .zip(parent_tuple.iter())
        .zip(child_cols.iter())
        .all(|((c, p), col)| match (c, p) {
            (Some(c), Some(p)) => {
                match child_cat
                    .columns()
                    .get(*col)
                    .and_then(|column| column.validator())
                {
                    Some(iv) => iv.compare(c, p).is_eq(),
                    None => c == p,
                }
            }
            _ => false,
        })
}
