//! Categories: ordered rows under an append-only column table.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::warn;

use crate::base::text::{iequals, split_tag_name};
use crate::error::{Error, Result};
use crate::query::condition::{Condition, Prepared};
use crate::query::value::FromCifValue;
use crate::validate::{CategoryValidator, ItemValidator};

use super::cell::{Row, RowId};

/// Separator and missing-cell marker inside normalized key strings.
/// Both are control bytes that cannot occur in parsed values.
const KEY_SEP: char = '\x1f';
const KEY_MISSING: char = '\x02';

#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    validator: Option<Arc<ItemValidator>>,
}

impl Column {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn validator(&self) -> Option<&Arc<ItemValidator>> {
        self.validator.as_ref()
    }
}

/// One relational table: named columns, insertion-ordered rows, an
/// optional category validator, and a transient primary-key index.
#[derive(Debug, Clone, Default)]
pub struct Category {
    name: String,
    columns: Vec<Column>,
    rows: Vec<Option<Row>>,
    order: Vec<RowId>,
    validator: Option<Arc<CategoryValidator>>,
    strict: bool,
    key_index: Option<FxHashMap<String, RowId>>,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn validator(&self) -> Option<&Arc<CategoryValidator>> {
        self.validator.as_ref()
    }

    /// Attach (or detach) the category validator and rebind the item
    /// validators of already-known columns.
    pub(crate) fn set_validator(
        &mut self,
        validator: Option<Arc<CategoryValidator>>,
        strict: bool,
    ) {
        self.validator = validator;
        self.strict = strict;
        self.key_index = None;
        for column in &mut self.columns {
            column.validator = self
                .validator
                .as_ref()
                .and_then(|v| v.get_item(&column.name))
                .cloned();
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Resolve a tag or bare item name to its column index.
    pub fn column_ix(&self, tag: &str) -> Option<usize> {
        let item = item_part(tag);
        self.columns.iter().position(|c| iequals(&c.name, item))
    }

    /// Find or append a column. Appending consults the category
    /// validator: an unknown tag is an error under strict validation and
    /// a warning otherwise.
    pub fn add_column(&mut self, tag: &str) -> Result<usize> {
        let item = item_part(tag);
        if let Some(ix) = self.columns.iter().position(|c| iequals(&c.name, item)) {
            return Ok(ix);
        }
        if self.columns.len() > u16::MAX as usize {
            return Err(Error::validation(&self.name, "too many columns"));
        }
        let item_validator = match &self.validator {
            Some(v) => {
                let found = v.get_item(item).cloned();
                if found.is_none() {
                    if self.strict {
                        return Err(Error::validation_item(
                            &self.name,
                            item,
                            "tag is not defined in the dictionary",
                        ));
                    }
                    warn!(category = %self.name, item, "tag is not defined in the dictionary");
                }
                found
            }
            None => None,
        };
        self.columns.push(Column {
            name: item.to_string(),
            validator: item_validator,
        });
        Ok(self.columns.len() - 1)
    }

    /// Is this column part of the primary key?
    pub fn is_key_column(&self, ix: usize) -> bool {
        match (&self.validator, self.columns.get(ix)) {
            (Some(v), Some(col)) => v.is_key(&col.name),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.order.iter().map(move |id| RowRef { cat: self, id: *id })
    }

    pub fn row(&self, id: RowId) -> Option<RowRef<'_>> {
        self.row_data(id).map(|_| RowRef { cat: self, id })
    }

    /// Row handles in insertion order.
    pub(crate) fn row_order(&self) -> &[RowId] {
        &self.order
    }

    pub(crate) fn row_data(&self, id: RowId) -> Option<&Row> {
        self.rows.get(id.index()).and_then(|slot| slot.as_ref())
    }

    fn row_data_mut(&mut self, id: RowId) -> Option<&mut Row> {
        self.rows.get_mut(id.index()).and_then(|slot| slot.as_mut())
    }

    /// Append an empty row (parser path; no validation).
    pub(crate) fn start_row(&mut self) -> RowId {
        let id = RowId(self.rows.len() as u32);
        self.rows.push(Some(Row::default()));
        self.order.push(id);
        self.key_index = None;
        id
    }

    /// Insert a fully formed row directly after an existing one; used by
    /// the cascade when splitting a child.
    pub(crate) fn insert_row_after(&mut self, after: RowId, row: Row) -> RowId {
        let id = RowId(self.rows.len() as u32);
        self.rows.push(Some(row));
        let pos = self
            .order
            .iter()
            .position(|r| *r == after)
            .map(|p| p + 1)
            .unwrap_or(self.order.len());
        self.order.insert(pos, id);
        self.key_index = None;
        id
    }

    /// Raw cell write without validation. `None` clears the cell.
    pub(crate) fn set_raw(&mut self, id: RowId, column: usize, text: Option<SmolStr>) {
        if let Some(row) = self.row_data_mut(id) {
            row.set(column as u16, text);
        }
        self.key_index = None;
    }

    /// Validated local write. This does not cascade into link groups;
    /// use [`crate::DataBlock::update_value`] for key columns of linked
    /// categories.
    pub fn set_value(&mut self, id: RowId, tag: &str, value: &str) -> Result<()> {
        let col = self.add_column(tag)?;
        if let Some(validator) = self.columns[col].validator() {
            validator.validate(value)?;
        }
        if self.is_key_column(col) {
            // The rewritten key must stay unique.
            if let Some(row) = self.row_data(id) {
                let mut candidate = row.clone();
                candidate.set(col as u16, encode_value(value));
                if let Some(key) = self.key_string(&candidate) {
                    if let Some(other) = self.lookup_key(&key) {
                        if other != id {
                            return Err(Error::duplicate_key(&self.name, display_key(&key)));
                        }
                    }
                }
            }
        }
        self.set_raw(id, col, encode_value(value));
        Ok(())
    }

    /// Append a row from `(tag, value)` pairs, validating every value
    /// and rejecting duplicate primary keys before the row becomes
    /// observable.
    pub fn emplace<'v>(
        &mut self,
        items: impl IntoIterator<Item = (&'v str, &'v str)>,
    ) -> Result<RowId> {
        let mut row = Row::default();
        for (tag, value) in items {
            let col = self.add_column(tag)?;
            if let Some(validator) = self.columns[col].validator() {
                validator.validate(value)?;
            }
            row.set(col as u16, encode_value(value));
        }
        if let Some(key) = self.key_string(&row) {
            if self.lookup_key(&key).is_some() {
                return Err(Error::duplicate_key(&self.name, display_key(&key)));
            }
        }
        let id = RowId(self.rows.len() as u32);
        self.rows.push(Some(row));
        self.order.push(id);
        self.key_index = None;
        Ok(id)
    }

    /// Remove a row without cascading into children; the block-level
    /// erase handles link groups.
    pub fn erase_row(&mut self, id: RowId) -> bool {
        let alive = self
            .rows
            .get_mut(id.index())
            .map(|slot| slot.take().is_some())
            .unwrap_or(false);
        if alive {
            self.order.retain(|r| *r != id);
            self.key_index = None;
        }
        alive
    }

    /// Normalized primary-key string of a row, `None` when the category
    /// has no key or the row has no key cell at all.
    pub(crate) fn key_string(&self, row: &Row) -> Option<String> {
        let validator = self.validator.as_ref()?;
        if !validator.has_key() {
            return None;
        }
        let mut out = String::new();
        let mut any = false;
        for key_item in &validator.keys {
            if !out.is_empty() {
                out.push(KEY_SEP);
            }
            let col = self.columns.iter().position(|c| iequals(&c.name, key_item));
            match col.and_then(|c| row.get(c as u16)) {
                Some(text) => {
                    any = true;
                    match validator.get_item(key_item) {
                        Some(item) => out.push_str(&item.normalize_key(text)),
                        None => out.push_str(text),
                    }
                }
                None => out.push(KEY_MISSING),
            }
        }
        any.then_some(out)
    }

    fn lookup_key(&mut self, key: &str) -> Option<RowId> {
        self.ensure_key_index();
        self.key_index.as_ref()?.get(key).copied()
    }

    fn ensure_key_index(&mut self) {
        if self.key_index.is_some() {
            return;
        }
        let mut index = FxHashMap::default();
        for id in &self.order {
            if let Some(row) = self.rows.get(id.index()).and_then(|s| s.as_ref()) {
                if let Some(key) = self.key_string(row) {
                    index.entry(key).or_insert(*id);
                }
            }
        }
        self.key_index = Some(index);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Lazy iterator over rows matching the condition. The condition is
    /// prepared against this category's column layout once, up front.
    pub fn find<'a>(&'a self, cond: &Condition) -> impl Iterator<Item = RowRef<'a>> + 'a {
        let prepared = Prepared::compile(cond, self);
        self.order
            .iter()
            .copied()
            .filter(move |id| {
                self.row_data(*id)
                    .is_some_and(|row| prepared.matches(self, row))
            })
            .map(move |id| RowRef { cat: self, id })
    }

    pub fn find_first(&self, cond: &Condition) -> Option<RowRef<'_>> {
        self.find(cond).next()
    }

    /// Exactly one row must match.
    pub fn find_one(&self, cond: &Condition) -> Result<RowRef<'_>> {
        let mut it = self.find(cond);
        let first = it.next().ok_or_else(|| {
            Error::validation(&self.name, "no row matches the condition")
        })?;
        if it.next().is_some() {
            return Err(Error::validation(
                &self.name,
                "more than one row matches the condition",
            ));
        }
        Ok(first)
    }

    pub fn exists(&self, cond: &Condition) -> bool {
        self.find(cond).next().is_some()
    }

    pub fn count(&self, cond: &Condition) -> usize {
        self.find(cond).count()
    }

    /// Project one column of the matching rows into a caller type.
    pub fn find_values<'a, T: FromCifValue + 'a>(
        &'a self,
        cond: &Condition,
        tag: &str,
    ) -> impl Iterator<Item = T> + 'a {
        let tag = item_part(tag).to_string();
        self.find(cond)
            .filter_map(move |row| row.get_as::<T>(&tag))
    }

    // ------------------------------------------------------------------
    // Structural equality
    // ------------------------------------------------------------------

    /// Data-identity compare: names case-insensitive, values type-aware
    /// where an item validator is attached. Rows match by primary key
    /// when both categories have one, positionally otherwise.
    pub fn same_data(&self, other: &Category) -> bool {
        if !iequals(&self.name, &other.name) || self.len() != other.len() {
            return false;
        }
        let keyed = self
            .validator
            .as_ref()
            .is_some_and(|v| v.has_key())
            && other.validator.as_ref().is_some_and(|v| v.has_key());
        if keyed {
            let mut used = vec![false; other.order.len()];
            'mine: for id in &self.order {
                let Some(my_row) = self.row_data(*id) else {
                    return false;
                };
                let my_key = self.key_string(my_row);
                for (ix, other_id) in other.order.iter().enumerate() {
                    if used[ix] {
                        continue;
                    }
                    let Some(other_row) = other.row_data(*other_id) else {
                        continue;
                    };
                    if my_key == other.key_string(other_row)
                        && self.rows_equal(my_row, other, other_row)
                    {
                        used[ix] = true;
                        continue 'mine;
                    }
                }
                return false;
            }
            true
        } else {
            self.order
                .iter()
                .zip(other.order.iter())
                .all(|(a, b)| match (self.row_data(*a), other.row_data(*b)) {
                    (Some(ra), Some(rb)) => self.rows_equal(ra, other, rb),
                    _ => false,
                })
        }
    }

    fn rows_equal(&self, my_row: &Row, other: &Category, other_row: &Row) -> bool {
        // Walk the union of column names of both categories.
        let mut names: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        for col in &other.columns {
            if !names.iter().any(|n| iequals(n, &col.name)) {
                names.push(&col.name);
            }
        }
        for name in names {
            let a = self
                .column_ix(name)
                .and_then(|c| my_row.get(c as u16));
            let b = other
                .column_ix(name)
                .and_then(|c| other_row.get(c as u16));
            let equal = match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => {
                    let validator = self
                        .column_ix(name)
                        .and_then(|c| self.columns[c].validator())
                        .or_else(|| {
                            other
                                .column_ix(name)
                                .and_then(|c| other.columns[c].validator())
                        });
                    match validator {
                        Some(v) => v.compare(a, b).is_eq(),
                        None => a == b,
                    }
                }
                _ => false,
            };
            if !equal {
                return false;
            }
        }
        true
    }
}

/// Stored encoding of an incoming value: `?` clears the cell, everything
/// else (including `.` and the empty string) is stored verbatim.
pub(crate) fn encode_value(value: &str) -> Option<SmolStr> {
    if value == "?" {
        None
    } else {
        Some(SmolStr::new(value))
    }
}

fn display_key(key: &str) -> String {
    key.replace(KEY_SEP, ",").replace(KEY_MISSING, "?")
}

fn item_part(tag: &str) -> &str {
    if tag.starts_with('_') {
        split_tag_name(tag).1
    } else {
        tag
    }
}

/// A borrowed view of one row.
#[derive(Clone, Copy)]
pub struct RowRef<'a> {
    pub(crate) cat: &'a Category,
    pub(crate) id: RowId,
}

impl<'a> RowRef<'a> {
    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn category_name(&self) -> &'a str {
        self.cat.name()
    }

    /// Raw cell text; `None` when the field is unknown. The inapplicable
    /// value comes back as `"."` and the empty string as `""`.
    pub fn get(&self, tag: &str) -> Option<&'a str> {
        let col = self.cat.column_ix(tag)?;
        self.cat.row_data(self.id)?.get(col as u16)
    }

    /// Typed accessor; unknown, inapplicable, and empty all yield `None`.
    pub fn get_as<T: FromCifValue>(&self, tag: &str) -> Option<T> {
        match self.get(tag) {
            None | Some("") | Some(".") => None,
            Some(text) => T::from_cif(text),
        }
    }

    /// Unknown, inapplicable, or empty.
    pub fn is_null(&self, tag: &str) -> bool {
        matches!(self.get(tag), None | Some("") | Some("."))
    }
}

impl std::fmt::Debug for RowRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        if let Some(row) = self.cat.row_data(self.id) {
            for cell in &row.cells {
                if let Some(col) = self.cat.columns.get(cell.column as usize) {
                    map.entry(&col.name, &cell.text.as_str());
                }
            }
        }
        map.finish()
    }
}
