//! Dictionary loading: a semantic second pass over a parsed DDL2
//! dictionary that compiles a [`Validator`].
//!
//! The dictionary is itself a CIF file: type declarations sit in
//! `_item_type_list` rows, item and category definitions in `save_`
//! frames, and link groups in `_item_linked` plus the
//! `_pdbx_item_linked_group_list` tables.

use std::io::BufRead;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::base::text::{iequals, split_tag_name, to_lower};
use crate::error::{Error, Result};
use crate::parser::{ParseSink, ParsedValue, Parser, Scanner, ValueKind};
use crate::store::{DataBlock, RowId};
use crate::validate::{
    CategoryValidator, ItemValidator, LinkValidator, Primitive, TypeValidator, Validator,
};

/// Parse and compile a dictionary from a byte stream.
pub fn load_dictionary(reader: impl BufRead) -> Result<Validator> {
    let mut parser = Parser::new(Scanner::new(reader), DictionaryBuilder::default());
    parser.parse_file()?;
    compile(parser.into_sink())
}

// ----------------------------------------------------------------------
// Parse sink: block-level categories plus one mini-block per save frame
// ----------------------------------------------------------------------

struct Frame {
    name: String,
    block: DataBlock,
}

#[derive(Default)]
struct DictionaryBuilder {
    block_name: String,
    main: DataBlock,
    frames: Vec<Frame>,
    in_frame: bool,
    current_row: Option<RowId>,
}

impl DictionaryBuilder {
    fn target(&mut self) -> &mut DataBlock {
        if self.in_frame {
            // A frame was pushed before `in_frame` was set.
            match self.frames.last_mut() {
                Some(frame) => &mut frame.block,
                None => &mut self.main,
            }
        } else {
            &mut self.main
        }
    }
}

impl ParseSink for DictionaryBuilder {
    fn accepts_saveframes(&self) -> bool {
        true
    }

    fn produce_datablock(&mut self, name: &str) -> Result<()> {
        if self.block_name.is_empty() {
            self.block_name = name.to_string();
        }
        self.in_frame = false;
        self.current_row = None;
        Ok(())
    }

    fn produce_saveframe(&mut self, name: &str) -> Result<()> {
        self.frames.push(Frame {
            name: name.to_string(),
            block: DataBlock::new(name),
        });
        self.in_frame = true;
        self.current_row = None;
        Ok(())
    }

    fn end_saveframe(&mut self) -> Result<()> {
        self.in_frame = false;
        self.current_row = None;
        Ok(())
    }

    fn produce_category(&mut self, name: &str) -> Result<()> {
        self.target().emplace_category(name);
        self.current_row = None;
        Ok(())
    }

    fn produce_row(&mut self) -> Result<()> {
        self.current_row = None;
        Ok(())
    }

    fn produce_item(&mut self, category: &str, item: &str, value: ParsedValue) -> Result<()> {
        let existing = self.current_row;
        let cat = self
            .target()
            .get_category_mut(category)
            .ok_or_else(|| Error::dictionary(format!("item for unknown category {category}")))?;
        let row = match existing {
            Some(row) => row,
            None => cat.start_row(),
        };
        let col = cat.add_column(item)?;
        if value.kind != ValueKind::Unknown {
            cat.set_raw(row, col, Some(value.text));
        }
        self.current_row = Some(row);
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Compilation
// ----------------------------------------------------------------------

#[derive(Default)]
struct ItemData {
    category: String,
    item_name: String,
    mandatory: bool,
    type_code: Option<String>,
    enums: Vec<String>,
    aliases: Vec<String>,
}

#[derive(Default)]
struct CategoryData {
    mandatory: bool,
    keys: Vec<String>,
}

fn compile(builder: DictionaryBuilder) -> Result<Validator> {
    let DictionaryBuilder {
        block_name,
        main,
        frames,
        ..
    } = builder;
    if block_name.is_empty() {
        return Err(Error::dictionary("dictionary holds no data block"));
    }

    // Dictionary identity.
    let (name, version) = match main.get_category("dictionary").and_then(|c| c.rows().next()) {
        Some(row) => (
            row.get("title").unwrap_or(&block_name).to_string(),
            row.get("version").unwrap_or("").to_string(),
        ),
        None => (block_name.clone(), String::new()),
    };
    let mut validator = Validator::new(name, version);

    // Types, declared at block level or inside frames.
    for block in std::iter::once(&main).chain(frames.iter().map(|f| &f.block)) {
        let Some(types) = block.get_category("item_type_list") else {
            continue;
        };
        for row in types.rows() {
            let Some(code) = row.get("code") else { continue };
            let primitive = Primitive::parse(row.get("primitive_code").unwrap_or("char"));
            let construct = row.get("construct").unwrap_or("");
            let tv = match TypeValidator::new(code, primitive, construct) {
                Ok(tv) => tv,
                Err(err) => {
                    // An untranslatable pattern degrades to `.+` rather
                    // than losing the whole type.
                    warn!(code, "{err}");
                    TypeValidator::new(code, primitive, "")?
                }
            };
            validator.add_type(tv);
        }
    }

    // Item and category definitions from the save frames.
    let mut items: IndexMap<String, ItemData> = IndexMap::new();
    let mut categories: IndexMap<String, CategoryData> = IndexMap::new();
    let mut pairwise: Vec<(String, String)> = Vec::new(); // (parent tag, child tag)

    for frame in &frames {
        collect_items(frame, &mut items);
        collect_category(frame, &mut categories);
        if let Some(linked) = frame.block.get_category("item_linked") {
            for row in linked.rows() {
                if let (Some(parent), Some(child)) = (row.get("parent_name"), row.get("child_name"))
                {
                    pairwise.push((parent.to_string(), child.to_string()));
                }
            }
        }
    }
    if let Some(linked) = main.get_category("item_linked") {
        for row in linked.rows() {
            if let (Some(parent), Some(child)) = (row.get("parent_name"), row.get("child_name")) {
                pairwise.push((parent.to_string(), child.to_string()));
            }
        }
    }

    // Link groups: explicit pdbx tables first, then leftover pairwise
    // links coalesced per category pair.
    let mut links = collect_pdbx_groups(&main);
    let mut next_id = links
        .iter()
        .map(|l| l.link_group_id)
        .max()
        .unwrap_or(0)
        + 1;
    let covered: Vec<(String, String)> = links
        .iter()
        .map(|l| (to_lower(&l.parent_category), to_lower(&l.child_category)))
        .collect();
    let mut grouped: IndexMap<(String, String), (Vec<String>, Vec<String>)> = IndexMap::new();
    for (parent_tag, child_tag) in &pairwise {
        let (pcat, pitem) = split_tag_name(parent_tag);
        let (ccat, citem) = split_tag_name(child_tag);
        if covered.contains(&(to_lower(pcat), to_lower(ccat))) {
            continue;
        }
        let entry = grouped
            .entry((pcat.to_string(), ccat.to_string()))
            .or_default();
        if !entry.1.iter().any(|c| iequals(c, citem)) {
            entry.0.push(pitem.to_string());
            entry.1.push(citem.to_string());
        }
    }
    for ((pcat, ccat), (parent_keys, child_keys)) in grouped {
        links.push(PendingLink {
            link_group_id: next_id,
            parent_category: pcat,
            child_category: ccat,
            parent_keys,
            child_keys,
            label: None,
        });
        next_id += 1;
    }

    // Child keys without a type inherit the parent key's type.
    for link in &links {
        for (pk, ck) in link.parent_keys.iter().zip(link.child_keys.iter()) {
            let parent_tag = to_lower(&format!("_{}.{}", link.parent_category, pk));
            let child_tag = to_lower(&format!("_{}.{}", link.child_category, ck));
            let parent_type = items.get(&parent_tag).and_then(|i| i.type_code.clone());
            if let (Some(ptype), Some(child)) = (parent_type, items.get_mut(&child_tag)) {
                if child.type_code.is_none() {
                    child.type_code = Some(ptype);
                }
            }
        }
    }

    // Freeze: category validators with their items, keys, and aliases.
    let mut built: IndexMap<String, CategoryValidator> = IndexMap::new();
    for (key, data) in &categories {
        let mut cv = CategoryValidator::new(key.clone());
        cv.mandatory = data.mandatory;
        cv.keys = data.keys.clone();
        built.insert(key.clone(), cv);
    }
    for data in items.values() {
        let cat_key = to_lower(&data.category);
        let cv = built
            .entry(cat_key)
            .or_insert_with(|| CategoryValidator::new(to_lower(&data.category)));
        let mut item = ItemValidator::new(&data.category, &data.item_name);
        item.mandatory = data.mandatory;
        item.enums = data.enums.clone();
        if let Some(code) = &data.type_code {
            match validator.get_type(code) {
                Some(ty) => item.type_validator = Some(ty.clone()),
                None => warn!(code, tag = %item.tag(), "item references an unknown type"),
            }
        }
        let canonical_tag = item.tag();
        let item = Arc::new(item);
        cv.add_item(item.clone());
        for alias in &data.aliases {
            let (alias_cat, alias_item) = split_tag_name(alias);
            if iequals(alias_cat, &data.category) {
                cv.add_alias(alias_item, &item.item_name);
            }
            validator.add_alias(alias, &canonical_tag);
        }
    }
    for (_, cv) in built {
        validator.add_category(cv);
    }

    for pending in links {
        match LinkValidator::new(
            pending.link_group_id,
            pending.parent_category,
            pending.child_category,
            pending.parent_keys,
            pending.child_keys,
        ) {
            Ok(mut link) => {
                link.label = pending.label;
                validator.add_link(link);
            }
            Err(err) => warn!("{err}"),
        }
    }

    debug!(
        dictionary = validator.name(),
        version = validator.version(),
        categories = validator.categories().count(),
        links = validator.links().len(),
        "compiled dictionary"
    );
    Ok(validator)
}

fn collect_items(frame: &Frame, items: &mut IndexMap<String, ItemData>) {
    let Some(item_cat) = frame.block.get_category("item") else {
        return;
    };
    // The frame's subject: item frames are named after their tag.
    let subject = frame.name.starts_with('_').then(|| to_lower(&frame.name));

    for row in item_cat.rows() {
        let Some(name) = row.get("name") else { continue };
        let (cat, item_name) = split_tag_name(name);
        let (cat, item_name) = if cat.is_empty() {
            // Single-row frames may omit `_item.name`'s category part;
            // fall back to `_item.category_id`.
            match row.get("category_id") {
                Some(c) => (c, item_name),
                None => continue,
            }
        } else {
            (cat, item_name)
        };
        let entry = items.entry(to_lower(name)).or_default();
        entry.category = cat.to_string();
        entry.item_name = item_name.to_string();
        entry.mandatory = is_yes(row.get("mandatory_code"));
    }

    let Some(subject) = subject else { return };
    // Ensure the subject exists even when the `_item` loop named only
    // related tags.
    if !items.contains_key(&subject) {
        let (cat, item_name) = split_tag_name(&frame.name);
        if !cat.is_empty() {
            let entry = items.entry(subject.clone()).or_default();
            entry.category = cat.to_string();
            entry.item_name = item_name.to_string();
        }
    }

    if let Some(type_cat) = frame.block.get_category("item_type") {
        if let Some(code) = type_cat.rows().next().and_then(|r| r.get("code")) {
            if let Some(entry) = items.get_mut(&subject) {
                entry.type_code = Some(code.to_string());
            }
        }
    }
    if let Some(enum_cat) = frame.block.get_category("item_enumeration") {
        if let Some(entry) = items.get_mut(&subject) {
            for row in enum_cat.rows() {
                if let Some(value) = row.get("value") {
                    entry.enums.push(value.to_string());
                }
            }
        }
    }
    if let Some(alias_cat) = frame.block.get_category("item_aliases") {
        if let Some(entry) = items.get_mut(&subject) {
            for row in alias_cat.rows() {
                if let Some(alias) = row.get("alias_name") {
                    entry.aliases.push(alias.to_string());
                }
            }
        }
    }
}

fn collect_category(frame: &Frame, categories: &mut IndexMap<String, CategoryData>) {
    let Some(cat) = frame.block.get_category("category") else {
        return;
    };
    let Some(row) = cat.rows().next() else { return };
    let id = row.get("id").unwrap_or(&frame.name);
    let entry = categories.entry(to_lower(id)).or_default();
    entry.mandatory = is_yes(row.get("mandatory_code"));
    if let Some(keys) = frame.block.get_category("category_key") {
        for row in keys.rows() {
            if let Some(name) = row.get("name") {
                let (_, item) = split_tag_name(name);
                if !entry.keys.iter().any(|k| iequals(k, item)) {
                    entry.keys.push(item.to_string());
                }
            }
        }
    }
}

struct PendingLink {
    link_group_id: u32,
    parent_category: String,
    child_category: String,
    parent_keys: Vec<String>,
    child_keys: Vec<String>,
    label: Option<String>,
}

fn collect_pdbx_groups(main: &DataBlock) -> Vec<PendingLink> {
    let mut groups: IndexMap<(String, u32), PendingLink> = IndexMap::new();
    if let Some(list) = main.get_category("pdbx_item_linked_group_list") {
        for row in list.rows() {
            let (Some(child_cat), Some(group), Some(child_name), Some(parent_name)) = (
                row.get("child_category_id"),
                row.get_as::<u32>("link_group_id"),
                row.get("child_name"),
                row.get("parent_name"),
            ) else {
                continue;
            };
            let (pcat, pitem) = split_tag_name(parent_name);
            let parent_cat = match row.get("parent_category_id") {
                Some(p) => p.to_string(),
                None => pcat.to_string(),
            };
            let (_, citem) = split_tag_name(child_name);
            let entry = groups
                .entry((to_lower(child_cat), group))
                .or_insert_with(|| PendingLink {
                    link_group_id: group,
                    parent_category: parent_cat.clone(),
                    child_category: child_cat.to_string(),
                    parent_keys: Vec::new(),
                    child_keys: Vec::new(),
                    label: None,
                });
            entry.parent_keys.push(pitem.to_string());
            entry.child_keys.push(citem.to_string());
        }
    }
    if let Some(labels) = main.get_category("pdbx_item_linked_group") {
        for row in labels.rows() {
            let (Some(cat), Some(group)) = (
                row.get("category_id"),
                row.get_as::<u32>("link_group_id"),
            ) else {
                continue;
            };
            if let Some(entry) = groups.get_mut(&(to_lower(cat), group)) {
                entry.label = row.get("label").map(str::to_string);
            }
        }
    }
    groups.into_values().collect()
}

fn is_yes(code: Option<&str>) -> bool {
    matches!(code, Some(c) if iequals(c, "yes") || iequals(c, "y"))
}
