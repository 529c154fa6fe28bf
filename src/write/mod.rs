//! CIF serialization.
//!
//! Single-row categories emit aligned `_cat.item value` pairs; anything
//! larger becomes a `loop_`. Values pick the cheapest quoting that
//! survives a re-parse: unquoted, single-quoted, double-quoted, or a
//! semicolon text field.

use std::io::Write;

use crate::base::text::{contains_ignore_case, starts_with_ignore_case};
use crate::error::Result;
use crate::store::{Category, DataBlock, File};
use crate::validate::Validator;

enum Style {
    Unquoted,
    Single,
    Double,
    TextField,
}

/// Quoting selection for a non-null value.
fn pick_style(value: &str) -> Style {
    if value.contains('\n') {
        return Style::TextField;
    }
    if is_unquoted_safe(value) {
        return Style::Unquoted;
    }
    if !value.contains('\'') {
        return Style::Single;
    }
    if !value.contains('"') {
        return Style::Double;
    }
    Style::TextField
}

/// The CIF unquoted-string rule: printable ASCII with no whitespace, a
/// first character that cannot open another construct, and no reserved
/// word hiding inside (`data_`/`save_` prefixes, `loop_`/`stop_`/
/// `global_` anywhere).
fn is_unquoted_safe(value: &str) -> bool {
    if value.is_empty() || value == "." || value == "?" {
        return false;
    }
    if !value.bytes().all(|b| (0x21..=0x7e).contains(&b)) {
        return false;
    }
    if matches!(
        value.as_bytes()[0],
        b'_' | b'\'' | b'"' | b'#' | b'$' | b'[' | b']' | b';'
    ) {
        return false;
    }
    !(starts_with_ignore_case(value, "data_")
        || starts_with_ignore_case(value, "save_")
        || contains_ignore_case(value, "loop_")
        || contains_ignore_case(value, "stop_")
        || contains_ignore_case(value, "global_"))
}

/// Render a cell for output. Missing is `?`, inapplicable is `.`, the
/// empty string keeps its quotes so all three stay distinct.
fn render(cell: Option<&str>) -> (String, bool) {
    match cell {
        None => ("?".to_string(), false),
        Some(".") => (".".to_string(), false),
        Some("") => ("''".to_string(), false),
        Some(value) => match pick_style(value) {
            Style::Unquoted => (value.to_string(), false),
            Style::Single => (format!("'{value}'"), false),
            Style::Double => (format!("\"{value}\""), false),
            Style::TextField => (value.to_string(), true),
        },
    }
}

fn tag_of(category: &str, item: &str) -> String {
    if category.is_empty() {
        format!("_{item}")
    } else {
        format!("_{category}.{item}")
    }
}

pub(crate) fn write_file(file: &File, mut writer: impl Write, tag_order: &[&str]) -> Result<()> {
    let validator = file.validator().map(|v| v.as_ref());
    for block in file.blocks() {
        write_datablock(block, &mut writer, tag_order, validator)?;
    }
    Ok(())
}

fn write_datablock(
    block: &DataBlock,
    writer: &mut impl Write,
    tag_order: &[&str],
    validator: Option<&Validator>,
) -> Result<()> {
    writeln!(writer, "data_{}", block.name())?;
    writeln!(writer, "# ")?;

    let order = category_order(block, tag_order);

    // `audit_conform` is synthesized from the dictionary when a
    // validator is attached and the block does not carry one itself.
    let mut wrote_conform = block.get_category("audit_conform").is_some();

    for (ix, cat) in order.iter().enumerate() {
        if cat.is_empty() {
            continue;
        }
        write_category(cat, writer)?;
        writeln!(writer, "# ")?;
        if !wrote_conform && ix == 0 {
            if let Some(v) = validator {
                if !v.name().is_empty() {
                    write_audit_conform(v, writer)?;
                    wrote_conform = true;
                }
            }
        }
    }
    if !wrote_conform {
        if let Some(v) = validator {
            if !v.name().is_empty() {
                write_audit_conform(v, writer)?;
            }
        }
    }
    Ok(())
}

fn write_audit_conform(validator: &Validator, writer: &mut impl Write) -> Result<()> {
    writeln!(writer, "_audit_conform.dict_name    {}", validator.name())?;
    if !validator.version().is_empty() {
        writeln!(writer, "_audit_conform.dict_version {}", validator.version())?;
    }
    writeln!(writer, "# ")?;
    Ok(())
}

/// Emission order: the tag-order hint decides when given, otherwise
/// `entry` then `audit_conform` are hoisted ahead of block order.
fn category_order<'a>(block: &'a DataBlock, tag_order: &[&str]) -> Vec<&'a Category> {
    let mut order: Vec<&Category> = Vec::new();
    let mut push = |cat: Option<&'a Category>, order: &mut Vec<&'a Category>| {
        if let Some(cat) = cat {
            if !order
                .iter()
                .any(|c| c.name().eq_ignore_ascii_case(cat.name()))
            {
                order.push(cat);
            }
        }
    };
    if tag_order.is_empty() {
        push(block.get_category("entry"), &mut order);
        push(block.get_category("audit_conform"), &mut order);
    } else {
        for tag in tag_order {
            let (cat, _) = crate::base::text::split_tag_name(tag);
            push(block.get_category(cat), &mut order);
        }
    }
    for cat in block.categories() {
        push(Some(cat), &mut order);
    }
    order
}

fn write_category(cat: &Category, writer: &mut impl Write) -> Result<()> {
    if cat.len() == 1 {
        write_pairs(cat, writer)
    } else {
        write_loop(cat, writer)
    }
}

fn write_pairs(cat: &Category, writer: &mut impl Write) -> Result<()> {
    let tags: Vec<String> = cat
        .columns()
        .iter()
        .map(|c| tag_of(cat.name(), c.name()))
        .collect();
    let width = tags.iter().map(String::len).max().unwrap_or(0);
    let Some(row) = cat.rows().next() else {
        return Ok(());
    };
    for (column, tag) in cat.columns().iter().zip(tags.iter()) {
        let (text, is_text_field) = render(row.get(column.name()));
        if is_text_field {
            writeln!(writer, "{tag}")?;
            write_text_field(&text, writer)?;
        } else {
            writeln!(writer, "{tag:<width$} {text}")?;
        }
    }
    Ok(())
}

fn write_loop(cat: &Category, writer: &mut impl Write) -> Result<()> {
    writeln!(writer, "loop_")?;
    for column in cat.columns() {
        writeln!(writer, "{}", tag_of(cat.name(), column.name()))?;
    }
    for row in cat.rows() {
        let mut line = String::new();
        for column in cat.columns() {
            let (text, is_text_field) = render(row.get(column.name()));
            if is_text_field {
                if !line.is_empty() {
                    writeln!(writer, "{line}")?;
                    line.clear();
                }
                write_text_field(&text, writer)?;
            } else {
                if !line.is_empty() {
                    line.push(' ');
                }
                line.push_str(&text);
            }
        }
        if !line.is_empty() {
            writeln!(writer, "{line}")?;
        }
    }
    Ok(())
}

fn write_text_field(text: &str, writer: &mut impl Write) -> Result<()> {
    writeln!(writer, ";{}", prefixed(text))?;
    writeln!(writer, ";")?;
    Ok(())
}

/// A text field opens with `;` and a line feed; the scanner drops that
/// first line feed again on the way back in.
fn prefixed(text: &str) -> String {
    format!("\n{text}")
}
