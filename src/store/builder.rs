//! The parse sink that fills a [`File`] from driver events.

use crate::error::{Error, Result};
use crate::parser::{ParseSink, ParsedValue, ValueKind};

use super::cell::RowId;
use super::file::File;

#[derive(Default)]
pub(crate) struct FileBuilder {
    file: File,
    current_block: Option<String>,
    current_category: Option<String>,
    current_row: Option<RowId>,
}

impl FileBuilder {
    pub fn into_file(self) -> File {
        self.file
    }

    fn block_name(&self) -> Result<&str> {
        self.current_block
            .as_deref()
            .ok_or_else(|| Error::validation("", "item outside of a data block"))
    }
}

impl ParseSink for FileBuilder {
    fn produce_datablock(&mut self, name: &str) -> Result<()> {
        if self.file.get_block(name).is_some() {
            return Err(Error::validation(
                name,
                "duplicate data block name",
            ));
        }
        self.file.emplace_block(name);
        self.current_block = Some(name.to_string());
        self.current_category = None;
        self.current_row = None;
        Ok(())
    }

    fn produce_category(&mut self, name: &str) -> Result<()> {
        let block_name = self.block_name()?.to_string();
        if let Some(block) = self.file.get_block_mut(&block_name) {
            block.emplace_category(name);
        }
        self.current_category = Some(name.to_string());
        self.current_row = None;
        Ok(())
    }

    fn produce_row(&mut self) -> Result<()> {
        let block_name = self.block_name()?.to_string();
        let cat_name = self
            .current_category
            .clone()
            .ok_or_else(|| Error::validation("", "row outside of a category"))?;
        let row = self
            .file
            .get_block_mut(&block_name)
            .and_then(|b| b.get_category_mut(&cat_name))
            .map(|c| c.start_row())
            .ok_or_else(|| Error::validation(&cat_name, "row for an unknown category"))?;
        self.current_row = Some(row);
        Ok(())
    }

    fn produce_item(&mut self, category: &str, item: &str, value: ParsedValue) -> Result<()> {
        let block_name = self.block_name()?.to_string();
        let row = self
            .current_row
            .ok_or_else(|| Error::validation(category, "item outside of a row"))?;
        let cat = self
            .file
            .get_block_mut(&block_name)
            .and_then(|b| b.get_category_mut(category))
            .ok_or_else(|| Error::validation(category, "item for an unknown category"))?;
        let col = cat.add_column(item)?;
        // The unknown value `?` stores no cell at all.
        if value.kind != ValueKind::Unknown {
            cat.set_raw(row, col, Some(value.text));
        }
        Ok(())
    }
}
