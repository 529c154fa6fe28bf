//! The file container: an ordered set of data blocks with an attached
//! validator and the load/save entry points.

use std::io::{BufRead, Write};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::base::text::to_lower;
use crate::error::{Error, Result};
use crate::parser::{Parser, Scanner};
use crate::resource::ResourceProvider;
use crate::validate::{Validator, ValidatorFactory};

use super::builder::FileBuilder;
use super::datablock::DataBlock;

/// An in-memory CIF file.
#[derive(Debug, Clone, Default)]
pub struct File {
    /// Keyed by lowercased block name; blocks keep the original
    /// spelling.
    blocks: IndexMap<String, DataBlock>,
    validator: Option<Arc<Validator>>,
}

impl File {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a whole stream into a new file.
    pub fn load(reader: impl BufRead) -> Result<File> {
        let mut parser = Parser::new(Scanner::new(reader), FileBuilder::default());
        parser.parse_file()?;
        Ok(parser.into_sink().into_file())
    }

    /// Fast-scan for one named block and parse only that block. Errors
    /// when the stream holds no block of that name.
    pub fn load_single(reader: impl BufRead, name: &str) -> Result<File> {
        let mut parser = Parser::new(Scanner::new(reader), FileBuilder::default());
        if !parser.parse_single_datablock(name)? {
            return Err(Error::validation(
                name,
                "data block not found in the stream",
            ));
        }
        Ok(parser.into_sink().into_file())
    }

    /// Serialize all blocks, hoisting `entry` and `audit_conform`.
    pub fn save(&self, writer: impl Write) -> Result<()> {
        crate::write::write_file(self, writer, &[])
    }

    /// Serialize with a tag-order hint: categories are emitted in the
    /// order their tags first appear in the hint.
    pub fn save_with_tag_order(&self, writer: impl Write, tag_order: &[&str]) -> Result<()> {
        crate::write::write_file(self, writer, tag_order)
    }

    pub fn validator(&self) -> Option<&Arc<Validator>> {
        self.validator.as_ref()
    }

    /// Attach a validator; cascades to every block and category.
    pub fn set_validator(&mut self, validator: Option<Arc<Validator>>) {
        self.validator = validator;
        for block in self.blocks.values_mut() {
            block.set_validator(self.validator.clone());
        }
    }

    /// Fetch a dictionary through the shared factory and attach it.
    pub fn load_dictionary(&mut self, name: &str, provider: &dyn ResourceProvider) -> Result<()> {
        let validator = ValidatorFactory::global().get(name, provider)?;
        self.set_validator(Some(validator));
        Ok(())
    }

    /// Find or create a block; the new block inherits the file's
    /// validator.
    pub fn emplace_block(&mut self, name: &str) -> &mut DataBlock {
        let key = to_lower(name);
        let validator = self.validator.clone();
        self.blocks.entry(key).or_insert_with(|| {
            let mut block = DataBlock::new(name);
            block.set_validator(validator);
            block
        })
    }

    pub fn get_block(&self, name: &str) -> Option<&DataBlock> {
        self.blocks.get(&to_lower(name))
    }

    pub fn get_block_mut(&mut self, name: &str) -> Option<&mut DataBlock> {
        self.blocks.get_mut(&to_lower(name))
    }

    /// The first block, the common case for single-block files.
    pub fn first_block(&self) -> Option<&DataBlock> {
        self.blocks.values().next()
    }

    pub fn first_block_mut(&mut self) -> Option<&mut DataBlock> {
        self.blocks.values_mut().next()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &DataBlock> {
        self.blocks.values()
    }

    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut DataBlock> {
        self.blocks.values_mut()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Validate every block against the attached validator.
    pub fn validate(&self) -> Result<()> {
        for block in self.blocks.values() {
            block.validate()?;
        }
        Ok(())
    }

    /// Data-identity compare over all blocks, order-insensitive by
    /// block name.
    pub fn same_data(&self, other: &File) -> bool {
        self.blocks.len() == other.blocks.len()
            && self.blocks.values().all(|block| {
                other
                    .get_block(block.name())
                    .is_some_and(|o| block.same_data(o))
            })
    }
}
