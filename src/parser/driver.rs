//! Pull-style grammar driver.
//!
//! The driver consumes tokens from the scanner and turns the CIF grammar
//! into semantic events on a [`ParseSink`]: data blocks, save frames,
//! categories, rows, and items. Consumers decide what a row *is*: the
//! store builds its relational model from these events, and the
//! dictionary loader builds validators from the same stream.

use std::io::BufRead;

use indexmap::IndexMap;
use tracing::trace;

use crate::base::text::{iequals, split_tag_name};
use crate::error::{Error, Result};

use super::scanner::Scanner;
use super::token::{ParsedValue, Token};

/// Semantic events emitted by the driver, in document order.
///
/// `produce_category` fires when the current category changes (a `loop_`
/// header or a tag naming a different category); `produce_row` fires once
/// per row before that row's `produce_item` calls.
pub trait ParseSink {
    /// Whether `save_` frames are a nested scope (dictionaries) or a
    /// fatal error (data files).
    fn accepts_saveframes(&self) -> bool {
        false
    }

    fn produce_datablock(&mut self, name: &str) -> Result<()>;

    fn produce_saveframe(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn end_saveframe(&mut self) -> Result<()> {
        Ok(())
    }

    fn produce_category(&mut self, name: &str) -> Result<()>;

    fn produce_row(&mut self) -> Result<()>;

    fn produce_item(&mut self, category: &str, item: &str, value: ParsedValue) -> Result<()>;
}

pub struct Parser<R, S> {
    scanner: Scanner<R>,
    sink: S,
    lookahead: Option<Token>,
    /// Category of the currently open singleton row, if any.
    current_category: Option<String>,
}

impl<R: BufRead, S: ParseSink> Parser<R, S> {
    pub fn new(scanner: Scanner<R>, sink: S) -> Self {
        Self {
            scanner,
            sink,
            lookahead: None,
            current_category: None,
        }
    }

    /// Give the sink back after parsing.
    pub fn into_sink(self) -> S {
        self.sink
    }

    fn next_token(&mut self) -> Result<Token> {
        match self.lookahead.take() {
            Some(token) => Ok(token),
            None => self.scanner.next_token(),
        }
    }

    fn peek_token(&mut self) -> Result<&Token> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.scanner.next_token()?);
        }
        match &self.lookahead {
            Some(token) => Ok(token),
            None => Ok(&Token::Eof),
        }
    }

    fn line(&self) -> u32 {
        self.scanner.line()
    }

    /// Parse a whole file: any number of `global_` sections and data
    /// blocks until end of input.
    pub fn parse_file(&mut self) -> Result<()> {
        loop {
            match self.next_token()? {
                Token::Eof => return Ok(()),
                Token::Global => self.parse_global_body()?,
                Token::DataName(name) => {
                    trace!(block = %name, "datablock");
                    self.sink.produce_datablock(&name)?;
                    self.parse_datablock_body()?;
                }
                token => {
                    return Err(Error::parse(
                        self.line(),
                        format!("expected data_ but got {}", token.describe()),
                    ));
                }
            }
        }
    }

    /// Parse one data block after its `data_` header has been consumed
    /// and announced. Stops at the next `data_` header or end of input.
    pub fn parse_datablock_body(&mut self) -> Result<()> {
        self.current_category = None;
        loop {
            match self.peek_token()? {
                Token::Eof | Token::DataName(_) => return Ok(()),
                Token::Loop => self.parse_loop()?,
                Token::Tag(_) => self.parse_assignment()?,
                Token::SaveName(_) => self.parse_saveframe()?,
                token => {
                    let got = token.describe();
                    return Err(Error::parse(
                        self.line(),
                        format!("unexpected {got} in data block"),
                    ));
                }
            }
        }
    }

    /// Fast-scan to the block named `name` and parse just that block.
    /// Returns false when no such block exists in the remaining input.
    pub fn parse_single_datablock(&mut self, name: &str) -> Result<bool> {
        loop {
            match self.scanner.next_datablock_header()? {
                None => return Ok(false),
                Some((found, _)) if iequals(&found, name) => {
                    self.sink.produce_datablock(&found)?;
                    self.parse_datablock_body()?;
                    return Ok(true);
                }
                Some(_) => continue,
            }
        }
    }

    fn parse_loop(&mut self) -> Result<()> {
        let loop_line = self.line();
        self.next_token()?; // loop_

        let mut category = String::new();
        let mut items: Vec<String> = Vec::new();
        while let Token::Tag(_) = self.peek_token()? {
            let Token::Tag(tag) = self.next_token()? else {
                unreachable!("peeked a tag");
            };
            let (cat, item) = split_tag_name(&tag);
            if items.is_empty() {
                category = cat.to_string();
            } else if !iequals(cat, &category) {
                return Err(Error::parse(
                    self.line(),
                    format!("loop_ with heterogeneous categories: {category} and {cat}"),
                ));
            }
            items.push(item.to_string());
        }
        if items.is_empty() {
            return Err(Error::parse(loop_line, "loop_ without tags"));
        }

        self.sink.produce_category(&category)?;
        self.current_category = None;

        let mut count = 0usize;
        loop {
            match self.peek_token()? {
                Token::Value(_) => {
                    let Token::Value(value) = self.next_token()? else {
                        unreachable!("peeked a value");
                    };
                    if count % items.len() == 0 {
                        self.sink.produce_row()?;
                    }
                    self.sink
                        .produce_item(&category, &items[count % items.len()], value)?;
                    count += 1;
                }
                _ => break,
            }
        }
        if count == 0 {
            return Err(Error::parse(loop_line, "loop_ without values"));
        }
        if count % items.len() != 0 {
            return Err(Error::parse(
                self.line(),
                format!(
                    "loop_ value count {count} is not a multiple of its {} tags",
                    items.len()
                ),
            ));
        }
        Ok(())
    }

    fn parse_assignment(&mut self) -> Result<()> {
        let Token::Tag(tag) = self.next_token()? else {
            unreachable!("caller peeked a tag");
        };
        let value = match self.next_token()? {
            Token::Value(value) => value,
            token => {
                return Err(Error::parse(
                    self.line(),
                    format!("expected a value after {tag} but got {}", token.describe()),
                ));
            }
        };
        let (cat, item) = split_tag_name(&tag);
        let same = self
            .current_category
            .as_deref()
            .is_some_and(|current| iequals(current, cat));
        if !same {
            // A new singleton row opens for this category.
            self.sink.produce_category(cat)?;
            self.sink.produce_row()?;
            self.current_category = Some(cat.to_string());
        }
        self.sink.produce_item(cat, item, value)
    }

    fn parse_saveframe(&mut self) -> Result<()> {
        let Token::SaveName(name) = self.next_token()? else {
            unreachable!("caller peeked a save_");
        };
        if !self.sink.accepts_saveframes() {
            return Err(Error::parse(
                self.line(),
                "save_ frame not allowed in a data file",
            ));
        }
        if name.is_empty() {
            return Err(Error::parse(self.line(), "save_ terminator without a frame"));
        }
        self.sink.produce_saveframe(&name)?;
        self.current_category = None;

        loop {
            match self.peek_token()? {
                Token::SaveName(end) if end.is_empty() => {
                    self.next_token()?;
                    self.current_category = None;
                    return self.sink.end_saveframe();
                }
                Token::Loop => self.parse_loop()?,
                Token::Tag(_) => self.parse_assignment()?,
                Token::Eof => {
                    return Err(Error::parse(self.line(), "unterminated save_ frame"));
                }
                token => {
                    let got = token.describe();
                    return Err(Error::parse(
                        self.line(),
                        format!("unexpected {got} in save_ frame"),
                    ));
                }
            }
        }
    }

    /// `global_` carries tag/value pairs that apply to no block; they are
    /// consumed and discarded.
    fn parse_global_body(&mut self) -> Result<()> {
        while let Token::Tag(_) = self.peek_token()? {
            self.next_token()?;
            match self.next_token()? {
                Token::Value(_) => {}
                token => {
                    return Err(Error::parse(
                        self.line(),
                        format!("expected a value in global_ but got {}", token.describe()),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Walk the stream once and record every `data_` header with its raw byte
/// offset, preserving document order. Offsets feed seek-based loading of
/// single blocks from multi-schema dictionary bundles.
pub fn index_datablocks<R: BufRead>(reader: R) -> Result<IndexMap<String, u64>> {
    let mut scanner = Scanner::new(reader);
    let mut index = IndexMap::new();
    while let Some((name, offset)) = scanner.next_datablock_header()? {
        index.entry(name).or_insert(offset);
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[derive(Default)]
    struct EventLog {
        events: Vec<String>,
        dictionary: bool,
    }

    impl ParseSink for EventLog {
        fn accepts_saveframes(&self) -> bool {
            self.dictionary
        }

        fn produce_datablock(&mut self, name: &str) -> Result<()> {
            self.events.push(format!("block {name}"));
            Ok(())
        }

        fn produce_saveframe(&mut self, name: &str) -> Result<()> {
            self.events.push(format!("frame {name}"));
            Ok(())
        }

        fn end_saveframe(&mut self) -> Result<()> {
            self.events.push("end-frame".into());
            Ok(())
        }

        fn produce_category(&mut self, name: &str) -> Result<()> {
            self.events.push(format!("cat {name}"));
            Ok(())
        }

        fn produce_row(&mut self) -> Result<()> {
            self.events.push("row".into());
            Ok(())
        }

        fn produce_item(&mut self, category: &str, item: &str, value: ParsedValue) -> Result<()> {
            self.events
                .push(format!("item {category}.{item}={}", value.text));
            Ok(())
        }
    }

    fn drive(input: &str) -> Vec<String> {
        let mut parser = Parser::new(Scanner::new(Cursor::new(input)), EventLog::default());
        parser.parse_file().expect("parse");
        parser.into_sink().events
    }

    #[test]
    fn test_loop_events() {
        let events = drive("data_TEST\nloop_ _t.id _t.n\n1 aap 2 noot 3 mies\n");
        assert_eq!(
            events,
            vec![
                "block TEST",
                "cat t",
                "row",
                "item t.id=1",
                "item t.n=aap",
                "row",
                "item t.id=2",
                "item t.n=noot",
                "row",
                "item t.id=3",
                "item t.n=mies",
            ]
        );
    }

    #[test]
    fn test_singleton_rows_merge_per_category() {
        let events = drive("data_D\n_entry.id X\n_cell.length_a 1.0\n_cell.length_b 2.0\n");
        assert_eq!(
            events,
            vec![
                "block D",
                "cat entry",
                "row",
                "item entry.id=X",
                "cat cell",
                "row",
                "item cell.length_a=1.0",
                "item cell.length_b=2.0",
            ]
        );
    }

    #[test]
    fn test_heterogeneous_loop_is_fatal() {
        let input = "data_D\nloop_ _a.x _b.y\n1 2\n";
        let mut parser = Parser::new(Scanner::new(Cursor::new(input)), EventLog::default());
        let err = parser.parse_file().unwrap_err();
        assert!(err.to_string().contains("heterogeneous"));
    }

    #[test]
    fn test_ragged_loop_is_fatal() {
        let input = "data_D\nloop_ _a.x _a.y\n1 2 3\n";
        let mut parser = Parser::new(Scanner::new(Cursor::new(input)), EventLog::default());
        let err = parser.parse_file().unwrap_err();
        assert!(err.to_string().contains("multiple"));
    }

    #[test]
    fn test_saveframe_fatal_in_data_file() {
        let input = "data_D\nsave_frame\n_a.x 1\nsave_\n";
        let mut parser = Parser::new(Scanner::new(Cursor::new(input)), EventLog::default());
        let err = parser.parse_file().unwrap_err();
        assert!(err.to_string().contains("save_"));
    }

    #[test]
    fn test_saveframe_scoped_in_dictionary() {
        let input = "data_dict\nsave_one\n_item.name x\nsave_\nsave_two\n_item.name y\nsave_\n";
        let sink = EventLog {
            dictionary: true,
            ..Default::default()
        };
        let mut parser = Parser::new(Scanner::new(Cursor::new(input)), sink);
        parser.parse_file().expect("parse");
        let events = parser.into_sink().events;
        assert_eq!(
            events,
            vec![
                "block dict",
                "frame one",
                "cat item",
                "row",
                "item item.name=x",
                "end-frame",
                "frame two",
                "cat item",
                "row",
                "item item.name=y",
                "end-frame",
            ]
        );
    }

    #[test]
    fn test_global_is_discarded() {
        let events = drive("global_\n_x.y 1\ndata_D\n_a.b 2\n");
        assert_eq!(events, vec!["block D", "cat a", "row", "item a.b=2"]);
    }

    #[test]
    fn test_parse_single_datablock_skips_others() {
        let input = "data_one\n_a.x 1\ndata_two\n_a.x 2\ndata_three\n_a.x 3\n";
        let mut parser = Parser::new(Scanner::new(Cursor::new(input)), EventLog::default());
        assert!(parser.parse_single_datablock("TWO").expect("parse"));
        let events = parser.into_sink().events;
        assert_eq!(events, vec!["block two", "cat a", "row", "item a.x=2"]);
    }

    #[test]
    fn test_index_datablocks() {
        let input = "data_one\n_a.x 1\ndata_two\n_a.x 2\n";
        let index = index_datablocks(Cursor::new(input)).expect("index");
        assert_eq!(index.len(), 2);
        assert_eq!(&input[index["one"] as usize..][..8], "data_one");
        assert_eq!(&input[index["two"] as usize..][..8], "data_two");
    }
}
