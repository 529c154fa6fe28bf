//! Byte-level CIF scanner.
//!
//! A deterministic state machine over a byte stream with a single-byte
//! pushback buffer. CR, LF, and CR-LF all normalize to one LF and advance
//! the line counter. The scanner is begin-of-line aware: a `;` in column
//! one opens a text field that runs until the next line starting with `;`.
//! Quoted strings close only at a matching quote followed by whitespace.
//!
//! Unquoted lexemes are classified by a restart ladder: the lexeme is
//! first read under the float hypothesis, and on a violating byte the
//! accumulated characters are re-scanned one hypothesis down (int, then
//! generic string). Completed value lexemes are then promoted to the
//! reserved tokens `data_*`, `save_*`, `loop_`, `global_`, `stop_`, `?`,
//! and `.` by case-insensitive comparison.

use std::io::BufRead;

use crate::base::number::{is_float, is_int};
use crate::base::text::{iequals, starts_with_ignore_case};
use crate::error::{Error, Result};

use super::token::{ParsedValue, Token, ValueKind};

/// Printable in CIF terms: tab, visible ASCII, or a byte from a multi-byte
/// UTF-8 sequence. Control characters are not.
#[inline]
fn is_printable(b: u8) -> bool {
    b == b'\t' || (0x20..0x7f).contains(&b) || b >= 0x80
}

#[inline]
fn is_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

pub struct Scanner<R> {
    reader: R,
    pushback: Option<u8>,
    /// Raw bytes consumed from the reader.
    raw_pos: u64,
    /// Raw offset of the byte most recently returned by `bump`.
    byte_offset: u64,
    line: u32,
    /// True when the next byte starts a line.
    bol: bool,
    /// True when the byte most recently returned by `bump` started a line.
    at_bol: bool,
    strict: bool,
}

impl<R: BufRead> Scanner<R> {
    pub fn new(reader: R) -> Self {
        Self::with_strict(reader, false)
    }

    /// In strict mode non-printable bytes are rejected inside comments as
    /// well as inside strings and text fields.
    pub fn with_strict(reader: R, strict: bool) -> Self {
        Self {
            reader,
            pushback: None,
            raw_pos: 0,
            byte_offset: 0,
            line: 1,
            bol: true,
            at_bol: true,
            strict,
        }
    }

    /// Line number of the byte most recently consumed (1-based).
    pub fn line(&self) -> u32 {
        self.line
    }

    fn read_raw(&mut self) -> Result<Option<u8>> {
        if let Some(b) = self.pushback.take() {
            self.byte_offset = self.raw_pos - 1;
            return Ok(Some(b));
        }
        let mut buf = [0u8; 1];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.byte_offset = self.raw_pos;
                    self.raw_pos += 1;
                    return Ok(Some(buf[0]));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Next byte with line-ending normalization and line accounting.
    fn bump(&mut self) -> Result<Option<u8>> {
        let Some(b) = self.read_raw()? else {
            return Ok(None);
        };
        let start = self.byte_offset;
        let b = if b == b'\r' {
            if let Some(next) = self.read_raw()? {
                if next != b'\n' {
                    self.pushback = Some(next);
                }
            }
            self.byte_offset = start;
            b'\n'
        } else {
            b
        };
        self.at_bol = self.bol;
        if b == b'\n' {
            self.line += 1;
            self.bol = true;
        } else {
            self.bol = false;
        }
        Ok(Some(b))
    }

    /// Look at the next raw byte without consuming it.
    fn peek(&mut self) -> Result<Option<u8>> {
        if self.pushback.is_none() {
            let mut buf = [0u8; 1];
            loop {
                match self.reader.read(&mut buf) {
                    Ok(0) => return Ok(None),
                    Ok(_) => {
                        self.raw_pos += 1;
                        self.pushback = Some(buf[0]);
                        break;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(self.pushback)
    }

    /// Skip whitespace and comments; return the first significant byte.
    /// `self.at_bol` afterwards tells whether that byte started its line.
    fn next_significant(&mut self) -> Result<Option<u8>> {
        loop {
            let Some(b) = self.bump()? else {
                return Ok(None);
            };
            match b {
                b' ' | b'\t' | b'\n' => continue,
                b'#' => loop {
                    match self.bump()? {
                        None => return Ok(None),
                        Some(b'\n') => break,
                        Some(c) if self.strict && !is_printable(c) => {
                            return Err(Error::parse(
                                self.line,
                                format!("invalid character {c:#04x} in comment"),
                            ));
                        }
                        Some(_) => {}
                    }
                },
                _ => return Ok(Some(b)),
            }
        }
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> Result<Token> {
        let Some(b) = self.next_significant()? else {
            return Ok(Token::Eof);
        };
        if b == b';' && self.at_bol {
            return self.scan_text_field();
        }
        match b {
            b'\'' | b'"' => self.scan_quoted(b),
            b'_' => self.scan_tag(),
            _ => self.scan_bare(b),
        }
    }

    fn scan_text_field(&mut self) -> Result<Token> {
        let start_line = self.line;
        let mut text: Vec<u8> = Vec::new();
        loop {
            match self.bump()? {
                None => {
                    return Err(Error::parse(start_line, "unterminated text field"));
                }
                Some(b';') if self.at_bol => break,
                Some(b) if b != b'\n' && !is_printable(b) => {
                    return Err(Error::parse(
                        self.line,
                        format!("invalid character {b:#04x} in text field"),
                    ));
                }
                Some(b) => text.push(b),
            }
        }
        // Drop the newline that precedes the closing `;`, and at most one
        // newline directly after the opening `;`, so that
        // `;\nfoo\n;` yields exactly `foo`.
        if text.last() == Some(&b'\n') {
            text.pop();
        }
        if text.first() == Some(&b'\n') {
            text.remove(0);
        }
        let text = String::from_utf8_lossy(&text).into_owned();
        Ok(Token::Value(ParsedValue::new(text, ValueKind::TextField)))
    }

    fn scan_quoted(&mut self, quote: u8) -> Result<Token> {
        let start_line = self.line;
        let mut text: Vec<u8> = Vec::new();
        loop {
            match self.bump()? {
                None | Some(b'\n') => {
                    return Err(Error::parse(start_line, "unterminated quoted string"));
                }
                Some(b) if b == quote => {
                    // A quote only closes when followed by whitespace.
                    match self.peek()? {
                        None => break,
                        Some(nb) if is_ws(nb) => break,
                        Some(_) => text.push(b),
                    }
                }
                Some(b) if !is_printable(b) => {
                    return Err(Error::parse(
                        self.line,
                        format!("invalid character {b:#04x} in quoted string"),
                    ));
                }
                Some(b) => text.push(b),
            }
        }
        let text = String::from_utf8_lossy(&text).into_owned();
        Ok(Token::Value(ParsedValue::new(text, ValueKind::String)))
    }

    fn scan_tag(&mut self) -> Result<Token> {
        let lexeme = self.take_lexeme(b'_')?;
        if lexeme.len() == 1 {
            return Err(Error::parse(self.line, "empty tag"));
        }
        Ok(Token::Tag(lexeme))
    }

    fn scan_bare(&mut self, first: u8) -> Result<Token> {
        let lexeme = self.take_lexeme(first)?;

        // Reserved-word promotion, case-insensitive.
        if iequals(&lexeme, "loop_") {
            return Ok(Token::Loop);
        }
        if iequals(&lexeme, "global_") {
            return Ok(Token::Global);
        }
        if iequals(&lexeme, "stop_") {
            return Ok(Token::Stop);
        }
        if starts_with_ignore_case(&lexeme, "data_") {
            let name = &lexeme[5..];
            if name.is_empty() {
                return Err(Error::parse(self.line, "data_ without a block name"));
            }
            return Ok(Token::DataName(name.to_string()));
        }
        if starts_with_ignore_case(&lexeme, "save_") {
            return Ok(Token::SaveName(lexeme[5..].to_string()));
        }
        if lexeme == "?" {
            return Ok(Token::Value(ParsedValue::unknown()));
        }
        if lexeme == "." {
            return Ok(Token::Value(ParsedValue::inapplicable()));
        }

        Ok(Token::Value(classify(&lexeme)))
    }

    /// Accumulate a whitespace-delimited lexeme starting with `first`.
    fn take_lexeme(&mut self, first: u8) -> Result<String> {
        let mut text = vec![first];
        loop {
            match self.peek()? {
                None => break,
                Some(b) if is_ws(b) => break,
                Some(_) => {
                    // Cannot be None: peek just saw a byte.
                    let Some(b) = self.bump()? else { break };
                    if !is_printable(b) {
                        return Err(Error::parse(
                            self.line,
                            format!("invalid character {b:#04x} in value"),
                        ));
                    }
                    text.push(b);
                }
            }
        }
        Ok(String::from_utf8_lossy(&text).into_owned())
    }

    /// Raw fast scan to the next `data_` header, honoring strings,
    /// comments, and text fields but skipping value classification.
    ///
    /// Returns the block name and the raw byte offset of the header's
    /// first byte, or `None` at end of input.
    pub fn next_datablock_header(&mut self) -> Result<Option<(String, u64)>> {
        loop {
            let Some(b) = self.next_significant()? else {
                return Ok(None);
            };
            let start = self.byte_offset;
            if b == b';' && self.at_bol {
                self.skim_text_field()?;
                continue;
            }
            match b {
                b'\'' | b'"' => {
                    // Reuse the full string scan; content is discarded.
                    self.scan_quoted(b)?;
                }
                _ => {
                    let lexeme = self.take_lexeme(b)?;
                    if starts_with_ignore_case(&lexeme, "data_") && lexeme.len() > 5 {
                        return Ok(Some((lexeme[5..].to_string(), start)));
                    }
                }
            }
        }
    }

    fn skim_text_field(&mut self) -> Result<()> {
        let start_line = self.line;
        loop {
            match self.bump()? {
                None => return Err(Error::parse(start_line, "unterminated text field")),
                Some(b';') if self.at_bol => return Ok(()),
                Some(_) => {}
            }
        }
    }
}

/// The restart ladder over a completed lexeme: float, then int, then
/// generic string. Rewinding is a re-scan of the accumulated bytes under
/// the next hypothesis; the float hypothesis requires a decimal point or
/// exponent so that pure digit runs fall through to int.
fn classify(lexeme: &str) -> ParsedValue {
    if is_float(lexeme) {
        ParsedValue::new(lexeme, ValueKind::Float)
    } else if is_int(lexeme) {
        ParsedValue::new(lexeme, ValueKind::Int)
    } else {
        ParsedValue::new(lexeme, ValueKind::String)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn scan_all(input: &str) -> Vec<Token> {
        let mut scanner = Scanner::new(Cursor::new(input));
        let mut tokens = Vec::new();
        loop {
            let token = scanner.next_token().expect("scan");
            if token == Token::Eof {
                break;
            }
            tokens.push(token);
        }
        tokens
    }

    fn value(text: &str, kind: ValueKind) -> Token {
        Token::Value(ParsedValue::new(text, kind))
    }

    #[test]
    fn test_basic_tokens() {
        let tokens = scan_all("data_TEST loop_ _t.id _t.n 1 aap");
        assert_eq!(
            tokens,
            vec![
                Token::DataName("TEST".into()),
                Token::Loop,
                Token::Tag("_t.id".into()),
                Token::Tag("_t.n".into()),
                value("1", ValueKind::Int),
                value("aap", ValueKind::String),
            ]
        );
    }

    #[test]
    fn test_number_classification() {
        let tokens = scan_all("1.0 -.2e11 1.3e-10 3.000000 42 12a");
        assert_eq!(
            tokens,
            vec![
                value("1.0", ValueKind::Float),
                value("-.2e11", ValueKind::Float),
                value("1.3e-10", ValueKind::Float),
                value("3.000000", ValueKind::Float),
                value("42", ValueKind::Int),
                value("12a", ValueKind::String),
            ]
        );
    }

    #[test]
    fn test_null_values() {
        let tokens = scan_all("? .");
        assert_eq!(
            tokens,
            vec![
                Token::Value(ParsedValue::unknown()),
                Token::Value(ParsedValue::inapplicable()),
            ]
        );
    }

    #[test]
    fn test_reserved_case_insensitive() {
        let tokens = scan_all("DATA_x LOOP_ Save_frame save_ GLOBAL_ Stop_");
        assert_eq!(
            tokens,
            vec![
                Token::DataName("x".into()),
                Token::Loop,
                Token::SaveName("frame".into()),
                Token::SaveName("".into()),
                Token::Global,
                Token::Stop,
            ]
        );
    }

    #[test]
    fn test_quoted_strings() {
        let tokens = scan_all("'aap noot' \"mies\" 'it's fine'");
        assert_eq!(
            tokens,
            vec![
                value("aap noot", ValueKind::String),
                value("mies", ValueKind::String),
                value("it's fine", ValueKind::String),
            ]
        );
    }

    #[test]
    fn test_quoted_empty_string() {
        let tokens = scan_all("'' \"\"");
        assert_eq!(
            tokens,
            vec![value("", ValueKind::String), value("", ValueKind::String)]
        );
    }

    #[test]
    fn test_unterminated_string_is_fatal() {
        let mut scanner = Scanner::new(Cursor::new("'no end\n"));
        let err = scanner.next_token().unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }));
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = scan_all("# leading\n1 # trailing\n2");
        assert_eq!(
            tokens,
            vec![value("1", ValueKind::Int), value("2", ValueKind::Int)]
        );
    }

    #[test]
    fn test_hash_inside_value_is_not_a_comment() {
        let tokens = scan_all("1.0#c");
        assert_eq!(tokens, vec![value("1.0#c", ValueKind::String)]);
    }

    #[test]
    fn test_text_field() {
        let tokens = scan_all(";\nfirst line\n  second  line\n;\n");
        assert_eq!(
            tokens,
            vec![value("first line\n  second  line", ValueKind::TextField)]
        );
    }

    #[test]
    fn test_text_field_inline_start() {
        let tokens = scan_all(";inline\ncont\n;\n");
        assert_eq!(tokens, vec![value("inline\ncont", ValueKind::TextField)]);
    }

    #[test]
    fn test_semicolon_not_at_bol_is_plain_text() {
        let tokens = scan_all("x ;y\n");
        assert_eq!(
            tokens,
            vec![
                value("x", ValueKind::String),
                value(";y", ValueKind::String)
            ]
        );
    }

    #[test]
    fn test_crlf_normalization() {
        let mut scanner = Scanner::new(Cursor::new("1\r\n2\r3\n"));
        assert_eq!(scanner.next_token().unwrap(), value("1", ValueKind::Int));
        assert_eq!(scanner.next_token().unwrap(), value("2", ValueKind::Int));
        assert_eq!(scanner.next_token().unwrap(), value("3", ValueKind::Int));
        assert_eq!(scanner.next_token().unwrap(), Token::Eof);
        // 1\n 2\n 3\n: three line feeds seen.
        assert_eq!(scanner.line(), 4);
    }

    #[test]
    fn test_datablock_header_scan() {
        let input = "# intro\ndata_one\n_a.b ';not a field'\ndata_two\n_c.d 1\n";
        let mut scanner = Scanner::new(Cursor::new(input));
        let (name, offset) = scanner.next_datablock_header().unwrap().unwrap();
        assert_eq!(name, "one");
        assert_eq!(&input[offset as usize..offset as usize + 8], "data_one");
        let (name, _) = scanner.next_datablock_header().unwrap().unwrap();
        assert_eq!(name, "two");
        assert!(scanner.next_datablock_header().unwrap().is_none());
    }
}
