//! PDF lexer (tokenizer).
//!
//! This module turns a seekable byte source into PDF tokens, one at a time.
//! The same lexer drives the file-level parser, the object-stream sub-parser
//! and content streams, so any bare word that is not a structural keyword is
//! reported as a [`Token::Command`].
//!
//! # PDF Syntax Overview
//!
//! - Numbers: integers (42, -123) and reals (3.14, -2.5, .5)
//! - Strings: literal ((Hello)) and hexadecimal (<48656C6C6F>)
//! - Names: identifiers starting with / (/Type, /A#20B)
//! - Keywords: true, false, null, obj, endobj, stream, endstream,
//!   xref, trailer, startxref
//! - Special comments: `%%EOF` and `%PDF-x.y`
//!
//! Whitespace (space, \t, \r, \n, \0, \f) and comments (% to EOL) are skipped.
//!
//! Both tokens and raw characters can be pushed back. Pushed-back state is a
//! stack, so the reference lookahead (`10 0 R`) can return two integers.
//! Any [`Tokenizer::seek`] discards everything that was pushed back.

use std::cell::{RefCell, RefMut};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::rc::Rc;

use crate::error::{Error, Result};

/// Object-safe combination of [`Read`] and [`Seek`].
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// The document's file tokenizer, shared with file-backed stream sources.
pub type SharedTokenizer = Rc<RefCell<Tokenizer<Box<dyn ReadSeek>>>>;

/// Borrow the shared tokenizer, failing instead of panicking if it is in use.
pub(crate) fn borrow_shared(
    shared: &SharedTokenizer,
) -> Result<RefMut<'_, Tokenizer<Box<dyn ReadSeek>>>> {
    shared
        .try_borrow_mut()
        .map_err(|_| Error::InvalidPdf("file reader is busy".to_string()))
}

/// Token types recognized by the PDF lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    /// Boolean keyword (`true` / `false`)
    Bool(bool),

    /// Integer number (e.g., 42, -123)
    Integer(i64),

    /// Real (floating-point) number (e.g., 3.14, -2.5, .5)
    Real(f64),

    /// Decoded string bytes from a literal or hex string
    String(Vec<u8>),

    /// Name bytes without the leading slash, `#XX` escapes decoded
    Name(Vec<u8>),

    /// Array start delimiter [
    ArrayStart,

    /// Array end delimiter ]
    ArrayEnd,

    /// Dictionary start delimiter <<
    DictStart,

    /// Dictionary end delimiter >>
    DictEnd,

    /// Stream start keyword "stream" (the following EOL is consumed)
    StreamStart,

    /// Stream end keyword "endstream"
    StreamEnd,

    /// Indirect object start keyword "obj"
    ObjStart,

    /// Indirect object end keyword "endobj"
    ObjEnd,

    /// Null keyword
    Null,

    /// `%PDF-x.y` header comment, carrying the text after the dash
    Version(String),

    /// `%%EOF` marker
    Eof,

    /// `startxref` keyword
    StartXref,

    /// `xref` keyword
    Xref,

    /// `trailer` keyword
    Trailer,

    /// Any other bare word, including `R` and content-stream operators
    Command(String),
}

impl Token {
    /// Returns true if this is the command token `word`.
    pub fn is_command(&self, word: &str) -> bool {
        matches!(self, Token::Command(c) if c == word)
    }
}

/// Returns true for the six PDF whitespace characters (PDF Ref 1.7, Table 3.1).
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, 0 | b'\t' | b'\n' | 0x0C | b'\r' | b' ')
}

/// Returns true for the PDF delimiter characters (PDF Ref 1.7, Table 3.2).
pub fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Stateful tokenizer over any seekable byte source.
pub struct Tokenizer<R> {
    inner: BufReader<R>,
    tokens: Vec<Token>,
    chars: Vec<u8>,
}

impl<R: Read + Seek> Tokenizer<R> {
    /// Create a tokenizer positioned at the current offset of `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            tokens: Vec::new(),
            chars: Vec::new(),
        }
    }

    /// Reposition the underlying stream and discard all pushed-back state.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.tokens.clear();
        self.chars.clear();
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    /// Current logical position, accounting for pushed-back characters.
    ///
    /// Pushed-back tokens are not accounted for.
    pub fn tell(&mut self) -> Result<u64> {
        let pos = self.inner.stream_position()?;
        Ok(pos.saturating_sub(self.chars.len() as u64))
    }

    /// Total length of the underlying stream. The logical position is kept.
    pub fn stream_len(&mut self) -> Result<u64> {
        let pos = self.inner.stream_position()?;
        let len = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(len)
    }

    /// Push a token back; the next [`Tokenizer::next_token`] returns it.
    pub fn put_back(&mut self, token: Token) {
        self.tokens.push(token);
    }

    /// Push a raw character back.
    pub(crate) fn unget(&mut self, c: u8) {
        self.chars.push(c);
    }

    pub(crate) fn getc(&mut self) -> Result<Option<u8>> {
        if let Some(c) = self.chars.pop() {
            return Ok(Some(c));
        }
        let buf = self.inner.fill_buf()?;
        match buf.first() {
            Some(&c) => {
                self.inner.consume(1);
                Ok(Some(c))
            },
            None => Ok(None),
        }
    }

    /// Raw read, draining pushed-back characters first.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.chars.pop() {
                Some(c) => {
                    buf[n] = c;
                    n += 1;
                },
                None => break,
            }
        }
        if n < buf.len() {
            n += self.inner.read(&mut buf[n..])?;
        }
        Ok(n)
    }

    /// Read one line, split on CR or LF (a CRLF pair counts as one break).
    ///
    /// Pushed-back tokens are discarded. Returns `None` at end of input.
    pub fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        self.tokens.clear();
        let mut line = Vec::new();
        loop {
            match self.getc()? {
                None if line.is_empty() => return Ok(None),
                None => return Ok(Some(line)),
                Some(b'\n') => return Ok(Some(line)),
                Some(b'\r') => {
                    if let Some(c) = self.getc()? {
                        if c != b'\n' {
                            self.unget(c);
                        }
                    }
                    return Ok(Some(line));
                },
                Some(c) => line.push(c),
            }
        }
    }

    fn skip_line(&mut self) -> Result<()> {
        loop {
            match self.getc()? {
                None | Some(b'\n') => return Ok(()),
                Some(b'\r') => {
                    if let Some(c) = self.getc()? {
                        if c != b'\n' {
                            self.unget(c);
                        }
                    }
                    return Ok(());
                },
                Some(_) => {},
            }
        }
    }

    /// Return the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>> {
        if let Some(tok) = self.tokens.pop() {
            return Ok(Some(tok));
        }

        loop {
            let c = match self.getc()? {
                None => return Ok(None),
                Some(c) if is_whitespace(c) => continue,
                Some(c) => c,
            };

            let token = match c {
                b'%' => match self.read_comment()? {
                    Some(tok) => tok,
                    None => continue,
                },
                b'[' => Token::ArrayStart,
                b']' => Token::ArrayEnd,
                b'<' => match self.getc()? {
                    Some(b'<') => Token::DictStart,
                    Some(other) => {
                        self.unget(other);
                        self.read_hex_string()?
                    },
                    None => return Err(Error::UnexpectedEof),
                },
                b'>' => match self.getc()? {
                    Some(b'>') => Token::DictEnd,
                    _ => {
                        let offset = self.tell()?;
                        return Err(Error::parse(offset, "expected '>>'"));
                    },
                },
                b'(' => self.read_literal_string()?,
                b'/' => self.read_name()?,
                b'+' | b'-' | b'.' | b'0'..=b'9' => self.read_number(c)?,
                b'{' | b'}' => Token::Command((c as char).to_string()),
                b')' => {
                    let offset = self.tell()?;
                    return Err(Error::parse(offset, "unbalanced ')'"));
                },
                _ => self.read_keyword(c)?,
            };
            return Ok(Some(token));
        }
    }

    /// Handles everything after a `%`. Returns `None` for plain comments.
    fn read_comment(&mut self) -> Result<Option<Token>> {
        let mut word = Vec::new();
        while let Some(c) = self.getc()? {
            if is_whitespace(c) {
                self.unget(c);
                break;
            }
            word.push(c);
        }

        if word.starts_with(b"%EOF") {
            self.skip_line()?;
            return Ok(Some(Token::Eof));
        }
        if let Some(rest) = word.strip_prefix(b"PDF-") {
            let version: String = rest
                .iter()
                .take_while(|c| c.is_ascii_digit() || **c == b'.')
                .map(|&c| c as char)
                .collect();
            self.skip_line()?;
            return Ok(Some(Token::Version(version)));
        }
        self.skip_line()?;
        Ok(None)
    }

    fn read_number(&mut self, first: u8) -> Result<Token> {
        let mut text = String::new();
        let mut next = Some(first);
        if matches!(first, b'+' | b'-') {
            if first == b'-' {
                text.push('-');
            }
            next = self.getc()?;
        }

        let mut digits = 0;
        while let Some(c) = next.filter(u8::is_ascii_digit) {
            text.push(c as char);
            digits += 1;
            next = self.getc()?;
        }
        let mut is_real = false;
        if next == Some(b'.') {
            is_real = true;
            text.push('.');
            next = self.getc()?;
            while let Some(c) = next.filter(u8::is_ascii_digit) {
                text.push(c as char);
                digits += 1;
                next = self.getc()?;
            }
        }
        if let Some(c) = next {
            self.unget(c);
        }

        if digits == 0 {
            let offset = self.tell()?;
            return Err(Error::parse(offset, format!("malformed number '{}'", text)));
        }

        if !is_real {
            if let Ok(value) = text.parse::<i64>() {
                return Ok(Token::Integer(value));
            }
        }
        // "5." and "-.5" are valid PDF reals but need a digit on both sides for Rust.
        let normalized = if text.ends_with('.') {
            format!("{}0", text)
        } else {
            text
        };
        normalized
            .parse::<f64>()
            .map(Token::Real)
            .map_err(|e| Error::parse(0, format!("malformed number: {}", e)))
    }

    fn read_literal_string(&mut self) -> Result<Token> {
        let mut out = Vec::new();
        let mut depth = 1usize;
        loop {
            let c = self.getc()?.ok_or(Error::UnexpectedEof)?;
            match c {
                b'(' => {
                    depth += 1;
                    out.push(c);
                },
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(c);
                },
                b'\\' => {
                    let e = self.getc()?.ok_or(Error::UnexpectedEof)?;
                    match e {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'0'..=b'7' => {
                            let mut value = u32::from(e - b'0');
                            for _ in 0..2 {
                                match self.getc()? {
                                    Some(d @ b'0'..=b'7') => value = value * 8 + u32::from(d - b'0'),
                                    Some(other) => {
                                        self.unget(other);
                                        break;
                                    },
                                    None => break,
                                }
                            }
                            out.push((value & 0xFF) as u8);
                        },
                        b'\r' => {
                            if let Some(n) = self.getc()? {
                                if n != b'\n' {
                                    self.unget(n);
                                }
                            }
                        },
                        b'\n' => {},
                        other => out.push(other),
                    }
                },
                b'\r' => {
                    if let Some(n) = self.getc()? {
                        if n != b'\n' {
                            self.unget(n);
                        }
                    }
                    out.push(b'\n');
                },
                _ => out.push(c),
            }
        }
        Ok(Token::String(out))
    }

    fn read_hex_string(&mut self) -> Result<Token> {
        let mut out = Vec::new();
        let mut high: Option<u8> = None;
        loop {
            let c = self.getc()?.ok_or(Error::UnexpectedEof)?;
            if is_whitespace(c) {
                continue;
            }
            if c == b'>' {
                break;
            }
            let nibble = match hex_value(c) {
                Some(n) => n,
                None => {
                    let offset = self.tell()?;
                    return Err(Error::parse(
                        offset,
                        format!("invalid character 0x{:02X} in hex string", c),
                    ));
                },
            };
            match high.take() {
                Some(h) => out.push((h << 4) | nibble),
                None => high = Some(nibble),
            }
        }
        if let Some(h) = high {
            out.push(h << 4);
        }
        Ok(Token::String(out))
    }

    fn read_name(&mut self) -> Result<Token> {
        let mut out = Vec::new();
        while let Some(c) = self.getc()? {
            if is_whitespace(c) || is_delimiter(c) {
                self.unget(c);
                break;
            }
            if c != b'#' {
                out.push(c);
                continue;
            }
            let h1 = self.getc()?;
            let h2 = self.getc()?;
            match (h1.and_then(hex_value), h2.and_then(hex_value)) {
                (Some(a), Some(b)) => out.push((a << 4) | b),
                _ => {
                    out.push(b'#');
                    if let Some(b) = h2 {
                        self.unget(b);
                    }
                    if let Some(a) = h1 {
                        self.unget(a);
                    }
                },
            }
        }
        Ok(Token::Name(out))
    }

    fn read_keyword(&mut self, first: u8) -> Result<Token> {
        let mut word = vec![first];
        while let Some(c) = self.getc()? {
            if is_whitespace(c) || is_delimiter(c) {
                self.unget(c);
                break;
            }
            word.push(c);
        }

        let token = match word.as_slice() {
            b"true" => Token::Bool(true),
            b"false" => Token::Bool(false),
            b"null" => Token::Null,
            b"obj" => Token::ObjStart,
            b"endobj" => Token::ObjEnd,
            b"endstream" => Token::StreamEnd,
            b"startxref" => Token::StartXref,
            b"xref" => Token::Xref,
            b"trailer" => Token::Trailer,
            b"stream" => {
                self.consume_stream_eol()?;
                Token::StreamStart
            },
            _ => Token::Command(String::from_utf8_lossy(&word).into_owned()),
        };
        Ok(token)
    }

    /// After `stream` the data starts behind CRLF or LF. A lone CR is tolerated.
    fn consume_stream_eol(&mut self) -> Result<()> {
        let mut first = self.getc()?;
        while first == Some(b' ') {
            first = self.getc()?;
        }
        let second = self.getc()?;
        match first {
            Some(b'\n') => {
                if let Some(c) = second {
                    self.unget(c);
                }
                Ok(())
            },
            Some(b'\r') => {
                if let Some(c) = second.filter(|&c| c != b'\n') {
                    self.unget(c);
                }
                Ok(())
            },
            _ => {
                let offset = self.tell()?;
                Err(Error::parse(offset, "'stream' keyword not followed by an end of line"))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn lex(input: &[u8]) -> Vec<Token> {
        let mut tok = Tokenizer::new(Cursor::new(input.to_vec()));
        let mut out = Vec::new();
        while let Some(t) = tok.next_token().unwrap() {
            out.push(t);
        }
        out
    }

    fn single(input: &[u8]) -> Token {
        let mut tokens = lex(input);
        assert_eq!(tokens.len(), 1, "expected one token from {:?}", input);
        tokens.remove(0)
    }

    // ========================================================================
    // Number Tests
    // ========================================================================

    #[test]
    fn test_parse_integers() {
        assert_eq!(single(b"42"), Token::Integer(42));
        assert_eq!(single(b"-123"), Token::Integer(-123));
        assert_eq!(single(b"+17"), Token::Integer(17));
        assert_eq!(single(b"0"), Token::Integer(0));
    }

    #[test]
    fn test_parse_reals() {
        assert_eq!(single(b"-2.5"), Token::Real(-2.5));
        assert_eq!(single(b".5"), Token::Real(0.5));
        assert_eq!(single(b"5."), Token::Real(5.0));
        assert_eq!(single(b"-.002"), Token::Real(-0.002));
    }

    #[test]
    fn test_number_without_digits_is_error() {
        let mut tok = Tokenizer::new(Cursor::new(b"- ".to_vec()));
        assert!(tok.next_token().is_err());
    }

    // ========================================================================
    // String Tests
    // ========================================================================

    #[test]
    fn test_parse_literal_string_with_nested_parens() {
        assert_eq!(single(b"(a (b) c)"), Token::String(b"a (b) c".to_vec()));
    }

    #[test]
    fn test_parse_literal_string_escapes() {
        assert_eq!(
            single(b"(\\n\\r\\t\\b\\f\\(\\)\\\\\\q)"),
            Token::String(b"\n\r\t\x08\x0C()\\q".to_vec())
        );
    }

    #[test]
    fn test_parse_literal_string_octal() {
        assert_eq!(single(b"(\\101\\7x\\0053)"), Token::String(b"A\x07x\x053".to_vec()));
    }

    #[test]
    fn test_parse_literal_string_line_continuation() {
        assert_eq!(single(b"(ab\\\r\ncd\\\nef)"), Token::String(b"abcdef".to_vec()));
    }

    #[test]
    fn test_literal_string_raw_cr_becomes_lf() {
        assert_eq!(single(b"(a\r\nb\rc)"), Token::String(b"a\nb\nc".to_vec()));
    }

    #[test]
    fn test_parse_hex_string() {
        assert_eq!(single(b"<48 65\n6C6C 6F>"), Token::String(b"Hello".to_vec()));
        assert_eq!(single(b"<901FA>"), Token::String(vec![0x90, 0x1F, 0xA0]));
        assert_eq!(single(b"<>"), Token::String(Vec::new()));
    }

    #[test]
    fn test_hex_string_invalid_char_is_error() {
        let mut tok = Tokenizer::new(Cursor::new(b"<4G>".to_vec()));
        assert!(tok.next_token().is_err());
    }

    // ========================================================================
    // Name Tests
    // ========================================================================

    #[test]
    fn test_parse_name_with_hex_escape() {
        assert_eq!(single(b"/A#20B"), Token::Name(b"A B".to_vec()));
        assert_eq!(single(b"/A#2"), Token::Name(b"A#2".to_vec()));
        assert_eq!(single(b"/A#zz"), Token::Name(b"A#zz".to_vec()));
    }

    #[test]
    fn test_name_terminated_by_delimiter() {
        assert_eq!(
            lex(b"/Type/Page[1]"),
            vec![
                Token::Name(b"Type".to_vec()),
                Token::Name(b"Page".to_vec()),
                Token::ArrayStart,
                Token::Integer(1),
                Token::ArrayEnd,
            ]
        );
    }

    // ========================================================================
    // Keyword Tests
    // ========================================================================

    #[test]
    fn test_keywords() {
        assert_eq!(
            lex(b"true false null obj endobj endstream xref trailer startxref R Tj"),
            vec![
                Token::Bool(true),
                Token::Bool(false),
                Token::Null,
                Token::ObjStart,
                Token::ObjEnd,
                Token::StreamEnd,
                Token::Xref,
                Token::Trailer,
                Token::StartXref,
                Token::Command("R".to_string()),
                Token::Command("Tj".to_string()),
            ]
        );
    }

    #[test]
    fn test_special_comments() {
        assert_eq!(
            lex(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n1 % comment\n%%EOF\n"),
            vec![Token::Version("1.7".to_string()), Token::Integer(1), Token::Eof]
        );
    }

    #[test]
    fn test_dict_delimiters() {
        assert_eq!(lex(b"<<>>"), vec![Token::DictStart, Token::DictEnd]);
    }

    #[test]
    fn test_single_gt_is_error() {
        let mut tok = Tokenizer::new(Cursor::new(b"> ".to_vec()));
        assert!(tok.next_token().is_err());
    }

    // ========================================================================
    // Stream keyword and positioning
    // ========================================================================

    #[test]
    fn test_stream_keyword_consumes_crlf() {
        let mut tok = Tokenizer::new(Cursor::new(b"stream\r\nDATA".to_vec()));
        assert_eq!(tok.next_token().unwrap(), Some(Token::StreamStart));
        assert_eq!(tok.tell().unwrap(), 8);
    }

    #[test]
    fn test_stream_keyword_lone_cr_restores_byte() {
        let mut tok = Tokenizer::new(Cursor::new(b"stream\rDATA".to_vec()));
        assert_eq!(tok.next_token().unwrap(), Some(Token::StreamStart));
        assert_eq!(tok.tell().unwrap(), 7);
        let mut buf = [0u8; 4];
        assert_eq!(tok.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"DATA");
    }

    #[test]
    fn test_stream_keyword_lf() {
        let mut tok = Tokenizer::new(Cursor::new(b"stream\nDATA".to_vec()));
        assert_eq!(tok.next_token().unwrap(), Some(Token::StreamStart));
        assert_eq!(tok.tell().unwrap(), 7);
    }

    #[test]
    fn test_stream_keyword_without_eol_is_error() {
        let mut tok = Tokenizer::new(Cursor::new(b"streamDATA".to_vec()));
        // "streamDATA" is a single bare word, so it lexes as a command
        assert_eq!(tok.next_token().unwrap(), Some(Token::Command("streamDATA".to_string())));
        let mut tok = Tokenizer::new(Cursor::new(b"stream X".to_vec()));
        assert!(tok.next_token().is_err());
    }

    #[test]
    fn test_put_back_is_a_stack() {
        let mut tok = Tokenizer::new(Cursor::new(b"3".to_vec()));
        tok.put_back(Token::Integer(2));
        tok.put_back(Token::Integer(1));
        assert_eq!(tok.next_token().unwrap(), Some(Token::Integer(1)));
        assert_eq!(tok.next_token().unwrap(), Some(Token::Integer(2)));
        assert_eq!(tok.next_token().unwrap(), Some(Token::Integer(3)));
        assert_eq!(tok.next_token().unwrap(), None);
    }

    #[test]
    fn test_seek_clears_put_back() {
        let mut tok = Tokenizer::new(Cursor::new(b"1 2 3".to_vec()));
        tok.put_back(Token::Null);
        tok.unget(b'x');
        tok.seek(2).unwrap();
        assert_eq!(tok.next_token().unwrap(), Some(Token::Integer(2)));
    }

    #[test]
    fn test_tell_accounts_for_unget() {
        let mut tok = Tokenizer::new(Cursor::new(b"12 ".to_vec()));
        assert_eq!(tok.next_token().unwrap(), Some(Token::Integer(12)));
        // the terminating space was read and pushed back
        assert_eq!(tok.tell().unwrap(), 2);
    }

    #[test]
    fn test_read_line() {
        let mut tok = Tokenizer::new(Cursor::new(b"a\r\nb\rc\nd".to_vec()));
        assert_eq!(tok.read_line().unwrap(), Some(b"a".to_vec()));
        assert_eq!(tok.read_line().unwrap(), Some(b"b".to_vec()));
        assert_eq!(tok.read_line().unwrap(), Some(b"c".to_vec()));
        assert_eq!(tok.read_line().unwrap(), Some(b"d".to_vec()));
        assert_eq!(tok.read_line().unwrap(), None);
    }

    #[test]
    fn test_stream_len_keeps_position() {
        let mut tok = Tokenizer::new(Cursor::new(b"0123456789".to_vec()));
        tok.seek(4).unwrap();
        assert_eq!(tok.stream_len().unwrap(), 10);
        assert_eq!(tok.tell().unwrap(), 4);
    }
}
