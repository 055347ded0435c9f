//! PDF object parser.
//!
//! [`ObjectReader`] combines tokens from the lexer into complete objects
//! (arrays, dictionaries, indirect references, streams).
//!
//! # Architecture
//!
//! The reader uses a recursive descent approach:
//! 1. Read token from lexer
//! 2. Based on token type, decide how to parse
//! 3. For composite types (arrays, dicts), recursively parse contents
//!
//! An integer may start an indirect reference (`12 0 R`), so the reader looks
//! two tokens ahead and pushes both back when the pattern does not match.
//!
//! # Streams
//!
//! A dictionary followed by `stream` becomes an [`Object::Stream`] that only
//! records where its data lives. The data length comes from `/Length`, which
//! may be an indirect reference read through the xref table. When the length
//! does not land on `endstream` the reader scans for `endstream` and logs the
//! corrected length.

use std::io::{Read, Seek};
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::lexer::{is_whitespace, Token, Tokenizer};
use crate::object::{Dict, Object, ObjectRef, PdfBytes, StreamObject};
use crate::parser_config::ParserOptions;
use crate::security::SecurityHandler;
use crate::xref::{EntryKind, XRefTable};

const ENDSTREAM: &[u8] = b"endstream";

/// Reads objects from a tokenizer.
pub struct ObjectReader<'a, R> {
    lexer: &'a mut Tokenizer<R>,
    options: &'a ParserOptions,
    xref: Option<&'a XRefTable>,
    security: Option<&'a dyn SecurityHandler>,
    allow_streams: bool,
}

impl<'a, R: Read + Seek> ObjectReader<'a, R> {
    /// Reader over `lexer` with no xref table and no decryption.
    pub fn new(lexer: &'a mut Tokenizer<R>, options: &'a ParserOptions) -> Self {
        Self {
            lexer,
            options,
            xref: None,
            security: None,
            allow_streams: true,
        }
    }

    /// Use `xref` to resolve indirect `/Length` entries.
    pub fn with_xref(mut self, xref: &'a XRefTable) -> Self {
        self.xref = Some(xref);
        self
    }

    /// Decrypt strings with `security`.
    pub fn with_security(mut self, security: Option<&'a dyn SecurityHandler>) -> Self {
        self.security = security;
        self
    }

    /// Reject `stream` keywords, for sources that have no file offsets
    /// (object streams) and for nested `/Length` reads.
    pub fn without_streams(mut self) -> Self {
        self.allow_streams = false;
        self
    }

    /// Next raw token; end of input is an error.
    pub(crate) fn next_raw(&mut self) -> Result<Token> {
        self.lexer.next_token()?.ok_or(Error::UnexpectedEof)
    }

    fn error_here(&mut self, reason: impl Into<String>) -> Error {
        let offset = self.lexer.tell().unwrap_or(0);
        Error::parse(offset, reason)
    }

    /// Read one value. Strings are decrypted as belonging to `id`/`gen`;
    /// pass id 0 for values that are not encrypted (trailers, xref streams).
    pub fn read_value(&mut self, id: u32, gen: u16) -> Result<Object> {
        self.read_nested(id, gen, 0)
    }

    fn read_nested(&mut self, id: u32, gen: u16, depth: usize) -> Result<Object> {
        if depth > self.options.max_nesting {
            return Err(Error::RecursionLimitExceeded(self.options.max_nesting as u32));
        }

        match self.next_raw()? {
            Token::Bool(b) => Ok(Object::Boolean(b)),
            Token::Integer(value) => self.read_integer_or_reference(value),
            Token::Real(value) => Ok(Object::Real(value)),
            Token::String(bytes) => Ok(Object::String(self.decrypt(&bytes, id, gen))),
            Token::Name(name) => Ok(Object::Name(PdfBytes::new(&name))),
            Token::Null => Ok(Object::Null),
            Token::ArrayStart => {
                let mut items = Vec::new();
                loop {
                    let token = self.next_raw()?;
                    if token == Token::ArrayEnd {
                        break;
                    }
                    self.lexer.put_back(token);
                    items.push(self.read_nested(id, gen, depth + 1)?);
                }
                Ok(Object::array(items))
            },
            Token::DictStart => {
                let dict = self.read_dict_entries(id, gen, depth)?;
                match self.lexer.next_token() {
                    Ok(Some(Token::StreamStart)) => self.read_stream(dict, id, gen),
                    Ok(Some(other)) => {
                        self.lexer.put_back(other);
                        Ok(Object::dict(dict))
                    },
                    _ => Ok(Object::dict(dict)),
                }
            },
            other => Err(self.error_here(format!("unexpected token {:?}", other))),
        }
    }

    fn read_integer_or_reference(&mut self, value: i64) -> Result<Object> {
        match self.lexer.next_token()? {
            Some(Token::Integer(gen)) => match self.lexer.next_token()? {
                Some(token) if token.is_command("R") => {
                    return match (u32::try_from(value), u16::try_from(gen)) {
                        (Ok(id), Ok(gen)) => Ok(Object::reference(id, gen)),
                        _ => Err(self.error_here(format!("invalid reference {} {} R", value, gen))),
                    };
                },
                Some(token) => {
                    self.lexer.put_back(token);
                    self.lexer.put_back(Token::Integer(gen));
                },
                None => self.lexer.put_back(Token::Integer(gen)),
            },
            Some(token) => self.lexer.put_back(token),
            None => {},
        }
        Ok(Object::Integer(value))
    }

    fn read_dict_entries(&mut self, id: u32, gen: u16, depth: usize) -> Result<Dict> {
        let mut dict = Dict::new();
        loop {
            match self.next_raw()? {
                Token::DictEnd => break,
                Token::Name(key) => {
                    let value = self.read_nested(id, gen, depth + 1)?;
                    dict.insert(String::from_utf8_lossy(&key).into_owned(), value);
                },
                other => {
                    // unterminated dictionary; keep what we have
                    log::warn!("dictionary key expected, found {:?}", other);
                    self.lexer.put_back(other);
                    break;
                },
            }
        }
        Ok(dict)
    }

    fn decrypt(&self, bytes: &[u8], id: u32, gen: u16) -> PdfBytes {
        match self.security {
            Some(handler) if id != 0 => PdfBytes::from(handler.decrypt_string(bytes, id, gen)),
            _ => PdfBytes::new(bytes),
        }
    }

    fn read_stream(&mut self, mut dict: Dict, id: u32, gen: u16) -> Result<Object> {
        if !self.allow_streams {
            return Err(self.error_here("stream not allowed here"));
        }
        let start = self.lexer.tell()?;

        let declared = match self.resolve_length(dict.get("Length")) {
            Ok(length) => Some(length),
            Err(e) => {
                log::warn!("object {} {}: {}", id, gen, e);
                None
            },
        };
        let trusted = match declared {
            Some(length) => self.ends_at(start + length)?,
            None => false,
        };

        let length = match declared {
            Some(length) if trusted => length,
            _ => {
                if !self.options.allow_malformed_streams {
                    return Err(Error::parse(start, "stream length does not end at endstream"));
                }
                let guessed = self
                    .guess_stream_length(start)?
                    .ok_or_else(|| Error::parse(start, "stream without endstream"))?;
                log::warn!(
                    "invalid stream length of {} for object {} {}; should be {}",
                    declared.unwrap_or(0),
                    id,
                    gen,
                    guessed
                );
                dict.insert("Length".to_string(), Object::Integer(guessed as i64));
                guessed
            },
        };

        Ok(Object::Stream(Rc::new(StreamObject {
            dict,
            offset: start,
            length,
            id,
            gen,
        })))
    }

    /// True if `endstream` follows at `pos`. Leaves the lexer after it.
    fn ends_at(&mut self, pos: u64) -> Result<bool> {
        self.lexer.seek(pos)?;
        Ok(matches!(self.lexer.next_token(), Ok(Some(Token::StreamEnd))))
    }

    fn resolve_length(&mut self, length: Option<&Object>) -> Result<u64> {
        match length {
            None => Err(Error::InvalidPdf("missing /Length in stream dictionary".to_string())),
            Some(Object::Integer(n)) => u64::try_from(*n)
                .map_err(|_| Error::InvalidPdf(format!("negative stream length {}", n))),
            Some(Object::Reference(r)) => {
                let value = self.read_length_object(*r)?;
                match value.as_integer().map(u64::try_from) {
                    Some(Ok(n)) => Ok(n),
                    _ => Err(Error::InvalidObjectType {
                        expected: "Integer".to_string(),
                        found: value.type_name().to_string(),
                    }),
                }
            },
            Some(other) => Err(Error::InvalidObjectType {
                expected: "Integer".to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Read the object `r` points at, restoring the lexer position after.
    fn read_length_object(&mut self, r: ObjectRef) -> Result<Object> {
        let xref = self
            .xref
            .ok_or_else(|| Error::InvalidPdf(format!("cannot resolve /Length {}", r)))?;
        let entry = xref.get(r.id).ok_or(Error::ObjectNotFound(r.id, r.gen))?;
        if let Some(value) = entry.cached() {
            return Ok(value.clone());
        }
        let offset = match entry.kind() {
            EntryKind::Direct { gen, offset } if gen == r.gen => offset,
            _ => return Err(Error::ObjectNotFound(r.id, r.gen)),
        };

        let saved = self.lexer.tell()?;
        let options = self.options;
        let result = ObjectReader::new(&mut *self.lexer, options)
            .without_streams()
            .read_indirect(offset, r.id, r.gen);
        self.lexer.seek(saved)?;
        result
    }

    /// Scan from `start` for an end-of-line followed by `endstream`.
    ///
    /// Returns the data length up to (not including) that end-of-line and
    /// leaves the lexer after the keyword.
    fn guess_stream_length(&mut self, start: u64) -> Result<Option<u64>> {
        self.lexer.seek(start)?;
        let mut buf = [0u8; 4096];
        let mut pos = start;
        // data may be empty, so the start counts as a line break
        let mut matched = 0;
        let mut at_line_start = true;
        let mut eol_start = start;
        let mut prev = 0u8;

        loop {
            let n = self.lexer.read(&mut buf)?;
            if n == 0 {
                if matched == ENDSTREAM.len() {
                    return Ok(Some(eol_start - start));
                }
                return Ok(None);
            }
            for &c in &buf[..n] {
                if matched == ENDSTREAM.len() && (is_whitespace(c) || c == b'%') {
                    self.lexer.seek(pos)?;
                    return Ok(Some(eol_start - start));
                }
                if c == b'\r' || c == b'\n' {
                    if !(at_line_start && matched == 0 && prev == b'\r' && c == b'\n') {
                        eol_start = pos;
                    }
                    at_line_start = true;
                    matched = 0;
                } else if at_line_start && matched < ENDSTREAM.len() && c == ENDSTREAM[matched] {
                    matched += 1;
                } else {
                    at_line_start = false;
                    matched = 0;
                }
                prev = c;
                pos += 1;
            }
        }
    }

    /// Read an `id gen obj` header.
    pub fn read_object_header(&mut self) -> Result<(u32, u16)> {
        let id = match self.next_raw()? {
            Token::Integer(n) => u32::try_from(n).ok(),
            _ => None,
        };
        let gen = match self.next_raw()? {
            Token::Integer(n) => u16::try_from(n).ok(),
            _ => None,
        };
        match (id, gen, self.next_raw()?) {
            (Some(id), Some(gen), Token::ObjStart) => Ok((id, gen)),
            _ => Err(self.error_here("expected 'id gen obj'")),
        }
    }

    /// Read the indirect object `id gen obj ... endobj` at `offset`.
    pub fn read_indirect(&mut self, offset: u64, id: u32, gen: u16) -> Result<Object> {
        self.lexer.seek(offset)?;
        let (found_id, found_gen) = self.read_object_header()?;
        if (found_id, found_gen) != (id, gen) {
            return Err(Error::parse(
                offset,
                format!(
                    "expected object {} {}, found {} {}",
                    id, gen, found_id, found_gen
                ),
            ));
        }
        let value = self.read_value(id, gen)?;

        if !matches!(self.lexer.next_token(), Ok(Some(Token::ObjEnd))) {
            if !self.options.allow_missing_endobj {
                return Err(Error::parse(offset, format!("missing endobj for object {} {}", id, gen)));
            }
            log::warn!("missing endobj for object {} {}", id, gen);
        }
        Ok(value)
    }
}
