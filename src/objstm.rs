//! Object stream parsing (PDF 1.5+).
//!
//! Object streams (/Type /ObjStm) allow multiple objects to be compressed together
//! in a single stream for better compression ratios. The document decodes a
//! container once; members are parsed lazily the first time they are asked for.
//!
//! # Format
//!
//! An object stream has this structure:
//! ```text
//! N 0 obj
//! << /Type /ObjStm
//!    /N 5              % Number of objects in stream
//!    /First 30         % Byte offset to first object's data
//!    /Filter /FlateDecode
//! >>
//! stream
//! 10 0 11 15 12 28 13 42 14 55    % Pairs: (obj_num, offset)
//! <dict>                           % Object 10 at offset 0
//! <array>                          % Object 11 at offset 15
//! ...
//! endstream
//! endobj
//! ```
//!
//! The first part contains N pairs of integers (object number, byte offset relative
//! to /First). The second part contains the actual object data. References
//! inside members keep their file-wide object numbers; they are resolved by
//! the document, not by the container.

use std::cell::OnceCell;
use std::io::Cursor;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::lexer::{Token, Tokenizer};
use crate::object::Object;
use crate::parser::ObjectReader;
use crate::parser_config::ParserOptions;

/// A decoded object stream.
#[derive(Debug)]
pub struct ObjectStream {
    data: Bytes,
    first: usize,
    /// (object number, offset relative to `first`) per member
    members: Vec<(u32, usize)>,
    cache: Vec<OnceCell<Object>>,
}

impl ObjectStream {
    /// Read the member table of a decoded container.
    ///
    /// `n` and `first` are the stream's `/N` and `/First`.
    ///
    /// # Errors
    ///
    /// `first` past the end of the data, or fewer than `n` well-formed pairs.
    pub fn parse(data: Bytes, n: usize, first: usize) -> Result<Self> {
        if first > data.len() {
            return Err(Error::InvalidPdf(format!(
                "object stream /First {} beyond {} decoded bytes",
                first,
                data.len()
            )));
        }

        let mut lexer = Tokenizer::new(Cursor::new(data.slice(..first)));
        let mut members = Vec::with_capacity(n.min(first / 4 + 1));
        for i in 0..n {
            let id = lexer.next_token()?;
            let offset = lexer.next_token()?;
            match (id, offset) {
                (Some(Token::Integer(id)), Some(Token::Integer(offset))) => {
                    match (u32::try_from(id), usize::try_from(offset)) {
                        (Ok(id), Ok(offset)) => members.push((id, offset)),
                        _ => {
                            return Err(Error::InvalidPdf(format!(
                                "object stream pair {}: {} {}",
                                i, id, offset
                            )))
                        },
                    }
                },
                _ => {
                    return Err(Error::InvalidPdf(format!(
                        "object stream header has {} of {} pairs",
                        i, n
                    )))
                },
            }
        }

        let cache = members.iter().map(|_| OnceCell::new()).collect();
        Ok(Self {
            data,
            first,
            members,
            cache,
        })
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True if the container holds no objects.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Object number of the member at `index`.
    pub fn object_id(&self, index: usize) -> Option<u32> {
        self.members.get(index).map(|&(id, _)| id)
    }

    /// Index of the member with object number `id`.
    pub fn index_of(&self, id: u32) -> Option<usize> {
        self.members.iter().position(|&(m, _)| m == id)
    }

    /// Parse (once) and return the member at `index`.
    pub fn object_at(&self, index: usize, options: &ParserOptions) -> Result<Object> {
        let cell = self.cache.get(index).ok_or_else(|| {
            Error::InvalidPdf(format!(
                "object stream index {} out of {}",
                index,
                self.members.len()
            ))
        })?;
        if let Some(value) = cell.get() {
            return Ok(value.clone());
        }

        let offset = self.first + self.members[index].1;
        if offset >= self.data.len() {
            return Err(Error::InvalidPdf(format!(
                "object stream member at {} beyond {} decoded bytes",
                offset,
                self.data.len()
            )));
        }
        let mut lexer = Tokenizer::new(Cursor::new(self.data.clone()));
        lexer.seek(offset as u64)?;
        let value = ObjectReader::new(&mut lexer, options)
            .without_streams()
            .read_value(0, 0)?;
        Ok(cell.get_or_init(|| value).clone())
    }
}
