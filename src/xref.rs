//! Cross-reference table and the trusted xref reader.
//!
//! The xref table maps object numbers to byte offsets in the PDF file (or to
//! a slot in an object stream), enabling random access to PDF objects. Each
//! entry also caches the value once it has been read.
//!
//! [`read_trusted`] follows the file's own index: `startxref`, then classic
//! `xref` sections and cross-reference streams (PDF 1.5+), chained through
//! `/Prev` and `/XRefStm`. Any inconsistency is an error; the caller then
//! falls back to [`crate::xref_reconstruction`].

use std::cell::OnceCell;
use std::collections::HashSet;

use byteorder::{BigEndian, ByteOrder};

use crate::decoders::{build_chain, FileSource};
use crate::error::{Error, Result};
use crate::lexer::{borrow_shared, SharedTokenizer, Token};
use crate::object::{Dict, NoResolve, Object, StreamObject};
use crate::parser::ObjectReader;
use crate::parser_config::ParserOptions;

/// Largest object number accepted from any xref source.
pub const MAX_OBJECT_ID: u32 = 8_388_607;

/// Generation that marks the head of the free list.
const FREE_HEAD_GEN: u16 = 65535;

/// Where an object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryKind {
    /// No section mentioned the object.
    #[default]
    Empty,
    /// Free (deleted) object.
    Free {
        /// Generation to use if the number is reused
        gen: u16,
    },
    /// Object stored at a file offset.
    Direct {
        /// Generation number
        gen: u16,
        /// Byte offset of `id gen obj`
        offset: u64,
    },
    /// Object stored inside an object stream. Carries no generation.
    Compressed {
        /// Object number of the containing stream
        stream_id: u32,
        /// Index of the object within the stream
        index: u32,
    },
}

impl EntryKind {
    fn generation(&self) -> Option<u16> {
        match *self {
            EntryKind::Free { gen } | EntryKind::Direct { gen, .. } => Some(gen),
            EntryKind::Compressed { .. } => Some(0),
            EntryKind::Empty => None,
        }
    }
}

/// One table slot: the location plus the cached value.
#[derive(Debug, Default)]
pub struct XRefEntry {
    kind: EntryKind,
    value: OnceCell<Object>,
}

impl XRefEntry {
    fn new(kind: EntryKind) -> Self {
        Self {
            kind,
            value: OnceCell::new(),
        }
    }

    /// Location of the object.
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// The value, if it has been read.
    pub fn cached(&self) -> Option<&Object> {
        self.value.get()
    }

    /// Store the value read for this entry. A value already cached is kept.
    pub(crate) fn cache(&self, value: Object) -> &Object {
        self.value.get_or_init(|| value)
    }
}

/// Cross-reference table indexed by object number.
#[derive(Debug, Default)]
pub struct XRefTable {
    entries: Vec<XRefEntry>,
}

impl XRefTable {
    /// Create a new empty cross-reference table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots (highest object number + 1).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get an entry by object number.
    pub fn get(&self, id: u32) -> Option<&XRefEntry> {
        self.entries.get(id as usize)
    }

    /// Location of object `id`; [`EntryKind::Empty`] when out of range.
    pub fn kind(&self, id: u32) -> EntryKind {
        self.get(id).map(XRefEntry::kind).unwrap_or_default()
    }

    /// All slots with their object numbers.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &XRefEntry)> + '_ {
        self.entries.iter().enumerate().map(|(i, e)| (i as u32, e))
    }

    fn put(&mut self, id: u32, kind: EntryKind) {
        if id > MAX_OBJECT_ID {
            log::warn!("ignoring xref entry for object {}: number too large", id);
            return;
        }
        let idx = id as usize;
        if idx >= self.entries.len() {
            self.entries.resize_with(idx + 1, XRefEntry::default);
        }
        self.entries[idx] = XRefEntry::new(kind);
    }

    /// Record an entry from a classic `xref` section.
    ///
    /// Sections are read newest first, so an existing entry is only replaced
    /// by one with a higher generation. Free-list heads and compressed
    /// entries are never replaced.
    pub fn set_classic(&mut self, id: u32, gen: u16, offset: u64, in_use: bool) {
        let current = self.kind(id);
        let replace = match current {
            EntryKind::Empty => true,
            EntryKind::Compressed { .. } => false,
            _ => gen != FREE_HEAD_GEN && current.generation().is_some_and(|g| g < gen),
        };
        if replace {
            let kind = if in_use {
                EntryKind::Direct { gen, offset }
            } else {
                EntryKind::Free { gen }
            };
            self.put(id, kind);
        }
    }

    /// Record an entry from a cross-reference stream. Only empty slots are
    /// filled.
    pub fn set_from_stream(&mut self, id: u32, kind: EntryKind) {
        if self.kind(id) == EntryKind::Empty {
            self.put(id, kind);
        }
    }

    /// Record an object header found by scanning the file. Later headers
    /// replace earlier ones unless their generation is lower.
    pub fn set_scanned(&mut self, id: u32, gen: u16, offset: u64) {
        let replace = match self.kind(id).generation() {
            None => true,
            Some(current) => current <= gen,
        };
        if replace {
            self.put(id, EntryKind::Direct { gen, offset });
        }
    }

    /// Drop every cached value.
    pub fn clear_cache(&mut self) {
        for entry in &mut self.entries {
            entry.value.take();
        }
    }

    /// `(id, gen, offset)` of every direct entry.
    pub fn direct_entries(&self) -> Vec<(u32, u16, u64)> {
        self.iter()
            .filter_map(|(id, e)| match e.kind() {
                EntryKind::Direct { gen, offset } => Some((id, gen, offset)),
                _ => None,
            })
            .collect()
    }
}

/// Everything the trusted reader recovers.
#[derive(Debug)]
pub struct XRefData {
    /// Merged table of all sections
    pub table: XRefTable,
    /// Merged trailer; the newest section wins
    pub trailer: Dict,
    /// Header version
    pub version: (u8, u8),
}

/// Parse a `major.minor` version string.
pub(crate) fn parse_version(text: &str) -> Option<(u8, u8)> {
    let (major, minor) = text.split_once('.')?;
    let minor: String = minor.chars().take_while(char::is_ascii_digit).collect();
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Keys of a cross-reference stream dictionary that describe the stream
/// itself and are not merged into the trailer.
pub(crate) const XREF_STREAM_ONLY_KEYS: &[&str] = &[
    "Length",
    "Filter",
    "DP",
    "DecodeParms",
    "Type",
    "W",
    "Index",
];

/// Read the xref the way the file describes it.
///
/// # Errors
///
/// Missing header, missing `startxref`, malformed sections, no `/Root`, or
/// (with `verify_xref`) a direct entry that does not point at its object.
pub fn read_trusted(shared: &SharedTokenizer, options: &ParserOptions) -> Result<XRefData> {
    let version = read_header(shared)?;
    let start = find_startxref(shared, options)?;
    log::debug!("startxref points at {}", start);

    let mut table = XRefTable::new();
    let mut trailer = Dict::new();
    let mut pending = vec![start];
    let mut visited = HashSet::new();

    while let Some(offset) = pending.pop() {
        if !visited.insert(offset) {
            log::debug!("xref section at {} already read", offset);
            continue;
        }

        let mut section = read_section(shared, options, offset, &mut table)?;

        if let Some(prev) = section.get("Prev") {
            pending.push(section_offset(prev, "Prev")?);
        }
        if let Some(stm) = section.shift_remove("XRefStm") {
            pending.push(section_offset(&stm, "XRefStm")?);
        }
        for (key, value) in section {
            trailer.entry(key).or_insert(value);
        }
    }

    if !trailer.contains_key("Root") {
        return Err(Error::InvalidXref("trailer has no /Root".to_string()));
    }
    if options.verify_xref {
        verify_xref(shared, &table)?;
    }

    Ok(XRefData {
        table,
        trailer,
        version,
    })
}

fn section_offset(value: &Object, key: &str) -> Result<u64> {
    value
        .as_integer()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| Error::InvalidXref(format!("invalid /{} offset", key)))
}

fn read_header(shared: &SharedTokenizer) -> Result<(u8, u8)> {
    let mut lexer = borrow_shared(shared)?;
    lexer.seek(0)?;
    match lexer.next_token() {
        Ok(Some(Token::Version(text))) => {
            parse_version(&text).ok_or_else(|| Error::InvalidHeader(format!("%PDF-{}", text)))
        },
        Ok(other) => Err(Error::InvalidHeader(format!("{:?}", other))),
        Err(e) => Err(Error::InvalidHeader(e.to_string())),
    }
}

/// Search backwards from the end of the file for `startxref <offset>`.
fn find_startxref(shared: &SharedTokenizer, options: &ParserOptions) -> Result<u64> {
    const KEYWORD: &[u8] = b"startxref";
    let mut lexer = borrow_shared(shared)?;
    let len = lexer.stream_len()?;
    let window = options.startxref_window.max(KEYWORD.len() as u64);
    let overlap = KEYWORD.len() as u64 - 1;

    let mut end = len;
    for _ in 0..options.startxref_max_windows {
        let start = end.saturating_sub(window);
        let read_end = (end + overlap).min(len);
        let mut buf = vec![0u8; (read_end - start) as usize];
        lexer.seek(start)?;
        let n = lexer.read(&mut buf)?;
        buf.truncate(n);

        if let Some(pos) = buf.windows(KEYWORD.len()).rposition(|w| w == KEYWORD) {
            lexer.seek(start + pos as u64)?;
            return match (lexer.next_token()?, lexer.next_token()?) {
                (Some(Token::StartXref), Some(Token::Integer(n))) if n >= 0 => Ok(n as u64),
                _ => Err(Error::InvalidXref("startxref without an offset".to_string())),
            };
        }
        if start == 0 {
            break;
        }
        end = start;
    }
    Err(Error::InvalidXref("startxref not found".to_string()))
}

/// Read one section (table or stream) into `table` and return its trailer.
pub(crate) fn read_section(
    shared: &SharedTokenizer,
    options: &ParserOptions,
    offset: u64,
    table: &mut XRefTable,
) -> Result<Dict> {
    let stream = {
        let mut lexer = borrow_shared(shared)?;
        lexer.seek(offset)?;
        match lexer.next_token()? {
            Some(Token::Xref) => {
                return read_classic_table(&mut ObjectReader::new(&mut *lexer, options), table);
            },
            Some(token @ Token::Integer(_)) => {
                lexer.put_back(token);
                let mut reader = ObjectReader::new(&mut *lexer, options);
                let (id, gen) = reader.read_object_header()?;
                match reader.read_value(id, gen)? {
                    Object::Stream(stream) => stream,
                    other => {
                        return Err(Error::InvalidXref(format!(
                            "object {} {} at {} is a {}, not an xref stream",
                            id,
                            gen,
                            offset,
                            other.type_name()
                        )))
                    },
                }
            },
            other => {
                return Err(Error::InvalidXref(format!(
                    "no xref section at offset {}: {:?}",
                    offset, other
                )))
            },
        }
    };

    read_xref_stream(shared, &stream, table)?;
    let mut trailer = stream.dict.clone();
    for key in XREF_STREAM_ONLY_KEYS {
        trailer.shift_remove(*key);
    }
    Ok(trailer)
}

fn expect_int<R: std::io::Read + std::io::Seek>(
    reader: &mut ObjectReader<'_, R>,
    what: &str,
) -> Result<i64> {
    match reader.read_value(0, 0)? {
        Object::Integer(n) => Ok(n),
        other => Err(Error::InvalidXref(format!(
            "expected {} in xref table, found {}",
            what,
            other.type_name()
        ))),
    }
}

/// Parse subsections after the `xref` keyword, then the trailer dictionary.
///
/// ```text
/// xref
/// 0 6
/// 0000000000 65535 f
/// 0000000018 00000 n
/// trailer
/// << /Size 6 /Root 1 0 R >>
/// ```
fn read_classic_table<R: std::io::Read + std::io::Seek>(
    reader: &mut ObjectReader<'_, R>,
    table: &mut XRefTable,
) -> Result<Dict> {
    loop {
        match reader.next_raw()? {
            Token::Trailer => break,
            Token::Integer(first) => {
                let count = reader.next_raw()?;
                let count = match count {
                    Token::Integer(n) if n >= 0 => n,
                    other => {
                        return Err(Error::InvalidXref(format!(
                            "bad subsection count {:?}",
                            other
                        )))
                    },
                };
                if first < 0 || first + count > i64::from(MAX_OBJECT_ID) + 1 {
                    return Err(Error::InvalidXref(format!(
                        "subsection {} {} out of range",
                        first, count
                    )));
                }
                for i in 0..count {
                    let offset = expect_int(reader, "offset")?;
                    let gen = expect_int(reader, "generation")?;
                    let in_use = match reader.next_raw()? {
                        t if t.is_command("n") => true,
                        t if t.is_command("f") => false,
                        other => {
                            return Err(Error::InvalidXref(format!(
                                "bad xref entry type {:?}",
                                other
                            )))
                        },
                    };
                    let (Ok(offset), Ok(gen)) = (u64::try_from(offset), u16::try_from(gen)) else {
                        return Err(Error::InvalidXref(format!(
                            "bad xref entry {} {}",
                            offset, gen
                        )));
                    };
                    table.set_classic((first + i) as u32, gen, offset, in_use);
                }
            },
            other => {
                return Err(Error::InvalidXref(format!("unexpected {:?} in xref table", other)))
            },
        }
    }

    match reader.read_value(0, 0)? {
        Object::Dictionary(dict) => Ok(dict.as_ref().clone()),
        other => Err(Error::InvalidXref(format!(
            "trailer is a {}, expected a dictionary",
            other.type_name()
        ))),
    }
}

fn field_width(value: &Object) -> Result<usize> {
    match value.as_integer().and_then(|n| usize::try_from(n).ok()) {
        Some(w) if w <= 8 => Ok(w),
        _ => Err(Error::InvalidXref(format!("bad /W entry {:?}", value))),
    }
}

/// Decode a cross-reference stream into `table`.
pub(crate) fn read_xref_stream(
    shared: &SharedTokenizer,
    stream: &StreamObject,
    table: &mut XRefTable,
) -> Result<()> {
    let dict = &stream.dict;
    let widths = dict
        .get("W")
        .and_then(Object::as_array)
        .ok_or_else(|| Error::InvalidXref("xref stream without /W".to_string()))?;
    if widths.len() != 3 {
        return Err(Error::InvalidXref(format!("/W has {} entries", widths.len())));
    }
    let w = [
        field_width(&widths[0])?,
        field_width(&widths[1])?,
        field_width(&widths[2])?,
    ];

    let size = dict
        .get("Size")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::InvalidXref("xref stream without /Size".to_string()))?;
    let mut ranges = Vec::new();
    match dict.get("Index").and_then(Object::as_array) {
        Some(index) => {
            for pair in index.chunks(2) {
                match (pair[0].as_integer(), pair.get(1).and_then(Object::as_integer)) {
                    (Some(first), Some(count)) if first >= 0 && count >= 0 => {
                        ranges.push((first, count))
                    },
                    _ => return Err(Error::InvalidXref("bad /Index array".to_string())),
                }
            }
        },
        None => ranges.push((0, size)),
    }

    let source = FileSource::new(shared.clone(), stream.offset, stream.length);
    let mut decoded = build_chain(Box::new(source), dict, &NoResolve)?;
    let mut record = vec![0u8; w.iter().sum()];

    for (first, count) in ranges {
        for id in first..first + count {
            let n = decoded.read_fully(&mut record)?;
            if n < record.len() {
                log::warn!("xref stream ended before object {}", id);
                return Ok(());
            }
            let Ok(id) = u32::try_from(id) else {
                return Err(Error::InvalidXref(format!("object number {} too large", id)));
            };

            let field = |i: usize, default: u64| -> u64 {
                if w[i] == 0 {
                    return default;
                }
                let start: usize = w[..i].iter().sum();
                BigEndian::read_uint(&record[start..start + w[i]], w[i])
            };
            match field(0, 1) {
                0 => {},
                1 => table.set_from_stream(
                    id,
                    EntryKind::Direct {
                        gen: field(2, 0) as u16,
                        offset: field(1, 0),
                    },
                ),
                2 => table.set_from_stream(
                    id,
                    EntryKind::Compressed {
                        stream_id: field(1, 0) as u32,
                        index: field(2, 0) as u32,
                    },
                ),
                other => log::warn!("unknown xref stream record type {} for object {}", other, id),
            }
        }
    }
    Ok(())
}

/// Check that each direct entry's offset starts with its object number.
pub fn verify_xref(shared: &SharedTokenizer, table: &XRefTable) -> Result<()> {
    let mut lexer = borrow_shared(shared)?;
    for (id, gen, offset) in table.direct_entries() {
        if offset == 0 && gen == 0 {
            continue;
        }
        lexer.seek(offset)?;
        match lexer.next_token() {
            Ok(Some(Token::Integer(n))) if n == i64::from(id) => {},
            _ => {
                return Err(Error::InvalidXref(format!(
                    "object {} is not at offset {}",
                    id, offset
                )))
            },
        }
    }
    Ok(())
}
