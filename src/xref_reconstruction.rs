//! Cross-reference table reconstruction for damaged PDFs.
//!
//! When the xref table is corrupted, missing, or incomplete, the table is
//! rebuilt by scanning the entire PDF file line by line for object markers
//! and `trailer` keywords.
//!
//! This is a fallback mechanism used only when the trusted reader fails. It
//! never gives up part way: whatever it finds is returned, and the caller
//! decides whether a usable `/Root` came out of it.

use lazy_static::lazy_static;
use regex::bytes::Regex;

use crate::error::Result;
use crate::lexer::{borrow_shared, SharedTokenizer};
use crate::object::{Dict, Object, StreamObject};
use crate::parser::ObjectReader;
use crate::parser_config::ParserOptions;
use crate::xref::{
    parse_version, read_section, read_xref_stream, XRefData, XRefTable, XREF_STREAM_ONLY_KEYS,
};

lazy_static! {
    /// `N G obj` at the start of a line
    static ref RE_OBJ_HEADER: Regex =
        Regex::new(r"^\s*(\d+)\s+(\d+)\s+obj(?:$|[\s\x00()<>\[\]{}/%])").unwrap();

    static ref RE_VERSION: Regex = Regex::new(r"%PDF-(\d\.\d+)").unwrap();

    static ref RE_TRAILER: Regex = Regex::new(r"^trailer").unwrap();
}

/// Version reported when no header line is found.
const DEFAULT_VERSION: (u8, u8) = (1, 0);

/// Rebuild the xref by scanning the file.
///
/// Every `N G obj` line registers object N at the line's offset (the highest
/// generation wins, and among equal generations the last one). Every
/// `trailer` dictionary is merged into the result, later keys replacing
/// earlier ones.
///
/// # Errors
///
/// Only I/O failures. A file with no objects yields an empty table.
pub fn reconstruct_xref(shared: &SharedTokenizer, options: &ParserOptions) -> Result<XRefData> {
    log::info!("Reconstructing xref table by scanning file...");

    let mut table = XRefTable::new();
    let mut trailer = Dict::new();
    let mut version = None;

    {
        let mut lexer = borrow_shared(shared)?;
        lexer.seek(0)?;
        loop {
            let pos = lexer.tell()?;
            let Some(line) = lexer.read_line()? else {
                break;
            };

            if version.is_none() {
                version = RE_VERSION
                    .captures(&line)
                    .and_then(|caps| parse_version(&String::from_utf8_lossy(&caps[1])));
            }

            if let Some(caps) = RE_OBJ_HEADER.captures(&line) {
                let id = std::str::from_utf8(&caps[1]).ok().and_then(|s| s.parse::<u32>().ok());
                let gen = std::str::from_utf8(&caps[2]).ok().and_then(|s| s.parse::<u16>().ok());
                if let (Some(id), Some(gen)) = (id, gen) {
                    table.set_scanned(id, gen, pos);
                }
                continue;
            }

            if RE_TRAILER.is_match(&line) {
                let next_line = lexer.tell()?;
                lexer.seek(pos + 7)?;
                match ObjectReader::new(&mut *lexer, options).read_value(0, 0) {
                    Ok(Object::Dictionary(dict)) => {
                        for (key, value) in dict.iter() {
                            trailer.insert(key.clone(), value.clone());
                        }
                    },
                    Ok(other) => log::warn!("trailer at {} is a {}", pos, other.type_name()),
                    Err(e) => log::warn!("unreadable trailer at {}: {}", pos, e),
                }
                // the dictionary lines hold no object headers; rescanning them is harmless
                lexer.seek(next_line)?;
            }
        }
    }
    log::info!("Reconstruction found {} object slots", table.len());

    // hybrid files keep compressed entries in the stream named by /XRefStm
    if let Some(offset) = trailer.get("XRefStm").and_then(Object::as_integer) {
        match u64::try_from(offset) {
            Ok(offset) => {
                if let Err(e) = read_section(shared, options, offset, &mut table) {
                    log::warn!("ignoring /XRefStm at {}: {}", offset, e);
                }
            },
            Err(_) => log::warn!("ignoring negative /XRefStm {}", offset),
        }
    }

    if !trailer.contains_key("Root") {
        recover_root(shared, options, &mut table, &mut trailer)?;
    }

    Ok(XRefData {
        table,
        trailer,
        version: version.unwrap_or(DEFAULT_VERSION),
    })
}

/// Look through the recovered objects for cross-reference streams and a
/// catalog, for files whose trailer was lost or never existed.
fn recover_root(
    shared: &SharedTokenizer,
    options: &ParserOptions,
    table: &mut XRefTable,
    trailer: &mut Dict,
) -> Result<()> {
    let mut xref_streams: Vec<std::rc::Rc<StreamObject>> = Vec::new();
    let mut catalog = None;

    {
        let mut lexer = borrow_shared(shared)?;
        for (id, gen, offset) in table.direct_entries() {
            let value = ObjectReader::new(&mut *lexer, options)
                .with_xref(table)
                .read_indirect(offset, id, gen);
            let Ok(value) = value else {
                continue;
            };
            match value.get("Type").and_then(Object::as_name) {
                Some("XRef") => {
                    if let Object::Stream(stream) = value {
                        xref_streams.push(stream);
                    }
                },
                Some("Catalog") if catalog.is_none() => catalog = Some((id, gen)),
                _ => {},
            }
        }
    }

    // newest stream last in the file; its keys win
    for stream in xref_streams.iter().rev() {
        if let Err(e) = read_xref_stream(shared, stream, table) {
            log::warn!("skipping xref stream {} {}: {}", stream.id, stream.gen, e);
            continue;
        }
        for (key, value) in stream.dict.iter() {
            if !XREF_STREAM_ONLY_KEYS.contains(&key.as_str()) {
                trailer.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }

    if !trailer.contains_key("Root") {
        if let Some((id, gen)) = catalog {
            log::warn!("no trailer /Root; using catalog object {} {}", id, gen);
            trailer.insert("Root".to_string(), Object::reference(id, gen));
            trailer.insert("Size".to_string(), Object::Integer(table.len() as i64));
        }
    }
    Ok(())
}
