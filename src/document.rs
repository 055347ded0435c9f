//! PDF document model.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::rc::Rc;

use bytes::Bytes;

use crate::decoders::{build_chain, BoxedDecoder, DecodedStream, FileSource};
use crate::error::{Error, Result};
use crate::lexer::{borrow_shared, ReadSeek, SharedTokenizer, Tokenizer};
use crate::object::{Object, ObjectRef, Resolver};
use crate::objstm::ObjectStream;
use crate::parser::ObjectReader;
use crate::parser_config::ParserOptions;
use crate::security::{create_handler, SecurityHandler};
use crate::xref::{parse_version, read_trusted, EntryKind, XRefData, XRefTable};
use crate::xref_reconstruction::reconstruct_xref;

/// PDF document.
///
/// This structure represents an open PDF document, providing access to:
/// - Document metadata (version, catalog, trailer, info, file ID)
/// - Page information (count, page tree)
/// - Object loading and dereferencing
/// - Decoded stream contents
///
/// Objects are read lazily and cached in the xref table; every accessor
/// takes `&self`. A document is meant to be used from one thread.
///
/// # Example
///
/// ```no_run
/// use pdf_oxide_reader::document::PdfDocument;
///
/// let doc = PdfDocument::open("sample.pdf")?;
/// println!("PDF version: {}.{}", doc.version().0, doc.version().1);
/// println!("Page count: {}", doc.page_count());
/// # Ok::<(), pdf_oxide_reader::error::Error>(())
/// ```
pub struct PdfDocument {
    /// Tokenizer over the file, shared with file-backed stream sources
    reader: SharedTokenizer,
    options: ParserOptions,
    /// PDF version (major, minor)
    version: (u8, u8),
    /// Cross-reference table mapping object IDs to locations and cached values
    xref: XRefTable,
    /// Trailer dictionary
    trailer: Object,
    catalog: Object,
    page_count: usize,
    root_loaded: bool,
    /// Pages found so far, by index
    pages: RefCell<HashMap<usize, Object>>,
    /// Decoded object streams; `None` marks a container that failed to load
    object_streams: RefCell<HashMap<u32, Option<Rc<ObjectStream>>>>,
    /// Containers being decoded (for cycle detection)
    loading: RefCell<HashSet<u32>>,
    security: Option<Box<dyn SecurityHandler>>,
    parse_count: Cell<usize>,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("version", &self.version)
            .field("xref_entries", &self.xref.len())
            .field("page_count", &self.page_count)
            .field("encrypted", &self.is_encrypted())
            .field("parsed_objects", &self.parse_count.get())
            .finish_non_exhaustive()
    }
}

impl PdfDocument {
    /// Open a PDF document from a file path.
    ///
    /// This function:
    /// 1. Opens the file
    /// 2. Reads the header version and the cross-reference data, rebuilding
    ///    the table by scanning the file if the trusted chain is damaged
    /// 3. Sets up decryption when the trailer has `/Encrypt`
    /// 4. Loads the catalog and the page count
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be opened
    /// - No trailer with a usable `/Root` can be found, even by reconstruction
    /// - The `/Encrypt` dictionary is invalid
    /// - The catalog or its `/Pages` is not a dictionary
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pdf_oxide_reader::document::PdfDocument;
    ///
    /// let doc = PdfDocument::open("sample.pdf")?;
    /// # Ok::<(), pdf_oxide_reader::error::Error>(())
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ParserOptions::default())
    }

    /// Open a file with explicit parser options.
    pub fn open_with_options(path: impl AsRef<Path>, options: ParserOptions) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(Box::new(file), options)
    }

    /// Open a document held in memory.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Result<Self> {
        Self::from_bytes_with_options(data, ParserOptions::default())
    }

    /// Open a document held in memory with explicit parser options.
    pub fn from_bytes_with_options(data: impl Into<Vec<u8>>, options: ParserOptions) -> Result<Self> {
        Self::from_reader(Box::new(Cursor::new(data.into())), options)
    }

    fn from_reader(reader: Box<dyn ReadSeek>, options: ParserOptions) -> Result<Self> {
        let reader: SharedTokenizer = Rc::new(RefCell::new(Tokenizer::new(reader)));

        let XRefData {
            table,
            trailer,
            version,
        } = match read_trusted(&reader, &options) {
            Ok(data) => data,
            Err(e) if options.allow_reconstruction => {
                log::warn!("damaged file, reconstructing: {}", e);
                reconstruct_xref(&reader, &options)?
            },
            Err(e) => return Err(e),
        };

        let mut doc = Self {
            reader,
            options,
            version,
            xref: table,
            trailer: Object::dict(trailer),
            catalog: Object::Null,
            page_count: 0,
            root_loaded: false,
            pages: RefCell::new(HashMap::new()),
            object_streams: RefCell::new(HashMap::new()),
            loading: RefCell::new(HashSet::new()),
            security: None,
            parse_count: Cell::new(0),
        };

        if let Some(encrypt) = doc.trailer.get("Encrypt") {
            let encrypt = doc.resolve(encrypt);
            doc.security = create_handler(&encrypt)?;
            if let Some(handler) = doc.security.as_mut() {
                if !handler.unlock(b"") {
                    log::info!("document needs a password");
                }
            }
        }

        if doc.security.as_ref().map_or(true, |h| h.is_unlocked()) {
            doc.load_root()?;
        }
        Ok(doc)
    }

    fn load_root(&mut self) -> Result<()> {
        let root = self
            .trailer
            .get("Root")
            .cloned()
            .ok_or_else(|| Error::InvalidPdf("trailer has no /Root".to_string()))?;
        let catalog = self.resolve(&root);
        if catalog.as_dict().is_none() {
            return Err(Error::InvalidObjectType {
                expected: "Dictionary".to_string(),
                found: catalog.type_name().to_string(),
            });
        }

        if let Some(version) = catalog
            .get_resolved("Version", self)
            .as_name()
            .and_then(parse_version)
        {
            if version > self.version {
                log::debug!("catalog raises version to {}.{}", version.0, version.1);
                self.version = version;
            }
        }

        let pages = catalog.get_resolved("Pages", self);
        if pages.as_dict().is_none() {
            return Err(Error::InvalidPdf(format!(
                "catalog /Pages is a {}, expected a dictionary",
                pages.type_name()
            )));
        }
        let count = self.node_count(&pages, 0);

        self.catalog = catalog;
        self.page_count = count;
        self.pages.borrow_mut().clear();
        self.root_loaded = true;
        Ok(())
    }

    /// PDF version (major, minor).
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// The merged trailer dictionary.
    pub fn trailer(&self) -> &Object {
        &self.trailer
    }

    /// The document catalog; `Null` while an encrypted document is locked.
    pub fn catalog(&self) -> &Object {
        &self.catalog
    }

    /// The trailer's `/Info` dictionary.
    pub fn info(&self) -> Option<Object> {
        let info = self.trailer.get_resolved("Info", self);
        info.as_dict().is_some().then_some(info)
    }

    /// The two halves of the trailer's `/ID`.
    pub fn file_id(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        let id = self.trailer.get_resolved("ID", self);
        let first = id.index_resolved(0, self);
        let second = id.index_resolved(1, self);
        Some((first.as_string()?.to_vec(), second.as_string()?.to_vec()))
    }

    /// True if the trailer has an `/Encrypt` entry.
    pub fn is_encrypted(&self) -> bool {
        self.trailer.get("Encrypt").is_some()
    }

    /// Try a password with the installed security handler.
    ///
    /// Loads the catalog the first time a password is accepted. Without a
    /// handler there is nothing to unlock and the result is `true`.
    ///
    /// # Errors
    ///
    /// The password was accepted but the catalog cannot be loaded.
    pub fn unlock(&mut self, password: &[u8]) -> Result<bool> {
        let unlocked = match self.security.as_mut() {
            Some(handler) => handler.unlock(password),
            None => true,
        };
        if unlocked && !self.root_loaded {
            self.load_root()?;
        }
        Ok(unlocked)
    }

    /// Install a handler for this document's encryption.
    ///
    /// Values read so far are dropped so they are read again through the
    /// handler. Call [`PdfDocument::unlock`] afterwards.
    pub fn set_security_handler(&mut self, handler: Box<dyn SecurityHandler>) {
        self.security = Some(handler);
        self.xref.clear_cache();
        self.object_streams.borrow_mut().clear();
        self.pages.borrow_mut().clear();
        self.catalog = Object::Null;
        self.page_count = 0;
        self.root_loaded = false;
    }

    /// The cross-reference table.
    pub fn xref(&self) -> &XRefTable {
        &self.xref
    }

    /// Number of objects parsed from the file or from object streams so far.
    pub fn parsed_object_count(&self) -> usize {
        self.parse_count.get()
    }

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// The page dictionary at `index`, or `None` if the page tree does not
    /// lead to one.
    pub fn page(&self, index: usize) -> Option<Object> {
        if index >= self.page_count {
            return None;
        }
        if let Some(page) = self.pages.borrow().get(&index) {
            return Some(page.clone());
        }
        let page = self.find_page(index)?;
        self.pages.borrow_mut().insert(index, page.clone());
        Some(page)
    }

    fn find_page(&self, index: usize) -> Option<Object> {
        let root = self.catalog.get("Pages")?;
        let mut visited = HashSet::new();
        if let Some(r) = root.as_reference() {
            visited.insert(r);
        }
        let mut node = self.resolve(root);
        let mut remaining = index;

        for depth in 0..self.options.max_page_tree_depth {
            let kids = node.get_resolved("Kids", self);
            let mut next = None;
            for kid_ref in kids.as_array()? {
                let kid = self.resolve(kid_ref);
                match kid.get_resolved("Type", self).as_name() {
                    Some("Page") => {
                        if remaining == 0 {
                            return Some(kid);
                        }
                        remaining -= 1;
                    },
                    Some("Pages") => {
                        let count = self.node_count(&kid, depth + 1);
                        if remaining < count {
                            next = Some((kid, kid_ref.as_reference()));
                            break;
                        }
                        remaining -= count;
                    },
                    _ => {
                        log::warn!("page tree node without /Type /Page or /Pages: {:?}", kid_ref);
                        return None;
                    },
                }
            }

            let (kid, kid_ref) = next?;
            if let Some(r) = kid_ref {
                if !visited.insert(r) {
                    log::warn!("page tree cycle at {}", r);
                    return None;
                }
            }
            node = kid;
        }
        log::warn!("page tree deeper than {}", self.options.max_page_tree_depth);
        None
    }

    /// Pages under `node`: its `/Count`, or counted when that is missing.
    fn node_count(&self, node: &Object, depth: usize) -> usize {
        match node.get_resolved("Count", self).to_i64() {
            Some(n) if n >= 0 => n as usize,
            _ => self.count_pages(node, depth, &mut HashSet::new()),
        }
    }

    fn count_pages(&self, node: &Object, depth: usize, visited: &mut HashSet<ObjectRef>) -> usize {
        if depth >= self.options.max_page_tree_depth {
            log::warn!("page tree deeper than {}", self.options.max_page_tree_depth);
            return 0;
        }
        let kids = node.get_resolved("Kids", self);
        let mut total = 0;
        for kid_ref in kids.as_array().unwrap_or_default() {
            if let Some(r) = kid_ref.as_reference() {
                if !visited.insert(r) {
                    log::warn!("page tree cycle at {}", r);
                    continue;
                }
            }
            let kid = self.resolve(kid_ref);
            match kid.get_resolved("Type", self).as_name() {
                Some("Page") => total += 1,
                Some("Pages") => total += self.count_pages(&kid, depth + 1, visited),
                _ => {},
            }
        }
        total
    }

    /// Value of object `id`/`gen`, read on first use.
    ///
    /// Missing, free, stale (generation mismatch) and unreadable objects are
    /// all `Null`; read failures are logged.
    pub fn get_object(&self, id: u32, gen: u16) -> Object {
        let Some(entry) = self.xref.get(id) else {
            return Object::Null;
        };
        let loaded = match entry.kind() {
            EntryKind::Direct { gen: g, offset } => {
                if g != gen {
                    log::debug!("stale reference {} {} R (table has generation {})", id, gen, g);
                    return Object::Null;
                }
                if let Some(value) = entry.cached() {
                    return value.clone();
                }
                self.load_direct(id, gen, offset)
            },
            EntryKind::Compressed { stream_id, index } => {
                if gen != 0 {
                    log::debug!("stale reference {} {} R to a compressed object", id, gen);
                    return Object::Null;
                }
                if let Some(value) = entry.cached() {
                    return value.clone();
                }
                self.load_compressed(id, stream_id, index)
            },
            EntryKind::Free { .. } | EntryKind::Empty => return Object::Null,
        };

        match loaded {
            Ok(value) => entry.cache(value).clone(),
            Err(e) => {
                log::warn!("cannot read object {} {}: {}", id, gen, e);
                Object::Null
            },
        }
    }

    fn load_direct(&self, id: u32, gen: u16, offset: u64) -> Result<Object> {
        self.parse_count.set(self.parse_count.get() + 1);
        let mut lexer = borrow_shared(&self.reader)?;
        ObjectReader::new(&mut *lexer, &self.options)
            .with_xref(&self.xref)
            .with_security(self.security.as_deref())
            .read_indirect(offset, id, gen)
    }

    fn load_compressed(&self, id: u32, stream_id: u32, index: u32) -> Result<Object> {
        let container = self.object_stream(stream_id)?;
        let index = match container.object_id(index as usize) {
            Some(found) if found == id => index as usize,
            _ => {
                log::warn!(
                    "object {} is not at index {} of object stream {}",
                    id,
                    index,
                    stream_id
                );
                container.index_of(id).ok_or(Error::ObjectNotFound(id, 0))?
            },
        };
        self.parse_count.set(self.parse_count.get() + 1);
        container.object_at(index, &self.options)
    }

    /// The decoded container `stream_id`, decoded once.
    fn object_stream(&self, stream_id: u32) -> Result<Rc<ObjectStream>> {
        if let Some(loaded) = self.object_streams.borrow().get(&stream_id) {
            return loaded.clone().ok_or_else(|| {
                Error::InvalidPdf(format!("object stream {} is unreadable", stream_id))
            });
        }
        if !self.loading.borrow_mut().insert(stream_id) {
            return Err(Error::CircularReference(ObjectRef::new(stream_id, 0)));
        }
        let result = self.decode_object_stream(stream_id);
        self.loading.borrow_mut().remove(&stream_id);

        let loaded = result.map(Rc::new);
        self.object_streams
            .borrow_mut()
            .insert(stream_id, loaded.as_ref().ok().cloned());
        loaded
    }

    fn decode_object_stream(&self, stream_id: u32) -> Result<ObjectStream> {
        let container = match self.xref.kind(stream_id) {
            EntryKind::Direct { gen, .. } => self.get_object(stream_id, gen),
            _ => Object::Null,
        };
        let stream = container.as_stream().ok_or_else(|| Error::InvalidObjectType {
            expected: "Stream".to_string(),
            found: container.type_name().to_string(),
        })?;

        let header_value = |key: &str| -> Result<usize> {
            stream
                .dict
                .get(key)
                .map(|v| self.resolve(v))
                .and_then(|v| v.to_i64())
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| {
                    Error::InvalidPdf(format!("object stream {} has no valid /{}", stream_id, key))
                })
        };
        let n = header_value("N")?;
        let first = header_value("First")?;

        let data = self.read_stream_all(&container)?;
        log::debug!("object stream {}: {} objects, {} bytes", stream_id, n, data.len());
        ObjectStream::parse(Bytes::from(data), n, first)
    }

    /// Read every object: direct entries in file order, then compressed
    /// entries grouped by container.
    pub fn preload(&self) {
        let mut direct = self.xref.direct_entries();
        direct.sort_by_key(|&(_, _, offset)| offset);
        for (id, gen, _) in direct {
            self.get_object(id, gen);
        }

        let mut compressed: Vec<(u32, u32, u32)> = self
            .xref
            .iter()
            .filter_map(|(id, e)| match e.kind() {
                EntryKind::Compressed { stream_id, index } => Some((stream_id, index, id)),
                _ => None,
            })
            .collect();
        compressed.sort_unstable();
        for (_, _, id) in compressed {
            self.get_object(id, 0);
        }
    }

    /// Build the decoder chain for a stream value (or a reference to one).
    ///
    /// # Errors
    ///
    /// `obj` is not a stream, or the filter list cannot be decoded.
    pub fn stream(&self, obj: &Object) -> Result<DecodedStream> {
        let resolved = self.resolve(obj);
        let stream = resolved.as_stream().ok_or_else(|| Error::InvalidObjectType {
            expected: "Stream".to_string(),
            found: resolved.type_name().to_string(),
        })?;

        let mut source: BoxedDecoder =
            Box::new(FileSource::new(self.reader.clone(), stream.offset, stream.length));
        if let Some(handler) = &self.security {
            let is_metadata =
                stream.dict.get("Type").and_then(Object::as_name) == Some("Metadata");
            source = handler.create_stream_decrypter(is_metadata, stream.id, stream.gen, source);
        }
        build_chain(source, &stream.dict, self)
    }

    /// Decode a whole stream into memory, bounded by `max_decompressed_size`.
    pub fn read_stream_all(&self, obj: &Object) -> Result<Vec<u8>> {
        self.stream(obj)?.read_all(self.options.max_decompressed_size)
    }
}

impl Resolver for PdfDocument {
    fn resolve(&self, obj: &Object) -> Object {
        match obj {
            Object::Reference(r) => self.get_object(r.id, r.gen),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_pdf(bodies: &[&str], trailer_extra: &str) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in bodies.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", bodies.len() + 1).as_bytes());
        for off in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R {} >>\nstartxref\n{}\n%%EOF\n",
                bodies.len() + 1,
                trailer_extra,
                xref
            )
            .as_bytes(),
        );
        out
    }

    fn simple_doc() -> PdfDocument {
        PdfDocument::from_bytes(build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R /Version /1.6 >>",
                "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>",
                "<< /Type /Page /Parent 2 0 R /Name (first) >>",
                "<< /Type /Page /Parent 2 0 R /Name (second) >>",
            ],
            "",
        ))
        .unwrap()
    }

    #[test]
    fn test_open_simple_document() {
        let doc = simple_doc();
        assert_eq!(doc.version(), (1, 6));
        assert_eq!(doc.page_count(), 2);
        assert!(!doc.is_encrypted());
        assert_eq!(doc.catalog().get("Type").unwrap().as_name(), Some("Catalog"));
    }

    #[test]
    fn test_page_lookup() {
        let doc = simple_doc();
        let second = doc.page(1).unwrap();
        assert_eq!(second.get("Name"), Some(&Object::string(b"second")));
        assert!(doc.page(2).is_none());
    }

    #[test]
    fn test_get_object_caches() {
        let doc = simple_doc();
        let before = doc.parsed_object_count();
        let a = doc.get_object(3, 0);
        let after_first = doc.parsed_object_count();
        let b = doc.get_object(3, 0);
        assert_eq!(a, b);
        assert_eq!(after_first, before + 1);
        assert_eq!(doc.parsed_object_count(), after_first);
    }

    #[test]
    fn test_stale_and_missing_references() {
        let doc = simple_doc();
        assert!(doc.get_object(3, 1).is_null());
        assert!(doc.get_object(0, 65535).is_null());
        assert!(doc.get_object(99, 0).is_null());
        assert!(doc.resolve(&Object::reference(4, 7)).is_null());
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let data = build_pdf(&["<< /Type /Pages /Kids [] /Count 0 >>"], "");
        let text = String::from_utf8(data).unwrap().replace("/Root 1 0 R", "");
        let result = PdfDocument::from_bytes_with_options(text, ParserOptions::strict());
        assert!(result.is_err());
    }

    #[test]
    fn test_catalog_must_be_dictionary() {
        let data = build_pdf(&["42"], "");
        assert!(PdfDocument::from_bytes(data).is_err());
    }

    #[test]
    fn test_unknown_encryption_filter_reads_as_stored() {
        let data = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [] /Count 0 >>",
                "<< /Filter /Unknown /V 1 >>",
            ],
            "/Encrypt 3 0 R",
        );
        let doc = PdfDocument::from_bytes(data).unwrap();
        assert!(doc.is_encrypted());
        assert_eq!(doc.page_count(), 0);
    }

    #[test]
    fn test_invalid_encrypt_is_fatal() {
        let data = build_pdf(
            &["<< /Type /Catalog /Pages 2 0 R >>", "<< /Type /Pages /Kids [] /Count 0 >>"],
            "/Encrypt 5",
        );
        assert!(matches!(
            PdfDocument::from_bytes(data),
            Err(Error::InvalidEncryption(_))
        ));
    }
}
