//! PDF object types.
//!
//! [`Object`] is a closed sum over the PDF value kinds. Scalars, references and
//! short names/strings live inline; arrays, dictionaries and streams sit behind
//! an [`Rc`] and are shared by every clone of the value. Shared payloads are
//! never mutated after construction.
//!
//! Values carry no pointer back to their document. Accessors that need to
//! follow indirect references take a [`Resolver`] (normally the
//! [`crate::document::PdfDocument`]) and resolve exactly one level.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use indexmap::IndexMap;

/// Dictionary storage. Keys are unique; iteration follows insertion order.
pub type Dict = IndexMap<String, Object>;

const INLINE_CAPACITY: usize = 7;

/// Byte payload of a name or string.
///
/// Payloads of up to seven bytes are stored inline; longer ones are shared.
#[derive(Clone)]
pub struct PdfBytes(Repr);

#[derive(Clone)]
enum Repr {
    Inline { len: u8, data: [u8; INLINE_CAPACITY] },
    Shared(Rc<[u8]>),
}

impl PdfBytes {
    /// Copy `bytes` into a new payload.
    pub fn new(bytes: &[u8]) -> Self {
        if bytes.len() <= INLINE_CAPACITY {
            let mut data = [0u8; INLINE_CAPACITY];
            data[..bytes.len()].copy_from_slice(bytes);
            PdfBytes(Repr::Inline {
                len: bytes.len() as u8,
                data,
            })
        } else {
            PdfBytes(Repr::Shared(Rc::from(bytes)))
        }
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.0 {
            Repr::Inline { len, data } => &data[..*len as usize],
            Repr::Shared(rc) => rc,
        }
    }

    /// True when the payload lives inline (no heap allocation).
    pub fn is_inline(&self) -> bool {
        matches!(self.0, Repr::Inline { .. })
    }

    fn heap_size(&self) -> usize {
        match &self.0 {
            Repr::Inline { .. } => 0,
            Repr::Shared(rc) => rc.len(),
        }
    }
}

impl Deref for PdfBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<&[u8]> for PdfBytes {
    fn from(bytes: &[u8]) -> Self {
        PdfBytes::new(bytes)
    }
}

impl From<Vec<u8>> for PdfBytes {
    fn from(bytes: Vec<u8>) -> Self {
        PdfBytes::new(&bytes)
    }
}

impl From<&str> for PdfBytes {
    fn from(s: &str) -> Self {
        PdfBytes::new(s.as_bytes())
    }
}

impl PartialEq for PdfBytes {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for PdfBytes {}

impl PartialOrd for PdfBytes {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PdfBytes {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl std::hash::Hash for PdfBytes {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl fmt::Debug for PdfBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

/// A stream value: its dictionary and where its raw bytes live in the file.
///
/// Content is not held here; it is produced on demand by a decoder chain.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamObject {
    /// Stream dictionary
    pub dict: Dict,
    /// File offset of the first data byte
    pub offset: u64,
    /// Number of raw data bytes
    pub length: u64,
    /// Object number the stream was read from
    pub id: u32,
    /// Generation the stream was read from
    pub gen: u16,
}

/// PDF object representation.
#[derive(Debug, Clone, Default)]
pub enum Object {
    /// Null object
    #[default]
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// Name (without the leading /)
    Name(PdfBytes),
    /// String (byte array)
    String(PdfBytes),
    /// Indirect object reference
    Reference(ObjectRef),
    /// Array of objects
    Array(Rc<Vec<Object>>),
    /// Dictionary (key-value pairs)
    Dictionary(Rc<Dict>),
    /// Stream (dictionary + file location)
    Stream(Rc<StreamObject>),
}

/// Something that can turn an indirect reference into its value.
pub trait Resolver {
    /// Resolve `obj` one level. Non-references are returned unchanged,
    /// dangling references become [`Object::Null`].
    fn resolve(&self, obj: &Object) -> Object;
}

/// Resolver that never follows references.
///
/// Used where indirect values are not permitted, e.g. xref stream dictionaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolve;

impl Resolver for NoResolve {
    fn resolve(&self, obj: &Object) -> Object {
        obj.clone()
    }
}

impl Object {
    /// Build a name object.
    pub fn name(name: &str) -> Self {
        Object::Name(PdfBytes::from(name))
    }

    /// Build a string object.
    pub fn string(bytes: &[u8]) -> Self {
        Object::String(PdfBytes::new(bytes))
    }

    /// Build an array object.
    pub fn array(items: Vec<Object>) -> Self {
        Object::Array(Rc::new(items))
    }

    /// Build a dictionary object.
    pub fn dict(dict: Dict) -> Self {
        Object::Dictionary(Rc::new(dict))
    }

    /// Build a reference object.
    pub fn reference(id: u32, gen: u16) -> Self {
        Object::Reference(ObjectRef::new(id, gen))
    }

    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream(_) => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// True for Integer and Real.
    pub fn is_number(&self) -> bool {
        matches!(self, Object::Integer(_) | Object::Real(_))
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to cast to real. Only matches `Real`; see [`Object::as_number`].
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Numeric value of an Integer or Real.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Integer value of an Integer or Real (reals are truncated).
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            Object::Real(r) => Some(*r as i64),
            _ => None,
        }
    }

    /// Try to cast to name. Names that are not valid UTF-8 return `None`;
    /// use [`Object::as_name_bytes`] for those.
    pub fn as_name(&self) -> Option<&str> {
        self.as_name_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Raw bytes of a name.
    pub fn as_name_bytes(&self) -> Option<&[u8]> {
        match self {
            Object::Name(n) => Some(n.as_bytes()),
            _ => None,
        }
    }

    /// Try to cast to string (raw bytes).
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Decode a string as a PDF text string.
    ///
    /// A leading FE FF selects UTF-16BE, anything else is PDFDocEncoding.
    pub fn as_unicode_string(&self) -> Option<String> {
        self.as_string().map(decode_text_string)
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&[Object]> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both Dictionary and Stream objects.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    /// Try to cast to stream.
    pub fn as_stream(&self) -> Option<&StreamObject> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Raw dictionary lookup (no resolution).
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Dictionary lookup resolving one level of indirection.
    ///
    /// Missing keys and non-dictionaries yield `Null`.
    pub fn get_resolved(&self, key: &str, resolver: &dyn Resolver) -> Object {
        match self.get(key) {
            Some(value) => resolver.resolve(value),
            None => Object::Null,
        }
    }

    /// Array element lookup resolving one level of indirection.
    pub fn index_resolved(&self, index: usize, resolver: &dyn Resolver) -> Object {
        match self.as_array().and_then(|a| a.get(index)) {
            Some(value) => resolver.resolve(value),
            None => Object::Null,
        }
    }

    /// Iterate an array's elements, resolving each one level.
    pub fn iter_resolved<'a>(
        &'a self,
        resolver: &'a dyn Resolver,
    ) -> impl Iterator<Item = Object> + 'a {
        self.as_array()
            .unwrap_or(&[])
            .iter()
            .map(move |item| resolver.resolve(item))
    }

    /// Iterate a dictionary's entries, resolving each value one level.
    pub fn entries_resolved<'a>(
        &'a self,
        resolver: &'a dyn Resolver,
    ) -> impl Iterator<Item = (&'a str, Object)> + 'a {
        self.as_dict()
            .into_iter()
            .flat_map(|d| d.iter())
            .map(move |(k, v)| (k.as_str(), resolver.resolve(v)))
    }

    /// Approximate memory footprint of this value in bytes.
    ///
    /// Heap payloads reachable more than once through the same `Rc` are
    /// counted a single time.
    pub fn mem_size(&self) -> usize {
        let mut seen = HashSet::new();
        self.mem_size_inner(&mut seen)
    }

    fn mem_size_inner(&self, seen: &mut HashSet<*const ()>) -> usize {
        let own = std::mem::size_of::<Object>();
        match self {
            Object::Name(b) | Object::String(b) => own + b.heap_size(),
            Object::Array(arr) => {
                if !seen.insert(Rc::as_ptr(arr) as *const ()) {
                    return own;
                }
                own + arr.iter().map(|o| o.mem_size_inner(seen)).sum::<usize>()
            },
            Object::Dictionary(dict) => {
                if !seen.insert(Rc::as_ptr(dict) as *const ()) {
                    return own;
                }
                own + dict_mem_size(dict, seen)
            },
            Object::Stream(stream) => {
                if !seen.insert(Rc::as_ptr(stream) as *const ()) {
                    return own;
                }
                own + std::mem::size_of::<StreamObject>() + dict_mem_size(&stream.dict, seen)
            },
            _ => own,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Object::Null => 0,
            Object::Boolean(_) => 1,
            Object::Integer(_) | Object::Real(_) => 2,
            Object::Name(_) => 3,
            Object::String(_) => 4,
            Object::Reference(_) => 5,
            Object::Array(_) => 6,
            Object::Dictionary(_) => 7,
            Object::Stream(_) => 8,
        }
    }
}

fn dict_mem_size(dict: &Dict, seen: &mut HashSet<*const ()>) -> usize {
    dict.iter()
        .map(|(k, v)| k.len() + v.mem_size_inner(seen))
        .sum()
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Object::Null, Object::Null) => true,
            (Object::Boolean(a), Object::Boolean(b)) => a == b,
            (Object::Integer(a), Object::Integer(b)) => a == b,
            (Object::Integer(_) | Object::Real(_), Object::Integer(_) | Object::Real(_)) => {
                self.as_number() == other.as_number()
            },
            (Object::Name(a), Object::Name(b)) => a == b,
            (Object::String(a), Object::String(b)) => a == b,
            (Object::Reference(a), Object::Reference(b)) => a == b,
            (Object::Array(a), Object::Array(b)) => Rc::ptr_eq(a, b) || a == b,
            (Object::Dictionary(a), Object::Dictionary(b)) => Rc::ptr_eq(a, b) || a == b,
            (Object::Stream(a), Object::Stream(b)) => Rc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Object {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let by_rank = self.rank().cmp(&other.rank());
        if by_rank != Ordering::Equal {
            return Some(by_rank);
        }
        match (self, other) {
            (Object::Null, Object::Null) => Some(Ordering::Equal),
            (Object::Boolean(a), Object::Boolean(b)) => a.partial_cmp(b),
            (Object::Integer(a), Object::Integer(b)) => a.partial_cmp(b),
            (Object::Name(a), Object::Name(b)) | (Object::String(a), Object::String(b)) => {
                a.partial_cmp(b)
            },
            (Object::Reference(a), Object::Reference(b)) => a.partial_cmp(b),
            (Object::Array(a), Object::Array(b)) => a.as_slice().partial_cmp(b.as_slice()),
            (Object::Dictionary(a), Object::Dictionary(b)) => cmp_dicts(a, b),
            (Object::Stream(a), Object::Stream(b)) => {
                match (a.offset, a.length, a.id, a.gen).cmp(&(b.offset, b.length, b.id, b.gen)) {
                    Ordering::Equal => cmp_dicts(&a.dict, &b.dict),
                    ord => Some(ord),
                }
            },
            // mixed Integer/Real
            _ => self.as_number()?.partial_cmp(&other.as_number()?),
        }
    }
}

fn cmp_dicts(a: &Dict, b: &Dict) -> Option<Ordering> {
    let mut left: Vec<_> = a.iter().collect();
    let mut right: Vec<_> = b.iter().collect();
    left.sort_by(|x, y| x.0.cmp(y.0));
    right.sort_by(|x, y| x.0.cmp(y.0));
    left.partial_cmp(&right)
}

/// PDFDocEncoding to Unicode (PDF 32000-1:2008, Annex D.2).
///
/// Code points without a mapping are 0 and decode to U+FFFD.
pub const PDF_DOC_ENCODING: [u16; 256] = [
    0x0000, 0x0001, 0x0002, 0x0003, 0x0004, 0x0005, 0x0006, 0x0007, 0x0008, 0x0009, 0x000A,
    0x000B, 0x000C, 0x000D, 0x000E, 0x000F, 0x0010, 0x0011, 0x0012, 0x0013, 0x0014, 0x0015,
    0x0016, 0x0017, 0x02D8, 0x02C7, 0x02C6, 0x02D9, 0x02DD, 0x02DB, 0x02DA, 0x02DC, 0x0020,
    0x0021, 0x0022, 0x0023, 0x0024, 0x0025, 0x0026, 0x0027, 0x0028, 0x0029, 0x002A, 0x002B,
    0x002C, 0x002D, 0x002E, 0x002F, 0x0030, 0x0031, 0x0032, 0x0033, 0x0034, 0x0035, 0x0036,
    0x0037, 0x0038, 0x0039, 0x003A, 0x003B, 0x003C, 0x003D, 0x003E, 0x003F, 0x0040, 0x0041,
    0x0042, 0x0043, 0x0044, 0x0045, 0x0046, 0x0047, 0x0048, 0x0049, 0x004A, 0x004B, 0x004C,
    0x004D, 0x004E, 0x004F, 0x0050, 0x0051, 0x0052, 0x0053, 0x0054, 0x0055, 0x0056, 0x0057,
    0x0058, 0x0059, 0x005A, 0x005B, 0x005C, 0x005D, 0x005E, 0x005F, 0x0060, 0x0061, 0x0062,
    0x0063, 0x0064, 0x0065, 0x0066, 0x0067, 0x0068, 0x0069, 0x006A, 0x006B, 0x006C, 0x006D,
    0x006E, 0x006F, 0x0070, 0x0071, 0x0072, 0x0073, 0x0074, 0x0075, 0x0076, 0x0077, 0x0078,
    0x0079, 0x007A, 0x007B, 0x007C, 0x007D, 0x007E, 0x0000, 0x2022, 0x2020, 0x2021, 0x2026,
    0x2014, 0x2013, 0x0192, 0x2044, 0x2039, 0x203A, 0x2212, 0x2030, 0x201E, 0x201C, 0x201D,
    0x2018, 0x2019, 0x201A, 0x2122, 0xFB01, 0xFB02, 0x0141, 0x0152, 0x0160, 0x0178, 0x017D,
    0x0131, 0x0142, 0x0153, 0x0161, 0x017E, 0x0000, 0x20AC, 0x00A1, 0x00A2, 0x00A3, 0x00A4,
    0x00A5, 0x00A6, 0x00A7, 0x00A8, 0x00A9, 0x00AA, 0x00AB, 0x00AC, 0x0000, 0x00AE, 0x00AF,
    0x00B0, 0x00B1, 0x00B2, 0x00B3, 0x00B4, 0x00B5, 0x00B6, 0x00B7, 0x00B8, 0x00B9, 0x00BA,
    0x00BB, 0x00BC, 0x00BD, 0x00BE, 0x00BF, 0x00C0, 0x00C1, 0x00C2, 0x00C3, 0x00C4, 0x00C5,
    0x00C6, 0x00C7, 0x00C8, 0x00C9, 0x00CA, 0x00CB, 0x00CC, 0x00CD, 0x00CE, 0x00CF, 0x00D0,
    0x00D1, 0x00D2, 0x00D3, 0x00D4, 0x00D5, 0x00D6, 0x00D7, 0x00D8, 0x00D9, 0x00DA, 0x00DB,
    0x00DC, 0x00DD, 0x00DE, 0x00DF, 0x00E0, 0x00E1, 0x00E2, 0x00E3, 0x00E4, 0x00E5, 0x00E6,
    0x00E7, 0x00E8, 0x00E9, 0x00EA, 0x00EB, 0x00EC, 0x00ED, 0x00EE, 0x00EF, 0x00F0, 0x00F1,
    0x00F2, 0x00F3, 0x00F4, 0x00F5, 0x00F6, 0x00F7, 0x00F8, 0x00F9, 0x00FA, 0x00FB, 0x00FC,
    0x00FD, 0x00FE, 0x00FF,
];

/// Decode a PDF text string to UTF-8.
///
/// UTF-16BE strings may embed language escapes (`U+001B lang U+001B`); the
/// escaped region is dropped.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let mut in_escape = false;
        let units = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .filter(|&unit| {
                if unit == 0x001B {
                    in_escape = !in_escape;
                    return false;
                }
                !in_escape
            });
        return char::decode_utf16(units)
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
    }

    bytes
        .iter()
        .map(|&b| match PDF_DOC_ENCODING[b as usize] {
            0 if b != 0 => char::REPLACEMENT_CHARACTER,
            code => char::from_u32(u32::from(code)).unwrap_or(char::REPLACEMENT_CHARACTER),
        })
        .collect()
}

/// Extract filter names from a stream's `/Filter` entry.
///
/// `/Filter` may be a single name or an array of names; other element
/// types are skipped.
pub fn extract_filter_names(filter: &Object, resolver: &dyn Resolver) -> Vec<String> {
    let resolved = resolver.resolve(filter);
    match &resolved {
        Object::Name(_) => resolved
            .as_name()
            .map(|n| vec![n.to_string()])
            .unwrap_or_default(),
        Object::Array(_) => resolved
            .iter_resolved(resolver)
            .filter_map(|o| o.as_name().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_object_integer() {
        let obj = Object::Integer(42);
        assert_eq!(obj.as_integer(), Some(42));
        assert!(obj.as_name().is_none());
        assert!(!obj.is_null());
    }

    #[test]
    fn test_object_name() {
        let obj = Object::name("Type");
        assert_eq!(obj.as_name(), Some("Type"));
        assert!(obj.as_integer().is_none());
    }

    #[test]
    #[allow(clippy::approx_constant)]
    fn test_object_real() {
        let obj = Object::Real(3.14);
        assert_eq!(obj.as_real(), Some(3.14));
        assert_eq!(obj.to_i64(), Some(3));
        assert_eq!(Object::Integer(2).as_number(), Some(2.0));
    }

    #[test]
    fn test_object_default_is_null() {
        assert!(Object::default().is_null());
    }

    #[test]
    fn test_short_payload_is_inline() {
        assert!(PdfBytes::from("Catalog").is_inline());
        assert!(!PdfBytes::from("FontDescriptor").is_inline());
        assert_eq!(PdfBytes::from("FontDescriptor").as_bytes(), b"FontDescriptor");
    }

    #[test]
    fn test_numeric_equality_normalizes_integer_and_real() {
        assert_eq!(Object::Integer(3), Object::Real(3.0));
        assert_ne!(Object::Integer(3), Object::Real(3.5));
        assert!(Object::Integer(3) < Object::Real(3.5));
    }

    #[test]
    fn test_equality_requires_same_kind() {
        assert_ne!(Object::name("A"), Object::string(b"A"));
        assert_ne!(Object::Null, Object::Boolean(false));
    }

    #[test]
    fn test_ordering_by_kind_then_value() {
        assert!(Object::Null < Object::Boolean(false));
        assert!(Object::Integer(100) < Object::name("A"));
        assert!(Object::name("A") < Object::name("B"));
        assert!(Object::reference(1, 5) < Object::reference(2, 0));
    }

    #[test]
    fn test_dictionary_equality_ignores_insertion_order() {
        let mut a = Dict::new();
        a.insert("A".to_string(), Object::Integer(1));
        a.insert("B".to_string(), Object::Integer(2));
        let mut b = Dict::new();
        b.insert("B".to_string(), Object::Integer(2));
        b.insert("A".to_string(), Object::Integer(1));
        assert_eq!(Object::dict(a.clone()), Object::dict(b.clone()));
        assert_eq!(
            Object::dict(a).partial_cmp(&Object::dict(b)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_object_stream_dict_access() {
        let mut dict = Dict::new();
        dict.insert("Length".to_string(), Object::Integer(10));
        let obj = Object::Stream(Rc::new(StreamObject {
            dict,
            offset: 100,
            length: 10,
            id: 4,
            gen: 0,
        }));
        assert_eq!(obj.get("Length"), Some(&Object::Integer(10)));
        assert_eq!(obj.as_stream().map(|s| s.offset), Some(100));
    }

    #[test]
    fn test_object_ref_display() {
        assert_eq!(ObjectRef::new(10, 0).to_string(), "10 0 R");
    }

    struct MapResolver(HashMap<u32, Object>);

    impl Resolver for MapResolver {
        fn resolve(&self, obj: &Object) -> Object {
            match obj {
                Object::Reference(r) => self.0.get(&r.id).cloned().unwrap_or_default(),
                other => other.clone(),
            }
        }
    }

    #[test]
    fn test_resolved_access_is_one_level() {
        let mut objects = HashMap::new();
        objects.insert(5, Object::reference(6, 0));
        objects.insert(6, Object::Integer(99));
        let resolver = MapResolver(objects);

        let mut dict = Dict::new();
        dict.insert("Direct".to_string(), Object::Integer(1));
        dict.insert("Indirect".to_string(), Object::reference(5, 0));
        let obj = Object::dict(dict);

        assert_eq!(obj.get_resolved("Direct", &resolver), Object::Integer(1));
        assert_eq!(obj.get_resolved("Indirect", &resolver), Object::reference(6, 0));
        assert!(obj.get_resolved("Missing", &resolver).is_null());

        let arr = Object::array(vec![Object::reference(6, 0), Object::reference(7, 0)]);
        let items: Vec<_> = arr.iter_resolved(&resolver).collect();
        assert_eq!(items, vec![Object::Integer(99), Object::Null]);
        assert_eq!(arr.index_resolved(0, &resolver), Object::Integer(99));
    }

    #[test]
    fn test_unicode_string_utf16() {
        let obj = Object::string(&[0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69]);
        assert_eq!(obj.as_unicode_string().as_deref(), Some("Hi"));
    }

    #[test]
    fn test_unicode_string_language_escape_skipped() {
        let bytes = [
            0xFE, 0xFF, 0x00, 0x1B, 0x00, 0x65, 0x00, 0x6E, 0x00, 0x1B, 0x00, 0x41,
        ];
        assert_eq!(decode_text_string(&bytes), "A");
    }

    #[test]
    fn test_unicode_string_pdfdoc() {
        assert_eq!(decode_text_string(b"caf\xE9 \x80 \xA0"), "café • €");
        assert_eq!(decode_text_string(b"\x18"), "\u{02D8}");
    }

    #[test]
    fn test_mem_size_counts_shared_payload_once() {
        let inner = Object::array(vec![Object::string(b"a long string payload")]);
        let single = inner.mem_size();
        let twice = Object::array(vec![inner.clone(), inner]);
        let expected = std::mem::size_of::<Object>() * 2 + single;
        assert_eq!(twice.mem_size(), expected);
    }

    #[test]
    fn test_extract_filter_names() {
        let single = Object::name("FlateDecode");
        assert_eq!(extract_filter_names(&single, &NoResolve), vec!["FlateDecode"]);
        let many = Object::array(vec![Object::name("ASCII85Decode"), Object::name("LZWDecode")]);
        assert_eq!(
            extract_filter_names(&many, &NoResolve),
            vec!["ASCII85Decode", "LZWDecode"]
        );
    }
}
