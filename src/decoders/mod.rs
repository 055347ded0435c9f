//! Stream decoder implementations for PDF filters.
//!
//! Decoders are pull-based: each one owns its upstream decoder and produces
//! bytes only when [`StreamDecoder::read`] is called. A chain for one stream
//! looks like
//!
//! ```text
//! source -> [decrypter] -> filter -> [predictor] -> filter ... -> [limiter]
//! ```
//!
//! Supported filters:
//! - FlateDecode (zlib/deflate) - most common
//! - LZWDecode - LZW compression with EarlyChange
//! - ASCIIHexDecode - hexadecimal encoding
//! - ASCII85Decode - base85 encoding
//! - RunLengthDecode - run-length encoding
//! - CCITTFaxDecode - Group 3 and Group 4 fax
//! - DCTDecode / JPXDecode - left encoded, reported through [`StreamFormat`]
//! - JBIG2Decode - recognized, refused
//! - Crypt - Identity only

use std::io;

use crate::error::{Error, Result};
use crate::object::{extract_filter_names, Dict, Object, Resolver};

mod ascii85;
mod ascii_hex;
mod ccitt;
mod flate;
mod image;
mod limiter;
mod lzw;
mod predictor;
mod runlength;
mod source;

pub use ascii85::Ascii85Decoder;
pub use ascii_hex::AsciiHexDecoder;
pub use ccitt::{CcittFaxDecoder, CcittParams};
pub use flate::FlateDecoder;
pub use image::{colour_components, image_info, ImageInfo};
pub use limiter::Limiter;
pub use lzw::LzwDecoder;
pub use predictor::{apply_predictor, DecodeParams, PngPredictor, TiffPredictor};
pub use runlength::RunLengthDecoder;
pub use source::{FileSource, MemorySource};

/// Size of the internal block used by buffered decoders.
pub(crate) const BLOCK_SIZE: usize = 4096;

/// PDF stream filter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// FlateDecode (deflate/zlib compression)
    FlateDecode,
    /// ASCIIHexDecode (hexadecimal encoding)
    ASCIIHexDecode,
    /// ASCII85Decode (base-85 encoding)
    ASCII85Decode,
    /// LZWDecode (Lempel-Ziv-Welch compression)
    LZWDecode,
    /// RunLengthDecode (run-length encoding)
    RunLengthDecode,
    /// DCTDecode (JPEG compression)
    DCTDecode,
    /// JPXDecode (JPEG 2000 compression)
    JPXDecode,
    /// CCITTFaxDecode (CCITT Fax compression)
    CCITTFaxDecode,
    /// JBIG2Decode (JBIG2 compression)
    JBIG2Decode,
    /// Crypt (per-stream security filter)
    Crypt,
}

impl Filter {
    /// Look up a filter by its full name or inline-image abbreviation.
    pub fn from_name(name: &str) -> Option<Self> {
        let filter = match name {
            "FlateDecode" | "Fl" => Filter::FlateDecode,
            "ASCIIHexDecode" | "AHx" => Filter::ASCIIHexDecode,
            "ASCII85Decode" | "A85" => Filter::ASCII85Decode,
            "LZWDecode" | "LZW" => Filter::LZWDecode,
            "RunLengthDecode" | "RL" => Filter::RunLengthDecode,
            "DCTDecode" | "DCT" => Filter::DCTDecode,
            "JPXDecode" => Filter::JPXDecode,
            "CCITTFaxDecode" | "CCF" => Filter::CCITTFaxDecode,
            "JBIG2Decode" => Filter::JBIG2Decode,
            "Crypt" => Filter::Crypt,
            _ => return None,
        };
        Some(filter)
    }
}

/// Trait for PDF stream decoders.
///
/// Each decoder pulls from an owned upstream decoder (or, for sources, from
/// raw bytes) and writes decoded output into the caller's buffer.
pub trait StreamDecoder {
    /// Fill `buf` with decoded bytes.
    ///
    /// Returns the number of bytes written; 0 means end of data. A short
    /// count does not imply end of data.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Restart decoding from the beginning of the upstream source.
    ///
    /// All internal bit and byte buffers are reset.
    fn rewind(&mut self) -> Result<()>;

    /// Get the name of this decoder (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

/// A boxed decoder, the unit chains are built from.
pub type BoxedDecoder = Box<dyn StreamDecoder>;

/// Read until `buf` is full or the decoder reports end of data.
pub fn read_fully(decoder: &mut dyn StreamDecoder, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = decoder.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Drain a decoder into memory.
///
/// `limit` caps the output size (decompression bomb protection); 0 disables it.
pub fn read_all(decoder: &mut dyn StreamDecoder, limit: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut chunk = [0u8; BLOCK_SIZE];
    loop {
        let n = decoder.read(&mut chunk)?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&chunk[..n]);
        if limit != 0 && out.len() > limit {
            return Err(Error::Decode(format!(
                "decoded stream exceeds limit of {} bytes",
                limit
            )));
        }
    }
}

/// Block-buffered byte access to an upstream decoder.
///
/// Used by filters that consume their input one byte (or bit) at a time.
pub(crate) struct BufferedInput {
    upstream: BoxedDecoder,
    block: Box<[u8; BLOCK_SIZE]>,
    pos: usize,
    len: usize,
}

impl BufferedInput {
    pub(crate) fn new(upstream: BoxedDecoder) -> Self {
        Self {
            upstream,
            block: Box::new([0u8; BLOCK_SIZE]),
            pos: 0,
            len: 0,
        }
    }

    /// Next input byte, or `None` once the upstream is exhausted.
    pub(crate) fn next_byte(&mut self) -> Result<Option<u8>> {
        if self.pos == self.len {
            self.len = self.upstream.read(&mut self.block[..])?;
            self.pos = 0;
            if self.len == 0 {
                return Ok(None);
            }
        }
        let b = self.block[self.pos];
        self.pos += 1;
        Ok(Some(b))
    }

    pub(crate) fn rewind(&mut self) -> Result<()> {
        self.pos = 0;
        self.len = 0;
        self.upstream.rewind()
    }
}

/// How the bytes produced by a [`DecodedStream`] are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// Fully decoded bytes
    Raw,
    /// JPEG data (DCTDecode left undecoded)
    JpegEncoded,
    /// JPEG 2000 data (JPXDecode left undecoded)
    Jpeg2000,
}

/// A readable decoder chain for one stream.
pub struct DecodedStream {
    decoder: BoxedDecoder,
    format: StreamFormat,
}

impl DecodedStream {
    /// Wrap a built chain.
    pub fn new(decoder: BoxedDecoder, format: StreamFormat) -> Self {
        Self { decoder, format }
    }

    /// Encoding of the bytes this stream produces.
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Pull decoded bytes; 0 means end of data.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.decoder.read(buf)
    }

    /// Read until `buf` is full or the data ends.
    pub fn read_fully(&mut self, buf: &mut [u8]) -> Result<usize> {
        read_fully(self.decoder.as_mut(), buf)
    }

    /// Restart from the first byte.
    pub fn rewind(&mut self) -> Result<()> {
        self.decoder.rewind()
    }

    /// Read the remaining bytes into memory. `limit` of 0 means unlimited.
    pub fn read_all(&mut self, limit: usize) -> Result<Vec<u8>> {
        read_all(self.decoder.as_mut(), limit)
    }
}

impl std::fmt::Debug for DecodedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedStream")
            .field("decoder", &self.decoder.name())
            .field("format", &self.format)
            .finish()
    }
}

impl io::Read for DecodedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decoder
            .read(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}

/// Pair each `/Filter` name with its `/DecodeParms` (or `/DP`) entry.
///
/// Missing parameter entries are padded with `Null`.
pub fn collect_filters(dict: &Dict, resolver: &dyn Resolver) -> Vec<(String, Object)> {
    let names = match dict.get("Filter") {
        Some(filter) => extract_filter_names(filter, resolver),
        None => Vec::new(),
    };

    let params_obj = dict
        .get("DecodeParms")
        .or_else(|| dict.get("DP"))
        .map(|p| resolver.resolve(p))
        .unwrap_or(Object::Null);
    let mut params: Vec<Object> = match &params_obj {
        Object::Dictionary(_) => vec![params_obj.clone()],
        Object::Array(_) => params_obj.iter_resolved(resolver).collect(),
        _ => Vec::new(),
    };
    params.resize(names.len(), Object::Null);

    names.into_iter().zip(params).collect()
}

/// Build the decoder chain for a stream dictionary on top of `source`.
///
/// `source` already includes any decrypting stage. The chain stops at the
/// first image codec that is handed to the caller undecoded (DCT, JPX).
///
/// # Errors
///
/// Unknown filter names, JBIG2, non-identity Crypt filters, bad predictor
/// or fax parameters and image dimensions whose size overflows fail the
/// construction.
pub fn build_chain(
    source: BoxedDecoder,
    dict: &Dict,
    resolver: &dyn Resolver,
) -> Result<DecodedStream> {
    let mut decoder = source;
    let mut format = StreamFormat::Raw;
    let mut needs_limit = false;
    let mut is_bitmap = false;
    let mut colors_hint = None;

    for (name, params) in collect_filters(dict, resolver) {
        let filter = Filter::from_name(&name).ok_or_else(|| Error::UnsupportedFilter(name.clone()))?;
        if let Some(colors) = params.get_resolved("Colors", resolver).to_i64() {
            colors_hint = Some(colors);
        }
        match filter {
            Filter::FlateDecode => {
                needs_limit = true;
                decoder = Box::new(FlateDecoder::new(decoder));
                decoder = apply_predictor(decoder, &params, resolver)?;
            },
            Filter::LZWDecode => {
                let early_change = params
                    .get_resolved("EarlyChange", resolver)
                    .to_i64()
                    .unwrap_or(1);
                decoder = Box::new(LzwDecoder::new(decoder, early_change != 0));
                decoder = apply_predictor(decoder, &params, resolver)?;
            },
            Filter::ASCIIHexDecode => decoder = Box::new(AsciiHexDecoder::new(decoder)),
            Filter::ASCII85Decode => decoder = Box::new(Ascii85Decoder::new(decoder)),
            Filter::RunLengthDecode => decoder = Box::new(RunLengthDecoder::new(decoder)),
            Filter::CCITTFaxDecode => {
                needs_limit = true;
                is_bitmap = true;
                let ccitt = CcittParams::from_params(&params, resolver);
                decoder = Box::new(CcittFaxDecoder::new(decoder, ccitt)?);
            },
            Filter::DCTDecode => {
                format = StreamFormat::JpegEncoded;
                break;
            },
            Filter::JPXDecode => {
                format = StreamFormat::Jpeg2000;
                break;
            },
            Filter::JBIG2Decode => {
                log::error!("JBIG2Decode is not implemented; refusing to decode stream");
                return Err(Error::Unsupported("JBIG2Decode".to_string()));
            },
            Filter::Crypt => {
                let crypt_name = params.get_resolved("Name", resolver);
                match crypt_name.as_name() {
                    None | Some("Identity") => {},
                    Some(other) => {
                        return Err(Error::UnsupportedFilter(format!("Crypt/{}", other)));
                    },
                }
            },
        }
    }

    if needs_limit {
        if let Some(info) = image_info(dict, resolver, is_bitmap, colors_hint) {
            let limit = info.data_bytes().ok_or_else(|| {
                Error::Decode(format!(
                    "image of {}x{} samples is too large to decode",
                    info.width, info.height
                ))
            })?;
            log::debug!("limiting image stream to {} bytes", limit);
            decoder = Box::new(Limiter::new(decoder, limit as u64));
        }
    }

    Ok(DecodedStream::new(decoder, format))
}
