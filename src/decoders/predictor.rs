//! PNG and TIFF predictor stages for PDF stream decoding.
//!
//! PDF streams can use PNG predictors (algorithms 10-15) or TIFF predictor 2
//! to improve compression. These predictors encode differences between
//! adjacent samples, which are reversed here one row at a time.

use byteorder::{BigEndian, ByteOrder};

use crate::decoders::{read_fully, BoxedDecoder, StreamDecoder};
use crate::error::{Error, Result};
use crate::object::{Object, Resolver};

/// Largest predictor row accepted, in bytes.
const MAX_ROW_BYTES: usize = 1 << 24;

/// Decode parameters for predictor stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of columns (width in samples)
    pub columns: usize,
    /// Number of color components per sample (default 1)
    pub colors: usize,
    /// Bits per component (default 8)
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1, // No prediction
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Read predictor parameters from a `/DecodeParms` dictionary.
    pub fn from_params(params: &Object, resolver: &dyn Resolver) -> Self {
        let defaults = Self::default();
        let int = |key: &str| params.get_resolved(key, resolver).to_i64();
        Self {
            predictor: int("Predictor").unwrap_or(defaults.predictor),
            columns: int("Columns").map_or(defaults.columns, |v| v.max(1) as usize),
            colors: int("Colors").map_or(defaults.colors, |v| v.max(1) as usize),
            bits_per_component: int("BitsPerComponent")
                .map_or(defaults.bits_per_component, |v| v.max(1) as usize),
        }
    }

    /// Number of bytes of pixel data per row (without the PNG tag byte).
    ///
    /// # Errors
    ///
    /// Fails when the row size overflows or exceeds 16 MiB.
    pub fn pixel_bytes_per_row(&self) -> Result<usize> {
        self.columns
            .checked_mul(self.colors)
            .and_then(|n| n.checked_mul(self.bits_per_component))
            .map(|bits| bits.div_ceil(8))
            .filter(|&n| n <= MAX_ROW_BYTES)
            .ok_or_else(|| {
                Error::Decode(format!(
                    "predictor row too large: {} columns x {} colors x {} bits",
                    self.columns, self.colors, self.bits_per_component
                ))
            })
    }

    /// Bytes per complete pixel, at least 1.
    ///
    /// Only meaningful once [`pixel_bytes_per_row`](Self::pixel_bytes_per_row)
    /// has accepted the parameters.
    pub fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8)
    }
}

/// Wrap `upstream` in the predictor stage `params` asks for.
///
/// `Null` parameters and predictor 1 leave the chain unchanged.
///
/// # Errors
///
/// Unknown predictor numbers, unsupported TIFF sample sizes and rows too
/// large to buffer.
pub fn apply_predictor(
    upstream: BoxedDecoder,
    params: &Object,
    resolver: &dyn Resolver,
) -> Result<BoxedDecoder> {
    if params.as_dict().is_none() {
        return Ok(upstream);
    }
    let params = DecodeParams::from_params(params, resolver);
    match params.predictor {
        1 => Ok(upstream),
        2 => Ok(Box::new(TiffPredictor::new(upstream, params)?)),
        10..=15 => Ok(Box::new(PngPredictor::new(upstream, params)?)),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

/// PNG predictor stage (predictors 10-15).
///
/// Every row starts with a tag byte choosing None/Sub/Up/Average/Paeth, so
/// the specific number 10-15 does not matter when decoding.
pub struct PngPredictor {
    upstream: BoxedDecoder,
    bpp: usize,
    row_bytes: usize,
    prev: Vec<u8>,
    cur: Vec<u8>,
    pos: usize,
    len: usize,
    done: bool,
}

impl PngPredictor {
    /// Reverse PNG prediction on the output of `upstream`.
    ///
    /// # Errors
    ///
    /// Rejects parameters whose row size overflows or is unreasonably large.
    pub fn new(upstream: BoxedDecoder, params: DecodeParams) -> Result<Self> {
        let row_bytes = params.pixel_bytes_per_row()?;
        Ok(Self {
            upstream,
            bpp: params.bytes_per_pixel(),
            row_bytes,
            prev: vec![0; row_bytes],
            cur: vec![0; row_bytes],
            pos: 0,
            len: 0,
            done: false,
        })
    }

    fn next_row(&mut self) -> Result<bool> {
        let mut tag = [0u8; 1];
        if read_fully(self.upstream.as_mut(), &mut tag)? == 0 {
            return Ok(false);
        }
        std::mem::swap(&mut self.prev, &mut self.cur);
        let n = read_fully(self.upstream.as_mut(), &mut self.cur[..self.row_bytes])?;
        // a short final row only decodes what is there
        let row = &mut self.cur[..n];
        let prev = &self.prev;
        let bpp = self.bpp;

        match tag[0] {
            1 => {
                for i in bpp..row.len() {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            },
            2 => {
                for i in 0..row.len() {
                    row[i] = row[i].wrapping_add(prev[i]);
                }
            },
            3 => {
                for i in 0..row.len() {
                    let left = if i >= bpp { u16::from(row[i - bpp]) } else { 0 };
                    let avg = ((left + u16::from(prev[i])) / 2) as u8;
                    row[i] = row[i].wrapping_add(avg);
                }
            },
            4 => {
                for i in 0..row.len() {
                    let (left, up_left) = if i >= bpp {
                        (i16::from(row[i - bpp]), i16::from(prev[i - bpp]))
                    } else {
                        (0, 0)
                    };
                    let paeth = paeth_predictor(left, i16::from(prev[i]), up_left) as u8;
                    row[i] = row[i].wrapping_add(paeth);
                }
            },
            _ => {},
        }

        self.pos = 0;
        self.len = n;
        Ok(n > 0)
    }
}

impl StreamDecoder for PngPredictor {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        while written < buf.len() && !self.done {
            if self.pos == self.len && !self.next_row()? {
                self.done = true;
                break;
            }
            let n = (self.len - self.pos).min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&self.cur[self.pos..self.pos + n]);
            self.pos += n;
            written += n;
        }
        Ok(written)
    }

    fn rewind(&mut self) -> Result<()> {
        self.prev.iter_mut().for_each(|b| *b = 0);
        self.cur.iter_mut().for_each(|b| *b = 0);
        self.pos = 0;
        self.len = 0;
        self.done = false;
        self.upstream.rewind()
    }

    fn name(&self) -> &str {
        "PngPredictor"
    }
}

/// Paeth predictor function from PNG specification.
fn paeth_predictor(a: i16, b: i16, c: i16) -> i16 {
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// TIFF predictor 2 stage: horizontal differencing per component.
pub struct TiffPredictor {
    upstream: BoxedDecoder,
    colors: usize,
    bits_per_component: usize,
    row: Vec<u8>,
    pos: usize,
    len: usize,
}

impl TiffPredictor {
    /// Reverse TIFF prediction on the output of `upstream`.
    ///
    /// # Errors
    ///
    /// Only 8 and 16 bits per component are implemented, and the row size
    /// must be bounded.
    pub fn new(upstream: BoxedDecoder, params: DecodeParams) -> Result<Self> {
        match params.bits_per_component {
            8 | 16 => {},
            1 => {
                log::error!("TIFF predictor with 1 bit per component is not implemented");
                return Err(Error::Unsupported(
                    "TIFF predictor with 1 bit per component".to_string(),
                ));
            },
            other => {
                return Err(Error::Decode(format!(
                    "TIFF predictor: unsupported bits per component {}",
                    other
                )));
            },
        }
        let row_bytes = params.pixel_bytes_per_row()?;
        Ok(Self {
            upstream,
            colors: params.colors,
            bits_per_component: params.bits_per_component,
            row: vec![0; row_bytes],
            pos: 0,
            len: 0,
        })
    }

    fn next_row(&mut self) -> Result<bool> {
        let n = read_fully(self.upstream.as_mut(), &mut self.row)?;
        let colors = self.colors;
        let row = &mut self.row[..n];
        if self.bits_per_component == 8 {
            for i in colors..row.len() {
                row[i] = row[i].wrapping_add(row[i - colors]);
            }
        } else {
            let samples = row.len() / 2;
            for i in colors..samples {
                let left = BigEndian::read_u16(&row[(i - colors) * 2..]);
                let value = BigEndian::read_u16(&row[i * 2..]).wrapping_add(left);
                BigEndian::write_u16(&mut row[i * 2..], value);
            }
        }
        self.pos = 0;
        self.len = n;
        Ok(n > 0)
    }
}

impl StreamDecoder for TiffPredictor {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            if self.pos == self.len && !self.next_row()? {
                break;
            }
            let n = (self.len - self.pos).min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&self.row[self.pos..self.pos + n]);
            self.pos += n;
            written += n;
        }
        Ok(written)
    }

    fn rewind(&mut self) -> Result<()> {
        self.pos = 0;
        self.len = 0;
        self.upstream.rewind()
    }

    fn name(&self) -> &str {
        "TiffPredictor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::{read_all, MemorySource};
    use crate::object::{Dict, NoResolve};
    use bytes::Bytes;

    fn source(data: &[u8]) -> BoxedDecoder {
        Box::new(MemorySource::new(Bytes::copy_from_slice(data)))
    }

    fn params(predictor: i64, columns: usize, colors: usize, bpc: usize) -> DecodeParams {
        DecodeParams {
            predictor,
            columns,
            colors,
            bits_per_component: bpc,
        }
    }

    #[test]
    fn test_png_up_predictor() {
        let encoded = vec![
            2, 10, 20, 30, 40, 50, // Row 0: tag + [10, 20, 30, 40, 50]
            2, 5, 5, 5, 5, 5, // Row 1: [15, 25, 35, 45, 55] decoded
        ];
        let mut dec = PngPredictor::new(source(&encoded), params(12, 5, 1, 8)).unwrap();
        assert_eq!(
            read_all(&mut dec, 0).unwrap(),
            vec![10, 20, 30, 40, 50, 15, 25, 35, 45, 55]
        );
    }

    #[test]
    fn test_png_sub_uses_bytes_per_pixel() {
        // 2 pixels of RGB: second pixel stored as difference from the first
        let encoded = vec![1, 10, 20, 30, 1, 1, 1];
        let mut dec = PngPredictor::new(source(&encoded), params(11, 2, 3, 8)).unwrap();
        assert_eq!(read_all(&mut dec, 0).unwrap(), vec![10, 20, 30, 11, 21, 31]);
    }

    #[test]
    fn test_png_average_and_paeth() {
        let encoded = vec![
            0, 100, 50, // row 0 raw
            3, 10, 10, // avg: 10+(0+100)/2=60, 10+(60+50)/2=65
            4, 1, 1, // paeth: a=0,b=60,c=0 -> b; then a=61,b=65,c=60 -> b
        ];
        let mut dec = PngPredictor::new(source(&encoded), params(15, 2, 1, 8)).unwrap();
        assert_eq!(read_all(&mut dec, 0).unwrap(), vec![100, 50, 60, 65, 61, 66]);
    }

    #[test]
    fn test_png_single_row_and_short_row() {
        let mut dec = PngPredictor::new(source(&[0, 1, 2, 3]), params(10, 3, 1, 8)).unwrap();
        assert_eq!(read_all(&mut dec, 0).unwrap(), vec![1, 2, 3]);

        let mut dec = PngPredictor::new(source(&[0, 1, 2, 3, 1, 5]), params(10, 3, 1, 8)).unwrap();
        assert_eq!(read_all(&mut dec, 0).unwrap(), vec![1, 2, 3, 5]);
    }

    #[test]
    fn test_png_rewind() {
        let mut dec = PngPredictor::new(source(&[2, 1, 2, 2, 1, 1]), params(12, 2, 1, 8)).unwrap();
        assert_eq!(read_all(&mut dec, 0).unwrap(), vec![1, 2, 2, 3]);
        dec.rewind().unwrap();
        assert_eq!(read_all(&mut dec, 0).unwrap(), vec![1, 2, 2, 3]);
    }

    #[test]
    fn test_tiff_predictor_8bit() {
        let mut dec = TiffPredictor::new(source(&[10, 1, 1, 1]), params(2, 4, 1, 8)).unwrap();
        assert_eq!(read_all(&mut dec, 0).unwrap(), vec![10, 11, 12, 13]);
    }

    #[test]
    fn test_tiff_predictor_16bit_wraps() {
        let data = [0xFF, 0xFF, 0x00, 0x02];
        let mut dec = TiffPredictor::new(source(&data), params(2, 2, 1, 16)).unwrap();
        assert_eq!(read_all(&mut dec, 0).unwrap(), vec![0xFF, 0xFF, 0x00, 0x01]);
    }

    #[test]
    fn test_tiff_predictor_1bit_unsupported() {
        assert!(matches!(
            TiffPredictor::new(source(&[0]), params(2, 8, 1, 1)),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_apply_predictor_rejects_unknown() {
        let mut dict = Dict::new();
        dict.insert("Predictor".to_string(), Object::Integer(7));
        assert!(apply_predictor(source(b""), &Object::dict(dict), &NoResolve).is_err());
    }

    #[test]
    fn test_decode_params_from_dict() {
        let mut dict = Dict::new();
        dict.insert("Predictor".to_string(), Object::Integer(12));
        dict.insert("Columns".to_string(), Object::Integer(5));
        let p = DecodeParams::from_params(&Object::dict(dict), &NoResolve);
        assert_eq!(p, params(12, 5, 1, 8));
        assert_eq!(p.pixel_bytes_per_row().unwrap(), 5);
    }

    #[test]
    fn test_png_predictor_rejects_overflowing_columns() {
        let mut dict = Dict::new();
        dict.insert("Predictor".to_string(), Object::Integer(12));
        dict.insert("Columns".to_string(), Object::Integer(4_611_686_018_427_387_904));
        dict.insert("Colors".to_string(), Object::Integer(4));
        let result = apply_predictor(source(b""), &Object::dict(dict), &NoResolve);
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_row_size_is_capped() {
        assert!(params(12, 1 << 25, 1, 8).pixel_bytes_per_row().is_err());
        assert!(TiffPredictor::new(source(b""), params(2, 1 << 25, 3, 8)).is_err());
        assert_eq!(params(10, 9, 3, 4).pixel_bytes_per_row().unwrap(), 14);
    }
}
