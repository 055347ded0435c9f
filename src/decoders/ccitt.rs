//! CCITTFaxDecode implementation.
//!
//! CCITT Group 3 (1D and mixed 1D/2D) and Group 4 (pure 2D) fax
//! decompression for monochrome images, producing one packed row of
//! `(Columns + 7) / 8` bytes at a time.
//!
//! Pure 2D data goes through the Group 4 decoder of the [`fax`] crate.
//! One dimensional, mixed and byte-aligned data is decoded here on top of
//! the `fax` bit reader and code tables: its Group 3 decoder insists on an
//! EOL before every row and handles 1D rows only, and neither decoder knows
//! about `/EncodedByteAlign`.
//!
//! Rows are held as their list of changing elements: the columns where the
//! colour flips, starting from white. The previous row's list is the
//! reference line for 2D coding.
//!
//! PDF Spec: ISO 32000-1:2008, Section 7.4.6 - CCITTFaxDecode Filter

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use fax::decoder::{pels, DecodeError, DecodeStatus, Group4Decoder};
use fax::maps::{black, mode, white, Mode};
use fax::{BitReader, ByteReader, Color};

use crate::decoders::{BoxedDecoder, BufferedInput, StreamDecoder};
use crate::error::{Error, Result};
use crate::object::{Object, Resolver};

/// Widest row accepted; `fax` addresses columns with `u16`.
pub const MAX_COLUMNS: usize = u16::MAX as usize;

/// End-of-line code (eleven zeros and a one).
const EOL_CODE: u16 = 0x001;
const EOL_LEN: u8 = 12;

/// Parameters of a CCITTFaxDecode stage (`/DecodeParms`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcittParams {
    /// Coding scheme: <0 pure 2D, 0 pure 1D, >0 mixed
    pub k: i64,
    /// Rows are expected to be preceded by EOL codes
    pub end_of_line: bool,
    /// Each encoded row starts on a byte boundary
    pub encoded_byte_align: bool,
    /// Image width in pixels
    pub columns: usize,
    /// Image height in rows, 0 if unknown
    pub rows: usize,
    /// Data is terminated by an end-of-block pattern
    pub end_of_block: bool,
    /// 1 bits are black (default: 0 bits are black)
    pub black_is_1: bool,
}

impl Default for CcittParams {
    fn default() -> Self {
        Self {
            k: 0,
            end_of_line: false,
            encoded_byte_align: false,
            columns: 1728,
            rows: 0,
            end_of_block: true,
            black_is_1: false,
        }
    }
}

impl CcittParams {
    /// Read the parameters from a `/DecodeParms` dictionary; `Null` gives
    /// the defaults.
    pub fn from_params(params: &Object, resolver: &dyn Resolver) -> Self {
        let defaults = Self::default();
        let int = |key: &str| params.get_resolved(key, resolver).to_i64();
        let flag = |key: &str, default: bool| {
            params
                .get_resolved(key, resolver)
                .as_bool()
                .unwrap_or(default)
        };
        Self {
            k: int("K").unwrap_or(defaults.k),
            end_of_line: flag("EndOfLine", defaults.end_of_line),
            encoded_byte_align: flag("EncodedByteAlign", defaults.encoded_byte_align),
            columns: int("Columns").map_or(defaults.columns, |v| v.max(1) as usize),
            rows: int("Rows").map_or(defaults.rows, |v| v.max(0) as usize),
            end_of_block: flag("EndOfBlock", defaults.end_of_block),
            black_is_1: flag("BlackIs1", defaults.black_is_1),
        }
    }

    /// Bytes in one decoded row.
    pub fn row_bytes(&self) -> usize {
        self.columns.div_ceil(8)
    }
}

struct SharedInput {
    input: BufferedInput,
    ended: bool,
    error: Option<Error>,
}

/// The stage input as the byte iterator `fax` reads from.
///
/// An upstream error ends the iteration and is kept until the decoder
/// picks it up.
#[derive(Clone)]
struct InputBytes(Rc<RefCell<SharedInput>>);

impl Iterator for InputBytes {
    type Item = std::result::Result<u8, Infallible>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut shared = self.0.borrow_mut();
        if shared.ended {
            return None;
        }
        match shared.input.next_byte() {
            Ok(Some(byte)) => Some(Ok(byte)),
            Ok(None) => {
                shared.ended = true;
                None
            },
            Err(e) => {
                shared.ended = true;
                shared.error = Some(e);
                None
            },
        }
    }
}

fn infallible<T>(result: std::result::Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}

/// Row decoding for everything but plain Group 4 data.
struct CodedRows {
    bits: ByteReader<InputBytes>,
    k: i64,
    end_of_block: bool,
    encoded_byte_align: bool,
    columns: u16,
    reference: Vec<u16>,
}

impl CodedRows {
    fn consume(&mut self, n: u8) {
        infallible(self.bits.consume(n));
    }

    /// Fewer bits are left than the longest code needs.
    fn near_end(&self) -> bool {
        self.bits.peek(16).is_none()
    }

    /// Skip fill bits and EOL codes before a row.
    ///
    /// Returns `None` at end of data, otherwise whether an EOL was seen.
    fn start_row(&mut self) -> Option<bool> {
        let mut eols = 0;
        loop {
            match self.bits.peek(EOL_LEN) {
                Some(EOL_CODE) => {
                    self.consume(EOL_LEN);
                    eols += 1;
                    if eols >= 2 && self.end_of_block {
                        return None;
                    }
                },
                Some(0) => self.consume(1),
                _ => break,
            }
        }
        self.bits.peek(1)?;
        Some(eols > 0)
    }

    /// A full run: any make-up codes plus the terminating code.
    fn read_run(&mut self, colour: Color, row: usize) -> Result<Option<u16>> {
        let mut total: u16 = 0;
        loop {
            let code = match colour {
                Color::White => white::decode(&mut self.bits),
                Color::Black => black::decode(&mut self.bits),
            };
            match code {
                Some(run) => {
                    total = total.saturating_add(run);
                    if run < 64 {
                        return Ok(Some(total));
                    }
                },
                None if self.near_end() => return Ok(None),
                None => {
                    return Err(Error::Decode(format!(
                        "CCITTFaxDecode: invalid {:?} run code in row {}",
                        colour, row
                    )));
                },
            }
        }
    }

    /// b1 and b2 on the reference line for a0 with colour `white`.
    fn reference_changes(&self, a0: i32, white: bool) -> (i32, i32) {
        let columns = i32::from(self.columns);
        let mut i = usize::from(!white);
        while i < self.reference.len() && i32::from(self.reference[i]) <= a0 {
            i += 2;
        }
        let at = |i: usize| {
            self.reference
                .get(i)
                .map_or(columns, |&c| i32::from(c).min(columns))
        };
        (at(i), at(i + 1))
    }

    fn decode_1d(&mut self, row: usize, changes: &mut Vec<u16>) -> Result<bool> {
        let mut a0: u16 = 0;
        let mut colour = Color::White;
        while a0 < self.columns {
            let run = match self.read_run(colour, row)? {
                Some(run) => run,
                None => return Ok(false),
            };
            a0 = a0.saturating_add(run).min(self.columns);
            changes.push(a0);
            colour = !colour;
        }
        Ok(true)
    }

    fn decode_2d(&mut self, row: usize, changes: &mut Vec<u16>) -> Result<bool> {
        let columns = i32::from(self.columns);
        let mut a0: i32 = -1;
        let mut white = true;
        while a0 < columns {
            let mode = match mode::decode(&mut self.bits) {
                Some(mode) => mode,
                None if self.near_end() => return Ok(false),
                None => {
                    return Err(Error::Decode(format!(
                        "CCITTFaxDecode: invalid 2D mode code in row {}",
                        row
                    )));
                },
            };
            let (b1, b2) = self.reference_changes(a0, white);
            match mode {
                Mode::Pass => a0 = b2,
                Mode::Horizontal => {
                    let colour = if white { Color::White } else { Color::Black };
                    let first = self.read_run(colour, row)?;
                    let second = self.read_run(!colour, row)?;
                    let (run1, run2) = match (first, second) {
                        (Some(r1), Some(r2)) => (i32::from(r1), i32::from(r2)),
                        _ => return Ok(false),
                    };
                    let a1 = (a0.max(0) + run1).min(columns);
                    let a2 = (a1 + run2).min(columns);
                    changes.push(a1 as u16);
                    changes.push(a2 as u16);
                    a0 = a2;
                },
                Mode::Vertical(delta) => {
                    let a1 = (b1 + i32::from(delta)).min(columns);
                    if a1 < a0.max(0) {
                        return Err(Error::Decode(format!(
                            "CCITTFaxDecode: vertical code moves backwards in row {}",
                            row
                        )));
                    }
                    changes.push(a1 as u16);
                    a0 = a1;
                    white = !white;
                },
                // an EOL inside a 2D row ends the data
                Mode::EOF => return Ok(false),
                Mode::Extension => {
                    return Err(Error::Unsupported(
                        "CCITTFaxDecode extension codes".to_string(),
                    ));
                },
            }
        }
        Ok(true)
    }

    /// Decode row number `row` into `changes`. Returns false at end of data.
    fn next_row(&mut self, row: usize, changes: &mut Vec<u16>) -> Result<bool> {
        let eol_seen = match self.start_row() {
            Some(seen) => seen,
            None => return Ok(false),
        };

        let one_d = match self.k {
            k if k < 0 => false,
            0 => true,
            // a tag bit follows the EOL in mixed coding
            _ if eol_seen => match self.bits.peek(1) {
                Some(bit) => {
                    self.consume(1);
                    bit == 1
                },
                None => return Ok(false),
            },
            k => row % k as usize == 0,
        };

        changes.clear();
        let complete = if one_d {
            self.decode_1d(row, changes)?
        } else {
            self.decode_2d(row, changes)?
        };
        if !complete {
            if !changes.is_empty() {
                log::warn!("CCITTFaxDecode: data ended inside row {}", row);
            }
            return Ok(false);
        }

        if self.encoded_byte_align {
            let waste = self.bits.bits_to_byte_boundary();
            self.consume(waste);
        }
        self.reference.clear();
        self.reference.extend_from_slice(changes);
        Ok(true)
    }
}

enum Rows {
    Group4(Group4Decoder<InputBytes>),
    Coded(CodedRows),
}

/// CCITTFaxDecode filter implementation.
pub struct CcittFaxDecoder {
    params: CcittParams,
    columns: u16,
    input: Rc<RefCell<SharedInput>>,
    rows: Option<Rows>,
    changes: Vec<u16>,
    row: Vec<u8>,
    row_pos: usize,
    row_counter: usize,
    eof: bool,
}

impl CcittFaxDecoder {
    /// Decode the output of `upstream` with `params`.
    ///
    /// # Errors
    ///
    /// `/Columns` must be between 1 and [`MAX_COLUMNS`].
    pub fn new(upstream: BoxedDecoder, params: CcittParams) -> Result<Self> {
        let columns = u16::try_from(params.columns)
            .ok()
            .filter(|&c| c > 0)
            .ok_or_else(|| {
                Error::Decode(format!(
                    "CCITTFaxDecode: /Columns {} outside 1..={}",
                    params.columns, MAX_COLUMNS
                ))
            })?;
        Ok(Self {
            columns,
            input: Rc::new(RefCell::new(SharedInput {
                input: BufferedInput::new(upstream),
                ended: false,
                error: None,
            })),
            rows: None,
            changes: Vec::new(),
            row: Vec::new(),
            row_pos: 0,
            row_counter: 0,
            eof: false,
            params,
        })
    }

    fn start(&self) -> Rows {
        let bytes = InputBytes(Rc::clone(&self.input));
        let group4 =
            self.params.k < 0 && !self.params.encoded_byte_align && !self.params.end_of_line;
        if group4 {
            Rows::Group4(infallible(Group4Decoder::new(bytes, self.columns)))
        } else {
            Rows::Coded(CodedRows {
                bits: infallible(ByteReader::new(bytes)),
                k: self.params.k,
                end_of_block: self.params.end_of_block,
                encoded_byte_align: self.params.encoded_byte_align,
                columns: self.columns,
                reference: Vec::new(),
            })
        }
    }

    /// Decode the next row into `self.row`. Returns false at end of data.
    fn decode_row(&mut self) -> Result<bool> {
        if self.params.rows != 0 && self.row_counter >= self.params.rows {
            return Ok(false);
        }
        if self.rows.is_none() {
            self.rows = Some(self.start());
        }

        let complete = match self.rows.as_mut() {
            Some(Rows::Group4(decoder)) => match decoder.advance() {
                Ok(DecodeStatus::Incomplete) => {
                    self.changes.clear();
                    self.changes.extend_from_slice(decoder.transition());
                    true
                },
                Ok(DecodeStatus::End) => false,
                Err(DecodeError::Unsupported) => {
                    return Err(Error::Unsupported(
                        "CCITTFaxDecode extension codes".to_string(),
                    ));
                },
                Err(DecodeError::Reader(never)) => match never {},
                Err(DecodeError::Invalid) => {
                    if !self.input.borrow().ended {
                        return Err(Error::Decode(format!(
                            "CCITTFaxDecode: invalid Group 4 code in row {}",
                            self.row_counter
                        )));
                    }
                    log::debug!("CCITTFaxDecode: data ended before row {}", self.row_counter);
                    false
                },
            },
            Some(Rows::Coded(rows)) => rows.next_row(self.row_counter, &mut self.changes)?,
            None => false,
        };

        if let Some(e) = self.input.borrow_mut().error.take() {
            return Err(e);
        }
        if !complete {
            return Ok(false);
        }
        self.paint_row();
        self.row_counter += 1;
        Ok(true)
    }

    fn paint_row(&mut self) {
        // colour written as 1 bits; the padding after the last column stays 0
        let set = if self.params.black_is_1 {
            Color::Black
        } else {
            Color::White
        };
        self.row.clear();
        self.row.resize(self.params.row_bytes(), 0);
        for (x, colour) in pels(&self.changes, self.columns).enumerate() {
            if colour == set {
                self.row[x / 8] |= 0x80 >> (x % 8);
            }
        }
        self.row_pos = 0;
    }
}

impl StreamDecoder for CcittFaxDecoder {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            if self.row_pos == self.row.len() {
                if self.eof {
                    break;
                }
                if !self.decode_row()? {
                    self.eof = true;
                }
                continue;
            }
            let n = (self.row.len() - self.row_pos).min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&self.row[self.row_pos..self.row_pos + n]);
            self.row_pos += n;
            written += n;
        }
        Ok(written)
    }

    fn rewind(&mut self) -> Result<()> {
        self.rows = None;
        self.changes.clear();
        self.row.clear();
        self.row_pos = 0;
        self.row_counter = 0;
        self.eof = false;
        let mut shared = self.input.borrow_mut();
        shared.ended = false;
        shared.error = None;
        shared.input.rewind()
    }

    fn name(&self) -> &str {
        "CCITTFaxDecode"
    }
}
