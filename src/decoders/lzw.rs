//! LZWDecode implementation for PDF.
//!
//! Decompresses data using the Lempel-Ziv-Welch (LZW) algorithm as specified
//! in the PDF Reference (Section 7.4.4). The dictionary work is done by
//! [`weezl`]; this stage feeds it the PDF code stream in blocks.
//!
//! PDF's LZW implementation:
//! - Uses MSB-first bit ordering
//! - Starts with 9-bit codes and grows to at most 12 bits
//! - EarlyChange (default 1) switches code size one code earlier than GIF
//! - Clear code is 256, EOD code is 257
//! - First available code is 258
//!
//! Some writers keep emitting literal codes after the table has filled
//! instead of sending a clear code. The code widths are tracked here so
//! that a literal arriving on a full table clears it first, after which
//! codes are read at 9 bits again. A literal directly followed by an
//! explicit 12-bit clear or EOD code is left alone.

use weezl::{decode::Decoder, BitOrder, LzwStatus};

use crate::decoders::{BoxedDecoder, BufferedInput, StreamDecoder, BLOCK_SIZE};
use crate::error::{Error, Result};

const CLEAR_CODE: u16 = 256;
const EOD_CODE: u16 = 257;
const FIRST_CODE: usize = 258;
const MAX_CODES: usize = 4096;

/// LZWDecode filter implementation.
pub struct LzwDecoder {
    input: BufferedInput,
    lzw: Decoder,
    early_change: usize,
    // incoming code stream
    in_bits: u32,
    in_count: u32,
    code_len: u32,
    entries: usize,
    first: bool,
    codes_done: bool,
    // code stream handed to weezl
    packed: Vec<u8>,
    packed_pos: usize,
    out_bits: u32,
    out_count: u32,
    // decoded bytes
    output: Vec<u8>,
    output_pos: usize,
    output_len: usize,
    finished: bool,
}

impl LzwDecoder {
    /// Decode the output of `upstream`. `early_change` mirrors `/EarlyChange`.
    pub fn new(upstream: BoxedDecoder, early_change: bool) -> Self {
        Self {
            input: BufferedInput::new(upstream),
            lzw: new_lzw(early_change),
            early_change: usize::from(early_change),
            in_bits: 0,
            in_count: 0,
            code_len: 9,
            entries: 0,
            first: true,
            codes_done: false,
            packed: Vec::with_capacity(BLOCK_SIZE + 8),
            packed_pos: 0,
            out_bits: 0,
            out_count: 0,
            output: vec![0; BLOCK_SIZE],
            output_pos: 0,
            output_len: 0,
            finished: false,
        }
    }

    fn read_code(&mut self) -> Result<Option<u16>> {
        while self.in_count < self.code_len {
            match self.input.next_byte()? {
                Some(b) => {
                    self.in_bits = (self.in_bits << 8) | u32::from(b);
                    self.in_count += 8;
                },
                None => return Ok(None),
            }
        }
        self.in_count -= self.code_len;
        let code = (self.in_bits >> self.in_count) & ((1 << self.code_len) - 1);
        self.in_bits &= (1 << self.in_count) - 1;
        Ok(Some(code as u16))
    }

    /// The next 12 bits of input, without consuming them.
    fn peek_wide_code(&mut self) -> Result<Option<u16>> {
        while self.in_count < 12 {
            match self.input.next_byte()? {
                Some(b) => {
                    self.in_bits = (self.in_bits << 8) | u32::from(b);
                    self.in_count += 8;
                },
                None => return Ok(None),
            }
        }
        Ok(Some(((self.in_bits >> (self.in_count - 12)) & 0xFFF) as u16))
    }

    fn write_code(&mut self, code: u16) {
        self.out_bits = (self.out_bits << self.code_len) | u32::from(code);
        self.out_count += self.code_len;
        while self.out_count >= 8 {
            self.out_count -= 8;
            self.packed.push((self.out_bits >> self.out_count) as u8);
        }
        self.out_bits &= (1 << self.out_count) - 1;
    }

    fn flush_bits(&mut self) {
        if self.out_count > 0 {
            self.packed.push((self.out_bits << (8 - self.out_count)) as u8);
            self.out_bits = 0;
            self.out_count = 0;
        }
    }

    fn reset_table(&mut self) {
        self.code_len = 9;
        self.entries = 0;
        self.first = true;
    }

    /// The next code would need 13 bits.
    fn table_full(&self) -> bool {
        FIRST_CODE + self.entries + self.early_change >= MAX_CODES
    }

    /// Move the next block of codes from the input to `packed`.
    fn repack(&mut self) -> Result<()> {
        self.packed.drain(..self.packed_pos);
        self.packed_pos = 0;
        while self.packed.len() < BLOCK_SIZE && !self.codes_done {
            let code = match self.read_code()? {
                Some(code) => code,
                None => {
                    // missing EOD: end at the last complete code
                    self.flush_bits();
                    self.codes_done = true;
                    break;
                },
            };
            match code {
                CLEAR_CODE => {
                    self.write_code(code);
                    self.reset_table();
                },
                EOD_CODE => {
                    self.write_code(code);
                    self.flush_bits();
                    self.codes_done = true;
                },
                _ => {
                    if code < 256
                        && self.table_full()
                        && !matches!(self.peek_wide_code()?, Some(CLEAR_CODE | EOD_CODE))
                    {
                        log::debug!("LZWDecode: table full, clearing before code {}", code);
                        self.write_code(CLEAR_CODE);
                        self.reset_table();
                    }
                    self.write_code(code);
                    if self.first {
                        self.first = false;
                    } else if FIRST_CODE + self.entries < MAX_CODES {
                        self.entries += 1;
                        match FIRST_CODE + self.entries + self.early_change {
                            512 => self.code_len = 10,
                            1024 => self.code_len = 11,
                            2048 => self.code_len = 12,
                            _ => {},
                        }
                    }
                },
            }
        }
        Ok(())
    }

    /// Decode into `output` until some bytes are available or the data ends.
    fn fill(&mut self) -> Result<()> {
        loop {
            if self.packed_pos == self.packed.len() && !self.codes_done {
                self.repack()?;
            }
            let result = self
                .lzw
                .decode_bytes(&self.packed[self.packed_pos..], &mut self.output);
            self.packed_pos += result.consumed_in;
            self.output_pos = 0;
            self.output_len = result.consumed_out;

            match result.status {
                Err(err) => return Err(Error::Decode(format!("LZWDecode: {}", err))),
                Ok(LzwStatus::Done) => {
                    self.finished = true;
                    return Ok(());
                },
                Ok(_) => {},
            }
            if result.consumed_out > 0 {
                return Ok(());
            }
            if result.consumed_in == 0 {
                if self.codes_done && self.packed_pos == self.packed.len() {
                    self.finished = true;
                    return Ok(());
                }
                if !self.codes_done {
                    let pending = self.packed.len() - self.packed_pos;
                    self.repack()?;
                    if self.packed.len() == pending && !self.codes_done {
                        return Err(Error::Decode("LZWDecode: decoder stalled".to_string()));
                    }
                }
            }
        }
    }
}

fn new_lzw(early_change: bool) -> Decoder {
    if early_change {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        Decoder::new(BitOrder::Msb, 8)
    }
}

impl StreamDecoder for LzwDecoder {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            if self.output_pos == self.output_len {
                if self.finished {
                    break;
                }
                self.fill()?;
                continue;
            }
            let n = (self.output_len - self.output_pos).min(buf.len() - written);
            buf[written..written + n]
                .copy_from_slice(&self.output[self.output_pos..self.output_pos + n]);
            self.output_pos += n;
            written += n;
        }
        Ok(written)
    }

    fn rewind(&mut self) -> Result<()> {
        self.lzw.reset();
        self.reset_table();
        self.in_bits = 0;
        self.in_count = 0;
        self.codes_done = false;
        self.packed.clear();
        self.packed_pos = 0;
        self.out_bits = 0;
        self.out_count = 0;
        self.output_pos = 0;
        self.output_len = 0;
        self.finished = false;
        self.input.rewind()
    }

    fn name(&self) -> &str {
        "LZWDecode"
    }
}
