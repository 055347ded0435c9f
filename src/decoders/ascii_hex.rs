//! ASCIIHexDecode implementation.
//!
//! Decodes pairs of hexadecimal digits to bytes. Whitespace is ignored, `>`
//! ends the data and an odd final digit is completed with 0.

use crate::decoders::{BoxedDecoder, BufferedInput, StreamDecoder};
use crate::error::Result;
use crate::lexer::is_whitespace;

/// ASCIIHexDecode filter implementation.
pub struct AsciiHexDecoder {
    input: BufferedInput,
    eof: bool,
}

impl AsciiHexDecoder {
    /// Decode the output of `upstream`.
    pub fn new(upstream: BoxedDecoder) -> Self {
        Self {
            input: BufferedInput::new(upstream),
            eof: false,
        }
    }

    /// Next hex digit value, or `None` at end of data.
    fn next_digit(&mut self) -> Result<Option<u8>> {
        loop {
            let c = match self.input.next_byte()? {
                Some(c) if is_whitespace(c) => continue,
                Some(b'>') | None => return Ok(None),
                Some(c) => c,
            };
            return match (c as char).to_digit(16) {
                Some(d) => Ok(Some(d as u8)),
                None => {
                    log::error!("ASCIIHexDecode: invalid character 0x{:02X}", c);
                    Ok(None)
                },
            };
        }
    }
}

impl StreamDecoder for AsciiHexDecoder {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        while written < buf.len() && !self.eof {
            let high = match self.next_digit()? {
                Some(d) => d,
                None => {
                    self.eof = true;
                    break;
                },
            };
            let low = match self.next_digit()? {
                Some(d) => d,
                None => {
                    self.eof = true;
                    0
                },
            };
            buf[written] = (high << 4) | low;
            written += 1;
        }
        Ok(written)
    }

    fn rewind(&mut self) -> Result<()> {
        self.eof = false;
        self.input.rewind()
    }

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}
