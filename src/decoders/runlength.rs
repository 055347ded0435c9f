//! RunLengthDecode implementation.
//!
//! Decodes run-length encoded data according to PDF specification:
//! - Length byte 0-127: Copy next N+1 bytes literally
//! - Length byte 128: EOD marker
//! - Length byte 129-255: Repeat next byte 257-N times

use crate::decoders::{BoxedDecoder, BufferedInput, StreamDecoder};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
enum Run {
    None,
    Literal(usize),
    Repeat(u8, usize),
    Done,
}

/// RunLengthDecode filter implementation.
pub struct RunLengthDecoder {
    input: BufferedInput,
    run: Run,
}

impl RunLengthDecoder {
    /// Decode the output of `upstream`.
    pub fn new(upstream: BoxedDecoder) -> Self {
        Self {
            input: BufferedInput::new(upstream),
            run: Run::None,
        }
    }

    fn next_run(&mut self) -> Result<()> {
        self.run = match self.input.next_byte()? {
            None | Some(128) => Run::Done,
            Some(len @ 0..=127) => Run::Literal(len as usize + 1),
            Some(len) => match self.input.next_byte()? {
                Some(byte) => Run::Repeat(byte, 257 - len as usize),
                None => {
                    return Err(Error::Decode(
                        "RunLengthDecode: missing byte for run".to_string(),
                    ));
                },
            },
        };
        Ok(())
    }
}

impl StreamDecoder for RunLengthDecoder {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            match self.run {
                Run::Done => break,
                Run::None | Run::Literal(0) | Run::Repeat(_, 0) => self.next_run()?,
                Run::Literal(left) => match self.input.next_byte()? {
                    Some(b) => {
                        buf[written] = b;
                        written += 1;
                        self.run = Run::Literal(left - 1);
                    },
                    None => {
                        log::warn!("RunLengthDecode: literal run truncated");
                        self.run = Run::Done;
                    },
                },
                Run::Repeat(byte, left) => {
                    let n = left.min(buf.len() - written);
                    buf[written..written + n].fill(byte);
                    written += n;
                    self.run = Run::Repeat(byte, left - n);
                },
            }
        }
        Ok(written)
    }

    fn rewind(&mut self) -> Result<()> {
        self.run = Run::None;
        self.input.rewind()
    }

    fn name(&self) -> &str {
        "RunLengthDecode"
    }
}
