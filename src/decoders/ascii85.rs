//! ASCII85Decode implementation.
//!
//! Decodes base-85 encoded data (Adobe variant):
//! - Groups of 5 characters in `!`..`u` encode 4 bytes
//! - `z` abbreviates a group of four zero bytes
//! - `~` (normally `~>`) terminates the data
//! - A final partial group of n characters yields n-1 bytes

use crate::decoders::{BoxedDecoder, BufferedInput, StreamDecoder};
use crate::error::{Error, Result};
use crate::lexer::is_whitespace;

/// ASCII85Decode filter implementation.
pub struct Ascii85Decoder {
    input: BufferedInput,
    group: [u8; 4],
    group_len: usize,
    group_pos: usize,
    eof: bool,
}

impl Ascii85Decoder {
    /// Decode the output of `upstream`.
    pub fn new(upstream: BoxedDecoder) -> Self {
        Self {
            input: BufferedInput::new(upstream),
            group: [0; 4],
            group_len: 0,
            group_pos: 0,
            eof: false,
        }
    }

    fn next_significant(&mut self) -> Result<Option<u8>> {
        loop {
            match self.input.next_byte()? {
                Some(c) if is_whitespace(c) => continue,
                Some(b'~') | None => return Ok(None),
                other => return Ok(other),
            }
        }
    }

    fn decode_group(&mut self) -> Result<()> {
        self.group_pos = 0;
        self.group_len = 0;

        let first = match self.next_significant()? {
            Some(c) => c,
            None => {
                self.eof = true;
                return Ok(());
            },
        };
        if first == b'z' {
            self.group = [0; 4];
            self.group_len = 4;
            return Ok(());
        }

        let mut chars = [b'u'; 5];
        chars[0] = first;
        let mut count = 1;
        while count < 5 {
            match self.next_significant()? {
                Some(c) => {
                    chars[count] = c;
                    count += 1;
                },
                None => {
                    self.eof = true;
                    break;
                },
            }
        }
        if count == 1 {
            return Err(Error::Decode(
                "ASCII85Decode: final group has a single character".to_string(),
            ));
        }

        let mut value: u64 = 0;
        for &c in &chars {
            if !(b'!'..=b'u').contains(&c) {
                return Err(Error::Decode(format!(
                    "ASCII85Decode: invalid character 0x{:02X}",
                    c
                )));
            }
            value = value * 85 + u64::from(c - b'!');
        }
        if value > u64::from(u32::MAX) {
            return Err(Error::Decode("ASCII85Decode: group overflows 32 bits".to_string()));
        }
        self.group = (value as u32).to_be_bytes();
        self.group_len = count - 1;
        Ok(())
    }
}

impl StreamDecoder for Ascii85Decoder {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            if self.group_pos == self.group_len {
                if self.eof {
                    break;
                }
                self.decode_group()?;
                continue;
            }
            buf[written] = self.group[self.group_pos];
            self.group_pos += 1;
            written += 1;
        }
        Ok(written)
    }

    fn rewind(&mut self) -> Result<()> {
        self.group_len = 0;
        self.group_pos = 0;
        self.eof = false;
        self.input.rewind()
    }

    fn name(&self) -> &str {
        "ASCII85Decode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::{read_all, MemorySource};
    use bytes::Bytes;

    fn decode(input: &'static [u8]) -> Result<Vec<u8>> {
        let mut decoder = Ascii85Decoder::new(Box::new(MemorySource::new(Bytes::from_static(input))));
        read_all(&mut decoder, 0)
    }

    #[test]
    fn test_ascii85_decode_simple() {
        assert_eq!(decode(b"87cURD]i,\"Ebo80~>").unwrap(), b"Hello World");
    }

    #[test]
    fn test_ascii85_decode_z() {
        assert_eq!(decode(b"z~>").unwrap(), vec![0, 0, 0, 0]);
        assert_eq!(decode(b"zz").unwrap(), vec![0; 8]);
    }

    #[test]
    fn test_ascii85_whitespace_ignored() {
        assert_eq!(decode(b" 87cU\nRD]i,\"E bo80 ~>").unwrap(), b"Hello World");
    }

    #[test]
    fn test_ascii85_partial_groups() {
        // "A" = 0x41 -> "5l"
        assert_eq!(decode(b"5l~>").unwrap(), b"A");
        assert_eq!(decode(b"").unwrap(), b"");
    }

    #[test]
    fn test_ascii85_invalid_char() {
        assert!(decode(b"87cU{~>").is_err());
    }
}
