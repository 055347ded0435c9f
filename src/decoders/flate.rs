//! FlateDecode (zlib/deflate) implementation.
//!
//! This is the most common PDF compression filter. The 2-byte zlib header is
//! checked by hand and the body is fed to a raw-deflate [`flate2::Decompress`]
//! in 4 KiB input blocks, so decoding is incremental.

use flate2::{Decompress, FlushDecompress, Status};

use crate::decoders::{BoxedDecoder, StreamDecoder, BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::lexer::is_whitespace;

/// FlateDecode filter implementation.
pub struct FlateDecoder {
    upstream: BoxedDecoder,
    inflater: Decompress,
    input: Box<[u8; BLOCK_SIZE]>,
    in_pos: usize,
    in_len: usize,
    upstream_done: bool,
    header_checked: bool,
    finished: bool,
}

impl FlateDecoder {
    /// Inflate the output of `upstream`.
    pub fn new(upstream: BoxedDecoder) -> Self {
        Self {
            upstream,
            inflater: Decompress::new(false),
            input: Box::new([0u8; BLOCK_SIZE]),
            in_pos: 0,
            in_len: 0,
            upstream_done: false,
            header_checked: false,
            finished: false,
        }
    }

    fn fill_input(&mut self) -> Result<()> {
        if self.in_pos == self.in_len && !self.upstream_done {
            self.in_len = self.upstream.read(&mut self.input[..])?;
            self.in_pos = 0;
            if self.in_len == 0 {
                self.upstream_done = true;
            }
        }
        Ok(())
    }

    fn next_input_byte(&mut self) -> Result<Option<u8>> {
        self.fill_input()?;
        if self.in_pos == self.in_len {
            return Ok(None);
        }
        let b = self.input[self.in_pos];
        self.in_pos += 1;
        Ok(Some(b))
    }

    /// Consume and validate the zlib header. Problems are logged, not fatal:
    /// the raw inflater reports real corruption on its own.
    fn check_header(&mut self) -> Result<()> {
        self.header_checked = true;
        let cmf = loop {
            match self.next_input_byte()? {
                Some(b) if is_whitespace(b) => continue,
                Some(b) => break b,
                None => return Ok(()),
            }
        };
        let flg = match self.next_input_byte()? {
            Some(b) => b,
            None => {
                log::error!("FlateDecode: truncated zlib header");
                return Ok(());
            },
        };

        if cmf & 0x0F != 8 {
            log::error!("FlateDecode: unknown compression method {}", cmf & 0x0F);
        }
        if ((u16::from(cmf) << 8) | u16::from(flg)) % 31 != 0 {
            log::error!("FlateDecode: bad zlib header check bits");
        }
        if flg & 0x20 != 0 {
            log::error!("FlateDecode: preset dictionary is not supported");
        }
        Ok(())
    }
}

impl StreamDecoder for FlateDecoder {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }
        if !self.header_checked {
            self.check_header()?;
        }

        loop {
            self.fill_input()?;
            let flush = if self.upstream_done {
                FlushDecompress::Finish
            } else {
                FlushDecompress::None
            };

            let before_in = self.inflater.total_in();
            let before_out = self.inflater.total_out();
            let status = self
                .inflater
                .decompress(&self.input[self.in_pos..self.in_len], buf, flush)
                .map_err(|e| Error::Decode(format!("FlateDecode: {}", e)))?;
            let consumed = (self.inflater.total_in() - before_in) as usize;
            let produced = (self.inflater.total_out() - before_out) as usize;
            self.in_pos += consumed;

            if status == Status::StreamEnd {
                // The adler32 trailer that follows is not needed.
                self.finished = true;
                return Ok(produced);
            }
            if produced > 0 {
                return Ok(produced);
            }
            if self.upstream_done && consumed == 0 {
                log::warn!("FlateDecode: input ended before end of deflate stream");
                self.finished = true;
                return Ok(0);
            }
        }
    }

    fn rewind(&mut self) -> Result<()> {
        self.inflater.reset(false);
        self.in_pos = 0;
        self.in_len = 0;
        self.upstream_done = false;
        self.header_checked = false;
        self.finished = false;
        self.upstream.rewind()
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::{read_all, MemorySource};
    use bytes::Bytes;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn decoder_for(data: Vec<u8>) -> FlateDecoder {
        FlateDecoder::new(Box::new(MemorySource::new(Bytes::from(data))))
    }

    #[test]
    fn test_flate_decode_simple() {
        let original = b"Hello, FlateDecode!";
        let mut decoder = decoder_for(compress(original));
        assert_eq!(read_all(&mut decoder, 0).unwrap(), original);
    }

    #[test]
    fn test_flate_decode_empty() {
        let mut decoder = decoder_for(compress(b""));
        assert!(read_all(&mut decoder, 0).unwrap().is_empty());
    }

    #[test]
    fn test_flate_decode_large_in_small_reads() {
        let original: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let mut decoder = decoder_for(compress(&original));
        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = decoder.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, original);
    }

    #[test]
    fn test_flate_skips_leading_whitespace() {
        let mut data = b"\r\n".to_vec();
        data.extend(compress(b"abc"));
        let mut decoder = decoder_for(data);
        assert_eq!(read_all(&mut decoder, 0).unwrap(), b"abc");
    }

    #[test]
    fn test_flate_rewind_restarts() {
        let mut decoder = decoder_for(compress(b"rewind me"));
        assert_eq!(read_all(&mut decoder, 0).unwrap(), b"rewind me");
        decoder.rewind().unwrap();
        assert_eq!(read_all(&mut decoder, 0).unwrap(), b"rewind me");
    }

    #[test]
    fn test_flate_decode_invalid_data() {
        let mut decoder = decoder_for(vec![0x78, 0x9C, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(read_all(&mut decoder, 0).is_err());
    }

    #[test]
    fn test_flate_truncated_input_returns_partial() {
        let original: Vec<u8> = (0..2000u32).map(|i| (i * 7 % 256) as u8).collect();
        let mut compressed = compress(&original);
        compressed.truncate(compressed.len() - 6);
        let mut decoder = decoder_for(compressed);
        match read_all(&mut decoder, 0) {
            Ok(out) => assert!(original.starts_with(&out)),
            Err(e) => assert!(e.to_string().contains("FlateDecode")),
        }
    }
}
