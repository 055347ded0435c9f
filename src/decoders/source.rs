//! Terminal sources at the head of every decoder chain.

use bytes::Bytes;

use crate::decoders::StreamDecoder;
use crate::error::Result;
use crate::lexer::{borrow_shared, SharedTokenizer};

/// Raw bytes of a region of the document file.
///
/// Each read repositions the shared file tokenizer, so a source can be read
/// interleaved with object access on the same document.
pub struct FileSource {
    reader: SharedTokenizer,
    offset: u64,
    length: u64,
    pos: u64,
}

impl FileSource {
    /// Source over `length` bytes starting at file offset `offset`.
    pub fn new(reader: SharedTokenizer, offset: u64, length: u64) -> Self {
        Self {
            reader,
            offset,
            length,
            pos: 0,
        }
    }
}

impl StreamDecoder for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pos >= self.length || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min((self.length - self.pos) as usize);
        let mut tok = borrow_shared(&self.reader)?;
        tok.seek(self.offset + self.pos)?;
        let mut got = 0;
        while got < want {
            let n = tok.read(&mut buf[got..want])?;
            if n == 0 {
                break;
            }
            got += n;
        }
        self.pos += got as u64;
        Ok(got)
    }

    fn rewind(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn name(&self) -> &str {
        "FileSource"
    }
}

/// An in-memory buffer (object streams, tests, inline data).
pub struct MemorySource {
    data: Bytes,
    pos: usize,
}

impl MemorySource {
    /// Source over `data`.
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }
}

impl StreamDecoder for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn rewind(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn name(&self) -> &str {
        "MemorySource"
    }
}
