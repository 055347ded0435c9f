//! Output length limiter for image streams.
//!
//! Flate and fax decoders may run past the real image (padding, corrupt
//! `/Length`). The limiter caps the chain at `row_bytes * height`.

use crate::decoders::{BoxedDecoder, StreamDecoder};
use crate::error::Result;

/// Stage that stops after a fixed number of bytes.
pub struct Limiter {
    upstream: BoxedDecoder,
    limit: u64,
    left: u64,
}

impl Limiter {
    /// Pass through at most `limit` bytes of `upstream`.
    pub fn new(upstream: BoxedDecoder, limit: u64) -> Self {
        Self {
            upstream,
            limit,
            left: limit,
        }
    }
}

impl StreamDecoder for Limiter {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.left == 0 {
            return Ok(0);
        }
        let want = buf.len().min(self.left.min(usize::MAX as u64) as usize);
        let n = self.upstream.read(&mut buf[..want])?;
        self.left -= n as u64;
        Ok(n)
    }

    fn rewind(&mut self) -> Result<()> {
        self.left = self.limit;
        self.upstream.rewind()
    }

    fn name(&self) -> &str {
        "Limiter"
    }
}
