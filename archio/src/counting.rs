//! Counting output channel used by every codec.

use crate::channel::{write_fully, write_fully_at, ByteSink};
use crate::error::Result;

const ZEROS: [u8; 512] = [0u8; 512];

/// Wraps a sink, sends every buffer through the reliable writer and tracks
/// the absolute offset of the next sequential byte.
pub struct OutputChannel<S> {
    inner: S,
    position: u64,
}

impl<S: ByteSink> OutputChannel<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, position: 0 }
    }

    /// Offset of the next sequentially written byte.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        write_fully(&mut self.inner, buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Overwrite already written bytes at `offset`. The sequential position is unchanged.
    pub fn patch(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        debug_assert!(offset + buf.len() as u64 <= self.position);
        tracing::trace!(offset, len = buf.len(), "patching written region");
        write_fully_at(&mut self.inner, buf, offset)
    }

    pub fn write_zeros(&mut self, mut count: u64) -> Result<()> {
        while count > 0 {
            let n = count.min(ZEROS.len() as u64) as usize;
            self.write(&ZEROS[..n])?;
            count -= n as u64;
        }
        Ok(())
    }

    /// Write zero bytes until the position is a multiple of `alignment`.
    pub fn pad_to(&mut self, alignment: u64) -> Result<()> {
        self.write_zeros(padding_for(self.position, alignment))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Bytes needed after `len` to reach the next multiple of `alignment`.
#[inline]
pub fn padding_for(len: u64, alignment: u64) -> u64 {
    match len % alignment {
        0 => 0,
        rem => alignment - rem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SeekableChannel;
    use std::io::Cursor;

    #[test]
    fn counts_and_patches() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut out = OutputChannel::new(SeekableChannel::new(&mut buf));
            out.write(b"hello").unwrap();
            assert_eq!(out.position(), 5);

            out.pad_to(4).unwrap();
            assert_eq!(out.position(), 8);

            out.patch(b"J", 0).unwrap();
            out.write(b" world").unwrap();
            assert_eq!(out.position(), 14);
        }
        assert_eq!(buf.into_inner(), b"Jello\0\0\0 world");
    }

    #[test]
    fn padding() {
        assert_eq!(padding_for(0, 512), 0);
        assert_eq!(padding_for(1, 512), 511);
        assert_eq!(padding_for(512, 512), 0);
        assert_eq!(padding_for(7, 2), 1);
    }
}
