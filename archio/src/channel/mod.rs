//! Byte channels that archive writers push their output through.
//!
//! A channel reports the outcome of each write attempt as a [`WriteProgress`]
//! rather than a bare count, so that "nothing accepted this time" and "will
//! never accept anything again" can be told apart. [`reliable`] drives a
//! buffer to completion on top of that.

use std::io::{self, Seek, SeekFrom, Write};

pub mod reliable;

pub use self::reliable::{write_fully, write_fully_at};

/// Outcome of a single write attempt.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WriteProgress {
    /// The channel consumed this many bytes (always > 0).
    Advanced(usize),
    /// The channel consumed nothing this time but may on a later attempt.
    Stalled,
    /// The channel will not accept more data.
    Refused,
}

impl From<isize> for WriteProgress {
    /// Maps the classic signed write count: positive is progress, zero is a
    /// stall and negative is end-of-channel.
    fn from(n: isize) -> Self {
        match n {
            0 => WriteProgress::Stalled,
            n if n < 0 => WriteProgress::Refused,
            n => WriteProgress::Advanced(n as usize),
        }
    }
}

/// A channel accepting sequential writes at its implicit cursor.
pub trait WritableChannel {
    /// Attempt to write some prefix of `buf`.
    fn write_some(&mut self, buf: &[u8]) -> io::Result<WriteProgress>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A channel accepting writes at an absolute offset without moving its
/// implicit cursor.
pub trait PositionedChannel {
    fn write_some_at(&mut self, buf: &[u8], offset: u64) -> io::Result<WriteProgress>;
}

/// Everything a writer session needs from its output.
pub trait ByteSink: WritableChannel + PositionedChannel {}

impl<T: WritableChannel + PositionedChannel + ?Sized> ByteSink for T {}

impl<C: WritableChannel + ?Sized> WritableChannel for &mut C {
    #[inline]
    fn write_some(&mut self, buf: &[u8]) -> io::Result<WriteProgress> {
        (**self).write_some(buf)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

impl<C: PositionedChannel + ?Sized> PositionedChannel for &mut C {
    #[inline]
    fn write_some_at(&mut self, buf: &[u8], offset: u64) -> io::Result<WriteProgress> {
        (**self).write_some_at(buf, offset)
    }
}

impl<C: WritableChannel + ?Sized> WritableChannel for Box<C> {
    #[inline]
    fn write_some(&mut self, buf: &[u8]) -> io::Result<WriteProgress> {
        (**self).write_some(buf)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

impl<C: PositionedChannel + ?Sized> PositionedChannel for Box<C> {
    #[inline]
    fn write_some_at(&mut self, buf: &[u8], offset: u64) -> io::Result<WriteProgress> {
        (**self).write_some_at(buf, offset)
    }
}

/// Adapts any `std` seekable writer (a `File`, a `Cursor<Vec<u8>>`, ...) into a
/// [`ByteSink`].
///
/// `Ok(0)` from the inner writer is taken as a refusal, since that is what a
/// `std::io::Write` returning zero means. `Interrupted` and `WouldBlock` are
/// reported as stalls.
#[derive(Debug)]
pub struct SeekableChannel<W> {
    inner: W,
}

impl<W> SeekableChannel<W> {
    pub fn new(inner: W) -> Self {
        SeekableChannel { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn classify(result: io::Result<usize>) -> io::Result<WriteProgress> {
    match result {
        Ok(0) => Ok(WriteProgress::Refused),
        Ok(n) => Ok(WriteProgress::Advanced(n)),
        Err(e) if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) => {
            Ok(WriteProgress::Stalled)
        }
        Err(e) => Err(e),
    }
}

impl<W: Write> WritableChannel for SeekableChannel<W> {
    fn write_some(&mut self, buf: &[u8]) -> io::Result<WriteProgress> {
        classify(self.inner.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Seek> PositionedChannel for SeekableChannel<W> {
    fn write_some_at(&mut self, buf: &[u8], offset: u64) -> io::Result<WriteProgress> {
        let cursor = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(offset))?;
        let result = self.inner.write(buf);
        self.inner.seek(SeekFrom::Start(cursor))?;
        classify(result)
    }
}
