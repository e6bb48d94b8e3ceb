//! The capability sets every codec exposes, regardless of container format.

use std::io::{self, Read, Write};

use crate::entry::EntryDescriptor;
use crate::error::Result;
use crate::lifecycle::SessionState;
use crate::registry::FormatKey;

/// A session producing one container.
///
/// Required call order: `open_entry`, any number of `write`s, `close_entry`,
/// repeated per entry; then optionally `finalize`; then `close`.
pub trait WriterSession {
    fn format(&self) -> FormatKey;

    fn state(&self) -> SessionState;

    /// Bytes handed to the sink so far, headers and padding included.
    fn bytes_written(&self) -> u64;

    fn open_entry(&mut self, entry: EntryDescriptor) -> Result<()>;

    /// Append content to the open entry. Empty buffers are a no-op.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    fn close_entry(&mut self) -> Result<()>;

    /// Write the container trailer/index. Optional: `close` does it if needed.
    fn finalize(&mut self) -> Result<()>;

    /// Release the session. Safe to call more than once.
    fn close(&mut self) -> Result<()>;

    /// Flush the underlying sink. A no-op once the session is closed.
    fn flush(&mut self) -> Result<()>;

    /// Convenience for a whole entry in one go. Directories take empty content.
    fn add_entry(&mut self, entry: EntryDescriptor, content: &[u8]) -> Result<()> {
        self.open_entry(entry)?;
        if !content.is_empty() {
            self.write(content)?;
        }
        self.close_entry()
    }
}

/// A session walking the entries of one container.
pub trait ReaderSession {
    fn format(&self) -> FormatKey;

    /// The next entry, or `None` once the archive is exhausted. Unread content
    /// of the previous entry is skipped.
    fn next_entry(&mut self) -> Result<Option<EntryDescriptor>>;

    /// Read content of the current entry. Returns 0 at its end, or if there
    /// is no current entry.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Release the session. Safe to call more than once.
    fn close(&mut self) -> Result<()>;

    /// Read the remaining content of the current entry.
    fn read_entry_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut buf = [0u8; 8192];
        let mut total = 0;
        loop {
            match self.read(&mut buf)? {
                0 => return Ok(total),
                n => {
                    out.extend_from_slice(&buf[..n]);
                    total += n;
                }
            }
        }
    }
}

/// Streams content into the open entry, so `std::io::copy` and friends can
/// feed a session. On a `Box<dyn WriterSession>` go through `as_mut()`, since
/// the box's own `io::Write` impl shadows the session methods once `Write` is
/// in scope.
impl<'a> Write for dyn WriterSession + 'a {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        WriterSession::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(WriterSession::flush(self)?)
    }
}

impl<'a> Read for dyn ReaderSession + 'a {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(ReaderSession::read(self, buf)?)
    }
}
