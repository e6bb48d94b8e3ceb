//! Container codecs.
//!
//! Write side: each format provides an [`EntryEncoder`] that lays out its
//! headers and trailer; [`ContainerWriter`] embeds the [`EntryLifecycle`],
//! moves content bytes and enforces the size limit, so call-order rules are
//! identical for every format.
//!
//! Read side: tar, cpio and ar are sequential and share [`StreamReader`] on top
//! of an [`EntryDecoder`]; zip reads its central directory and has its own
//! reader.

use std::io::{self, Read};

use crate::channel::ByteSink;
use crate::counting::OutputChannel;
use crate::entry::EntryDescriptor;
use crate::error::{ArchiveError, Result};
use crate::lifecycle::{CloseAction, EntryLifecycle, ReadLifecycle, SessionState};
use crate::limit::SizeLimit;
use crate::registry::FormatKey;
use crate::session::{ReaderSession, WriterSession};

pub mod ar;
pub mod cpio;
pub mod jar;
pub mod tar;
pub mod zip;

/// Format-specific layout for a write session.
pub trait EntryEncoder {
    fn format(&self) -> FormatKey;

    fn size_limit(&self) -> SizeLimit;

    /// Reject entries the format cannot represent.
    fn validate(&self, _entry: &EntryDescriptor) -> Result<()> {
        Ok(())
    }

    /// Write whatever precedes the content of `entry`. The size in `entry`
    /// is provisional and may be `None`.
    fn start_entry<S: ByteSink>(
        &mut self,
        out: &mut OutputChannel<S>,
        entry: &EntryDescriptor,
    ) -> Result<()>;

    /// Observe content as it is written.
    fn update(&mut self, _buf: &[u8]) {}

    /// Write whatever follows the content and fix up the header if the
    /// provisional size was wrong. `entry.size()` is the written size.
    fn finish_entry<S: ByteSink>(
        &mut self,
        out: &mut OutputChannel<S>,
        entry: &EntryDescriptor,
    ) -> Result<()>;

    fn finish_archive<S: ByteSink>(&mut self, out: &mut OutputChannel<S>) -> Result<()>;
}

/// The provisional size to put in a header at open time: the declared size
/// if the format can hold it, zero otherwise.
pub(crate) fn provisional_size(entry: &EntryDescriptor, limit: SizeLimit) -> u64 {
    match entry.size() {
        Some(size) if !entry.is_directory() && !limit.exceeded_by(size) => size,
        _ => 0,
    }
}

/// A writer session for any format with an [`EntryEncoder`].
pub struct ContainerWriter<S: ByteSink, E: EntryEncoder> {
    out: OutputChannel<S>,
    encoder: E,
    lifecycle: EntryLifecycle,
    written: u64,
}

impl<S: ByteSink, E: EntryEncoder> ContainerWriter<S, E> {
    pub fn new(sink: S, encoder: E) -> Self {
        ContainerWriter {
            out: OutputChannel::new(sink),
            encoder,
            lifecycle: EntryLifecycle::new(),
            written: 0,
        }
    }

    /// The entry currently open, if any.
    pub fn current_entry(&self) -> Option<&EntryDescriptor> {
        self.lifecycle.current()
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.encoder.finish_archive(&mut self.out)?;
        self.out.flush()?;
        tracing::debug!(
            format = %self.encoder.format(),
            size = self.out.position(),
            "wrote archive trailer"
        );
        Ok(())
    }
}

impl<S: ByteSink, E: EntryEncoder> WriterSession for ContainerWriter<S, E> {
    fn format(&self) -> FormatKey {
        self.encoder.format()
    }

    fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    fn bytes_written(&self) -> u64 {
        self.out.position()
    }

    fn open_entry(&mut self, entry: EntryDescriptor) -> Result<()> {
        self.lifecycle.check_open(&entry)?;
        self.encoder.validate(&entry)?;

        let offset = self.out.position();
        self.encoder.start_entry(&mut self.out, &entry)?;
        tracing::debug!(
            format = %self.encoder.format(),
            name = entry.name(),
            size = ?entry.size(),
            offset,
            "opened entry"
        );

        self.written = 0;
        self.lifecycle.opened(entry);
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.lifecycle.check_write()?;
        if buf.is_empty() {
            return Ok(());
        }

        self.out.write(buf)?;
        self.encoder.update(buf);
        self.written += buf.len() as u64;
        Ok(())
    }

    fn close_entry(&mut self) -> Result<()> {
        let limit = self.encoder.size_limit();
        let entry = self.lifecycle.check_close_entry()?;

        let checked = match entry.size() {
            Some(declared) => limit
                .check(entry.name(), declared)
                .and_then(|_| limit.check(entry.name(), self.written)),
            None => limit.check(entry.name(), self.written),
        };
        if let Err(err) = checked {
            // The entry is abandoned; the session may still be closed.
            self.lifecycle.entry_closed();
            return Err(err);
        }

        let mut entry = match self.lifecycle.entry_closed() {
            Some(entry) => entry,
            None => return Err(ArchiveError::protocol("no open entry to close")),
        };
        entry.set_size(self.written);
        self.encoder.finish_entry(&mut self.out, &entry)?;

        tracing::debug!(
            format = %self.encoder.format(),
            name = entry.name(),
            size = self.written,
            "closed entry"
        );
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.lifecycle.check_finalize()?;
        self.write_trailer()?;
        self.lifecycle.finalized();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let result = match self.lifecycle.check_close()? {
            CloseAction::AlreadyClosed => return Ok(()),
            CloseAction::FinalizeThenRelease => self.write_trailer(),
            CloseAction::Release => self.out.flush(),
        };

        self.lifecycle.closed();
        tracing::debug!(format = %self.encoder.format(), "closed writer session");
        result
    }

    fn flush(&mut self) -> Result<()> {
        if self.lifecycle.state() == SessionState::Closed {
            return Ok(());
        }
        self.out.flush()
    }
}

impl<S: ByteSink, E: EntryEncoder> Drop for ContainerWriter<S, E> {
    fn drop(&mut self) {
        if self.lifecycle.state() != SessionState::Closed {
            tracing::warn!(
                format = %self.encoder.format(),
                state = %self.lifecycle.state(),
                "writer session dropped without calling close(). Archive may be incomplete."
            );
        }
    }
}

/// A header read from a sequential archive.
#[derive(Debug)]
pub struct DecodedEntry {
    pub entry: EntryDescriptor,
    /// Content bytes following the header.
    pub data_len: u64,
    /// Bytes after the content before the next header.
    pub padding: u64,
}

/// Format-specific header parsing for sequential archives.
pub trait EntryDecoder {
    fn format(&self) -> FormatKey;

    /// Read the next header, or `None` at the end of the archive.
    fn next_header<R: Read>(&mut self, src: &mut R) -> Result<Option<DecodedEntry>>;
}

/// A reader session for tar, cpio and ar.
pub struct StreamReader<R, D> {
    src: R,
    decoder: D,
    lifecycle: ReadLifecycle,
    remaining: u64,
    padding: u64,
    exhausted: bool,
}

impl<R: Read, D: EntryDecoder> StreamReader<R, D> {
    pub fn new(src: R, decoder: D) -> Self {
        StreamReader {
            src,
            decoder,
            lifecycle: ReadLifecycle::default(),
            remaining: 0,
            padding: 0,
            exhausted: false,
        }
    }
}

impl<R: Read, D: EntryDecoder> ReaderSession for StreamReader<R, D> {
    fn format(&self) -> FormatKey {
        self.decoder.format()
    }

    fn next_entry(&mut self) -> Result<Option<EntryDescriptor>> {
        self.lifecycle.check_ready()?;
        if self.exhausted {
            return Ok(None);
        }

        skip(&mut self.src, self.remaining + self.padding)?;
        self.remaining = 0;
        self.padding = 0;

        match self.decoder.next_header(&mut self.src)? {
            Some(decoded) => {
                tracing::debug!(
                    format = %self.decoder.format(),
                    name = decoded.entry.name(),
                    size = decoded.data_len,
                    "read entry header"
                );
                self.remaining = decoded.data_len;
                self.padding = decoded.padding;
                Ok(Some(decoded.entry))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.lifecycle.check_ready()?;
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let max = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = read_retrying(&mut self.src, &mut buf[..max])?;
        if n == 0 {
            return Err(unexpected_eof());
        }
        self.remaining -= n as u64;
        Ok(n)
    }

    fn close(&mut self) -> Result<()> {
        if self.lifecycle.close() {
            tracing::debug!(format = %self.decoder.format(), "closed reader session");
        }
        Ok(())
    }
}

pub(crate) fn unexpected_eof() -> ArchiveError {
    ArchiveError::corrupt("unexpected end of archive")
}

fn read_retrying<R: Read + ?Sized>(src: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match src.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Fill `buf` completely. Returns `false` if the source was already at its
/// end; a partially filled buffer is an error.
pub(crate) fn read_block<R: Read + ?Sized>(src: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match read_retrying(src, &mut buf[filled..])? {
            0 if filled == 0 => return Ok(false),
            0 => return Err(unexpected_eof()),
            n => filled += n,
        }
    }
    Ok(true)
}

pub(crate) fn read_exact<R: Read + ?Sized>(src: &mut R, buf: &mut [u8]) -> Result<()> {
    src.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => unexpected_eof(),
        _ => ArchiveError::Io(e),
    })
}

pub(crate) fn skip<R: Read + ?Sized>(src: &mut R, count: u64) -> Result<()> {
    if count == 0 {
        return Ok(());
    }
    let skipped = io::copy(&mut src.take(count), &mut io::sink())?;
    if skipped != count {
        return Err(unexpected_eof());
    }
    Ok(())
}

/// Bytes of a fixed-width text field up to the first NUL.
pub(crate) fn field_str(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

pub(crate) fn utf8_name(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ArchiveError::corrupt("entry name is not valid UTF-8"))
}
