//! Full-buffer writes on top of channels that may accept only part of a
//! buffer per call.
//!
//! A positive result advances the buffer, a stall is retried immediately and
//! a refusal ends the write with [`ArchiveError::IncompleteWrite`], even if
//! earlier attempts made progress. There is no retry cap and no backoff: a
//! channel that stalls forever blocks the caller forever.

use std::io;

use super::{PositionedChannel, WritableChannel, WriteProgress};
use crate::error::{ArchiveError, Result};

/// A buffer to send and, for positioned writes, the offset it starts at.
#[derive(Debug)]
pub struct WriteRequest<'a> {
    buf: &'a [u8],
    consumed: usize,
    offset: Option<u64>,
}

impl<'a> WriteRequest<'a> {
    pub fn sequential(buf: &'a [u8]) -> Self {
        WriteRequest {
            buf,
            consumed: 0,
            offset: None,
        }
    }

    pub fn positioned(buf: &'a [u8], offset: u64) -> Self {
        WriteRequest {
            buf,
            consumed: 0,
            offset: Some(offset),
        }
    }

    #[inline]
    pub fn remaining(&self) -> &'a [u8] {
        let buf: &'a [u8] = self.buf;
        &buf[self.consumed..]
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.consumed == self.buf.len()
    }

    /// The offset the next attempt targets, for positioned requests.
    #[inline]
    pub fn next_offset(&self) -> Option<u64> {
        self.offset.map(|start| start + self.consumed as u64)
    }

    /// Drive the request to completion, issuing one attempt per iteration.
    fn drive<F>(mut self, mut attempt: F) -> Result<()>
    where
        F: FnMut(&[u8], Option<u64>) -> io::Result<WriteProgress>,
    {
        while !self.is_complete() {
            let remaining = self.remaining();
            match attempt(remaining, self.next_offset())? {
                WriteProgress::Advanced(n) if n > remaining.len() => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "channel reported {} bytes written of {} requested",
                            n,
                            remaining.len()
                        ),
                    )
                    .into());
                }
                WriteProgress::Advanced(n) => {
                    self.consumed += n;
                    tracing::trace!(
                        written = n,
                        consumed = self.consumed,
                        total = self.buf.len(),
                        "partial channel write"
                    );
                }
                WriteProgress::Stalled => {
                    tracing::trace!(
                        consumed = self.consumed,
                        total = self.buf.len(),
                        "channel made no progress, retrying"
                    );
                }
                WriteProgress::Refused => {
                    tracing::debug!(
                        consumed = self.consumed,
                        total = self.buf.len(),
                        "channel refused further writes"
                    );
                    return Err(ArchiveError::IncompleteWrite);
                }
            }
        }
        Ok(())
    }
}

/// Write all of `buf` at the channel's implicit cursor.
pub fn write_fully<C: WritableChannel + ?Sized>(channel: &mut C, buf: &[u8]) -> Result<()> {
    WriteRequest::sequential(buf).drive(|chunk, _| channel.write_some(chunk))
}

/// Write all of `buf` starting at `offset`. Each attempt targets the start
/// offset advanced by the bytes consumed so far.
pub fn write_fully_at<C: PositionedChannel + ?Sized>(
    channel: &mut C,
    buf: &[u8],
    offset: u64,
) -> Result<()> {
    WriteRequest::positioned(buf, offset).drive(|chunk, at| {
        let at = at.unwrap_or(offset);
        channel.write_some_at(chunk, at)
    })
}
