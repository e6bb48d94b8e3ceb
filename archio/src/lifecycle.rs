//! Legal call orderings for archive sessions.
//!
//! Writer sessions move through [`SessionState`]:
//!
//! ```text
//!            open_entry            finalize            close
//!   Idle ──────────────▶ EntryOpen   Idle ─────▶ Finished ─────▶ Closed
//!    ▲                       │          │                          ▲
//!    └───── close_entry ─────┘          └────────── close ─────────┘
//! ```
//!
//! Finalizing is optional; closing from `Idle` makes the codec write its
//! trailer first. Closing twice is harmless, finalizing after a close never is.
//!
//! The checks here are split from the commits (`check_*` then `*_ed`) so a
//! codec can do its own validation and I/O between the two without the state
//! having moved yet.

use std::fmt;

use crate::entry::EntryDescriptor;
use crate::error::{ArchiveError, Result};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum SessionState {
    Idle,
    EntryOpen,
    Finished,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::EntryOpen => "entry open",
            SessionState::Finished => "finished",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// What a codec has to do to honour a `close` call.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CloseAction {
    /// The archive was never finalized: write the trailer, then release.
    FinalizeThenRelease,
    /// The trailer is already written.
    Release,
    /// Nothing to do.
    AlreadyClosed,
}

/// Per-session write-side state machine. Owns the current entry while one is open.
#[derive(Debug)]
pub struct EntryLifecycle {
    state: SessionState,
    current: Option<EntryDescriptor>,
}

impl Default for EntryLifecycle {
    fn default() -> Self {
        EntryLifecycle::new()
    }
}

impl EntryLifecycle {
    pub fn new() -> Self {
        EntryLifecycle {
            state: SessionState::Idle,
            current: None,
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn current(&self) -> Option<&EntryDescriptor> {
        self.current.as_ref()
    }

    pub fn check_open(&self, entry: &EntryDescriptor) -> Result<()> {
        match self.state {
            SessionState::Idle => {}
            SessionState::EntryOpen => return Err(ArchiveError::protocol("entry already open")),
            SessionState::Finished | SessionState::Closed => {
                return Err(ArchiveError::protocol("session already finished/closed"))
            }
        }

        if entry.name().is_empty() {
            return Err(ArchiveError::invalid_argument(
                "entry name must not be empty",
            ));
        }
        Ok(())
    }

    pub fn opened(&mut self, entry: EntryDescriptor) {
        debug_assert_eq!(self.state, SessionState::Idle);
        self.current = Some(entry);
        self.state = SessionState::EntryOpen;
    }

    /// The entry that content may be written to.
    pub fn check_write(&self) -> Result<&EntryDescriptor> {
        let entry = self.open_entry("no open entry")?;
        if entry.is_directory() {
            return Err(ArchiveError::protocol("directory entries carry no content"));
        }
        Ok(entry)
    }

    pub fn check_close_entry(&self) -> Result<&EntryDescriptor> {
        self.open_entry("no open entry to close")
    }

    /// Leave `EntryOpen`, handing back the descriptor of the closed entry.
    pub fn entry_closed(&mut self) -> Option<EntryDescriptor> {
        if self.state == SessionState::EntryOpen {
            self.state = SessionState::Idle;
        }
        self.current.take()
    }

    pub fn check_finalize(&self) -> Result<()> {
        match self.state {
            SessionState::Idle => Ok(()),
            SessionState::EntryOpen => Err(ArchiveError::protocol("entry still open")),
            SessionState::Finished => Err(ArchiveError::protocol("archive already finished")),
            SessionState::Closed => Err(ArchiveError::protocol(
                "finalize called after session closed",
            )),
        }
    }

    pub fn finalized(&mut self) {
        debug_assert_eq!(self.state, SessionState::Idle);
        self.state = SessionState::Finished;
    }

    pub fn check_close(&self) -> Result<CloseAction> {
        match self.state {
            SessionState::Idle => Ok(CloseAction::FinalizeThenRelease),
            SessionState::Finished => Ok(CloseAction::Release),
            SessionState::Closed => Ok(CloseAction::AlreadyClosed),
            SessionState::EntryOpen => Err(ArchiveError::protocol(
                "entry still open, close it first",
            )),
        }
    }

    pub fn closed(&mut self) {
        self.current = None;
        self.state = SessionState::Closed;
    }

    fn open_entry(&self, msg: &'static str) -> Result<&EntryDescriptor> {
        match (self.state, self.current.as_ref()) {
            (SessionState::EntryOpen, Some(entry)) => Ok(entry),
            _ => Err(ArchiveError::protocol(msg)),
        }
    }
}

/// Read-side state: a reader is usable until it is closed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ReadState {
    Ready,
    Closed,
}

#[derive(Debug)]
pub struct ReadLifecycle {
    state: ReadState,
}

impl Default for ReadLifecycle {
    fn default() -> Self {
        ReadLifecycle {
            state: ReadState::Ready,
        }
    }
}

impl ReadLifecycle {
    #[inline]
    pub fn state(&self) -> ReadState {
        self.state
    }

    pub fn check_ready(&self) -> Result<()> {
        match self.state {
            ReadState::Ready => Ok(()),
            ReadState::Closed => Err(ArchiveError::protocol("reader already closed")),
        }
    }

    /// Returns `false` if the reader was already closed.
    pub fn close(&mut self) -> bool {
        let was_open = self.state == ReadState::Ready;
        self.state = ReadState::Closed;
        was_open
    }
}
