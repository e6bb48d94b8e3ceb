//! Streaming read and write sessions for zip, jar, ar, cpio and tar containers.
//!
//! Every format is driven through the same [`WriterSession`] and
//! [`ReaderSession`] capability sets, obtained from a [`FormatRegistry`] by
//! format key. Writer sessions push their output through a [`ByteSink`],
//! which the [`reliable`](channel::reliable) writer drives until each buffer
//! has been fully accepted, and refuse entries larger than their format can
//! represent with a [`SizeLimitExceeded`](ArchiveError::SizeLimitExceeded)
//! error.
//!
//! ```
//! use std::io::Cursor;
//! use archio::{EntryDescriptor, FormatRegistry, SeekableChannel};
//!
//! # fn main() -> archio::Result<()> {
//! let mut out = Cursor::new(Vec::new());
//! let registry = FormatRegistry::new();
//! let mut writer = registry.create_writer(Some("tar"), Some(SeekableChannel::new(&mut out)))?;
//! writer.open_entry(EntryDescriptor::file("hello.txt", 5))?;
//! writer.write(b"hello")?;
//! writer.close_entry()?;
//! writer.close()?;
//! drop(writer);
//!
//! out.set_position(0);
//! let mut reader = registry.create_reader(Some("tar"), Some(out))?;
//! let entry = reader.next_entry()?.expect("one entry");
//! assert_eq!(entry.name(), "hello.txt");
//! # Ok(())
//! # }
//! ```

pub mod channel;
mod counting;
pub mod entry;
mod error;
pub mod formats;
pub mod lifecycle;
pub mod limit;
pub mod registry;
pub mod session;

pub use channel::{
    write_fully, write_fully_at, ByteSink, PositionedChannel, SeekableChannel, WritableChannel,
    WriteProgress,
};
pub use counting::{padding_for, OutputChannel};
pub use entry::EntryDescriptor;
pub use error::{ArchiveError, ErrorKind, Result};
pub use formats::{ContainerWriter, EntryDecoder, EntryEncoder, StreamReader};
pub use lifecycle::{CloseAction, EntryLifecycle, SessionState};
pub use limit::SizeLimit;
pub use registry::{ByteSource, FormatKey, FormatRegistry, WriterOptions};
pub use session::{ReaderSession, WriterSession};
