//! Unix `ar` archives, written with BSD `#1/<len>` long names and read in
//! both the BSD and the GNU dialect.

use std::io::Read;

use crate::channel::ByteSink;
use crate::counting::{padding_for, OutputChannel};
use crate::entry::{from_unix_seconds, EntryDescriptor, S_IFMT, S_IFREG};
use crate::error::{ArchiveError, Result};
use crate::formats::{
    provisional_size, read_block, read_exact, unexpected_eof, utf8_name, DecodedEntry,
    EntryDecoder, EntryEncoder,
};
use crate::limit::SizeLimit;
use crate::registry::FormatKey;

const GLOBAL_HEADER: &[u8; 8] = b"!<arch>\n";
const HEADER_LEN: usize = 60;
const END_MAGIC: &[u8; 2] = b"`\n";
const PAD: u8 = b'\n';
const BSD_LONG_PREFIX: &str = "#1/";

/// Longest BSD long name this reader accepts.
const MAX_LONG_NAME: u64 = 64 * 1024;

const NAME: std::ops::Range<usize> = 0..16;
const MTIME: std::ops::Range<usize> = 16..28;
const UID: std::ops::Range<usize> = 28..34;
const GID: std::ops::Range<usize> = 34..40;
const MODE: std::ops::Range<usize> = 40..48;
const SIZE: std::ops::Range<usize> = 48..58;
const END: std::ops::Range<usize> = 58..60;

type Header = [u8; HEADER_LEN];

fn put_field(header: &mut Header, range: std::ops::Range<usize>, text: &str) -> Result<()> {
    let field = &mut header[range];
    if text.len() > field.len() {
        return Err(ArchiveError::invalid_argument(format!(
            "`{}` does not fit a {}-byte ar header field",
            text,
            field.len()
        )));
    }
    field[..text.len()].copy_from_slice(text.as_bytes());
    Ok(())
}

fn encode_header(name: &str, mtime: u64, mode: u32, size: u64) -> Result<Header> {
    let mut header = [b' '; HEADER_LEN];
    put_field(&mut header, NAME, name)?;
    put_field(&mut header, MTIME, &mtime.to_string())?;
    put_field(&mut header, UID, "0")?;
    put_field(&mut header, GID, "0")?;
    put_field(&mut header, MODE, &format!("{:o}", mode))?;
    put_field(&mut header, SIZE, &size.to_string())?;
    header[END].copy_from_slice(END_MAGIC);
    Ok(header)
}

fn parse_field(field: &[u8], radix: u32) -> Result<u64> {
    let text = std::str::from_utf8(field)
        .map_err(|_| ArchiveError::corrupt("non-ASCII ar header field"))?
        .trim_end_matches(' ');
    if text.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(text, radix)
        .map_err(|_| ArchiveError::corrupt(format!("invalid ar header field `{}`", text)))
}

/// Header slot contents for an entry in progress.
#[derive(Debug)]
struct PendingHeader {
    offset: u64,
    name_field: String,
    name_len: u64,
    mtime: u64,
    mode: u32,
    provisional: u64,
}

#[derive(Debug, Default)]
pub struct ArEncoder {
    started: bool,
    pending: Option<PendingHeader>,
}

impl ArEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_started<S: ByteSink>(&mut self, out: &mut OutputChannel<S>) -> Result<()> {
        if !self.started {
            out.write(GLOBAL_HEADER)?;
            self.started = true;
        }
        Ok(())
    }
}

/// Names that would not survive the fixed field go after the header.
fn needs_long_name(name: &str) -> bool {
    name.len() > NAME.len()
        || name.contains(' ')
        || name.starts_with('/')
        || name.ends_with('/')
        || name.starts_with(BSD_LONG_PREFIX)
}

impl EntryEncoder for ArEncoder {
    fn format(&self) -> FormatKey {
        FormatKey::Ar
    }

    fn size_limit(&self) -> SizeLimit {
        SizeLimit::AR
    }

    fn validate(&self, entry: &EntryDescriptor) -> Result<()> {
        if entry.is_directory() {
            return Err(ArchiveError::invalid_argument(
                "ar archives cannot contain directories",
            ));
        }
        Ok(())
    }

    fn start_entry<S: ByteSink>(
        &mut self,
        out: &mut OutputChannel<S>,
        entry: &EntryDescriptor,
    ) -> Result<()> {
        self.ensure_started(out)?;

        let name = entry.name();
        let (name_field, name_len) = if needs_long_name(name) {
            (format!("{}{}", BSD_LONG_PREFIX, name.len()), name.len() as u64)
        } else {
            (name.to_string(), 0)
        };

        let mode = match entry.mode() & S_IFMT {
            0 => S_IFREG | entry.permissions(),
            _ => entry.mode(),
        };
        let mtime = entry.modified().timestamp().max(0) as u64;
        // The size field also counts the long name.
        let provisional = match provisional_size(entry, self.size_limit()) {
            size if self.size_limit().exceeded_by(name_len + size) => 0,
            size => size,
        };

        let offset = out.position();
        let header = encode_header(&name_field, mtime, mode, name_len + provisional)?;
        out.write(&header)?;
        if name_len > 0 {
            out.write(name.as_bytes())?;
        }

        self.pending = Some(PendingHeader {
            offset,
            name_field,
            name_len,
            mtime,
            mode,
            provisional,
        });
        Ok(())
    }

    fn finish_entry<S: ByteSink>(
        &mut self,
        out: &mut OutputChannel<S>,
        entry: &EntryDescriptor,
    ) -> Result<()> {
        let size = entry.size().unwrap_or(0);
        let pending = match self.pending.take() {
            Some(pending) => pending,
            None => return Ok(()),
        };
        self.size_limit().check(entry.name(), pending.name_len + size)?;

        if padding_for(pending.name_len + size, 2) == 1 {
            out.write(&[PAD])?;
        }

        if size != pending.provisional {
            let header = encode_header(
                &pending.name_field,
                pending.mtime,
                pending.mode,
                pending.name_len + size,
            )?;
            out.patch(&header, pending.offset)?;
        }
        Ok(())
    }

    fn finish_archive<S: ByteSink>(&mut self, out: &mut OutputChannel<S>) -> Result<()> {
        self.ensure_started(out)
    }
}

#[derive(Debug, Default)]
pub struct ArDecoder {
    started: bool,
}

impl ArDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntryDecoder for ArDecoder {
    fn format(&self) -> FormatKey {
        FormatKey::Ar
    }

    fn next_header<R: Read>(&mut self, src: &mut R) -> Result<Option<DecodedEntry>> {
        if !self.started {
            let mut magic = [0u8; 8];
            if !read_block(src, &mut magic)? {
                return Err(unexpected_eof());
            }
            if &magic != GLOBAL_HEADER {
                return Err(ArchiveError::corrupt("missing ar global header"));
            }
            self.started = true;
        }

        loop {
            let mut header: Header = [0u8; HEADER_LEN];
            if !read_block(src, &mut header)? {
                return Ok(None);
            }
            if header[END] != END_MAGIC[..] {
                return Err(ArchiveError::corrupt("bad ar header terminator"));
            }

            let raw_name = std::str::from_utf8(&header[NAME])
                .map_err(|_| ArchiveError::corrupt("entry name is not valid UTF-8"))?
                .trim_end_matches(' ');
            let size = parse_field(&header[SIZE], 10)?;
            let padding = padding_for(size, 2);

            // GNU symbol tables.
            if raw_name == "/" || raw_name == "/SYM64/" {
                tracing::trace!(name = raw_name, size, "skipping ar symbol table");
                crate::formats::skip(src, size + padding)?;
                continue;
            }
            if raw_name == "//" || (raw_name.starts_with('/') && raw_name.len() > 1) {
                return Err(ArchiveError::UnsupportedFormat(
                    "ar with GNU extended name table".to_string(),
                ));
            }

            let (name, data_len) = match raw_name.strip_prefix(BSD_LONG_PREFIX) {
                Some(len) => {
                    let len: u64 = len
                        .parse()
                        .map_err(|_| ArchiveError::corrupt("invalid BSD long name length"))?;
                    if len > MAX_LONG_NAME || len > size {
                        return Err(ArchiveError::corrupt("invalid BSD long name length"));
                    }
                    let mut buf = vec![0u8; len as usize];
                    read_exact(src, &mut buf)?;
                    while buf.last() == Some(&0) {
                        buf.pop();
                    }
                    (utf8_name(&buf)?, size - len)
                }
                None => (raw_name.trim_end_matches('/').to_string(), size),
            };

            let mode = parse_field(&header[MODE], 8)? as u32;
            let mode = match mode & S_IFMT {
                0 => S_IFREG | (mode & 0o7777),
                _ => mode,
            };
            let mtime = i64::try_from(parse_field(&header[MTIME], 10)?).unwrap_or(i64::MAX);

            return Ok(Some(DecodedEntry {
                entry: EntryDescriptor::from_parts(name, data_len, from_unix_seconds(mtime), mode),
                data_len,
                padding,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SeekableChannel;
    use crate::formats::{ContainerWriter, StreamReader};
    use crate::session::{ReaderSession, WriterSession};
    use std::io::Cursor;

    fn write_ar(entries: &[(EntryDescriptor, &[u8])]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = ContainerWriter::new(SeekableChannel::new(&mut buf), ArEncoder::new());
            for (entry, content) in entries {
                writer.add_entry(entry.clone(), content).unwrap();
            }
            writer.close().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn empty_archive_has_global_header() {
        assert_eq!(write_ar(&[]), GLOBAL_HEADER);
    }

    #[test]
    fn header_layout_and_padding() {
        let data = write_ar(&[(EntryDescriptor::file("a.o", 3), &b"abc"[..])]);

        assert_eq!(&data[..8], GLOBAL_HEADER);
        let header = &data[8..68];
        assert_eq!(&header[NAME], b"a.o             ");
        assert_eq!(&header[MODE], b"100644  ");
        assert_eq!(&header[SIZE], b"3         ");
        assert_eq!(&header[END], b"`\n");
        assert_eq!(&data[68..71], b"abc");
        assert_eq!(data[71], b'\n');
        assert_eq!(data.len(), 72);
    }

    #[test]
    fn streamed_size_is_backfilled() {
        let data = write_ar(&[(EntryDescriptor::streamed("s"), &b"1234"[..])]);
        assert_eq!(&data[8 + 48..8 + 58], b"4         ");
    }

    #[test]
    fn long_names_round_trip() {
        let long = "a much longer member name.txt";
        let data = write_ar(&[
            (EntryDescriptor::file(long, 5), &b"hello"[..]),
            (EntryDescriptor::file("b", 1), &b"b"[..]),
        ]);
        assert_eq!(&data[8..13], b"#1/29");

        let mut reader = StreamReader::new(Cursor::new(data), ArDecoder::new());
        let first = reader.next_entry().unwrap().unwrap();
        assert_eq!(first.name(), long);
        assert_eq!(first.size(), Some(5));
        let mut content = Vec::new();
        reader.read_entry_to_end(&mut content).unwrap();
        assert_eq!(content, b"hello");

        let second = reader.next_entry().unwrap().unwrap();
        assert_eq!(second.name(), "b");
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn names_that_look_like_long_name_references() {
        let data = write_ar(&[(EntryDescriptor::file("#1/5", 2), &b"ok"[..])]);
        assert_eq!(&data[8..12], b"#1/4");

        let mut reader = StreamReader::new(Cursor::new(data), ArDecoder::new());
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.name(), "#1/5");
        assert_eq!(entry.size(), Some(2));
        let mut content = Vec::new();
        reader.read_entry_to_end(&mut content).unwrap();
        assert_eq!(content, b"ok");
    }

    #[test]
    fn long_name_counts_toward_the_size_field() {
        let long = "a member name past sixteen bytes";
        let size = SizeLimit::AR.max() - 4;
        let mut buf = Cursor::new(Vec::new());
        let mut encoder = ArEncoder::new();

        let err = {
            let mut out = OutputChannel::new(SeekableChannel::new(&mut buf));
            encoder
                .start_entry(&mut out, &EntryDescriptor::file(long, size))
                .unwrap();
            encoder
                .finish_entry(&mut out, &EntryDescriptor::file(long, size))
                .unwrap_err()
        };
        // Too large once the name is counted, so the placeholder is zero.
        assert_eq!(&buf.get_ref()[8 + 48..8 + 58], b"32        ");
        assert_eq!(err.kind(), crate::ErrorKind::SizeLimitExceeded);
        assert_eq!(
            err.to_string(),
            format!("{}'s size exceeds the limit of 10GByte.", long)
        );
    }

    #[test]
    fn gnu_names_and_symbol_tables() {
        let mut data = GLOBAL_HEADER.to_vec();
        data.extend_from_slice(&encode_header("/", 0, 0, 4).unwrap());
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.extend_from_slice(&encode_header("libc.o/", 7, 0o644, 1).unwrap());
        data.extend_from_slice(b"x\n");

        let mut reader = StreamReader::new(Cursor::new(data), ArDecoder::new());
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.name(), "libc.o");
        assert_eq!(entry.modified().timestamp(), 7);
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn gnu_name_table_is_unsupported() {
        let mut data = GLOBAL_HEADER.to_vec();
        data.extend_from_slice(&encode_header("//", 0, 0, 0).unwrap());

        let mut reader = StreamReader::new(Cursor::new(data), ArDecoder::new());
        let err = reader.next_entry().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn directories_are_rejected() {
        let mut writer = ContainerWriter::new(
            SeekableChannel::new(Cursor::new(Vec::new())),
            ArEncoder::new(),
        );
        let err = writer
            .open_entry(EntryDescriptor::directory("dir"))
            .unwrap_err();
        assert_eq!(err.to_string(), "ar archives cannot contain directories");
        writer.close().unwrap();
    }
}
