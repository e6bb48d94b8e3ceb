//! SVR4 "newc" cpio archives (magic `070701`, CRC variant `070702` on read).

use std::io::Read;

use crate::channel::ByteSink;
use crate::counting::{padding_for, OutputChannel};
use crate::entry::{from_unix_seconds, EntryDescriptor, S_IFDIR, S_IFMT, S_IFREG};
use crate::error::{ArchiveError, Result};
use crate::formats::{
    provisional_size, read_block, read_exact, skip, utf8_name, DecodedEntry, EntryDecoder,
    EntryEncoder,
};
use crate::limit::SizeLimit;
use crate::registry::FormatKey;

const MAGIC_NEWC: &[u8; 6] = b"070701";
const MAGIC_CRC: &[u8; 6] = b"070702";
const HEADER_LEN: usize = 110;
const ALIGNMENT: u64 = 4;
const BLOCK_LEN: u64 = 512;
const TRAILER: &str = "TRAILER!!!";

/// Longest name this reader accepts, NUL included.
const MAX_NAME_LEN: u64 = 64 * 1024;

/// Numeric fields of a newc header, in on-disk order after the magic.
#[derive(Debug, Default, Clone, Copy)]
struct NewcHeader {
    ino: u32,
    mode: u32,
    uid: u32,
    gid: u32,
    nlink: u32,
    mtime: u32,
    filesize: u32,
    dev_major: u32,
    dev_minor: u32,
    rdev_major: u32,
    rdev_minor: u32,
    namesize: u32,
    check: u32,
}

impl NewcHeader {
    fn encode(&self) -> [u8; HEADER_LEN] {
        let text = format!(
            "{}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}",
            std::str::from_utf8(MAGIC_NEWC).unwrap_or("070701"),
            self.ino,
            self.mode,
            self.uid,
            self.gid,
            self.nlink,
            self.mtime,
            self.filesize,
            self.dev_major,
            self.dev_minor,
            self.rdev_major,
            self.rdev_minor,
            self.namesize,
            self.check,
        );
        let mut buf = [0u8; HEADER_LEN];
        buf.copy_from_slice(text.as_bytes());
        buf
    }

    fn decode(buf: &[u8; HEADER_LEN]) -> Result<NewcHeader> {
        let magic = &buf[..6];
        if magic != MAGIC_NEWC && magic != MAGIC_CRC {
            return Err(ArchiveError::corrupt("unknown cpio magic number"));
        }

        let mut fields = [0u32; 13];
        for (i, field) in fields.iter_mut().enumerate() {
            let start = 6 + i * 8;
            let text = std::str::from_utf8(&buf[start..start + 8])
                .map_err(|_| ArchiveError::corrupt("non-ASCII cpio header field"))?;
            *field = u32::from_str_radix(text, 16).map_err(|_| {
                ArchiveError::corrupt(format!("invalid hex cpio header field `{}`", text))
            })?;
        }

        let [ino, mode, uid, gid, nlink, mtime, filesize, dev_major, dev_minor, rdev_major, rdev_minor, namesize, check] =
            fields;
        Ok(NewcHeader {
            ino,
            mode,
            uid,
            gid,
            nlink,
            mtime,
            filesize,
            dev_major,
            dev_minor,
            rdev_major,
            rdev_minor,
            namesize,
            check,
        })
    }
}

/// Bytes of header plus name (NUL included) plus alignment padding.
fn name_padding(namesize: u64) -> u64 {
    padding_for(HEADER_LEN as u64 + namesize, ALIGNMENT)
}

#[derive(Debug)]
pub struct CpioEncoder {
    next_ino: u32,
    pending: Option<(u64, NewcHeader)>,
}

impl Default for CpioEncoder {
    fn default() -> Self {
        CpioEncoder {
            next_ino: 1,
            pending: None,
        }
    }
}

impl CpioEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_record<S: ByteSink>(
        out: &mut OutputChannel<S>,
        header: &NewcHeader,
        name: &str,
    ) -> Result<()> {
        out.write(&header.encode())?;
        out.write(name.as_bytes())?;
        out.write(&[0])?;
        out.pad_to(ALIGNMENT)
    }
}

impl EntryEncoder for CpioEncoder {
    fn format(&self) -> FormatKey {
        FormatKey::Cpio
    }

    fn size_limit(&self) -> SizeLimit {
        SizeLimit::CPIO_NEWC
    }

    fn validate(&self, entry: &EntryDescriptor) -> Result<()> {
        if entry.name() == TRAILER {
            return Err(ArchiveError::invalid_argument(format!(
                "`{}` is reserved for the archive trailer",
                TRAILER
            )));
        }
        if entry.name().len() as u64 + 1 > u32::MAX as u64 {
            return Err(ArchiveError::invalid_argument("entry name is too long"));
        }
        Ok(())
    }

    fn start_entry<S: ByteSink>(
        &mut self,
        out: &mut OutputChannel<S>,
        entry: &EntryDescriptor,
    ) -> Result<()> {
        let mode = match entry.mode() & S_IFMT {
            0 => S_IFREG | entry.permissions(),
            _ => entry.mode(),
        };

        let header = NewcHeader {
            ino: self.next_ino,
            mode,
            nlink: if entry.is_directory() { 2 } else { 1 },
            mtime: u32::try_from(entry.modified().timestamp().max(0)).unwrap_or(u32::MAX),
            filesize: provisional_size(entry, self.size_limit()) as u32,
            namesize: entry.name().len() as u32 + 1,
            ..NewcHeader::default()
        };
        self.next_ino = self.next_ino.wrapping_add(1);

        let offset = out.position();
        Self::write_record(out, &header, entry.name())?;
        self.pending = Some((offset, header));
        Ok(())
    }

    fn finish_entry<S: ByteSink>(
        &mut self,
        out: &mut OutputChannel<S>,
        entry: &EntryDescriptor,
    ) -> Result<()> {
        out.pad_to(ALIGNMENT)?;

        // The size guard has already run, so this fits.
        let size = entry.size().unwrap_or(0) as u32;
        if let Some((offset, mut header)) = self.pending.take() {
            if header.filesize != size {
                header.filesize = size;
                out.patch(&header.encode(), offset)?;
            }
        }
        Ok(())
    }

    fn finish_archive<S: ByteSink>(&mut self, out: &mut OutputChannel<S>) -> Result<()> {
        let trailer = NewcHeader {
            nlink: 1,
            namesize: TRAILER.len() as u32 + 1,
            ..NewcHeader::default()
        };
        Self::write_record(out, &trailer, TRAILER)?;
        out.pad_to(BLOCK_LEN)
    }
}

#[derive(Debug, Default)]
pub struct CpioDecoder;

impl CpioDecoder {
    pub fn new() -> Self {
        CpioDecoder
    }
}

impl EntryDecoder for CpioDecoder {
    fn format(&self) -> FormatKey {
        FormatKey::Cpio
    }

    fn next_header<R: Read>(&mut self, src: &mut R) -> Result<Option<DecodedEntry>> {
        let mut buf = [0u8; HEADER_LEN];
        if !read_block(src, &mut buf)? {
            return Ok(None);
        }
        let header = NewcHeader::decode(&buf)?;

        let namesize = header.namesize as u64;
        if namesize == 0 || namesize > MAX_NAME_LEN {
            return Err(ArchiveError::corrupt(format!(
                "invalid cpio name size {}",
                namesize
            )));
        }
        let mut name = vec![0u8; namesize as usize];
        read_exact(src, &mut name)?;
        skip(src, name_padding(namesize))?;

        if name.last() == Some(&0) {
            name.pop();
        }
        let name = utf8_name(&name)?;
        if name == TRAILER {
            return Ok(None);
        }

        let size = header.filesize as u64;
        let mode = match header.mode & S_IFMT {
            0 => S_IFREG | (header.mode & 0o7777),
            _ => header.mode,
        };
        let data_len = if mode & S_IFMT == S_IFDIR { 0 } else { size };

        Ok(Some(DecodedEntry {
            entry: EntryDescriptor::from_parts(
                name,
                data_len,
                from_unix_seconds(header.mtime as i64),
                mode,
            ),
            data_len,
            padding: (size - data_len) + padding_for(size, ALIGNMENT),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SeekableChannel;
    use crate::formats::{ContainerWriter, StreamReader};
    use crate::session::{ReaderSession, WriterSession};
    use std::io::Cursor;

    #[test]
    fn header_layout() {
        let header = NewcHeader {
            ino: 1,
            mode: 0o100644,
            nlink: 1,
            filesize: 5,
            namesize: 6,
            ..NewcHeader::default()
        };
        let encoded = header.encode();
        assert_eq!(&encoded[..6], b"070701");
        assert_eq!(&encoded[6..14], b"00000001");
        assert_eq!(&encoded[14..22], b"000081A4");

        let decoded = NewcHeader::decode(&encoded).unwrap();
        assert_eq!(decoded.filesize, 5);
        assert_eq!(decoded.mode, 0o100644);
    }

    #[test]
    fn alignment_and_trailer() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer =
                ContainerWriter::new(SeekableChannel::new(&mut buf), CpioEncoder::new());
            writer
                .add_entry(EntryDescriptor::streamed("abc"), b"hello")
                .unwrap();
            writer.finalize().unwrap();
            writer.close().unwrap();
        }
        let data = buf.into_inner();

        assert_eq!(data.len() % 512, 0);
        // 110 header + "abc\0" = 114, padded to 116.
        assert_eq!(&data[110..114], b"abc\0");
        assert_eq!(&data[116..121], b"hello");
        // Backfilled size.
        assert_eq!(&data[54..62], b"00000005");
        // Content padded to 124, then the trailer record.
        assert_eq!(&data[124..130], b"070701");
        assert_eq!(&data[234..244], b"TRAILER!!!");
    }

    #[test]
    fn crc_variant_is_read() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer =
                ContainerWriter::new(SeekableChannel::new(&mut buf), CpioEncoder::new());
            writer
                .add_entry(EntryDescriptor::file("abc", 5), b"hello")
                .unwrap();
            writer.close().unwrap();
        }
        let mut data = buf.into_inner();

        // Same layout, different magic, plus the byte sum of the content.
        data[..6].copy_from_slice(b"070702");
        data[102..110].copy_from_slice(b"00000214");
        data[124..130].copy_from_slice(b"070702");

        let mut reader = StreamReader::new(Cursor::new(data), CpioDecoder::new());
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.name(), "abc");
        let mut content = Vec::new();
        reader.read_entry_to_end(&mut content).unwrap();
        assert_eq!(content, b"hello");
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn directories_and_files() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer =
                ContainerWriter::new(SeekableChannel::new(&mut buf), CpioEncoder::new());
            writer
                .add_entry(EntryDescriptor::directory("etc"), b"")
                .unwrap();
            writer
                .add_entry(EntryDescriptor::file("etc/motd", 2), b"hi")
                .unwrap();
            writer.close().unwrap();
        }

        let mut reader = StreamReader::new(Cursor::new(buf.into_inner()), CpioDecoder::new());
        let dir = reader.next_entry().unwrap().unwrap();
        assert!(dir.is_directory());
        assert_eq!(dir.name(), "etc/");

        let file = reader.next_entry().unwrap().unwrap();
        assert_eq!(file.size(), Some(2));
        let mut content = Vec::new();
        reader.read_entry_to_end(&mut content).unwrap();
        assert_eq!(content, b"hi");

        assert!(reader.next_entry().unwrap().is_none());
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn trailer_name_is_reserved() {
        let mut writer = ContainerWriter::new(
            SeekableChannel::new(Cursor::new(Vec::new())),
            CpioEncoder::new(),
        );
        let err = writer
            .open_entry(EntryDescriptor::file(TRAILER, 0))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
        writer.close().unwrap();
    }
}
