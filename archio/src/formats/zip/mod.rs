//! Zip archives, stored (uncompressed) entries only.
//!
//! Local headers are written with a provisional CRC and size and patched in
//! place once the entry is closed, so no data descriptors are needed.

use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{DateTime, Utc};

use crate::channel::ByteSink;
use crate::counting::OutputChannel;
use crate::entry::EntryDescriptor;
use crate::error::{ArchiveError, Result};
use crate::formats::{provisional_size, EntryEncoder};
use crate::limit::SizeLimit;
use crate::registry::{FormatKey, WriterOptions};

mod dostime;
mod read;

pub use self::read::ZipReader;

pub(crate) const LOCAL_HEADER_SIGNATURE: u32 = 0x04034b50;
pub(crate) const CENTRAL_HEADER_SIGNATURE: u32 = 0x02014b50;
pub(crate) const END_OF_CENTRAL_DIR_SIGNATURE: u32 = 0x06054b50;

pub(crate) const LOCAL_HEADER_LEN: usize = 30;
pub(crate) const CENTRAL_HEADER_LEN: usize = 46;
pub(crate) const END_OF_CENTRAL_DIR_LEN: usize = 22;

/// Offset of the CRC within a local header; sizes follow it.
const LOCAL_CRC_OFFSET: u64 = 14;

pub(crate) const METHOD_STORED: u16 = 0;
pub(crate) const FLAG_UTF8: u16 = 0x0800;

/// Unix host, made by version 2.0.
const VERSION_MADE_BY: u16 = 0x0314;
const VERSION_NEEDED: u16 = 10;
const VERSION_NEEDED_DIR: u16 = 20;

pub(crate) const EXTRA_EXTENDED_TIMESTAMP: u16 = 0x5455;
pub(crate) const EXTRA_JAR_MARKER: u16 = 0xCAFE;

const MSDOS_DIR_ATTR: u32 = 0x10;
const MAX_ENTRIES: usize = 0xFFFF;
const MAX_COMMENT_LEN: usize = 0xFFFF;

/// What the central directory needs to know about a written entry.
#[derive(Debug)]
struct CentralRecord {
    name: Vec<u8>,
    flags: u16,
    version_needed: u16,
    dos_time: u16,
    dos_date: u16,
    crc: u32,
    size: u32,
    external_attrs: u32,
    offset: u32,
    extra: Vec<u8>,
}

#[derive(Debug)]
pub struct ZipEncoder {
    comment: Vec<u8>,
    jar_marker: bool,
    entries: Vec<CentralRecord>,
    current: Option<CentralRecord>,
    hasher: crc32fast::Hasher,
}

impl ZipEncoder {
    pub fn new(options: &WriterOptions) -> Result<Self> {
        let comment = options
            .zip_comment
            .as_deref()
            .map(|c| c.as_bytes().to_vec())
            .unwrap_or_default();
        if comment.len() > MAX_COMMENT_LEN {
            return Err(ArchiveError::invalid_argument(format!(
                "zip comment is {} bytes, the maximum is {}",
                comment.len(),
                MAX_COMMENT_LEN
            )));
        }

        Ok(ZipEncoder {
            comment,
            jar_marker: false,
            entries: Vec::new(),
            current: None,
            hasher: crc32fast::Hasher::new(),
        })
    }

    /// Tag the first entry with the executable-jar marker extra field.
    pub(crate) fn with_jar_marker(mut self) -> Self {
        self.jar_marker = true;
        self
    }

    fn extra_fields(&self, modified: DateTime<Utc>) -> Result<Vec<u8>> {
        let mut extra = Vec::new();
        if self.jar_marker && self.entries.is_empty() {
            extra.write_u16::<LittleEndian>(EXTRA_JAR_MARKER)?;
            extra.write_u16::<LittleEndian>(0)?;
        }
        if let Ok(mtime) = i32::try_from(modified.timestamp()) {
            extra.write_u16::<LittleEndian>(EXTRA_EXTENDED_TIMESTAMP)?;
            extra.write_u16::<LittleEndian>(5)?;
            // Flags: modification time present.
            extra.write_u8(1)?;
            extra.write_i32::<LittleEndian>(mtime)?;
        }
        Ok(extra)
    }
}

fn encode_local(record: &CentralRecord) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(LOCAL_HEADER_LEN + record.name.len() + record.extra.len());
    buf.write_u32::<LittleEndian>(LOCAL_HEADER_SIGNATURE)?;
    buf.write_u16::<LittleEndian>(record.version_needed)?;
    buf.write_u16::<LittleEndian>(record.flags)?;
    buf.write_u16::<LittleEndian>(METHOD_STORED)?;
    buf.write_u16::<LittleEndian>(record.dos_time)?;
    buf.write_u16::<LittleEndian>(record.dos_date)?;
    buf.write_u32::<LittleEndian>(record.crc)?;
    buf.write_u32::<LittleEndian>(record.size)?;
    buf.write_u32::<LittleEndian>(record.size)?;
    buf.write_u16::<LittleEndian>(record.name.len() as u16)?;
    buf.write_u16::<LittleEndian>(record.extra.len() as u16)?;
    buf.extend_from_slice(&record.name);
    buf.extend_from_slice(&record.extra);
    Ok(buf)
}

fn encode_central(record: &CentralRecord) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(CENTRAL_HEADER_LEN + record.name.len() + record.extra.len());
    buf.write_u32::<LittleEndian>(CENTRAL_HEADER_SIGNATURE)?;
    buf.write_u16::<LittleEndian>(VERSION_MADE_BY)?;
    buf.write_u16::<LittleEndian>(record.version_needed)?;
    buf.write_u16::<LittleEndian>(record.flags)?;
    buf.write_u16::<LittleEndian>(METHOD_STORED)?;
    buf.write_u16::<LittleEndian>(record.dos_time)?;
    buf.write_u16::<LittleEndian>(record.dos_date)?;
    buf.write_u32::<LittleEndian>(record.crc)?;
    buf.write_u32::<LittleEndian>(record.size)?;
    buf.write_u32::<LittleEndian>(record.size)?;
    buf.write_u16::<LittleEndian>(record.name.len() as u16)?;
    buf.write_u16::<LittleEndian>(record.extra.len() as u16)?;
    // Comment length, disk number, internal attributes.
    buf.write_u16::<LittleEndian>(0)?;
    buf.write_u16::<LittleEndian>(0)?;
    buf.write_u16::<LittleEndian>(0)?;
    buf.write_u32::<LittleEndian>(record.external_attrs)?;
    buf.write_u32::<LittleEndian>(record.offset)?;
    buf.extend_from_slice(&record.name);
    buf.extend_from_slice(&record.extra);
    Ok(buf)
}

impl EntryEncoder for ZipEncoder {
    fn format(&self) -> FormatKey {
        FormatKey::Zip
    }

    fn size_limit(&self) -> SizeLimit {
        SizeLimit::ZIP32
    }

    fn validate(&self, entry: &EntryDescriptor) -> Result<()> {
        if self.entries.len() >= MAX_ENTRIES {
            return Err(ArchiveError::invalid_argument(format!(
                "a zip archive holds at most {} entries",
                MAX_ENTRIES
            )));
        }
        if entry.name().len() > u16::MAX as usize {
            return Err(ArchiveError::invalid_argument(format!(
                "file name '{}' is too long",
                entry.name()
            )));
        }
        Ok(())
    }

    fn start_entry<S: ByteSink>(
        &mut self,
        out: &mut OutputChannel<S>,
        entry: &EntryDescriptor,
    ) -> Result<()> {
        let offset = out.position();
        SizeLimit::ZIP32.check("archive", offset)?;

        let name = entry.name();
        let (dos_time, dos_date) = dostime::to_dos(entry.modified());
        let is_dir = entry.is_directory();

        let record = CentralRecord {
            flags: if name.is_ascii() { 0 } else { FLAG_UTF8 },
            name: name.as_bytes().to_vec(),
            version_needed: if is_dir {
                VERSION_NEEDED_DIR
            } else {
                VERSION_NEEDED
            },
            dos_time,
            dos_date,
            crc: 0,
            size: provisional_size(entry, self.size_limit()) as u32,
            external_attrs: (entry.mode() << 16) | (if is_dir { MSDOS_DIR_ATTR } else { 0 }),
            offset: offset as u32,
            extra: self.extra_fields(entry.modified())?,
        };

        out.write(&encode_local(&record)?)?;
        self.hasher = crc32fast::Hasher::new();
        self.current = Some(record);
        Ok(())
    }

    fn update(&mut self, buf: &[u8]) {
        self.hasher.update(buf);
    }

    fn finish_entry<S: ByteSink>(
        &mut self,
        out: &mut OutputChannel<S>,
        entry: &EntryDescriptor,
    ) -> Result<()> {
        let mut record = match self.current.take() {
            Some(record) => record,
            None => return Ok(()),
        };

        let hasher = std::mem::replace(&mut self.hasher, crc32fast::Hasher::new());
        let crc = hasher.finalize();
        let size = entry.size().unwrap_or(0) as u32;

        if crc != record.crc || size != record.size {
            record.crc = crc;
            record.size = size;

            let mut fixup = Vec::with_capacity(12);
            fixup.write_u32::<LittleEndian>(crc)?;
            fixup.write_u32::<LittleEndian>(size)?;
            fixup.write_u32::<LittleEndian>(size)?;
            out.patch(&fixup, record.offset as u64 + LOCAL_CRC_OFFSET)?;
        }

        self.entries.push(record);
        Ok(())
    }

    fn finish_archive<S: ByteSink>(&mut self, out: &mut OutputChannel<S>) -> Result<()> {
        let cd_offset = out.position();
        SizeLimit::ZIP32.check("archive", cd_offset)?;

        for record in &self.entries {
            out.write(&encode_central(record)?)?;
        }
        let cd_size = out.position() - cd_offset;
        SizeLimit::ZIP32.check("archive", cd_size)?;

        let count = self.entries.len() as u16;
        let mut eocd = Vec::with_capacity(END_OF_CENTRAL_DIR_LEN + self.comment.len());
        eocd.write_u32::<LittleEndian>(END_OF_CENTRAL_DIR_SIGNATURE)?;
        // This disk, and the disk holding the central directory.
        eocd.write_u16::<LittleEndian>(0)?;
        eocd.write_u16::<LittleEndian>(0)?;
        eocd.write_u16::<LittleEndian>(count)?;
        eocd.write_u16::<LittleEndian>(count)?;
        eocd.write_u32::<LittleEndian>(cd_size as u32)?;
        eocd.write_u32::<LittleEndian>(cd_offset as u32)?;
        eocd.write_u16::<LittleEndian>(self.comment.len() as u16)?;
        eocd.extend_from_slice(&self.comment);
        out.write(&eocd)?;

        tracing::trace!(entries = count, cd_offset, cd_size, "wrote zip central directory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SeekableChannel;
    use crate::formats::ContainerWriter;
    use crate::session::{ReaderSession, WriterSession};
    use byteorder::{ByteOrder, LittleEndian};
    use std::io::Cursor;

    fn write_zip(options: &WriterOptions, entries: &[(EntryDescriptor, &[u8])]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let encoder = ZipEncoder::new(options).unwrap();
            let mut writer = ContainerWriter::new(SeekableChannel::new(&mut buf), encoder);
            for (entry, content) in entries {
                writer.add_entry(entry.clone(), content).unwrap();
            }
            writer.close().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn empty_archive_is_a_bare_end_record() {
        let data = write_zip(&WriterOptions::default(), &[]);
        assert_eq!(data.len(), END_OF_CENTRAL_DIR_LEN);
        assert_eq!(LittleEndian::read_u32(&data), END_OF_CENTRAL_DIR_SIGNATURE);
    }

    #[test]
    fn local_header_is_patched() {
        let data = write_zip(
            &WriterOptions::default(),
            &[(EntryDescriptor::streamed("hello.txt"), &b"hello"[..])],
        );

        assert_eq!(LittleEndian::read_u32(&data), LOCAL_HEADER_SIGNATURE);
        assert_eq!(LittleEndian::read_u32(&data[14..]), crc32fast::hash(b"hello"));
        assert_eq!(LittleEndian::read_u32(&data[18..]), 5);
        assert_eq!(LittleEndian::read_u32(&data[22..]), 5);
        assert_eq!(LittleEndian::read_u16(&data[26..]), 9);
        assert_eq!(&data[30..39], b"hello.txt");
    }

    #[test]
    fn comment_is_written_and_bounded() {
        let options = WriterOptions::default().with_zip_comment("built by hand");
        let data = write_zip(&options, &[]);
        assert!(data.ends_with(b"built by hand"));

        let too_long = WriterOptions::default().with_zip_comment("c".repeat(70_000));
        let err = ZipEncoder::new(&too_long).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn entries_round_trip() {
        let modified = DateTime::<Utc>::from_timestamp(1_234_567_891, 0).unwrap();
        let data = write_zip(
            &WriterOptions::default(),
            &[
                (EntryDescriptor::directory("docs"), &b""[..]),
                (
                    EntryDescriptor::file("docs/ünïcode.txt", 3)
                        .with_modified(modified)
                        .with_mode(0o600),
                    &b"abc"[..],
                ),
            ],
        );

        let mut reader = ZipReader::new(Cursor::new(data));
        let dir = reader.next_entry().unwrap().unwrap();
        assert_eq!(dir.name(), "docs/");
        assert!(dir.is_directory());

        let file = reader.next_entry().unwrap().unwrap();
        assert_eq!(file.name(), "docs/ünïcode.txt");
        assert_eq!(file.size(), Some(3));
        assert_eq!(file.modified(), modified);
        assert_eq!(file.permissions(), 0o600);

        let mut content = Vec::new();
        reader.read_entry_to_end(&mut content).unwrap();
        assert_eq!(content, b"abc");
        assert!(reader.next_entry().unwrap().is_none());
    }
}
