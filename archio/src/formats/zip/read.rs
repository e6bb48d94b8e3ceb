use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::entry::{
    from_unix_seconds, EntryDescriptor, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, S_IFDIR, S_IFMT,
    S_IFREG,
};
use crate::error::{ArchiveError, Result};
use crate::formats::{read_exact, unexpected_eof};
use crate::lifecycle::ReadLifecycle;
use crate::registry::FormatKey;
use crate::session::ReaderSession;

use super::{
    dostime, CENTRAL_HEADER_LEN, CENTRAL_HEADER_SIGNATURE, END_OF_CENTRAL_DIR_LEN,
    END_OF_CENTRAL_DIR_SIGNATURE, EXTRA_EXTENDED_TIMESTAMP, FLAG_UTF8, LOCAL_HEADER_LEN,
    LOCAL_HEADER_SIGNATURE, METHOD_STORED,
};

const UNIX_HOST: u8 = 3;
const MSDOS_DIR_ATTR: u32 = 0x10;
const MAX_EOCD_SEARCH: u64 = END_OF_CENTRAL_DIR_LEN as u64 + 0xFFFF;

#[derive(Debug)]
struct CentralEntry {
    entry: EntryDescriptor,
    method: u16,
    crc: u32,
    compressed_size: u64,
    local_offset: u64,
}

#[derive(Debug)]
struct OpenEntry {
    name: String,
    method: u16,
    crc: u32,
    remaining: u64,
    hasher: crc32fast::Hasher,
}

/// A reader session for zip and jar. The central directory is read on the
/// first call to `next_entry`.
pub struct ZipReader<R> {
    src: R,
    format: FormatKey,
    lifecycle: ReadLifecycle,
    entries: Option<std::vec::IntoIter<CentralEntry>>,
    current: Option<OpenEntry>,
}

impl<R: Read + Seek> ZipReader<R> {
    pub fn new(src: R) -> Self {
        ZipReader {
            src,
            format: FormatKey::Zip,
            lifecycle: ReadLifecycle::default(),
            entries: None,
            current: None,
        }
    }

    pub fn jar(src: R) -> Self {
        ZipReader {
            format: FormatKey::Jar,
            ..ZipReader::new(src)
        }
    }

    fn load_central_directory(&mut self) -> Result<Vec<CentralEntry>> {
        let (count, cd_size, cd_offset) = self.find_end_record()?;

        self.src.seek(SeekFrom::Start(cd_offset))?;
        let mut cd = vec![0u8; cd_size as usize];
        read_exact(&mut self.src, &mut cd)?;

        let mut cursor = &cd[..];
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(parse_central_entry(&mut cursor)?);
        }

        tracing::debug!(entries = entries.len(), cd_offset, "read zip central directory");
        Ok(entries)
    }

    /// `(entry count, central directory size, central directory offset)`.
    fn find_end_record(&mut self) -> Result<(u16, u64, u64)> {
        let len = self.src.seek(SeekFrom::End(0))?;
        let search = len.min(MAX_EOCD_SEARCH);
        if search < END_OF_CENTRAL_DIR_LEN as u64 {
            return Err(ArchiveError::corrupt("missing end of central directory record"));
        }

        let start = len - search;
        self.src.seek(SeekFrom::Start(start))?;
        let mut tail = vec![0u8; search as usize];
        read_exact(&mut self.src, &mut tail)?;

        let signature = END_OF_CENTRAL_DIR_SIGNATURE.to_le_bytes();
        let pos = (0..=tail.len() - END_OF_CENTRAL_DIR_LEN)
            .rev()
            .find(|&i| tail[i..i + 4] == signature)
            .ok_or_else(|| ArchiveError::corrupt("missing end of central directory record"))?;

        let mut record = &tail[pos + 4..];
        let disk = record.read_u16::<LittleEndian>()?;
        let cd_disk = record.read_u16::<LittleEndian>()?;
        let _entries_on_disk = record.read_u16::<LittleEndian>()?;
        let count = record.read_u16::<LittleEndian>()?;
        let cd_size = record.read_u32::<LittleEndian>()? as u64;
        let cd_offset = record.read_u32::<LittleEndian>()? as u64;

        if disk != 0 || cd_disk != 0 {
            return Err(ArchiveError::UnsupportedFormat(
                "multi-disk zip archives".to_string(),
            ));
        }
        if cd_offset == u32::MAX as u64 || count == u16::MAX {
            return Err(ArchiveError::UnsupportedFormat("zip64 archives".to_string()));
        }
        if cd_offset + cd_size > start + pos as u64 {
            return Err(ArchiveError::corrupt("central directory overlaps its end record"));
        }
        Ok((count, cd_size, cd_offset))
    }
}

fn parse_central_entry(cursor: &mut &[u8]) -> Result<CentralEntry> {
    if cursor.len() < CENTRAL_HEADER_LEN {
        return Err(ArchiveError::corrupt("truncated central directory"));
    }
    if cursor.read_u32::<LittleEndian>()? != CENTRAL_HEADER_SIGNATURE {
        return Err(ArchiveError::corrupt("bad central directory signature"));
    }

    let version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let method = cursor.read_u16::<LittleEndian>()?;
    let dos_time = cursor.read_u16::<LittleEndian>()?;
    let dos_date = cursor.read_u16::<LittleEndian>()?;
    let crc = cursor.read_u32::<LittleEndian>()?;
    let compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let size = cursor.read_u32::<LittleEndian>()? as u64;
    let name_len = cursor.read_u16::<LittleEndian>()? as usize;
    let extra_len = cursor.read_u16::<LittleEndian>()? as usize;
    let comment_len = cursor.read_u16::<LittleEndian>()? as usize;
    let _disk = cursor.read_u16::<LittleEndian>()?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let external_attrs = cursor.read_u32::<LittleEndian>()?;
    let local_offset = cursor.read_u32::<LittleEndian>()? as u64;

    if cursor.len() < name_len + extra_len + comment_len {
        return Err(ArchiveError::corrupt("truncated central directory"));
    }
    let data: &[u8] = *cursor;
    let (name, rest) = data.split_at(name_len);
    let (extra, rest) = rest.split_at(extra_len);
    *cursor = &rest[comment_len..];

    let name = decode_name(name, flags);
    let is_dir = name.ends_with('/') || external_attrs & MSDOS_DIR_ATTR != 0;

    let unix_mode = if (version_made_by >> 8) as u8 == UNIX_HOST {
        external_attrs >> 16
    } else {
        0
    };
    let mode = match (unix_mode, is_dir) {
        (0, true) => DEFAULT_DIR_MODE,
        (0, false) => DEFAULT_FILE_MODE,
        (mode, true) => S_IFDIR | (mode & 0o7777),
        (mode, false) if mode & S_IFMT == 0 => S_IFREG | mode,
        (mode, false) => mode,
    };

    let modified = match extended_mtime(extra) {
        Some(secs) => from_unix_seconds(secs),
        None => dostime::from_dos(dos_time, dos_date).unwrap_or_else(|| from_unix_seconds(0)),
    };

    let size = if is_dir { 0 } else { size };
    Ok(CentralEntry {
        entry: EntryDescriptor::from_parts(name, size, modified, mode),
        method,
        crc,
        compressed_size: if is_dir { 0 } else { compressed_size },
        local_offset,
    })
}

/// Names without the UTF-8 flag are nominally CP437; bytes outside ASCII
/// are mapped one-to-one onto Latin-1 unless they happen to be valid UTF-8.
fn decode_name(raw: &[u8], flags: u16) -> String {
    match String::from_utf8(raw.to_vec()) {
        Ok(name) => name,
        Err(_) if flags & FLAG_UTF8 != 0 => String::from_utf8_lossy(raw).into_owned(),
        Err(_) => raw.iter().map(|&b| b as char).collect(),
    }
}

/// The modification time from an extended-timestamp extra field.
fn extended_mtime(mut extra: &[u8]) -> Option<i64> {
    while extra.len() >= 4 {
        let id = extra.read_u16::<LittleEndian>().ok()?;
        let len = extra.read_u16::<LittleEndian>().ok()? as usize;
        if extra.len() < len {
            return None;
        }
        let (data, rest) = extra.split_at(len);
        extra = rest;

        if id == EXTRA_EXTENDED_TIMESTAMP && len >= 5 && data[0] & 1 != 0 {
            let mut mtime = &data[1..5];
            return mtime.read_i32::<LittleEndian>().ok().map(i64::from);
        }
    }
    None
}

impl<R: Read + Seek> ReaderSession for ZipReader<R> {
    fn format(&self) -> FormatKey {
        self.format
    }

    fn next_entry(&mut self) -> Result<Option<EntryDescriptor>> {
        self.lifecycle.check_ready()?;
        self.current = None;

        if self.entries.is_none() {
            self.entries = Some(self.load_central_directory()?.into_iter());
        }
        let next = match self.entries.as_mut().and_then(|entries| entries.next()) {
            Some(next) => next,
            None => return Ok(None),
        };

        self.src.seek(SeekFrom::Start(next.local_offset))?;
        let mut header = [0u8; LOCAL_HEADER_LEN];
        read_exact(&mut self.src, &mut header)?;
        let mut fields = &header[..];
        if fields.read_u32::<LittleEndian>()? != LOCAL_HEADER_SIGNATURE {
            return Err(ArchiveError::corrupt(format!(
                "bad local header signature for `{}`",
                next.entry.name()
            )));
        }
        let mut lengths = &header[26..];
        let name_len = lengths.read_u16::<LittleEndian>()? as i64;
        let extra_len = lengths.read_u16::<LittleEndian>()? as i64;
        self.src.seek(SeekFrom::Current(name_len + extra_len))?;

        tracing::debug!(
            format = %self.format,
            name = next.entry.name(),
            size = ?next.entry.size(),
            offset = next.local_offset,
            "read entry header"
        );

        self.current = Some(OpenEntry {
            name: next.entry.name().to_string(),
            method: next.method,
            crc: next.crc,
            remaining: next.compressed_size,
            hasher: crc32fast::Hasher::new(),
        });
        Ok(Some(next.entry))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.lifecycle.check_ready()?;
        let current = match self.current.as_mut() {
            Some(current) => current,
            None => return Ok(0),
        };
        if current.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        if current.method != METHOD_STORED {
            return Err(ArchiveError::UnsupportedFormat(format!(
                "zip compression method {}",
                current.method
            )));
        }

        let max = buf.len().min(usize::try_from(current.remaining).unwrap_or(usize::MAX));
        let n = self.src.read(&mut buf[..max])?;
        if n == 0 {
            return Err(unexpected_eof());
        }
        current.hasher.update(&buf[..n]);
        current.remaining -= n as u64;

        if current.remaining == 0 {
            let crc = std::mem::replace(&mut current.hasher, crc32fast::Hasher::new()).finalize();
            if crc != current.crc {
                return Err(ArchiveError::corrupt(format!(
                    "CRC mismatch for `{}`",
                    current.name
                )));
            }
        }
        Ok(n)
    }

    fn close(&mut self) -> Result<()> {
        if self.lifecycle.close() {
            self.current = None;
            tracing::debug!(format = %self.format, "closed reader session");
        }
        Ok(())
    }
}
